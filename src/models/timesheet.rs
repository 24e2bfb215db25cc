use std::fmt;

/// A value read from the export, or a fallback substituted when the source
/// element was missing or malformed.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Found(T),
    Defaulted { value: T, reason: String },
}

impl<T> Extracted<T> {
    pub fn defaulted(value: T, reason: impl Into<String>) -> Self {
        Extracted::Defaulted {
            value,
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Extracted::Found(value) | Extracted::Defaulted { value, .. } => value,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Extracted::Defaulted { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Extracted::Found(_) => None,
            Extracted::Defaulted { reason, .. } => Some(reason),
        }
    }
}

impl Extracted<String> {
    pub fn as_str(&self) -> &str {
        self.value().as_str()
    }
}

#[derive(Debug, Clone)]
pub struct TimesheetHeader {
    pub abn_number: Extracted<String>,
    pub month: Extracted<String>,
    pub year: Extracted<String>,
}

impl TimesheetHeader {
    /// Directory name the generated timesheets are written to.
    pub fn output_dir_name(&self) -> String {
        format!("{}-{}-timesheets", self.month.as_str(), self.year.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LessonEntry {
    pub date: String,
    pub length: String,
}

/// Where a student's total came from. A footer total is kept verbatim, a
/// computed one is the sum of the retained lessons.
#[derive(Debug, Clone, PartialEq)]
pub enum TotalHours {
    Footer(String),
    Computed(String),
    Defaulted { value: String, reason: String },
}

impl TotalHours {
    pub fn defaulted(reason: impl Into<String>) -> Self {
        TotalHours::Defaulted {
            value: "0".to_string(),
            reason: reason.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TotalHours::Footer(value)
            | TotalHours::Computed(value)
            | TotalHours::Defaulted { value, .. } => value,
        }
    }
}

impl fmt::Display for TotalHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StudentRecord {
    /// Variable part of the repeater identifiers shared by this student's elements.
    pub id_suffix: String,
    pub student_name: Extracted<String>,
    pub lessons: Vec<LessonEntry>,
    pub total_hours: TotalHours,
}

impl StudentRecord {
    pub fn name(&self) -> &str {
        self.student_name.as_str()
    }

    pub fn has_lessons(&self) -> bool {
        !self.lessons.is_empty()
    }
}

#[derive(Debug)]
pub struct Timesheet {
    pub header: TimesheetHeader,
    pub students: Vec<StudentRecord>,
}
