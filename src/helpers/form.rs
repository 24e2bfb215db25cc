use std::collections::BTreeMap;

use tracing::warn;

use crate::models::timesheet::{StudentRecord, TimesheetHeader};

pub const MONTH_FIELD: &str = "Month";
pub const ABN_FIELD: &str = "Your ABN";
pub const TUTOR_NAME_FIELD: &str = "Your Name";
pub const STUDENT_FIELD: &str = "STUDENT JOB NAME";
pub const PAGE_NO_FIELD: &str = "Page No";
pub const PAGE_COUNT_FIELD: &str = "of";
pub const TOTAL_FIELD: &str = "Total Job Time";

/// Number of lesson rows printed on the template.
pub const MAX_LESSONS: usize = 10;

pub type FieldValues = BTreeMap<String, String>;

pub fn lesson_date_field(index: usize) -> String {
    format!("dd  mm  yy{}", index)
}

pub fn lesson_length_field(index: usize) -> String {
    format!("hh  mm{}_3", index)
}

/// Rewrites `D/M/Y` into the `DD  MM  YY` layout of the template's date boxes.
/// Anything that is not three slash-separated parts is returned unchanged.
pub fn format_lesson_date(date: &str) -> String {
    let parts: Vec<&str> = date.split('/').collect();
    match parts.as_slice() {
        [day, month, year] => {
            let year_chars: Vec<char> = year.chars().collect();
            let short_year: String = year_chars[year_chars.len().saturating_sub(2)..]
                .iter()
                .collect();
            format!("{:0>2}  {:0>2}  {}", day, month, short_year)
        }
        _ => date.to_string(),
    }
}

pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn output_file_name(student_name: &str) -> String {
    format!("{}_timesheet.pdf", sanitize_file_name(student_name))
}

pub fn build_field_values(
    header: &TimesheetHeader,
    student: &StudentRecord,
    tutor_name: &str,
) -> FieldValues {
    let student_name = student.name();

    let mut fields = FieldValues::new();
    fields.insert(MONTH_FIELD.to_string(), header.month.as_str().to_string());
    fields.insert(ABN_FIELD.to_string(), header.abn_number.as_str().to_string());
    fields.insert(TUTOR_NAME_FIELD.to_string(), tutor_name.to_string());
    fields.insert(STUDENT_FIELD.to_string(), student_name.to_string());
    fields.insert(PAGE_NO_FIELD.to_string(), "1".to_string());
    fields.insert(PAGE_COUNT_FIELD.to_string(), "1".to_string());
    fields.insert(
        TOTAL_FIELD.to_string(),
        student.total_hours.as_str().to_string(),
    );

    if student.lessons.len() > MAX_LESSONS {
        warn!(
            "Student {} has {} lessons, only the first {} will be included",
            student_name,
            student.lessons.len(),
            MAX_LESSONS
        );
    }

    for (index, lesson) in student.lessons.iter().take(MAX_LESSONS).enumerate() {
        let index = index + 1;

        let date = if lesson.date.is_empty() {
            warn!("Missing date for lesson {} of student {}", index, student_name);
            "N/A"
        } else {
            lesson.date.as_str()
        };

        let length = if lesson.length.is_empty() {
            warn!("Missing length for lesson {} of student {}", index, student_name);
            "0"
        } else {
            lesson.length.as_str()
        };

        fields.insert(lesson_date_field(index), format_lesson_date(date));
        fields.insert(lesson_length_field(index), length.to_string());
    }

    fields
}
