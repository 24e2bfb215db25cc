use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::error::RunError;
use crate::helpers::{
    form::{build_field_values, output_file_name},
    html::extract_timesheet_file,
    pdf::PdfTemplate,
};

const DEFAULT_HTML_PATH: &str = "timesheet.html";
const DEFAULT_TEMPLATE_PATH: &str = "template.pdf";
const DEFAULT_TUTOR_NAME: &str = "Sam Towney";

/// Configuration for the timesheet generator
#[derive(Debug, Clone)]
pub struct TimesheetConfig {
    pub html_path: PathBuf,
    pub template_path: PathBuf,
    /// Directory the `<month>-<year>-timesheets` folder is created in.
    pub output_root: PathBuf,
    pub tutor_name: String,
}

impl Default for TimesheetConfig {
    fn default() -> Self {
        Self {
            html_path: PathBuf::from(DEFAULT_HTML_PATH),
            template_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            output_root: PathBuf::from("."),
            tutor_name: DEFAULT_TUTOR_NAME.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub total_students: usize,
    /// Students with at least one lesson.
    pub eligible_students: usize,
    pub created: Vec<PathBuf>,
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn success_count(&self) -> usize {
        self.created.len()
    }
}

/// Turns one timesheet export into one filled PDF per student.
#[derive(Clone)]
pub struct TimesheetService {
    pub config: TimesheetConfig,
}

impl TimesheetService {
    pub fn new(config: TimesheetConfig) -> Self {
        info!("Creating new TimesheetService instance");
        Self { config }
    }

    pub fn run(&self) -> Result<RunSummary, RunError> {
        let config = &self.config;
        ensure_exists("HTML timesheet", &config.html_path)?;
        ensure_exists("PDF template", &config.template_path)?;

        let timesheet = extract_timesheet_file(&config.html_path)?;
        let header = &timesheet.header;

        if header.month.value().is_empty() {
            warn!("Month information is missing");
        }
        if header.abn_number.value().is_empty() {
            warn!("ABN information is missing");
        }

        info!("Found {} students", timesheet.students.len());
        info!(
            "Month: {}, ABN: {}",
            non_empty_or(header.month.as_str(), "NOT FOUND"),
            non_empty_or(header.abn_number.as_str(), "NOT FOUND")
        );

        let template = PdfTemplate::load(&config.template_path)?;

        let output_dir = config.output_root.join(header.output_dir_name());
        fs::create_dir_all(&output_dir).map_err(|source| RunError::OutputDir {
            path: output_dir.clone(),
            source,
        })?;

        let mut summary = RunSummary {
            output_dir,
            total_students: timesheet.students.len(),
            eligible_students: 0,
            created: Vec::new(),
            failed: Vec::new(),
        };

        for student in &timesheet.students {
            let student_name = student.name();

            if !student.has_lessons() {
                info!("Skipping {} - no lessons found", student_name);
                continue;
            }
            summary.eligible_students += 1;

            let output_pdf = summary.output_dir.join(output_file_name(student_name));
            let field_values = build_field_values(header, student, &config.tutor_name);

            match template.fill(&output_pdf, &field_values) {
                Ok(_) => {
                    info!(
                        "Created timesheet for {} with {} lessons ({} hours)",
                        student_name,
                        student.lessons.len(),
                        student.total_hours
                    );
                    summary.created.push(output_pdf);
                }
                Err(e) => {
                    error!("Error creating PDF '{}': {}", output_pdf.display(), e);
                    summary.failed.push(student_name.to_string());
                }
            }
        }

        info!(
            "Summary: Successfully created {} of {} timesheets",
            summary.success_count(),
            summary.eligible_students
        );

        Ok(summary)
    }
}

fn ensure_exists(kind: &'static str, path: &Path) -> Result<(), RunError> {
    if path.exists() {
        Ok(())
    } else {
        Err(RunError::MissingInput {
            kind,
            path: path.to_path_buf(),
        })
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}
