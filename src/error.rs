use std::path::PathBuf;

use crate::models::timesheet::TimesheetHeader;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Failed to read HTML file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTML file is empty")]
    Empty,
    #[error("No student information found in HTML")]
    NoStudents { header: TimesheetHeader },
}

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("Failed to open template PDF '{}': {source}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },
    #[error("Malformed PDF structure: {0}")]
    Structure(#[from] lopdf::Error),
    #[error("Failed to write PDF '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{kind} file '{}' not found", path.display())]
    MissingInput { kind: &'static str, path: PathBuf },
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Template(#[from] PdfError),
    #[error("Failed to create output directory '{}': {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
