//! Tutoring Timesheet Utility Library
//!
//! This library extracts per-student lesson records from a tutoring timesheet
//! HTML export and fills one copy of a PDF timesheet template per student.

pub mod error;
pub mod helpers;
pub mod models;
pub mod service;

pub use error::{ExtractError, PdfError, RunError};
pub use service::{RunSummary, TimesheetConfig, TimesheetService};

// Re-export key types for convenience
pub use helpers::html::{extract_timesheet, extract_timesheet_file};
pub use helpers::pdf::{fill_timesheet, PdfTemplate};
pub use models::timesheet::{LessonEntry, StudentRecord, Timesheet, TimesheetHeader};
