use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use chrono::Month;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error, info, instrument, warn};

use crate::error::ExtractError;
use crate::models::timesheet::{
    Extracted, LessonEntry, StudentRecord, Timesheet, TimesheetHeader, TotalHours,
};

const ABN_ID: &str = "abnLabel";
const MONTH_YEAR_ID: &str = "mainContentPlaceHolder_timeSheetsRepeater_selectTimesheetLinkButton_0";

const FOOTER_ROW_CLASS: &str = "GroupFooter1";
const DETAIL_ROW_CLASS: &str = "ThinBorder";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

static WITH_ID: LazyLock<Selector> = LazyLock::new(|| selector("[id]"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static DATE_CELL: LazyLock<Selector> = LazyLock::new(|| selector("td.date"));
static HOURS_CELL: LazyLock<Selector> = LazyLock::new(|| selector("td.hours"));

/// The repeater elements of the export that are keyed by a per-student suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    StudentBlock,
    StudentName,
    LessonTable,
}

impl ElementKind {
    pub fn id_prefix(self) -> &'static str {
        match self {
            ElementKind::StudentBlock => {
                "mainContentPlaceHolder_rptTimesheetStudents_timesheetDetails_"
            }
            ElementKind::StudentName => "mainContentPlaceHolder_rptTimesheetStudents_lblStudentName_",
            ElementKind::LessonTable => {
                "mainContentPlaceHolder_rptTimesheetStudents_timeSheetDetailsDataList_"
            }
        }
    }

    pub fn element_id(self, suffix: &str) -> String {
        format!("{}{}", self.id_prefix(), suffix)
    }

    fn selector(self) -> &'static Selector {
        match self {
            ElementKind::StudentName => &*SPAN,
            ElementKind::StudentBlock | ElementKind::LessonTable => &*WITH_ID,
        }
    }
}

fn find_by_id<'a>(document: &'a Html, selector: &Selector, id: &str) -> Option<ElementRef<'a>> {
    document
        .select(selector)
        .find(|element| element.value().id() == Some(id))
}

pub fn find_by_suffix<'a>(
    document: &'a Html,
    kind: ElementKind,
    suffix: &str,
) -> Option<ElementRef<'a>> {
    find_by_id(document, kind.selector(), &kind.element_id(suffix))
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn has_class(element: ElementRef, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// Formats a computed hour total so it always carries a fractional part.
pub fn format_hours(total: f64) -> String {
    if total.is_finite() && total.fract() == 0.0 {
        format!("{:.1}", total)
    } else {
        total.to_string()
    }
}

pub fn extract_timesheet_file<P: AsRef<Path>>(path: P) -> Result<Timesheet, ExtractError> {
    let path = path.as_ref();
    info!("Reading HTML timesheet from {}", path.display());

    let html = fs::read_to_string(path).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    extract_timesheet(&html)
}

#[instrument(skip(html), fields(html_size = html.len()))]
pub fn extract_timesheet(html: &str) -> Result<Timesheet, ExtractError> {
    if html.is_empty() {
        return Err(ExtractError::Empty);
    }

    debug!("Parsing HTML document");
    let document = Html::parse_document(html);

    let header = extract_header(&document);

    let suffixes = student_suffixes(&document);
    if suffixes.is_empty() {
        return Err(ExtractError::NoStudents { header });
    }
    debug!("Found {} student blocks", suffixes.len());

    let students = suffixes
        .iter()
        .map(|suffix| extract_student(&document, suffix))
        .collect();

    Ok(Timesheet { header, students })
}

fn extract_header(document: &Html) -> TimesheetHeader {
    let abn_number = match find_by_id(document, &SPAN, ABN_ID) {
        Some(element) => Extracted::Found(element_text(element)),
        None => {
            warn!("ABN information not found in HTML");
            Extracted::defaulted(String::new(), "ABN element not found")
        }
    };

    let (month, year) = match find_by_id(document, &ANCHOR, MONTH_YEAR_ID) {
        None => {
            warn!("Month/Year information not found in HTML");
            let reason = "month/year element not found";
            (
                Extracted::defaulted(String::new(), reason),
                Extracted::defaulted(String::new(), reason),
            )
        }
        Some(element) => {
            let text = element_text(element);
            match split_month_year(&text) {
                Some((month, year)) => {
                    check_period(&month, &year);
                    (Extracted::Found(month), Extracted::Found(year))
                }
                None => {
                    warn!("Could not parse month and year from '{}'", text);
                    let reason = format!("unparseable month/year text '{}'", text);
                    (
                        Extracted::defaulted(String::new(), reason.clone()),
                        Extracted::defaulted(String::new(), reason),
                    )
                }
            }
        }
    };

    TimesheetHeader {
        abn_number,
        month,
        year,
    }
}

fn split_month_year(text: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = text.split(' ').collect();
    match parts.as_slice() {
        [month, year] => Some((month.to_string(), year.to_string())),
        _ => None,
    }
}

// Unusual values are kept verbatim; they only end up in a directory name.
fn check_period(month: &str, year: &str) {
    if month.parse::<Month>().is_err() {
        warn!("'{}' is not a recognised month name", month);
    }
    if year.parse::<i32>().is_err() {
        warn!("'{}' is not a numeric year", year);
    }
}

fn student_suffixes(document: &Html) -> Vec<String> {
    let prefix = ElementKind::StudentBlock.id_prefix();
    document
        .select(&WITH_ID)
        .filter_map(|element| element.value().id()?.strip_prefix(prefix))
        .map(str::to_string)
        .collect()
}

fn extract_student(document: &Html, suffix: &str) -> StudentRecord {
    let student_name = match find_by_suffix(document, ElementKind::StudentName, suffix) {
        Some(element) => Extracted::Found(element_text(element)),
        None => {
            warn!("Student name not found for element with ID suffix {}", suffix);
            Extracted::defaulted(
                format!("Unknown Student {}", suffix),
                "student name element not found",
            )
        }
    };
    let name = student_name.as_str();

    let (lessons, total_hours) = match find_by_suffix(document, ElementKind::LessonTable, suffix) {
        Some(table) => read_lesson_table(table, name),
        None => {
            warn!("No lesson table found for student {}", name);
            (Vec::new(), TotalHours::defaulted("lesson table not found"))
        }
    };

    if lessons.is_empty() {
        warn!("No valid lessons found for student {}", name);
    }

    StudentRecord {
        id_suffix: suffix.to_string(),
        student_name,
        lessons,
        total_hours,
    }
}

fn read_lesson_table(table: ElementRef, student: &str) -> (Vec<LessonEntry>, TotalHours) {
    let rows: Vec<ElementRef> = table.select(&ROW).collect();
    if rows.is_empty() {
        warn!("No lesson rows found for student {}", student);
        return (Vec::new(), TotalHours::defaulted("lesson table has no rows"));
    }

    let mut lessons = Vec::new();
    let mut footer_total = None;

    for row in rows {
        if has_class(row, FOOTER_ROW_CLASS) {
            if let Some(cell) = row.select(&HOURS_CELL).next() {
                footer_total = Some(element_text(cell));
            }
        }

        if has_class(row, DETAIL_ROW_CLASS) {
            if let Some(lesson) = read_lesson_row(row, student) {
                lessons.push(lesson);
            }
        }
    }

    let total_hours = match footer_total {
        Some(total) => TotalHours::Footer(total),
        None => sum_lessons(&lessons, student),
    };

    (lessons, total_hours)
}

fn read_lesson_row(row: ElementRef, student: &str) -> Option<LessonEntry> {
    let Some(date_cell) = row.select(&DATE_CELL).next() else {
        warn!("Date cell missing for a lesson of student {}", student);
        return None;
    };
    let date = element_text(date_cell);

    let Some(hours_cell) = row.select(&HOURS_CELL).next() else {
        warn!(
            "Hours cell missing for a lesson on {} for student {}",
            date, student
        );
        return None;
    };

    let Some(hours_span) = hours_cell.select(&SPAN).next() else {
        warn!(
            "Hours span missing for a lesson on {} for student {}",
            date, student
        );
        return None;
    };
    let length = element_text(hours_span);

    // Zero-length lessons never reach the timesheet and are not reported as warnings.
    if length.is_empty() || length.starts_with('0') {
        debug!(
            "Dropping lesson on {} for student {} with length '{}'",
            date, student, length
        );
        return None;
    }

    Some(LessonEntry { date, length })
}

fn sum_lessons(lessons: &[LessonEntry], student: &str) -> TotalHours {
    if lessons.is_empty() {
        return TotalHours::Computed("0".to_string());
    }

    match lessons
        .iter()
        .map(|lesson| lesson.length.parse::<f64>())
        .sum::<Result<f64, _>>()
    {
        Ok(total) => {
            let total = format_hours(total);
            info!("Calculated total hours for {}: {}", student, total);
            TotalHours::Computed(total)
        }
        Err(e) => {
            error!("Error calculating total hours for {}: {}", student, e);
            TotalHours::defaulted(format!("lesson lengths do not sum: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"
        <span id="abnLabel">12 345 678 901</span>
        <a id="mainContentPlaceHolder_timeSheetsRepeater_selectTimesheetLinkButton_0">March 2024</a>
    "#;

    fn lesson_row(date: &str, hours: &str) -> String {
        format!(
            r#"<tr class="ThinBorder"><td class="date">{date}</td><td class="hours"><span>{hours}</span></td></tr>"#
        )
    }

    fn footer_row(total: &str) -> String {
        format!(r#"<tr class="GroupFooter1"><td>Total</td><td class="hours">{total}</td></tr>"#)
    }

    fn student_block(suffix: &str, name: &str, rows: &[String]) -> String {
        format!(
            r#"<div id="mainContentPlaceHolder_rptTimesheetStudents_timesheetDetails_{suffix}">
                <span id="mainContentPlaceHolder_rptTimesheetStudents_lblStudentName_{suffix}">{name}</span>
                <table id="mainContentPlaceHolder_rptTimesheetStudents_timeSheetDetailsDataList_{suffix}">{rows}</table>
            </div>"#,
            rows = rows.concat()
        )
    }

    fn page(body: &str) -> String {
        format!("<html><body>{HEADER}{body}</body></html>")
    }

    #[test]
    fn test_extracts_header() {
        let html = page(&student_block("0", "Alice", &[lesson_row("5/3/24", "1.5")]));
        let timesheet = extract_timesheet(&html).unwrap();

        assert_eq!(timesheet.header.abn_number.as_str(), "12 345 678 901");
        assert_eq!(timesheet.header.month.as_str(), "March");
        assert_eq!(timesheet.header.year.as_str(), "2024");
        assert!(!timesheet.header.month.is_defaulted());
    }

    #[test]
    fn test_missing_header_elements_default_to_empty() {
        let html = format!(
            "<html><body>{}</body></html>",
            student_block("0", "Alice", &[lesson_row("5/3/24", "1.5")])
        );
        let timesheet = extract_timesheet(&html).unwrap();

        assert!(timesheet.header.abn_number.is_defaulted());
        assert_eq!(timesheet.header.abn_number.as_str(), "");
        assert!(timesheet.header.month.is_defaulted());
        assert!(timesheet.header.year.is_defaulted());
    }

    #[test]
    fn test_month_year_needs_exactly_two_tokens() {
        let html = format!(
            r#"<html><body>
                <a id="mainContentPlaceHolder_timeSheetsRepeater_selectTimesheetLinkButton_0">March of 2024</a>
                {}
            </body></html>"#,
            student_block("0", "Alice", &[])
        );
        let timesheet = extract_timesheet(&html).unwrap();

        assert_eq!(timesheet.header.month.as_str(), "");
        assert_eq!(timesheet.header.year.as_str(), "");
        assert!(timesheet.header.year.reason().unwrap().contains("March of 2024"));
    }

    #[test]
    fn test_one_record_per_student_block() {
        let body = [
            student_block("0", "Alice", &[lesson_row("5/3/24", "1.5")]),
            student_block("1", "Bob", &[]),
            student_block("2", "Alice", &[lesson_row("6/3/24", "2")]),
        ]
        .concat();
        let timesheet = extract_timesheet(&page(&body)).unwrap();

        let names: Vec<&str> = timesheet.students.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Alice", "Bob", "Alice"]);
        assert_eq!(timesheet.students[1].id_suffix, "1");
    }

    #[test]
    fn test_zero_length_lessons_are_dropped() {
        let rows = [
            lesson_row("1/3/24", "0.5"),
            lesson_row("2/3/24", "10.5"),
            lesson_row("3/3/24", "0"),
            lesson_row("4/3/24", "1"),
        ];
        let timesheet = extract_timesheet(&page(&student_block("0", "Alice", &rows))).unwrap();

        let lessons = &timesheet.students[0].lessons;
        assert_eq!(lessons.len(), 2);
        assert_eq!(lessons[0].length, "10.5");
        assert_eq!(lessons[1].date, "4/3/24");
    }

    #[test]
    fn test_footer_total_is_used_verbatim() {
        let rows = [
            lesson_row("1/3/24", "1.5"),
            lesson_row("2/3/24", "1"),
            footer_row(" 7.25 "),
        ];
        let timesheet = extract_timesheet(&page(&student_block("0", "Alice", &rows))).unwrap();

        assert_eq!(
            timesheet.students[0].total_hours,
            TotalHours::Footer("7.25".to_string())
        );
    }

    #[test]
    fn test_total_is_summed_without_footer() {
        let rows = [lesson_row("1/3/24", "1.5"), lesson_row("2/3/24", "1")];
        let timesheet = extract_timesheet(&page(&student_block("0", "Alice", &rows))).unwrap();

        assert_eq!(
            timesheet.students[0].total_hours,
            TotalHours::Computed("2.5".to_string())
        );
    }

    #[test]
    fn test_unparseable_lengths_total_zero() {
        let rows = [lesson_row("1/3/24", "1.5"), lesson_row("2/3/24", "1h")];
        let timesheet = extract_timesheet(&page(&student_block("0", "Alice", &rows))).unwrap();

        let student = &timesheet.students[0];
        assert_eq!(student.lessons.len(), 2);
        assert!(matches!(student.total_hours, TotalHours::Defaulted { .. }));
        assert_eq!(student.total_hours.as_str(), "0");
    }

    #[test]
    fn test_rows_missing_cells_are_skipped() {
        let rows = [
            r#"<tr class="ThinBorder"><td class="hours"><span>1</span></td></tr>"#.to_string(),
            r#"<tr class="ThinBorder"><td class="date">1/3/24</td></tr>"#.to_string(),
            r#"<tr class="ThinBorder"><td class="date">2/3/24</td><td class="hours">1</td></tr>"#
                .to_string(),
            lesson_row("3/3/24", "2"),
            r#"<tr class="header"><td class="date">Date</td><td class="hours"><span>Hours</span></td></tr>"#
                .to_string(),
        ];
        let timesheet = extract_timesheet(&page(&student_block("0", "Alice", &rows))).unwrap();

        let lessons = &timesheet.students[0].lessons;
        assert_eq!(
            lessons,
            &vec![LessonEntry {
                date: "3/3/24".to_string(),
                length: "2".to_string()
            }]
        );
    }

    #[test]
    fn test_missing_name_and_table_default() {
        let html = page(
            r#"<div id="mainContentPlaceHolder_rptTimesheetStudents_timesheetDetails_7"></div>"#,
        );
        let timesheet = extract_timesheet(&html).unwrap();

        let student = &timesheet.students[0];
        assert_eq!(student.name(), "Unknown Student 7");
        assert!(student.student_name.is_defaulted());
        assert!(!student.has_lessons());
        assert!(matches!(student.total_hours, TotalHours::Defaulted { .. }));
    }

    #[test]
    fn test_empty_lesson_table_defaults_total() {
        let timesheet = extract_timesheet(&page(&student_block("0", "Alice", &[]))).unwrap();
        let student = &timesheet.students[0];

        assert!(!student.has_lessons());
        assert_eq!(student.total_hours.as_str(), "0");
    }

    #[test]
    fn test_no_student_blocks_keeps_header() {
        match extract_timesheet(&page("<p>nothing here</p>")) {
            Err(ExtractError::NoStudents { header }) => {
                assert_eq!(header.month.as_str(), "March");
                assert_eq!(header.abn_number.as_str(), "12 345 678 901");
            }
            other => panic!("expected NoStudents, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_document_is_rejected() {
        assert!(matches!(extract_timesheet(""), Err(ExtractError::Empty)));
    }

    #[test]
    fn test_whitespace_document_has_no_students() {
        assert!(matches!(
            extract_timesheet("  \n"),
            Err(ExtractError::NoStudents { .. })
        ));
    }

    #[test]
    fn test_find_by_suffix_matches_exact_id() {
        let document = Html::parse_document(&page(&[
            student_block("1", "Alice", &[]),
            student_block("10", "Bob", &[]),
        ]
        .concat()));

        let name = find_by_suffix(&document, ElementKind::StudentName, "10").unwrap();
        assert_eq!(element_text(name), "Bob");
        assert!(find_by_suffix(&document, ElementKind::LessonTable, "2").is_none());
    }

    #[test]
    fn test_format_hours() {
        assert_eq!(format_hours(3.0), "3.0");
        assert_eq!(format_hours(2.5), "2.5");
        assert_eq!(format_hours(0.75), "0.75");
    }
}
