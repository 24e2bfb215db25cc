use std::path::Path;

use lopdf::{dictionary, Document, Object, ObjectId};

/// Every field the real timesheet template declares.
pub fn template_field_names() -> Vec<String> {
    let mut names: Vec<String> = [
        "Month",
        "Your ABN",
        "Your Name",
        "STUDENT JOB NAME",
        "Page No",
        "of",
        "Total Job Time",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect();

    for i in 1..=10 {
        names.push(format!("dd  mm  yy{}", i));
        names.push(format!("hh  mm{}_3", i));
    }
    names
}

/// Writes a one-page fillable PDF with a text widget per name.
pub fn write_form_template(path: &Path, names: &[String]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.new_object_id();

    let widgets: Vec<ObjectId> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let top = 820 - 25 * i as i64;
            doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "FT" => "Tx",
                "T" => Object::string_literal(name.as_str()),
                "DA" => Object::string_literal("/Helv 10 Tf 0 g"),
                "Rect" => vec![20.into(), (top - 18).into(), 300.into(), top.into()],
                "P" => page_id,
            })
        })
        .collect();
    let refs: Vec<Object> = widgets.iter().map(|id| (*id).into()).collect();

    doc.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Annots" => refs.clone(),
        }),
    );
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let acroform_id = doc.add_object(dictionary! { "Fields" => refs });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => acroform_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("Failed to write template PDF");
}

/// Reads the `/V` of the field called `name` from a filled PDF.
pub fn field_value(doc: &Document, name: &str) -> Option<String> {
    doc.objects
        .values()
        .filter_map(|object| object.as_dict().ok())
        .find(|dict| dict.get(b"T").and_then(Object::as_str).ok() == Some(name.as_bytes()))
        .and_then(|dict| dict.get(b"V").ok())
        .and_then(|value| value.as_str().ok())
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

pub fn lesson_row(date: &str, hours: &str) -> String {
    format!(
        r#"<tr class="ThinBorder"><td class="date">{date}</td><td class="hours"><span>{hours}</span></td></tr>"#
    )
}

pub fn student_block(suffix: &str, name: &str, rows: &[String]) -> String {
    format!(
        r#"<div id="mainContentPlaceHolder_rptTimesheetStudents_timesheetDetails_{suffix}">
            <span id="mainContentPlaceHolder_rptTimesheetStudents_lblStudentName_{suffix}">{name}</span>
            <table id="mainContentPlaceHolder_rptTimesheetStudents_timeSheetDetailsDataList_{suffix}">
                {rows}
            </table>
        </div>"#,
        rows = rows.concat()
    )
}

pub fn timesheet_page(blocks: &[String]) -> String {
    format!(
        r#"<html><body>
            <span id="abnLabel">12 345 678 901</span>
            <a id="mainContentPlaceHolder_timeSheetsRepeater_selectTimesheetLinkButton_0">March 2024</a>
            {}
        </body></html>"#,
        blocks.concat()
    )
}
