use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::PdfError;
use crate::helpers::form::{FieldValues, ABN_FIELD, MONTH_FIELD};

/// Fields the template must carry for a timesheet to be usable.
const REQUIRED_FIELDS: [&str; 2] = [MONTH_FIELD, ABN_FIELD];

const MAX_FIELD_DEPTH: usize = 32;
const DEFAULT_FONT_SIZE: f32 = 10.0;

pub type FieldCatalog = BTreeSet<String>;

fn load_pdf<P: AsRef<Path>>(path: P) -> Result<Document, lopdf::Error> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Document::load_from(reader)
}

/// Field values split into those the template declares and those it does not.
#[derive(Debug, Default, PartialEq)]
pub struct ValidatedFields {
    pub fields: FieldValues,
    pub dropped: Vec<String>,
}

/// An empty catalog means the template's fields could not be listed, in which
/// case nothing is dropped.
pub fn validate_fields(catalog: &FieldCatalog, values: &FieldValues) -> ValidatedFields {
    if catalog.is_empty() {
        return ValidatedFields {
            fields: values.clone(),
            dropped: Vec::new(),
        };
    }

    let mut validated = ValidatedFields::default();
    for (name, value) in values {
        if catalog.contains(name) {
            validated.fields.insert(name.clone(), value.clone());
        } else {
            validated.dropped.push(name.clone());
        }
    }
    validated
}

pub fn missing_expected_fields(catalog: &FieldCatalog) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .into_iter()
        .filter(|field| !catalog.contains(*field))
        .collect()
}

#[derive(Debug)]
pub struct FillReport {
    pub pages: usize,
    /// Widget annotations that received a value.
    pub filled: usize,
    pub dropped: Vec<String>,
    pub missing_expected: Vec<&'static str>,
}

pub struct PdfTemplate {
    path: PathBuf,
    document: Document,
    catalog: FieldCatalog,
}

impl PdfTemplate {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PdfError> {
        let path = path.as_ref();
        let document = load_pdf(path).map_err(|source| PdfError::Template {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            "Loaded template {} with {} page(s)",
            path.display(),
            document.get_pages().len()
        );

        let catalog = match collect_field_names(&document) {
            Ok(catalog) => catalog,
            Err(e) => {
                debug!("Could not read form fields of {}: {}", path.display(), e);
                FieldCatalog::new()
            }
        };
        info!("Found {} form fields", catalog.len());

        Ok(Self {
            path: path.to_path_buf(),
            document,
            catalog,
        })
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    pub fn field_catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Writes a copy of the template with `values` applied to every page.
    pub fn fill(&self, output: &Path, values: &FieldValues) -> Result<FillReport, PdfError> {
        let missing_expected = if self.catalog.is_empty() {
            warn!(
                "No form fields found in the template PDF '{}'",
                self.path.display()
            );
            Vec::new()
        } else {
            let missing = missing_expected_fields(&self.catalog);
            if !missing.is_empty() {
                warn!(
                    "Required fields missing in PDF template: {}",
                    missing.join(", ")
                );
            }
            missing
        };

        let validated = validate_fields(&self.catalog, values);
        if !validated.dropped.is_empty() {
            warn!(
                "The following fields don't exist in the PDF and will be ignored: {}",
                validated.dropped.join(", ")
            );
        }

        let mut doc = self.document.clone();
        let filled = fill_form_fields(&mut doc, &validated.fields)?;
        mark_need_appearances(&mut doc)?;
        write_pdf(&mut doc, output)?;

        info!("Created timesheet: {}", output.display());
        Ok(FillReport {
            pages: self.page_count(),
            filled,
            dropped: validated.dropped,
            missing_expected,
        })
    }
}

pub fn fill_timesheet<P: AsRef<Path>, Q: AsRef<Path>>(
    template: P,
    output: Q,
    values: &FieldValues,
) -> Result<FillReport, PdfError> {
    PdfTemplate::load(template)?.fill(output.as_ref(), values)
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, lopdf::Error> {
    match object {
        Object::Reference(id) => doc.get_object(*id),
        other => Ok(other),
    }
}

pub(crate) fn decode_pdf_text(object: &Object) -> Option<String> {
    let Object::String(bytes, _) = object else {
        return None;
    };

    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }

    Some(
        String::from_utf8(bytes.clone())
            .unwrap_or_else(|_| bytes.iter().map(|&b| b as char).collect()),
    )
}

fn encode_pdf_text(value: &str) -> Object {
    if value.is_ascii() {
        return Object::String(value.as_bytes().to_vec(), StringFormat::Literal);
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn collect_field_names(doc: &Document) -> Result<FieldCatalog, lopdf::Error> {
    let catalog = doc.catalog()?;
    let acroform = resolve(doc, catalog.get(b"AcroForm")?)?.as_dict()?;
    let fields = resolve(doc, acroform.get(b"Fields")?)?.as_array()?;

    let mut names = FieldCatalog::new();
    for field in fields {
        collect_field(doc, field, None, 0, &mut names);
    }
    Ok(names)
}

fn collect_field(
    doc: &Document,
    object: &Object,
    parent: Option<&str>,
    depth: usize,
    names: &mut FieldCatalog,
) {
    if depth > MAX_FIELD_DEPTH {
        return;
    }
    let Ok(field) = resolve(doc, object).and_then(Object::as_dict) else {
        return;
    };

    let qualified = match field.get(b"T").ok().and_then(decode_pdf_text) {
        Some(partial) => {
            let qualified = match parent {
                Some(parent) => format!("{}.{}", parent, partial),
                None => partial.clone(),
            };
            names.insert(partial);
            names.insert(qualified.clone());
            Some(qualified)
        }
        None => parent.map(str::to_string),
    };

    if let Ok(kids) = field
        .get(b"Kids")
        .and_then(|kids| resolve(doc, kids))
        .and_then(Object::as_array)
    {
        for kid in kids {
            collect_field(doc, kid, qualified.as_deref(), depth + 1, names);
        }
    }
}

fn qualified_name(doc: &Document, field_id: ObjectId) -> Option<String> {
    let mut parts = Vec::new();
    let mut current = Some(field_id);

    while let Some(id) = current {
        if parts.len() > MAX_FIELD_DEPTH {
            break;
        }
        let field = doc.get_dictionary(id).ok()?;
        if let Some(partial) = field.get(b"T").ok().and_then(decode_pdf_text) {
            parts.push(partial);
        }
        current = field.get(b"Parent").and_then(Object::as_reference).ok();
    }

    if parts.is_empty() {
        return None;
    }
    parts.reverse();
    Some(parts.join("."))
}

struct FieldUpdate {
    field_id: ObjectId,
    widget_id: ObjectId,
    value: String,
}

/// Applies `values` to the widgets of every page. A widget matches a value by
/// its field's partial or fully qualified name.
fn fill_form_fields(doc: &mut Document, values: &FieldValues) -> Result<usize, lopdf::Error> {
    let mut updates = Vec::new();

    for (page_number, page_id) in doc.get_pages() {
        let page = doc.get_dictionary(page_id)?;
        let Ok(annots) = page
            .get(b"Annots")
            .and_then(|annots| resolve(doc, annots))
            .and_then(Object::as_array)
        else {
            debug!("Page {} has no annotations", page_number);
            continue;
        };

        for annot in annots {
            let Ok(widget_id) = annot.as_reference() else {
                continue;
            };
            let Ok(widget) = doc.get_dictionary(widget_id) else {
                continue;
            };
            if widget.get(b"Subtype").and_then(Object::as_name).ok() != Some(b"Widget".as_slice()) {
                continue;
            }

            let field_id = if widget.has(b"T") {
                widget_id
            } else {
                match widget.get(b"Parent").and_then(Object::as_reference) {
                    Ok(parent_id) => parent_id,
                    Err(_) => continue,
                }
            };

            let partial = doc
                .get_dictionary(field_id)
                .ok()
                .and_then(|field| field.get(b"T").ok())
                .and_then(decode_pdf_text);
            let qualified = qualified_name(doc, field_id);

            let value = partial
                .as_deref()
                .and_then(|name| values.get(name))
                .or_else(|| qualified.as_deref().and_then(|name| values.get(name)));

            if let Some(value) = value {
                updates.push(FieldUpdate {
                    field_id,
                    widget_id,
                    value: value.clone(),
                });
            }
        }
    }

    for update in &updates {
        doc.get_dictionary_mut(update.field_id)?
            .set(b"V", encode_pdf_text(&update.value));

        let (rect, size) = {
            let widget = doc.get_dictionary(update.widget_id)?;
            let field = doc.get_dictionary(update.field_id)?;
            (widget_rect(widget), font_size(widget).or_else(|| font_size(field)))
        };

        let stream = appearance_stream(rect, size.unwrap_or(DEFAULT_FONT_SIZE), &update.value);
        let stream_id = doc.add_object(Object::Stream(stream));

        let widget = doc.get_dictionary_mut(update.widget_id)?;
        widget.set(b"AP", dictionary! { "N" => stream_id });
    }

    debug!("Applied {} widget updates", updates.len());
    Ok(updates.len())
}

fn widget_rect(widget: &Dictionary) -> [f32; 4] {
    let mut rect = [0.0, 0.0, 100.0, 30.0];
    if let Ok(values) = widget.get(b"Rect").and_then(Object::as_array) {
        for (slot, value) in rect.iter_mut().zip(values) {
            if let Ok(value) = value.as_float() {
                *slot = value;
            }
        }
    }
    rect
}

/// Reads the size operand of `Tf` from the default appearance string.
/// A size of 0 means auto-size, which is treated as unknown.
fn font_size(dict: &Dictionary) -> Option<f32> {
    let da = dict.get(b"DA").ok().and_then(decode_pdf_text)?;
    let tokens: Vec<&str> = da.split_whitespace().collect();
    let position = tokens.iter().position(|token| *token == "Tf")?;
    let size = tokens.get(position.checked_sub(1)?)?.parse::<f32>().ok()?;
    (size > 0.0).then_some(size)
}

fn escape_pdf_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '(' | ')' => {
                escaped.push('\\');
                escaped.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => escaped.push(c),
            // WinAnsi matches Latin-1 from 0xA0 upwards
            c if ('\u{A0}'..='\u{FF}').contains(&c) => {
                escaped.push_str(&format!("\\{:03o}", c as u32));
            }
            _ => escaped.push('?'),
        }
    }
    escaped
}

fn appearance_stream(rect: [f32; 4], font_size: f32, value: &str) -> lopdf::Stream {
    let width = (rect[2] - rect[0]).abs();
    let height = (rect[3] - rect[1]).abs();
    let baseline = ((height - font_size) / 2.0 + 2.0).max(1.0);

    let content = format!(
        "/Tx BMC\nq\nBT\n/Helv {} Tf\n0 g\n2 {} Td\n({}) Tj\nET\nQ\nEMC",
        font_size,
        baseline,
        escape_pdf_text(value)
    );

    let stream_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "BBox" => vec![0.into(), 0.into(), Object::Real(width.into()), Object::Real(height.into())],
        "Resources" => dictionary! {
            "Font" => dictionary! {
                "Helv" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                },
            },
        },
    };

    lopdf::Stream::new(stream_dict, content.into_bytes())
}

fn mark_need_appearances(doc: &mut Document) -> Result<(), lopdf::Error> {
    let root_id = doc.trailer.get(b"Root")?.as_reference()?;

    let acroform_id = match doc.get_dictionary(root_id)?.get(b"AcroForm") {
        Ok(Object::Reference(id)) => Some(*id),
        Ok(Object::Dictionary(_)) => None,
        _ => return Ok(()),
    };

    match acroform_id {
        Some(id) => doc
            .get_dictionary_mut(id)?
            .set(b"NeedAppearances", Object::Boolean(true)),
        None => {
            if let Object::Dictionary(acroform) =
                doc.get_dictionary_mut(root_id)?.get_mut(b"AcroForm")?
            {
                acroform.set(b"NeedAppearances", Object::Boolean(true));
            }
        }
    }
    Ok(())
}

fn write_pdf(doc: &mut Document, output: &Path) -> Result<(), PdfError> {
    let write_error = |source: std::io::Error| PdfError::Write {
        path: output.to_path_buf(),
        source,
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
    }

    let file = File::create(output).map_err(write_error)?;
    let mut writer = BufWriter::new(file);
    doc.save_to(&mut writer)
        .map_err(|e| write_error(std::io::Error::other(e.to_string())))?;
    writer.flush().map_err(write_error)?;

    Ok(())
}
