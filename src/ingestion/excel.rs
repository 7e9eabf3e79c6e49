#![cfg(feature = "excel")]

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::{ExtractError, ExtractResult};
use crate::types::{Record, Value};

/// Extract records from a spreadsheet (`.xlsx`, `.xls`, ...).
///
/// Behavior:
/// - Picks `sheet_name` if provided; otherwise uses the first sheet in the workbook
/// - Detects the first non-empty row as the header row
/// - Maps every later row positionally onto the header; trailing empty cells count as absent
///   (the record lacks those keys), interior empty cells become [`Value::Null`]
/// - A header with no data rows is [`ExtractError::NoData`]
pub fn extract_excel_from_path(
    path: impl AsRef<Path>,
    sheet_name: Option<&str>,
) -> ExtractResult<Vec<Record>> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)?;
    let sheet = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ExtractError::NoData {
                what: format!("workbook {} (no sheets)", path.display()),
            })?,
    };
    let range = workbook.worksheet_range(&sheet)?;
    let records = extract_sheet_range(&range);
    if records.is_empty() {
        return Err(ExtractError::NoData {
            what: format!("sheet '{sheet}' of {}", path.display()),
        });
    }
    Ok(records)
}

/// Extract every sheet of a workbook and concatenate the records in workbook order.
///
/// Sheets without data rows are skipped; if no sheet has data the result is
/// [`ExtractError::NoData`].
pub fn extract_excel_workbook_from_path(path: impl AsRef<Path>) -> ExtractResult<Vec<Record>> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)?;
    let mut all = Vec::new();
    for sheet in workbook.sheet_names() {
        let range = workbook.worksheet_range(&sheet)?;
        let mut records = extract_sheet_range(&range);
        tracing::debug!(sheet = %sheet, rows = records.len(), "extracted sheet");
        all.append(&mut records);
    }
    if all.is_empty() {
        return Err(ExtractError::NoData {
            what: format!("workbook {}", path.display()),
        });
    }
    Ok(all)
}

/// The first row of the used range is the header, even when it is blank.
fn extract_sheet_range(range: &calamine::Range<Data>) -> Vec<Record> {
    let mut rows = range.rows();

    let headers: Vec<String> = match rows.next() {
        Some(row) => row.iter().map(cell_to_header_string).collect(),
        None => return Vec::new(),
    };

    rows.map(|row| {
        let used = row
            .iter()
            .rposition(|c| !matches!(c, Data::Empty))
            .map_or(0, |i| i + 1);
        headers
            .iter()
            .zip(row[..used].iter())
            .map(|(h, cell)| (h.clone(), convert_cell(cell)))
            .collect()
    })
    .collect()
}

fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => (*f as i64).to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn convert_cell(c: &Data) -> Value {
    match c {
        Data::Empty => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Int(i) => Value::Int64(*i),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Value::Int64(*f as i64)
            } else {
                Value::Float64(*f)
            }
        }
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) if ts.time() == chrono::NaiveTime::MIN => {
                Value::Text(ts.date().format("%Y-%m-%d").to_string())
            }
            Some(ts) => Value::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Value::Float64(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(e) => Value::Text(format!("{e:?}")),
    }
}
