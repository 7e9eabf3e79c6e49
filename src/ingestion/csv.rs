//! CSV extraction.

use std::path::Path;

use crate::error::{ExtractError, ExtractResult};
use crate::types::{Record, Value};

/// Extract records from a CSV file.
///
/// Rules:
///
/// - The first row is the header.
/// - Each later row maps `header[i] -> cell[i]` as text.
/// - A row shorter than the header simply lacks the trailing keys.
/// - A header with no data rows is [`ExtractError::NoData`].
pub fn extract_csv_from_path(path: impl AsRef<Path>) -> ExtractResult<Vec<Record>> {
    let path = path.as_ref();
    let mut rdr = reader_builder().from_path(path)?;
    extract_csv_from_reader(&mut rdr).map_err(|e| match e {
        ExtractError::NoData { .. } => ExtractError::NoData {
            what: format!("CSV file {}", path.display()),
        },
        other => other,
    })
}

/// Extract records from an in-memory CSV string.
pub fn extract_csv_from_str(input: &str) -> ExtractResult<Vec<Record>> {
    let mut rdr = reader_builder().from_reader(input.as_bytes());
    extract_csv_from_reader(&mut rdr)
}

/// Extract records from an existing CSV reader.
pub fn extract_csv_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
) -> ExtractResult<Vec<Record>> {
    let headers = rdr.headers()?.clone();

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(h, cell)| (h.to_owned(), Value::text(cell)))
            .collect();
        records.push(record);
    }

    if records.is_empty() {
        return Err(ExtractError::NoData {
            what: "CSV input".to_string(),
        });
    }
    Ok(records)
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    // Rows may be shorter (or longer) than the header.
    builder.has_headers(true).flexible(true);
    builder
}
