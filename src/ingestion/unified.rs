//! Unified extraction entrypoint.
//!
//! Most callers should use [`extract_from_path`], which detects the file format (unless
//! [`ExtractOptions::format`] forces one) and dispatches to the matching extractor.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ExtractError, ExtractResult};
use crate::types::Record;

use super::detect::{detect_format, FileFormat};
use super::observability::{
    ExtractContext, ExtractObserver, ExtractSeverity, ExtractStats, TracingObserver,
};
use super::{csv, dump, json};

/// How to choose sheet(s) when extracting a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SheetSelection {
    /// The first sheet (default).
    #[default]
    First,
    /// A single named sheet.
    Sheet(String),
    /// All sheets, records concatenated in workbook order.
    AllSheets,
}

/// Options controlling unified extraction.
#[derive(Clone)]
pub struct ExtractOptions {
    /// If `None`, the format is detected from the path and content.
    pub format: Option<FileFormat>,
    /// Spreadsheet-specific options.
    pub sheet_selection: SheetSelection,
    /// Receives extraction outcomes; [`TracingObserver`] by default, `None` silences reporting.
    pub observer: Option<Arc<dyn ExtractObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: ExtractSeverity,
}

impl fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("format", &self.format)
            .field("sheet_selection", &self.sheet_selection)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            format: None,
            sheet_selection: SheetSelection::default(),
            observer: Some(Arc::new(TracingObserver)),
            alert_at_or_above: ExtractSeverity::Critical,
        }
    }
}

/// Output of a successful extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    /// Format the file was read as.
    pub format: FileFormat,
    /// Records in source order.
    pub records: Vec<Record>,
}

/// Unified extraction entry point for path-based sources.
///
/// Unless the observer is removed from `options`, this function reports:
///
/// - `on_success` on success, with the record count
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the severity is >= `options.alert_at_or_above`
///
/// ```no_run
/// use warehouse_etl::ingestion::{extract_from_path, ExtractOptions};
///
/// # fn main() -> Result<(), warehouse_etl::ExtractError> {
/// let out = extract_from_path("orders.csv", &ExtractOptions::default())?;
/// println!("format={} records={}", out.format, out.records.len());
/// # Ok(())
/// # }
/// ```
pub fn extract_from_path(path: impl AsRef<Path>, options: &ExtractOptions) -> ExtractResult<Extracted> {
    let path = path.as_ref();
    let format = options.format.unwrap_or_else(|| detect_format(path));
    tracing::debug!(path = %path.display(), %format, "dispatching extractor");

    let ctx = ExtractContext {
        path: path.to_path_buf(),
        format,
    };

    let result = match format {
        FileFormat::Csv => csv::extract_csv_from_path(path),
        FileFormat::Json => json::extract_json_from_path(path),
        FileFormat::Xlsx | FileFormat::Xls => extract_excel_dispatch(path, &options.sheet_selection),
        FileFormat::Dump | FileFormat::Sql => dump::extract_dump_from_path(path),
        FileFormat::Tar | FileFormat::TarGz | FileFormat::Unknown => {
            Err(ExtractError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: format.name().to_string(),
            })
        }
    };

    if let Some(obs) = options.observer.as_ref() {
        match &result {
            Ok(records) => obs.on_success(
                &ctx,
                ExtractStats {
                    records: records.len(),
                },
            ),
            Err(e) => {
                let sev = ExtractSeverity::for_error(e);
                obs.on_failure(&ctx, sev, e);
                if sev >= options.alert_at_or_above {
                    obs.on_alert(&ctx, sev, e);
                }
            }
        }
    }

    result.map(|records| Extracted { format, records })
}

fn extract_excel_dispatch(path: &Path, sel: &SheetSelection) -> ExtractResult<Vec<Record>> {
    // Avoid unused warnings when the feature is off.
    let _ = (path, sel);

    #[cfg(feature = "excel")]
    {
        use super::excel;

        match sel {
            SheetSelection::First => excel::extract_excel_from_path(path, None),
            SheetSelection::Sheet(name) => excel::extract_excel_from_path(path, Some(name.as_str())),
            SheetSelection::AllSheets => excel::extract_excel_workbook_from_path(path),
        }
    }

    #[cfg(not(feature = "excel"))]
    {
        Err(ExtractError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: "spreadsheet (enable cargo feature 'excel')".to_string(),
        })
    }
}
