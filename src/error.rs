use std::path::PathBuf;

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::warehouse::WarehouseError;

/// Convenience result type for extraction.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Error type returned by extractors.
///
/// Every variant is fatal for the file being extracted; there is no partial-extraction retry.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Spreadsheet error (feature-gated behind `excel`).
    #[error("spreadsheet error: {0}")]
    Excel(#[from] calamine::Error),

    /// Delimited-text error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Structured-document parse error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file was recognized but has no extractor, or was not recognized at all.
    #[error("unsupported file format '{format}' ({})", path.display())]
    UnsupportedFormat { path: PathBuf, format: String },

    /// A header was found but no data rows follow it.
    #[error("no data found in {what}")]
    NoData { what: String },

    /// The input parsed but does not have the expected shape.
    #[error("malformed input: {message}")]
    Malformed { message: String },
}

/// Convenience result type for whole pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Run-level failures. Each of these aborts the current run.
///
/// Per-record insert failures and archive failures are deliberately absent: the former are
/// counted in [`crate::loader::LoadReport`], the latter recorded in
/// [`crate::pipeline::RunReport`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unrecognized or unsupported file.
    #[error("format error: {0}")]
    Format(#[source] ExtractError),

    /// I/O, parse, or empty-input failure while extracting.
    #[error("extract failed: {0}")]
    Extract(#[source] ExtractError),

    /// Warehouse or object store unreachable / misconfigured.
    #[error("connection error: {0}")]
    Connection(String),

    /// Table creation failed.
    #[error("failed to create table {table}: {source}")]
    Ddl {
        table: String,
        #[source]
        source: WarehouseError,
    },

    /// Reading the column catalog failed.
    #[error("failed to read column catalog of {table}: {source}")]
    Catalog {
        table: String,
        #[source]
        source: WarehouseError,
    },

    /// View creation failed.
    #[error("failed to create view {view}: {source}")]
    View {
        view: String,
        #[source]
        source: WarehouseError,
    },

    /// The source query could not be executed.
    #[error("extract from query failed: {0}")]
    Source(#[source] WarehouseError),

    /// Invalid process configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ExtractError> for PipelineError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::UnsupportedFormat { .. } => Self::Format(err),
            other => Self::Extract(other),
        }
    }
}

impl From<ArchiveError> for PipelineError {
    fn from(err: ArchiveError) -> Self {
        Self::Connection(err.to_string())
    }
}
