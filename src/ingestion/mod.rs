//! Format detection and extraction.
//!
//! Most callers should use [`extract_from_path`] (from [`unified`]) which:
//!
//! - detects the format by extension, falling back to content inspection ([`detect`])
//! - runs the matching extractor into a `Vec<Record>`
//! - reports success/failure/alerts to an [`ExtractObserver`] ([`TracingObserver`] by default)
//!
//! Format-specific functions are also available under:
//! - [`csv`]
//! - [`json`]
//! - [`excel`] (feature `excel`)
//! - [`dump`]

pub mod csv;
pub mod detect;
pub mod dump;
#[cfg(feature = "excel")]
pub mod excel;
pub mod json;
pub mod observability;
pub mod unified;

pub use detect::{detect_format, FileFormat};
pub use observability::{
    EventKind, ExtractContext, ExtractEvent, ExtractObserver, ExtractSeverity, ExtractStats,
    JsonLinesObserver, TracingObserver,
};
pub use unified::{extract_from_path, ExtractOptions, Extracted, SheetSelection};
