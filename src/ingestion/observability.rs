//! Extraction outcome reporting.
//!
//! [`extract_from_path`](super::extract_from_path) reports every attempt to the
//! [`ExtractObserver`] in its options. [`TracingObserver`] is installed by default;
//! [`JsonLinesObserver`] keeps a machine-readable event log next to it.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

use super::detect::FileFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractSeverity {
    Info,
    Warning,
    /// The file could not be extracted.
    Error,
    /// The file could not be read at all.
    Critical,
}

impl ExtractSeverity {
    /// Severity of an extraction failure.
    pub fn for_error(e: &ExtractError) -> Self {
        match e {
            ExtractError::Io(_) => Self::Critical,
            ExtractError::Csv(err) => match err.kind() {
                ::csv::ErrorKind::Io(_) => Self::Critical,
                _ => Self::Error,
            },
            ExtractError::Json(err) if err.is_io() => Self::Critical,
            #[cfg(feature = "excel")]
            ExtractError::Excel(calamine::Error::Io(_)) => Self::Critical,
            _ => Self::Error,
        }
    }
}

/// The extraction attempt being reported.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    pub path: PathBuf,
    /// Detected (or forced) format.
    pub format: FileFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractStats {
    pub records: usize,
}

/// Receives extraction outcomes.
pub trait ExtractObserver: Send + Sync {
    fn on_success(&self, _ctx: &ExtractContext, _stats: ExtractStats) {}

    fn on_failure(&self, _ctx: &ExtractContext, _severity: ExtractSeverity, _error: &ExtractError) {}

    /// Called after [`Self::on_failure`] when the severity meets the alert threshold.
    ///
    /// Forwards to [`Self::on_failure`] unless overridden.
    fn on_alert(&self, ctx: &ExtractContext, severity: ExtractSeverity, error: &ExtractError) {
        self.on_failure(ctx, severity, error)
    }
}

/// A list of observers is itself an observer; events reach each one in order.
impl ExtractObserver for Vec<Arc<dyn ExtractObserver>> {
    fn on_success(&self, ctx: &ExtractContext, stats: ExtractStats) {
        self.iter().for_each(|o| o.on_success(ctx, stats));
    }

    fn on_failure(&self, ctx: &ExtractContext, severity: ExtractSeverity, error: &ExtractError) {
        self.iter().for_each(|o| o.on_failure(ctx, severity, error));
    }

    fn on_alert(&self, ctx: &ExtractContext, severity: ExtractSeverity, error: &ExtractError) {
        self.iter().for_each(|o| o.on_alert(ctx, severity, error));
    }
}

/// Forwards extraction events to `tracing`. The default observer.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ExtractObserver for TracingObserver {
    fn on_success(&self, ctx: &ExtractContext, stats: ExtractStats) {
        tracing::info!(
            format = %ctx.format,
            path = %ctx.path.display(),
            records = stats.records,
            "extracted"
        );
    }

    fn on_failure(&self, ctx: &ExtractContext, severity: ExtractSeverity, error: &ExtractError) {
        tracing::warn!(
            ?severity,
            format = %ctx.format,
            path = %ctx.path.display(),
            %error,
            "extraction failed"
        );
    }

    fn on_alert(&self, ctx: &ExtractContext, severity: ExtractSeverity, error: &ExtractError) {
        tracing::error!(
            ?severity,
            format = %ctx.format,
            path = %ctx.path.display(),
            %error,
            "extraction alert"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Success,
    Failure,
    Alert,
}

/// One line of a [`JsonLinesObserver`] log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractEvent {
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub format: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ExtractSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractEvent {
    fn new(kind: EventKind, ctx: &ExtractContext) -> Self {
        Self {
            at: Utc::now(),
            kind,
            format: ctx.format.name().to_string(),
            path: ctx.path.display().to_string(),
            records: None,
            severity: None,
            error: None,
        }
    }

    fn failed(kind: EventKind, ctx: &ExtractContext, severity: ExtractSeverity, error: &ExtractError) -> Self {
        Self {
            severity: Some(severity),
            error: Some(error.to_string()),
            ..Self::new(kind, ctx)
        }
    }
}

/// Appends one JSON object per extraction event to a file.
///
/// Write failures are logged and otherwise ignored; reporting never fails an extraction.
#[derive(Debug)]
pub struct JsonLinesObserver {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesObserver {
    /// Open `path` for appending, creating it if needed.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, event: &ExtractEvent) {
        let mut line = match serde_json::to_vec(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode extraction event");
                return;
            }
        };
        line.push(b'\n');
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        if let Err(e) = file.write_all(&line) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write extraction event");
        }
    }
}

impl ExtractObserver for JsonLinesObserver {
    fn on_success(&self, ctx: &ExtractContext, stats: ExtractStats) {
        self.write(&ExtractEvent {
            records: Some(stats.records),
            ..ExtractEvent::new(EventKind::Success, ctx)
        });
    }

    fn on_failure(&self, ctx: &ExtractContext, severity: ExtractSeverity, error: &ExtractError) {
        self.write(&ExtractEvent::failed(EventKind::Failure, ctx, severity, error));
    }

    fn on_alert(&self, ctx: &ExtractContext, severity: ExtractSeverity, error: &ExtractError) {
        self.write(&ExtractEvent::failed(EventKind::Alert, ctx, severity, error));
    }
}
