//! End-to-end ETL runs.
//!
//! A run goes extract -> transform -> archive -> infer schema -> create table -> load ->
//! classify -> view. The archive write and the warehouse path are independent: an archive
//! failure is logged and recorded in the [`RunReport`] while loading continues, and a warehouse
//! failure does not undo an archive write that already happened.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::archive::{ArchiveReceipt, RawArchiver};
use crate::classify::{Classification, ColumnClassifier, KeywordClassifier};
use crate::error::{PipelineError, PipelineResult};
use crate::ingestion::{extract_from_path, ExtractOptions, FileFormat};
use crate::loader::{load_records, LoadReport};
use crate::schema::infer_schema;
use crate::table::{auto_table_name, ensure_table};
use crate::transform::transform;
use crate::types::Record;
use crate::view::{synthesize_view, view_name};
use crate::warehouse::Warehouse;

/// Where a run's records came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(String),
    Query(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "file {path}"),
            Source::Query(sql) => write!(f, "query {sql}"),
        }
    }
}

/// Outcome of the raw archive write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Written(ArchiveReceipt),
    Failed { key: String, error: String },
}

impl ArchiveOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, ArchiveOutcome::Written(_))
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub source: Source,
    /// `None` for query sources.
    pub format: Option<FileFormat>,
    /// Records after transformation.
    pub records: usize,
    pub archive: ArchiveOutcome,
    /// `None` when the batch was empty and the warehouse path was skipped.
    pub load: Option<LoadReport>,
    pub classification: Option<Classification>,
    pub view: Option<String>,
}

/// Explicit pipeline context: warehouse, raw archiver, classifier, and extraction options.
pub struct Pipeline {
    warehouse: Arc<dyn Warehouse>,
    archiver: RawArchiver,
    classifier: Arc<dyn ColumnClassifier>,
    extract_options: ExtractOptions,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("archiver", &self.archiver)
            .field("extract_options", &self.extract_options)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline with the keyword classifier and default extraction options.
    pub fn new(warehouse: Arc<dyn Warehouse>, archiver: RawArchiver) -> Self {
        Self {
            warehouse,
            archiver,
            classifier: Arc::new(KeywordClassifier),
            extract_options: ExtractOptions::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ColumnClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract_options = options;
        self
    }

    /// Run the pipeline over a local file.
    pub async fn run_file(&self, path: impl AsRef<Path>) -> PipelineResult<RunReport> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "processing file");

        let extracted = extract_from_path(path, &self.extract_options)?;
        tracing::info!(
            path = %path.display(),
            format = %extracted.format,
            records = extracted.records.len(),
            "extracted records"
        );

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.finish(
            Source::File(path.display().to_string()),
            Some(extracted.format),
            RawArchiver::file_key(&file_name),
            extracted.records,
        )
        .await
    }

    /// Run the pipeline over the result of a query against the warehouse.
    pub async fn run_query(&self, sql: &str) -> PipelineResult<RunReport> {
        tracing::info!(query = sql, "processing query");
        let records = self
            .warehouse
            .query(sql)
            .await
            .map_err(PipelineError::Source)?;
        tracing::info!(records = records.len(), "extracted records from query");

        self.finish(
            Source::Query(sql.to_string()),
            None,
            RawArchiver::query_key(sql),
            records,
        )
        .await
    }

    async fn finish(
        &self,
        source: Source,
        format: Option<FileFormat>,
        archive_key: String,
        records: Vec<Record>,
    ) -> PipelineResult<RunReport> {
        let records = transform(records);

        let archive = match self.archiver.archive(&archive_key, &records).await {
            Ok(receipt) => ArchiveOutcome::Written(receipt),
            Err(error) => {
                tracing::error!(key = %archive_key, %error, "failed to archive raw data");
                ArchiveOutcome::Failed {
                    key: archive_key,
                    error: error.to_string(),
                }
            }
        };

        let mut report = RunReport {
            source,
            format,
            records: records.len(),
            archive,
            load: None,
            classification: None,
            view: None,
        };

        if records.is_empty() {
            tracing::warn!(source = %report.source, "no records extracted, skipping warehouse load");
            return Ok(report);
        }

        let warehouse = self.warehouse.as_ref();
        let schema = infer_schema(&records);
        let requested = auto_table_name(records.len());
        let table = ensure_table(warehouse, &requested, &schema)
            .await
            .map_err(|source| PipelineError::Ddl {
                table: requested.clone(),
                source,
            })?;

        report.load = Some(load_records(warehouse, &table, &records).await);

        let catalog = warehouse
            .columns(&table)
            .await
            .map_err(|source| PipelineError::Catalog {
                table: table.clone(),
                source,
            })?;
        let classification = self.classifier.classify(&table, &catalog);
        tracing::info!(
            %table,
            dimensions = ?classification.dimensions().collect::<Vec<_>>(),
            facts = ?classification.facts().collect::<Vec<_>>(),
            "classified columns"
        );

        let view = synthesize_view(warehouse, &table, &classification)
            .await
            .map_err(|source| PipelineError::View {
                view: view_name(&table),
                source,
            })?;

        report.classification = Some(classification);
        report.view = Some(view);
        tracing::info!(
            source = %report.source,
            records = report.records,
            archived = report.archive.is_written(),
            view = ?report.view,
            "run complete"
        );
        Ok(report)
    }
}
