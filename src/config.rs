//! Process configuration.
//!
//! Every option can be given on the command line or through its environment variable; the
//! binary loads a `.env` file first.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use object_store::memory::InMemory;

use crate::archive::{ObjectStoreConfig, ObjectStoreSink, RawStore, DEFAULT_BUCKET};
use crate::error::{PipelineError, PipelineResult};
use crate::ingestion::{ExtractObserver, ExtractOptions, JsonLinesObserver, SheetSelection, TracingObserver};
use crate::warehouse::PostgresConfig;

/// `ETL_COMMAND` value that selects a file run through `FILE_PATH`.
pub const PROCESS_FILE_COMMAND: &str = "process-file";

/// Source selector (`ETL_SOURCE_TYPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    File,
    Sql,
}

impl FromStr for SourceType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(SourceType::File),
            "sql" => Ok(SourceType::Sql),
            other => Err(PipelineError::Config(format!(
                "unknown source type '{other}' (expected 'file' or 'sql')"
            ))),
        }
    }
}

/// Warehouse backend (`ETL_WAREHOUSE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum WarehouseKind {
    #[default]
    Postgres,
    /// In-process dry run.
    Memory,
}

/// What a run reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    File(PathBuf),
    Query(String),
}

/// Load raw files or query results into the warehouse and the raw object store.
#[derive(Parser, Debug, Clone)]
#[command(name = "warehouse-etl", version, about, long_about = None)]
pub struct EtlConfig {
    /// Source type: file or sql
    #[arg(long, env = "ETL_SOURCE_TYPE")]
    pub source_type: Option<String>,

    /// File to process when the source type is file
    #[arg(long, env = "ETL_SOURCE_FILE")]
    pub source_file: Option<PathBuf>,

    /// Query to run when the source type is sql
    #[arg(long, env = "ETL_SOURCE_QUERY")]
    pub source_query: Option<String>,

    /// Alternate selector; only `process-file` is understood
    #[arg(long, env = "ETL_COMMAND")]
    pub command: Option<String>,

    /// File to process with `--command process-file`
    #[arg(long, env = "FILE_PATH")]
    pub file_path: Option<PathBuf>,

    /// Spreadsheet sheet to read (first sheet when omitted)
    #[arg(long, env = "ETL_SHEET")]
    pub sheet: Option<String>,

    /// Append a JSON line per extraction outcome to this file
    #[arg(long, env = "ETL_EXTRACT_LOG")]
    pub extract_log: Option<PathBuf>,

    /// Warehouse backend
    #[arg(long, env = "ETL_WAREHOUSE", value_enum, default_value_t = WarehouseKind::Postgres)]
    pub warehouse: WarehouseKind,

    #[arg(long, env = "DB_HOST")]
    pub db_host: Option<String>,

    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,

    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Object store endpoint (`host:port` or URL); may only be unset with `--warehouse memory`
    #[arg(long, env = "MINIO_ENDPOINT")]
    pub minio_endpoint: Option<String>,

    #[arg(long, env = "MINIO_ACCESS_KEY", default_value = "")]
    pub minio_access_key: String,

    #[arg(long, env = "MINIO_SECRET_KEY", default_value = "", hide_env_values = true)]
    pub minio_secret_key: String,

    #[arg(long, env = "MINIO_BUCKET", default_value = DEFAULT_BUCKET)]
    pub minio_bucket: String,

    #[arg(long, env = "MINIO_REGION", default_value = "us-east-1")]
    pub minio_region: String,

    #[arg(
        long,
        env = "MINIO_SECURE",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub minio_secure: bool,
}

impl EtlConfig {
    /// Resolve the source selectors into a single run target.
    ///
    /// `ETL_SOURCE_TYPE` wins; `ETL_COMMAND` is only consulted when no source type is set.
    pub fn target(&self) -> PipelineResult<RunTarget> {
        let Some(source_type) = self.source_type.as_deref() else {
            return self.command_target();
        };
        match source_type.parse::<SourceType>()? {
            SourceType::File => self
                .source_file
                .clone()
                .map(RunTarget::File)
                .ok_or_else(|| PipelineError::Config("ETL_SOURCE_FILE is required for file sources".into())),
            SourceType::Sql => self
                .source_query
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(|q| RunTarget::Query(q.to_string()))
                .ok_or_else(|| PipelineError::Config("ETL_SOURCE_QUERY is required for sql sources".into())),
        }
    }

    fn command_target(&self) -> PipelineResult<RunTarget> {
        let command = self
            .command
            .as_deref()
            .ok_or_else(|| PipelineError::Config("ETL_SOURCE_TYPE is not set".into()))?;
        if command.trim() != PROCESS_FILE_COMMAND {
            return Err(PipelineError::Config(format!(
                "unknown command '{command}' (expected '{PROCESS_FILE_COMMAND}')"
            )));
        }
        self.file_path
            .clone()
            .map(RunTarget::File)
            .ok_or_else(|| PipelineError::Config("FILE_PATH is required for process-file".into()))
    }

    /// Connection settings for the Postgres warehouse.
    pub fn postgres_config(&self) -> PipelineResult<PostgresConfig> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| PipelineError::Config(format!("{name} is required for the postgres warehouse")))
        };
        Ok(PostgresConfig {
            host: required(&self.db_host, "DB_HOST")?,
            port: self.db_port,
            dbname: required(&self.db_name, "DB_NAME")?,
            user: required(&self.db_user, "DB_USER")?,
            password: self.db_password.clone(),
        })
    }

    /// Object store settings, or `None` when no endpoint is configured.
    pub fn object_store_config(&self) -> Option<ObjectStoreConfig> {
        let endpoint = self.minio_endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        Some(ObjectStoreConfig {
            endpoint: endpoint.to_string(),
            access_key: self.minio_access_key.clone(),
            secret_key: self.minio_secret_key.clone(),
            bucket: self.minio_bucket.clone(),
            region: self.minio_region.clone(),
            secure: self.minio_secure,
        })
    }

    /// Extraction options: sheet selection and the observers reporting each extraction.
    ///
    /// Outcomes always go to `tracing`; `ETL_EXTRACT_LOG` adds a JSON-lines event log.
    pub fn extract_options(&self) -> PipelineResult<ExtractOptions> {
        let observer: Arc<dyn ExtractObserver> = match &self.extract_log {
            Some(path) => {
                let log = JsonLinesObserver::create(path).map_err(|e| {
                    PipelineError::Config(format!("cannot open extract log {}: {e}", path.display()))
                })?;
                let observers: Vec<Arc<dyn ExtractObserver>> = vec![Arc::new(TracingObserver), Arc::new(log)];
                Arc::new(observers)
            }
            None => Arc::new(TracingObserver),
        };
        Ok(ExtractOptions {
            sheet_selection: self
                .sheet
                .clone()
                .map(SheetSelection::Sheet)
                .unwrap_or_default(),
            observer: Some(observer),
            ..ExtractOptions::default()
        })
    }

    /// Build the raw store and check that it answers.
    ///
    /// Without `MINIO_ENDPOINT` the archive is kept in memory, which is only allowed for the
    /// in-memory warehouse. An unreachable store is a connection error.
    pub async fn raw_store(&self) -> PipelineResult<Arc<dyn RawStore>> {
        let Some(store_config) = self.object_store_config() else {
            if self.warehouse != WarehouseKind::Memory {
                return Err(PipelineError::Config(
                    "MINIO_ENDPOINT is required unless --warehouse memory is used".into(),
                ));
            }
            tracing::warn!("MINIO_ENDPOINT not set, raw archive is kept in memory");
            return Ok(Arc::new(ObjectStoreSink::new(
                Arc::new(InMemory::new()),
                self.minio_bucket.clone(),
            )));
        };
        let sink = ObjectStoreSink::s3(&store_config).map_err(|e| PipelineError::Config(e.to_string()))?;
        connect_raw_store(Arc::new(sink)).await
    }
}

/// Check `store` once and hand it back; a failed check is a [`PipelineError::Connection`].
pub async fn connect_raw_store(store: Arc<dyn RawStore>) -> PipelineResult<Arc<dyn RawStore>> {
    store
        .check()
        .await
        .map_err(|e| PipelineError::Connection(format!("object store unreachable: {e}")))?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> EtlConfig {
        let mut argv = vec!["warehouse-etl"];
        argv.extend_from_slice(args);
        EtlConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn file_source_resolves_to_path() {
        let cfg = parse(&["--source-type", "FILE", "--source-file", "data/orders.csv"]);
        assert_eq!(cfg.target().unwrap(), RunTarget::File("data/orders.csv".into()));
    }

    #[test]
    fn sql_source_requires_a_query() {
        let cfg = parse(&["--source-type", "sql", "--source-query", "  "]);
        assert!(matches!(cfg.target(), Err(PipelineError::Config(_))));

        let cfg = parse(&["--source-type", "sql", "--source-query", "SELECT 1"]);
        assert_eq!(cfg.target().unwrap(), RunTarget::Query("SELECT 1".into()));
    }

    #[test]
    fn unknown_selector_is_a_config_error() {
        let cfg = parse(&["--source-type", "ftp"]);
        let err = cfg.target().unwrap_err();
        assert!(err.to_string().contains("unknown source type 'ftp'"));
    }

    #[test]
    fn process_file_command_uses_file_path() {
        let cfg = parse(&["--command", "process-file", "--file-path", "in.json"]);
        assert_eq!(cfg.target().unwrap(), RunTarget::File("in.json".into()));

        let cfg = parse(&["--command", "process-file"]);
        assert!(matches!(cfg.target(), Err(PipelineError::Config(_))));

        let cfg = parse(&["--command", "send-email"]);
        assert!(matches!(cfg.target(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn postgres_settings_are_validated() {
        let cfg = parse(&["--db-host", "db", "--db-name", "dw", "--db-user", "etl"]);
        let pg = cfg.postgres_config().unwrap();
        assert_eq!((pg.host.as_str(), pg.port), ("db", 5432));
        assert!(pg.password.is_none());

        let cfg = parse(&["--db-host", "db"]);
        assert!(matches!(cfg.postgres_config(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn object_store_defaults() {
        let cfg = parse(&["--minio-endpoint", "minio:9000", "--minio-secure", "true"]);
        let store = cfg.object_store_config().unwrap();
        assert_eq!(store.bucket, "raw");
        assert_eq!(store.region, "us-east-1");
        assert_eq!(store.endpoint_url(), "https://minio:9000");
    }

    #[test]
    fn sheet_option_selects_named_sheet() {
        let cfg = parse(&["--sheet", "Q1", "--warehouse", "memory"]);
        assert_eq!(cfg.warehouse, WarehouseKind::Memory);
        assert_eq!(
            cfg.extract_options().unwrap().sheet_selection,
            SheetSelection::Sheet("Q1".into())
        );
    }

    #[test]
    fn source_type_wins_over_a_leftover_command() {
        let cfg = parse(&["--source-type", "file", "--source-file", "a.csv", "--command", "email-test"]);
        assert_eq!(cfg.target().unwrap(), RunTarget::File("a.csv".into()));

        let cfg = parse(&[
            "--source-type",
            "sql",
            "--source-query",
            "SELECT 1",
            "--command",
            "process-file",
            "--file-path",
            "ignored.csv",
        ]);
        assert_eq!(cfg.target().unwrap(), RunTarget::Query("SELECT 1".into()));

        let cfg = parse(&[]);
        let err = cfg.target().unwrap_err();
        assert!(err.to_string().contains("ETL_SOURCE_TYPE is not set"));
    }

    #[test]
    fn extraction_is_always_observed() {
        let cfg = parse(&[]);
        assert!(cfg.extract_options().unwrap().observer.is_some());

        let cfg = parse(&["--extract-log", "/nonexistent-dir/events.jsonl"]);
        assert!(matches!(cfg.extract_options(), Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn in_memory_archive_requires_the_memory_warehouse() {
        let cfg = parse(&[]);
        let Err(err) = cfg.raw_store().await else {
            panic!("expected a config error");
        };
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("MINIO_ENDPOINT"));

        let cfg = parse(&["--warehouse", "memory"]);
        let store = cfg.raw_store().await.unwrap();
        store.put("raw/raw_x.csv", b"[]".to_vec(), "application/json").await.unwrap();
    }

    struct Unreachable;

    #[async_trait::async_trait]
    impl RawStore for Unreachable {
        async fn put(&self, _key: &str, _body: Vec<u8>, _content_type: &str) -> crate::archive::ArchiveResult<()> {
            Ok(())
        }

        async fn check(&self) -> crate::archive::ArchiveResult<()> {
            Err(crate::archive::ArchiveError::Rejected("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn unreachable_store_is_a_connection_error() {
        let Err(err) = connect_raw_store(Arc::new(Unreachable)).await else {
            panic!("expected a connection error");
        };
        match err {
            PipelineError::Connection(message) => assert!(message.contains("connection refused")),
            other => panic!("expected Connection, got {other:?}"),
        }
    }
}
