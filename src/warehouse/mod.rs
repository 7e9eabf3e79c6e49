//! Warehouse abstraction.
//!
//! Pipeline stages never build SQL strings by hand; they emit typed [`Statement`]s and hand
//! them to a [`Warehouse`]. Two backends exist:
//! - [`PostgresWarehouse`]: the relational warehouse, over tokio-postgres
//! - [`MemoryWarehouse`]: an in-process warehouse used for dry runs and tests

use async_trait::async_trait;

use crate::types::{Field, Record, Value};

pub mod memory;
pub mod postgres;

pub use memory::MemoryWarehouse;
pub use postgres::{PostgresConfig, PostgresWarehouse};

/// Name of the surrogate identity column added to every created table.
pub const SURROGATE_KEY: &str = "id";

/// Error type for warehouse operations.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// Failed to connect.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server rejected or failed a statement.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// A value could not be converted to the column's type.
    #[error("cannot bind {value:?} as {target}: {message}")]
    Bind {
        value: String,
        target: String,
        message: String,
    },

    /// A statement violated a constraint of the in-process warehouse.
    #[error("statement rejected: {0}")]
    Rejected(String),

    /// Table or view does not exist.
    #[error("relation \"{0}\" does not exist")]
    UnknownRelation(String),

    /// The backend cannot run this statement.
    #[error("unsupported statement: {0}")]
    Unsupported(String),

    /// A result row could not be decoded into a record.
    #[error("failed to decode row: {0}")]
    Decode(String),
}

/// Result type for warehouse operations.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// One entry of a table's column catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    /// Declared type as reported by the catalog (e.g. `integer`, `text`).
    pub data_type: String,
}

impl CatalogColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A DDL/DML statement the pipeline issues against the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `CREATE TABLE IF NOT EXISTS` with the given columns plus [`SURROGATE_KEY`].
    CreateTable { table: String, columns: Vec<Field> },
    /// Parameterized single-row insert.
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Value>,
    },
    /// `CREATE OR REPLACE VIEW <view> AS SELECT * FROM <source>`.
    CreateOrReplaceView { view: String, source: String },
}

impl Statement {
    /// SQL text with `$n` placeholders.
    pub fn sql(&self) -> String {
        self.sql_with_placeholders(|i| format!("${i}"))
    }

    /// SQL text with each 1-based parameter position rendered by `placeholder`.
    pub fn sql_with_placeholders(&self, placeholder: impl Fn(usize) -> String) -> String {
        match self {
            Self::CreateTable { table, columns } => {
                let mut defs: Vec<String> = columns
                    .iter()
                    .map(|f| format!("{} {}", quote_ident(&f.name), f.column_type.sql_name()))
                    .collect();
                defs.push(format!("{SURROGATE_KEY} SERIAL PRIMARY KEY"));
                format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    quote_ident(table),
                    defs.join(", ")
                )
            }
            Self::Insert { table, columns, .. } if columns.is_empty() => {
                format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table))
            }
            Self::Insert { table, columns, .. } => {
                let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
                let placeholders: Vec<String> = (1..=columns.len()).map(&placeholder).collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quote_ident(table),
                    cols.join(", "),
                    placeholders.join(", ")
                )
            }
            Self::CreateOrReplaceView { view, source } => format!(
                "CREATE OR REPLACE VIEW {} AS SELECT * FROM {}",
                quote_ident(view),
                quote_ident(source)
            ),
        }
    }

    /// Bound parameters, in placeholder order.
    pub fn params(&self) -> &[Value] {
        match self {
            Self::Insert { values, .. } => values,
            _ => &[],
        }
    }
}

/// Quote an identifier for SQL, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Parse the date spellings the warehouse accepts for DATE columns.
pub fn parse_date(s: &str) -> Option<chrono::NaiveDate> {
    const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
    const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| chrono::NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| chrono::NaiveDateTime::parse_from_str(s, f).ok())
                .map(|ts| ts.date())
        })
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.date_naive())
        })
}

/// A relational warehouse the pipeline loads into.
///
/// Implementations must make `CreateTable` idempotent and `CreateOrReplaceView` replace any
/// previous definition.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Execute one statement; returns the number of affected rows.
    async fn execute(&self, statement: &Statement) -> WarehouseResult<u64>;

    /// Column catalog of `table` in ordinal order; empty when the table does not exist.
    async fn columns(&self, table: &str) -> WarehouseResult<Vec<CatalogColumn>>;

    /// Run a read-only query and return each row as a record.
    async fn query(&self, sql: &str) -> WarehouseResult<Vec<Record>>;
}
