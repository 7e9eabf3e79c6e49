//! Row-by-row loading.
//!
//! The column list of every insert comes from the **first** record's key set. A later record
//! missing one of those keys binds NULL for it; keys the first record lacks are dropped.
//! Each insert stands alone: a failing record is logged and skipped, the rest still load, and
//! nothing is rolled back.

use crate::schema::sanitize_column_name;
use crate::types::{Record, Value};
use crate::warehouse::{Statement, Warehouse};

/// Outcome of loading one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub table: String,
    pub attempted: usize,
    pub inserted: usize,
    pub failed: usize,
}

/// Insert column plan derived from the first record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPlan {
    table: String,
    /// Keys as they appear in the records.
    source_keys: Vec<String>,
    /// Sanitized column names, same order as `source_keys`.
    columns: Vec<String>,
}

impl InsertPlan {
    /// Plan inserts into `table` using the key set of `first`.
    pub fn from_first_record(table: impl Into<String>, first: &Record) -> Self {
        let source_keys: Vec<String> = first.keys().cloned().collect();
        let columns = source_keys.iter().map(|k| sanitize_column_name(k)).collect();
        Self {
            table: table.into(),
            source_keys,
            columns,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Insert statement for one record.
    pub fn statement_for(&self, record: &Record) -> Statement {
        Statement::Insert {
            table: self.table.clone(),
            columns: self.columns.clone(),
            values: self
                .source_keys
                .iter()
                .map(|k| record.get(k).cloned().unwrap_or(Value::Null))
                .collect(),
        }
    }
}

/// Insert every record into `table`, one statement per record.
pub async fn load_records(warehouse: &dyn Warehouse, table: &str, records: &[Record]) -> LoadReport {
    let mut report = LoadReport {
        table: table.to_string(),
        ..Default::default()
    };
    let Some(first) = records.first() else {
        return report;
    };

    let plan = InsertPlan::from_first_record(table, first);
    for (idx0, record) in records.iter().enumerate() {
        report.attempted += 1;
        match warehouse.execute(&plan.statement_for(record)).await {
            Ok(_) => report.inserted += 1,
            Err(error) => {
                report.failed += 1;
                tracing::warn!(table, record = idx0 + 1, %error, "error inserting record, skipping");
            }
        }
    }

    tracing::info!(
        table,
        inserted = report.inserted,
        failed = report.failed,
        "load finished"
    );
    report
}
