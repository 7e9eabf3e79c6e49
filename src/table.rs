//! Idempotent table creation from an inferred schema.
//!
//! Tables are created at most once. An existing table is never altered: columns that appear in
//! later loads are not added, and changed inferred types are not applied.

use crate::schema::sanitize_table_name;
use crate::types::Schema;
use crate::warehouse::{Statement, Warehouse, WarehouseResult};

/// Prefix of generated destination table names.
pub const AUTO_TABLE_PREFIX: &str = "auto_table_";

/// Destination table name for a batch of `record_count` records.
///
/// The name depends only on the record count, so two different sources with the same number of
/// records load into the same table.
pub fn auto_table_name(record_count: usize) -> String {
    sanitize_table_name(&format!("{AUTO_TABLE_PREFIX}{record_count}"))
}

/// Build the `CREATE TABLE IF NOT EXISTS` statement for `schema`.
pub fn create_table_statement(table: &str, schema: &Schema) -> Statement {
    Statement::CreateTable {
        table: sanitize_table_name(table),
        columns: schema.fields.clone(),
    }
}

/// Create `table` (sanitized) with one column per schema field plus the surrogate key.
///
/// Returns the sanitized table name. Safe to call repeatedly.
pub async fn ensure_table(
    warehouse: &dyn Warehouse,
    table: &str,
    schema: &Schema,
) -> WarehouseResult<String> {
    let table = sanitize_table_name(table);
    warehouse
        .execute(&create_table_statement(&table, schema))
        .await?;
    tracing::info!(%table, columns = schema.len(), "table ensured");
    Ok(table)
}
