//! Analytical view synthesis.
//!
//! The view is named like a star-schema view but is a plain `SELECT *` over its source table:
//! the classifier's output is only reported, it does not shape the view. Replacing a view is not
//! isolated from concurrent readers.

use crate::classify::Classification;
use crate::warehouse::{Statement, Warehouse, WarehouseResult};

/// Suffix appended to the source table name.
pub const VIEW_SUFFIX: &str = "_star_view";

/// Name of the view synthesized over `table`.
pub fn view_name(table: &str) -> String {
    format!("{table}{VIEW_SUFFIX}")
}

/// `CREATE OR REPLACE VIEW <table>_star_view AS SELECT * FROM <table>`.
pub fn view_statement(table: &str) -> Statement {
    Statement::CreateOrReplaceView {
        view: view_name(table),
        source: table.to_string(),
    }
}

/// Create or replace the view over `table`. Returns the view name.
pub async fn synthesize_view(
    warehouse: &dyn Warehouse,
    table: &str,
    classification: &Classification,
) -> WarehouseResult<String> {
    let statement = view_statement(table);
    warehouse.execute(&statement).await?;
    let view = view_name(table);
    tracing::info!(
        %view,
        dimensions = classification.dimensions().count(),
        facts = classification.facts().count(),
        "view created"
    );
    Ok(view)
}
