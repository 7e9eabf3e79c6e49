//! In-process warehouse.
//!
//! Interprets the pipeline's [`Statement`]s with PostgreSQL-like semantics: idempotent table
//! creation, a serial surrogate key, per-column type coercion on insert, and views that read
//! their source table at query time. Used by `ETL_WAREHOUSE=memory` dry runs and by tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    parse_date, CatalogColumn, Statement, Warehouse, WarehouseError, WarehouseResult, SURROGATE_KEY,
};
use crate::types::{ColumnType, Record, Value};

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<(String, ColumnType)>,
    rows: Vec<Record>,
    next_id: i64,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    /// view name -> source table
    views: BTreeMap<String, String>,
}

/// Warehouse that keeps tables in memory.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all tables, sorted.
    pub async fn table_names(&self) -> Vec<String> {
        self.state.lock().await.tables.keys().cloned().collect()
    }

    /// Names of all views, sorted.
    pub async fn view_names(&self) -> Vec<String> {
        self.state.lock().await.views.keys().cloned().collect()
    }

    /// Row count of a table or view.
    pub async fn row_count(&self, relation: &str) -> WarehouseResult<usize> {
        let state = self.state.lock().await;
        Ok(state.resolve(relation)?.rows.len())
    }

    /// All rows of a table or view, including the surrogate key.
    pub async fn select_all(&self, relation: &str) -> WarehouseResult<Vec<Record>> {
        let state = self.state.lock().await;
        Ok(state.resolve(relation)?.rows.clone())
    }
}

impl State {
    fn resolve(&self, relation: &str) -> WarehouseResult<&MemoryTable> {
        let table = self.views.get(relation).map_or(relation, String::as_str);
        self.tables
            .get(table)
            .ok_or_else(|| WarehouseError::UnknownRelation(relation.to_string()))
    }

    fn create_table(&mut self, table: &str, columns: &[crate::types::Field]) -> WarehouseResult<u64> {
        if self.tables.contains_key(table) {
            tracing::debug!(table, "table already exists, skipping");
            return Ok(0);
        }
        if self.views.contains_key(table) {
            return Err(WarehouseError::Rejected(format!(
                "relation \"{table}\" already exists as a view"
            )));
        }
        let mut defined: Vec<(String, ColumnType)> = Vec::with_capacity(columns.len() + 1);
        for field in columns {
            if field.name == SURROGATE_KEY || defined.iter().any(|(n, _)| *n == field.name) {
                return Err(WarehouseError::Rejected(format!(
                    "column \"{}\" specified more than once",
                    field.name
                )));
            }
            defined.push((field.name.clone(), field.column_type));
        }
        self.tables.insert(
            table.to_string(),
            MemoryTable {
                columns: defined,
                rows: Vec::new(),
                next_id: 1,
            },
        );
        Ok(0)
    }

    fn insert(&mut self, table: &str, columns: &[String], values: &[Value]) -> WarehouseResult<u64> {
        let target = self
            .tables
            .get_mut(table)
            .ok_or_else(|| WarehouseError::UnknownRelation(table.to_string()))?;
        if columns.len() != values.len() {
            return Err(WarehouseError::Rejected(format!(
                "{} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        for (idx0, column) in columns.iter().enumerate() {
            if columns[..idx0].contains(column) {
                return Err(WarehouseError::Rejected(format!(
                    "column \"{column}\" specified more than once"
                )));
            }
        }

        let mut row: Record = target
            .columns
            .iter()
            .map(|(name, _)| (name.clone(), Value::Null))
            .collect();
        let mut explicit_id = None;
        for (column, value) in columns.iter().zip(values) {
            if column == SURROGATE_KEY {
                explicit_id = Some(coerce(value, ColumnType::Integer)?);
                continue;
            }
            let column_type = target
                .columns
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, t)| *t)
                .ok_or_else(|| {
                    WarehouseError::Rejected(format!(
                        "column \"{column}\" of relation \"{table}\" does not exist"
                    ))
                })?;
            row.insert(column.clone(), coerce(value, column_type)?);
        }

        // An explicit key does not advance the sequence, as with a serial column.
        let id = match explicit_id {
            Some(Value::Null) => {
                return Err(WarehouseError::Rejected(format!(
                    "null value in column \"{SURROGATE_KEY}\" of relation \"{table}\""
                )));
            }
            Some(id) => id,
            None => {
                let id = Value::Int64(target.next_id);
                target.next_id += 1;
                id
            }
        };
        if target.rows.iter().any(|r| r.get(SURROGATE_KEY) == Some(&id)) {
            return Err(WarehouseError::Rejected(format!(
                "duplicate key value violates primary key of \"{table}\": {SURROGATE_KEY}={id}"
            )));
        }
        row.insert(SURROGATE_KEY.to_string(), id);
        target.rows.push(row);
        Ok(1)
    }

    fn create_or_replace_view(&mut self, view: &str, source: &str) -> WarehouseResult<u64> {
        if self.tables.contains_key(view) {
            return Err(WarehouseError::Rejected(format!("\"{view}\" is not a view")));
        }
        if !self.tables.contains_key(source) {
            return Err(WarehouseError::UnknownRelation(source.to_string()));
        }
        self.views.insert(view.to_string(), source.to_string());
        Ok(0)
    }
}

/// Convert a bound value to the representation stored for `column_type`.
fn coerce(value: &Value, column_type: ColumnType) -> WarehouseResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let fail = |message: &str| WarehouseError::Bind {
        value: value.to_string(),
        target: column_type.to_string(),
        message: message.to_string(),
    };
    match column_type {
        ColumnType::Integer => {
            let n = value.as_i64().ok_or_else(|| fail("expected integer"))?;
            i32::try_from(n)
                .map(|n| Value::Int64(i64::from(n)))
                .map_err(|_| fail("integer out of range"))
        }
        ColumnType::Numeric => value
            .as_f64()
            .map(Value::Float64)
            .ok_or_else(|| fail("expected number")),
        ColumnType::Date => parse_date(&value.to_string())
            .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| fail("expected date")),
        ColumnType::Text => Ok(Value::Text(value.to_string())),
    }
}

fn parse_select_all(sql: &str) -> Option<&str> {
    let sql = sql.trim().trim_end_matches(';').trim();
    let mut parts = sql.split_whitespace();
    let keywords = [parts.next()?, parts.next()?, parts.next()?];
    let relation = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let matches = keywords[0].eq_ignore_ascii_case("select")
        && keywords[1] == "*"
        && keywords[2].eq_ignore_ascii_case("from");
    matches.then(|| relation.trim_matches('"'))
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn execute(&self, statement: &Statement) -> WarehouseResult<u64> {
        let mut state = self.state.lock().await;
        match statement {
            Statement::CreateTable { table, columns } => state.create_table(table, columns),
            Statement::Insert {
                table,
                columns,
                values,
            } => state.insert(table, columns, values),
            Statement::CreateOrReplaceView { view, source } => {
                state.create_or_replace_view(view, source)
            }
        }
    }

    async fn columns(&self, table: &str) -> WarehouseResult<Vec<CatalogColumn>> {
        let state = self.state.lock().await;
        let Some(t) = state.tables.get(table) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<CatalogColumn> = t
            .columns
            .iter()
            .map(|(name, ty)| CatalogColumn::new(name.clone(), ty.sql_name().to_ascii_lowercase()))
            .collect();
        out.push(CatalogColumn::new(SURROGATE_KEY, "integer"));
        Ok(out)
    }

    /// Only `SELECT * FROM <relation>` is understood.
    async fn query(&self, sql: &str) -> WarehouseResult<Vec<Record>> {
        let relation = parse_select_all(sql).ok_or_else(|| {
            WarehouseError::Unsupported(format!("in-memory warehouse cannot run: {sql}"))
        })?;
        self.select_all(relation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;

    fn create(table: &str) -> Statement {
        Statement::CreateTable {
            table: table.to_string(),
            columns: vec![
                Field::new("qty", ColumnType::Integer),
                Field::new("price", ColumnType::Numeric),
                Field::new("day", ColumnType::Date),
            ],
        }
    }

    fn insert(table: &str, values: Vec<Value>) -> Statement {
        Statement::Insert {
            table: table.to_string(),
            columns: vec!["qty".into(), "price".into(), "day".into()],
            values,
        }
    }

    #[tokio::test]
    async fn insert_coerces_text_to_column_types() {
        let wh = MemoryWarehouse::new();
        wh.execute(&create("t")).await.unwrap();
        wh.execute(&insert(
            "t",
            vec![Value::text("3"), Value::text("9.5"), Value::text("2024/02/01")],
        ))
        .await
        .unwrap();
        let rows = wh.select_all("t").await.unwrap();
        assert_eq!(rows[0]["qty"], Value::Int64(3));
        assert_eq!(rows[0]["price"], Value::Float64(9.5));
        assert_eq!(rows[0]["day"], Value::text("2024-02-01"));
        assert_eq!(rows[0]["id"], Value::Int64(1));
    }

    #[tokio::test]
    async fn bad_value_is_rejected_and_nothing_is_stored() {
        let wh = MemoryWarehouse::new();
        wh.execute(&create("t")).await.unwrap();
        let err = wh
            .execute(&insert("t", vec![Value::text("x"), Value::Null, Value::Null]))
            .await
            .unwrap_err();
        assert!(matches!(err, WarehouseError::Bind { .. }));
        assert_eq!(wh.row_count("t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_and_surrogate_column_names_are_rejected() {
        let wh = MemoryWarehouse::new();
        let stmt = Statement::CreateTable {
            table: "t".into(),
            columns: vec![Field::new("id", ColumnType::Integer)],
        };
        assert!(matches!(
            wh.execute(&stmt).await,
            Err(WarehouseError::Rejected(_))
        ));
        assert!(wh.table_names().await.is_empty());
    }

    #[tokio::test]
    async fn views_track_their_source_table() {
        let wh = MemoryWarehouse::new();
        wh.execute(&create("t")).await.unwrap();
        wh.execute(&Statement::CreateOrReplaceView {
            view: "t_star_view".into(),
            source: "t".into(),
        })
        .await
        .unwrap();
        wh.execute(&insert("t", vec![Value::Int64(1), Value::Null, Value::Null]))
            .await
            .unwrap();
        assert_eq!(wh.query("SELECT * FROM t_star_view;").await.unwrap().len(), 1);
        assert!(wh.query("SELECT qty FROM t").await.is_err());
    }

    #[tokio::test]
    async fn explicit_surrogate_key_must_be_unique() {
        let wh = MemoryWarehouse::new();
        wh.execute(&create("t")).await.unwrap();
        wh.execute(&insert("t", vec![Value::Int64(1), Value::Null, Value::Null]))
            .await
            .unwrap();
        let reinsert = Statement::Insert {
            table: "t".into(),
            columns: vec!["id".into(), "qty".into()],
            values: vec![Value::Int64(1), Value::Int64(2)],
        };
        assert!(matches!(
            wh.execute(&reinsert).await,
            Err(WarehouseError::Rejected(_))
        ));

        let dup_column = Statement::Insert {
            table: "t".into(),
            columns: vec!["qty".into(), "qty".into()],
            values: vec![Value::Int64(1), Value::Int64(2)],
        };
        assert!(wh.execute(&dup_column).await.is_err());
        assert_eq!(wh.row_count("t").await.unwrap(), 1);
    }

    #[test]
    fn parses_only_select_star() {
        assert_eq!(parse_select_all("select * from \"orders\""), Some("orders"));
        assert_eq!(parse_select_all("SELECT * FROM a WHERE x = 1"), None);
        assert_eq!(parse_select_all("DELETE FROM a"), None);
    }
}
