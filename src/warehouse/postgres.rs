//! PostgreSQL warehouse backend.

use std::error::Error as StdError;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls};

use super::{parse_date, CatalogColumn, Statement, Warehouse, WarehouseError, WarehouseResult};
use crate::ingestion::json::record_from_json_object;
use crate::types::{Record, Value};

const CATALOG_QUERY: &str = "SELECT column_name::text, data_type::text \
     FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1 \
     ORDER BY ordinal_position";

/// Connection settings for [`PostgresWarehouse`].
#[derive(Clone, Default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

impl PostgresConfig {
    fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user);
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}

/// Warehouse backed by a single PostgreSQL connection.
pub struct PostgresWarehouse {
    client: Client,
}

impl PostgresWarehouse {
    /// Connect and verify the connection with a round trip.
    ///
    /// The connection task is spawned onto the current tokio runtime.
    pub async fn connect(config: &PostgresConfig) -> WarehouseResult<Self> {
        let (client, connection) = config
            .to_pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| {
                WarehouseError::Connection(format!(
                    "failed to connect to postgres at {}:{}: {e}",
                    config.host, config.port
                ))
            })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection error");
            }
        });

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| WarehouseError::Connection(format!("failed to ping postgres: {e}")))?;

        tracing::info!(host = %config.host, db = %config.dbname, "connected to warehouse");
        Ok(Self { client })
    }

    async fn execute_with_params(&self, statement: &Statement) -> WarehouseResult<u64> {
        let sql = statement.sql();
        let prepared = self.client.prepare(&sql).await?;

        let prepared = match text_cast_plan(statement, prepared.params()) {
            Some((cast_sql, types)) => {
                tracing::trace!(sql = %cast_sql, "execute with server-side casts");
                self.client.prepare_typed(&cast_sql, &types).await?
            }
            None => prepared,
        };

        let params: Vec<&(dyn ToSql + Sync)> = statement
            .params()
            .iter()
            .map(|v| v as &(dyn ToSql + Sync))
            .collect();
        Ok(self.client.execute(&prepared, &params).await?)
    }
}

/// Column types whose values are sent as text and parsed by the server.
fn parsed_by_server(ty: &Type) -> bool {
    matches!(*ty, Type::NUMERIC | Type::DATE)
}

/// Rewrite `statement` so NUMERIC and DATE parameters travel as text with an explicit cast.
///
/// `server_types` are the parameter types the server inferred for the plain statement.
/// Returns `None` when no parameter needs a cast.
fn text_cast_plan(statement: &Statement, server_types: &[Type]) -> Option<(String, Vec<Type>)> {
    if !server_types.iter().any(parsed_by_server) {
        return None;
    }
    let sql = statement.sql_with_placeholders(|i| match server_types.get(i - 1) {
        Some(ty) if parsed_by_server(ty) => format!("${i}::{}", ty.name()),
        _ => format!("${i}"),
    });
    let types = server_types
        .iter()
        .map(|ty| if parsed_by_server(ty) { Type::TEXT } else { ty.clone() })
        .collect();
    Some((sql, types))
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn execute(&self, statement: &Statement) -> WarehouseResult<u64> {
        if statement.params().is_empty() {
            let sql = statement.sql();
            tracing::trace!(%sql, "execute");
            Ok(self.client.execute(sql.as_str(), &[]).await?)
        } else {
            self.execute_with_params(statement).await
        }
    }

    async fn columns(&self, table: &str) -> WarehouseResult<Vec<CatalogColumn>> {
        let rows = self.client.query(CATALOG_QUERY, &[&table]).await?;
        rows.iter()
            .map(|row| -> WarehouseResult<CatalogColumn> {
                Ok(CatalogColumn {
                    name: row.try_get(0)?,
                    data_type: row.try_get(1)?,
                })
            })
            .collect()
    }

    async fn query(&self, sql: &str) -> WarehouseResult<Vec<Record>> {
        let inner = sql.trim().trim_end_matches(';');
        let wrapped = format!("SELECT row_to_json(q)::text FROM ({inner}) AS q");
        let rows = self.client.query(wrapped.as_str(), &[]).await?;
        rows.iter()
            .map(|row| -> WarehouseResult<Record> {
                let text: String = row.try_get(0)?;
                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(serde_json::Value::Object(obj)) => Ok(record_from_json_object(obj)),
                    Ok(other) => Err(WarehouseError::Decode(format!("expected object, got {other}"))),
                    Err(e) => Err(WarehouseError::Decode(e.to_string())),
                }
            })
            .collect()
    }
}

type BoxError = Box<dyn StdError + Sync + Send>;

fn bind_error(value: &Value, ty: &Type, message: impl Into<String>) -> BoxError {
    Box::new(WarehouseError::Bind {
        value: value.to_string(),
        target: ty.name().to_string(),
        message: message.into(),
    })
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }
        match *ty {
            Type::BOOL => self
                .as_bool()
                .ok_or_else(|| bind_error(self, ty, "expected boolean"))?
                .to_sql(ty, out),
            Type::INT2 => {
                let n = self.as_i64().ok_or_else(|| bind_error(self, ty, "expected integer"))?;
                i16::try_from(n)?.to_sql(ty, out)
            }
            Type::INT4 => {
                let n = self.as_i64().ok_or_else(|| bind_error(self, ty, "expected integer"))?;
                i32::try_from(n)?.to_sql(ty, out)
            }
            Type::INT8 => self
                .as_i64()
                .ok_or_else(|| bind_error(self, ty, "expected integer"))?
                .to_sql(ty, out),
            Type::FLOAT4 => {
                let x = self.as_f64().ok_or_else(|| bind_error(self, ty, "expected number"))?;
                (x as f32).to_sql(ty, out)
            }
            Type::FLOAT8 => self
                .as_f64()
                .ok_or_else(|| bind_error(self, ty, "expected number"))?
                .to_sql(ty, out),
            Type::DATE => parse_date(&self.to_string())
                .ok_or_else(|| bind_error(self, ty, "expected date"))?
                .to_sql(ty, out),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                self.to_string().to_sql(ty, out)
            }
            _ => Err(bind_error(self, ty, "unsupported column type")),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
