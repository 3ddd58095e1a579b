// ABOUTME: Remote store adapter backed by tokio-postgres over TLS
// ABOUTME: Converts between SqlValue and Postgres wire types at the boundary

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::Client;

use super::{Dialect, Row, SqlValue, Store};

/// The remote synchronization point.
///
/// Owns the client and the spawned connection task; dropping the store (or
/// calling [`PostgresStore::close`]) tears the connection down.
pub struct PostgresStore {
    client: Client,
    connection: Option<JoinHandle<()>>,
}

impl PostgresStore {
    /// Connect to the remote database described by `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let connector = TlsConnector::builder()
            .build()
            .context("Failed to build TLS connector")?;
        let tls = MakeTlsConnector::new(connector);

        let (client, connection) = tokio_postgres::connect(url, tls)
            .await
            .context("Failed to connect to remote PostgreSQL database")?;

        // The connection future drives all traffic; it must outlive the client.
        let handle = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Remote PostgreSQL connection ended: {}", e);
            }
        });

        Ok(Self {
            client,
            connection: Some(handle),
        })
    }

    /// Tear down the connection task.
    pub fn close(mut self) {
        if let Some(handle) = self.connection.take() {
            handle.abort();
        }
    }
}

impl Drop for PostgresStore {
    fn drop(&mut self) {
        if let Some(handle) = self.connection.take() {
            handle.abort();
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Integer(i) => i.to_sql(ty, out),
            SqlValue::Real(f) => f.to_sql(ty, out),
            SqlValue::Text(s) => s.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <i64 as ToSql>::accepts(ty) || <f64 as ToSql>::accepts(ty) || <String as ToSql>::accepts(ty)
    }

    to_sql_checked!();
}

/// Decode one column of a Postgres row into a [`SqlValue`].
///
/// Decoding is driven by the column's declared type; the schema bootstrap
/// only ever creates TEXT, BIGINT, and DOUBLE PRECISION columns, but the
/// narrower integer and float types are accepted for pre-existing remotes.
fn decode_column(row: &tokio_postgres::Row, idx: usize) -> Result<SqlValue> {
    let column = &row.columns()[idx];
    let ty = column.type_();
    let value = if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Integer)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?
            .map_or(SqlValue::Null, |v| SqlValue::Integer(v as i64))
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?
            .map_or(SqlValue::Null, |v| SqlValue::Integer(v as i64))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Real)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?
            .map_or(SqlValue::Null, |v| SqlValue::Real(v as f64))
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR {
        row.try_get::<_, Option<String>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Text)
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?
            .map_or(SqlValue::Null, |v| SqlValue::Integer(v as i64))
    } else {
        bail!(
            "Unsupported remote column type {} for column '{}'",
            ty,
            column.name()
        );
    };
    Ok(value)
}

#[async_trait]
impl Store for PostgresStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(|v| v as _).collect();
        self.client
            .execute(sql, &bound)
            .await
            .with_context(|| format!("Remote execute failed: {}", sql))
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(|v| v as _).collect();
        let rows = self
            .client
            .query(sql, &bound)
            .await
            .with_context(|| format!("Remote query failed: {}", sql))?;

        rows.iter()
            .map(|row| {
                (0..row.columns().len())
                    .map(|idx| decode_column(row, idx))
                    .collect()
            })
            .collect()
    }
}
