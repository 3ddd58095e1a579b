// ABOUTME: Local store adapter backed by rusqlite
// ABOUTME: Wraps a SQLite connection behind the async Store trait

use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;

use super::{Dialect, Row, SqlValue, Store};

/// The embedded local database.
///
/// SQLite calls are cheap and the engine serializes all store access behind
/// the single-flight guard, so the connection sits behind a plain mutex and
/// runs inline on the async task.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).with_context(|| {
            format!("Failed to open SQLite database at {:?}", path.as_ref())
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL on SQLite database")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a fresh in-memory database. Used by tests and the status probe.
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }
}

fn to_rusqlite(value: &SqlValue) -> rusqlite::types::Value {
    match value {
        SqlValue::Null => rusqlite::types::Value::Null,
        SqlValue::Integer(i) => rusqlite::types::Value::Integer(*i),
        SqlValue::Real(f) => rusqlite::types::Value::Real(*f),
        SqlValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
    }
}

fn from_rusqlite(value: rusqlite::types::Value, column: &str) -> Result<SqlValue> {
    match value {
        rusqlite::types::Value::Null => Ok(SqlValue::Null),
        rusqlite::types::Value::Integer(i) => Ok(SqlValue::Integer(i)),
        rusqlite::types::Value::Real(f) => Ok(SqlValue::Real(f)),
        rusqlite::types::Value::Text(s) => Ok(SqlValue::Text(s)),
        rusqlite::types::Value::Blob(_) => Err(anyhow!(
            "BLOB value in column '{}' is not synchronizable",
            column
        )),
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let conn = self.lock()?;
        let bound: Vec<rusqlite::types::Value> = params.iter().map(to_rusqlite).collect();
        let affected = conn
            .execute(sql, rusqlite::params_from_iter(bound))
            .with_context(|| format!("SQLite execute failed: {}", sql))?;
        Ok(affected as u64)
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .with_context(|| format!("SQLite prepare failed: {}", sql))?;
        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| s.to_string()).collect();
        let bound: Vec<rusqlite::types::Value> = params.iter().map(to_rusqlite).collect();

        let raw: Vec<Vec<rusqlite::types::Value>> = stmt
            .query_map(rusqlite::params_from_iter(bound), |row| {
                (0..column_names.len())
                    .map(|i| row.get::<_, rusqlite::types::Value>(i))
                    .collect()
            })
            .with_context(|| format!("SQLite query failed: {}", sql))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("SQLite row read failed: {}", sql))?;

        raw.into_iter()
            .map(|values| {
                values
                    .into_iter()
                    .zip(column_names.iter())
                    .map(|(v, name)| from_rusqlite(v, name))
                    .collect()
            })
            .collect()
    }
}
