// ABOUTME: Store adapter contract shared by the local and remote databases
// ABOUTME: Defines the Store trait, scalar SqlValue, and placeholder dialects

pub mod postgres;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// Placeholder syntax accepted by a store.
///
/// The logical contract of [`Store`] is identical on both sides; only the
/// parameter markers differ, so the engine renders every statement per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `?1`, `?2`, ... (rusqlite)
    Sqlite,
    /// `$1`, `$2`, ... (tokio-postgres)
    Postgres,
}

impl Dialect {
    /// Render the 1-based positional placeholder for this dialect.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{}", n),
            Dialect::Postgres => format!("${}", n),
        }
    }
}

/// Scalar value crossing the adapter boundary.
///
/// Conversion to and from driver-native values happens only inside the
/// adapters; the reconcilers never see a driver type. JSON columns travel as
/// `Text` and are validated at the UI boundary, not here.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Render the value as a merge-key lookup string.
    ///
    /// Merge keys are textual in every registry table, but an integer key
    /// still maps to a stable string. Null and floating-point values do not
    /// identify a row.
    pub fn to_key(&self) -> Option<String> {
        match self {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Integer(i) => Some(i.to_string()),
            SqlValue::Null | SqlValue::Real(_) => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Integer(i)
    }
}

/// One row read from a store, values in the order the statement selected.
pub type Row = Vec<SqlValue>;

/// Minimal capability surface each side of the sync must expose.
///
/// The engine is agnostic to which concrete database backs an adapter; tests
/// run the full engine over two SQLite stores.
#[async_trait]
pub trait Store: Send + Sync {
    /// Placeholder dialect this store's statements must use.
    fn dialect(&self) -> Dialect;

    /// Run DDL or mutating DML. Returns the number of rows affected.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run a read statement, returning rows in statement column order.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;
}
