// ABOUTME: Parameterized SQL statement templates for both store dialects
// ABOUTME: Upsert/select/delete/DDL builders driven by the schema registry

use std::collections::HashMap;

use crate::registry::{ColumnType, TableSpec, TOMBSTONE_TABLE, UPDATED_AT};
use crate::store::Dialect;

/// Quote a SQL identifier by doubling embedded quotes.
///
/// Every identifier reaching this function comes from the static registry,
/// so this is defense in depth rather than an injection boundary.
pub fn quote_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('"');
    for ch in identifier.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// `SELECT <all registry columns> FROM <table>` - dialect-free, no parameters.
pub fn select_all(spec: &TableSpec) -> String {
    let cols: Vec<String> = spec.columns.iter().map(|c| quote_ident(c.name)).collect();
    format!("SELECT {} FROM {}", cols.join(", "), quote_ident(spec.name))
}

/// Probe for the current state of a single row by merge key.
///
/// For timestamped tables this selects `updated_at` so the tombstone override
/// check can compare against the deletion time; for the timestamp-less table
/// it selects the key itself (existence is all that matters).
pub fn select_row_probe(spec: &TableSpec, dialect: Dialect) -> String {
    let probe_col = if spec.has_timestamp {
        UPDATED_AT
    } else {
        spec.merge_key
    };
    format!(
        "SELECT {} FROM {} WHERE {} = {}",
        quote_ident(probe_col),
        quote_ident(spec.name),
        quote_ident(spec.merge_key),
        dialect.placeholder(1)
    )
}

/// `DELETE FROM <table> WHERE <mergeKey> = ?`
pub fn delete_row(spec: &TableSpec, dialect: Dialect) -> String {
    format!(
        "DELETE FROM {} WHERE {} = {}",
        quote_ident(spec.name),
        quote_ident(spec.merge_key),
        dialect.placeholder(1)
    )
}

fn upsert(spec: &TableSpec, dialect: Dialect, present: &[usize]) -> String {
    let names: Vec<&str> = present.iter().map(|&i| spec.columns[i].name).collect();
    let cols: Vec<String> = names.iter().map(|n| quote_ident(n)).collect();
    let placeholders: Vec<String> = (1..=present.len()).map(|n| dialect.placeholder(n)).collect();

    // The merge key never appears in the SET clause; assigning it to itself
    // is a no-op at best and rewrites the conflict target at worst.
    let assignments: Vec<String> = names
        .iter()
        .filter(|n| **n != spec.merge_key)
        .map(|n| format!("{} = excluded.{}", quote_ident(n), quote_ident(n)))
        .collect();

    let conflict_action = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        quote_ident(spec.name),
        cols.join(", "),
        placeholders.join(", "),
        quote_ident(spec.merge_key),
        conflict_action
    )
}

/// Per-pass cache of rendered upsert statements.
///
/// The column list of a table is static, but the "only non-null columns"
/// rule makes the template a function of the present-column subset; rows of
/// the same shape reuse the same rendered statement.
#[derive(Default)]
pub struct StatementCache {
    upserts: HashMap<(String, Dialect, Vec<usize>), String>,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered upsert for `spec` with the given present column indices.
    pub fn upsert(&mut self, spec: &TableSpec, dialect: Dialect, present: &[usize]) -> String {
        self.upserts
            .entry((spec.name.to_string(), dialect, present.to_vec()))
            .or_insert_with(|| upsert(spec, dialect, present))
            .clone()
    }
}

/// Idempotent DDL for one registry table.
///
/// The primary id stays the primary key even when the merge key is a natural
/// field; the natural merge key gets a UNIQUE constraint so upserts can
/// target it.
pub fn create_table(spec: &TableSpec, dialect: Dialect) -> String {
    let defs: Vec<String> = spec
        .columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote_ident(c.name), c.ty.ddl(dialect));
            if c.name == "id" || (c.name == spec.merge_key && spec.col_index("id").is_none()) {
                def.push_str(" PRIMARY KEY");
            } else if c.name == spec.merge_key {
                def.push_str(" UNIQUE");
            }
            def
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(spec.name),
        defs.join(", ")
    )
}

/// Idempotent DDL for the tombstone table.
pub fn create_tombstone_table(dialect: Dialect) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({} TEXT NOT NULL, {} TEXT NOT NULL, {} {} NOT NULL, \
         PRIMARY KEY ({}, {}))",
        quote_ident(TOMBSTONE_TABLE),
        quote_ident("id"),
        quote_ident("table_name"),
        quote_ident("deleted_at"),
        ColumnType::BigInt.ddl(dialect),
        quote_ident("id"),
        quote_ident("table_name")
    )
}

/// Columns added to the schema after the first shipped release.
///
/// Bootstrap probes each with `ALTER TABLE ADD COLUMN` and swallows only the
/// duplicate-column failure, so remotes created by older versions catch up.
pub const ADDITIVE_MIGRATIONS: &[(&str, &str, ColumnType)] = &[
    ("stickers", "note_id", ColumnType::Text),
    ("canvas_nodes", "data", ColumnType::Text),
    ("journal_entries", "mood", ColumnType::Text),
];

/// `ALTER TABLE <table> ADD COLUMN <column> <type>`
pub fn add_column(table: &str, column: &str, ty: ColumnType, dialect: Dialect) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table),
        quote_ident(column),
        ty.ddl(dialect)
    )
}

/// Tombstones for one table, oldest first.
pub fn select_tombstones(dialect: Dialect) -> String {
    format!(
        "SELECT {}, {} FROM {} WHERE {} = {} ORDER BY {}",
        quote_ident("id"),
        quote_ident("deleted_at"),
        quote_ident(TOMBSTONE_TABLE),
        quote_ident("table_name"),
        dialect.placeholder(1),
        quote_ident("deleted_at")
    )
}

/// Record (or refresh) a tombstone.
pub fn upsert_tombstone(dialect: Dialect) -> String {
    format!(
        "INSERT INTO {} ({}, {}, {}) VALUES ({}, {}, {}) \
         ON CONFLICT({}, {}) DO UPDATE SET {} = excluded.{}",
        quote_ident(TOMBSTONE_TABLE),
        quote_ident("id"),
        quote_ident("table_name"),
        quote_ident("deleted_at"),
        dialect.placeholder(1),
        dialect.placeholder(2),
        dialect.placeholder(3),
        quote_ident("id"),
        quote_ident("table_name"),
        quote_ident("deleted_at"),
        quote_ident("deleted_at")
    )
}

/// Drop a single tombstone by id.
pub fn delete_tombstone(dialect: Dialect) -> String {
    format!(
        "DELETE FROM {} WHERE {} = {} AND {} = {}",
        quote_ident(TOMBSTONE_TABLE),
        quote_ident("id"),
        dialect.placeholder(1),
        quote_ident("table_name"),
        dialect.placeholder(2)
    )
}

/// Drop every tombstone older than the retention cutoff.
pub fn sweep_tombstones(dialect: Dialect) -> String {
    format!(
        "DELETE FROM {} WHERE {} < {}",
        quote_ident(TOMBSTONE_TABLE),
        quote_ident("deleted_at"),
        dialect.placeholder(1)
    )
}

/// Tombstoned ids for one table (used to block re-pulling deleted rows).
pub fn select_tombstoned_ids(dialect: Dialect) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = {}",
        quote_ident("id"),
        quote_ident(TOMBSTONE_TABLE),
        quote_ident("table_name"),
        dialect.placeholder(1)
    )
}
