// ABOUTME: Static schema registry for all synchronized tables
// ABOUTME: Pure data - table names, ordered columns, merge keys, timestamp flags

/// Storage class of a synchronized column.
///
/// Both stores agree on these three classes; JSON payloads (note content,
/// canvas node data) travel as `Text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    BigInt,
    Real,
}

impl ColumnType {
    /// SQL type name for the given dialect's DDL.
    pub fn ddl(&self, dialect: crate::store::Dialect) -> &'static str {
        use crate::store::Dialect;
        match (*self, dialect) {
            (ColumnType::Text, _) => "TEXT",
            (ColumnType::BigInt, Dialect::Sqlite) => "INTEGER",
            (ColumnType::BigInt, Dialect::Postgres) => "BIGINT",
            (ColumnType::Real, Dialect::Sqlite) => "REAL",
            (ColumnType::Real, Dialect::Postgres) => "DOUBLE PRECISION",
        }
    }
}

/// One column of a synchronized table.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty }
}

/// Descriptor for a synchronized table.
///
/// Adding a table to the engine requires only a new entry in [`registry`];
/// the reconcilers are driven entirely by this data.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// Column used to match rows across the two stores. The primary id for
    /// every table except `journal_entries`, whose ids are not stable across
    /// devices (each side may insert the same day independently) - there the
    /// unique `date` is the merge key.
    pub merge_key: &'static str,
    /// Whether the table carries `updated_at` (epoch milliseconds) and
    /// therefore supports last-write-wins. `settings` does not; it is merged
    /// by absence only.
    pub has_timestamp: bool,
}

impl TableSpec {
    /// Index of a column in this table's ordered column list.
    pub fn col_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Index of the merge key column.
    pub fn merge_key_index(&self) -> usize {
        // The registry is static; a spec whose merge key is not one of its
        // columns cannot be constructed without failing the registry tests.
        self.col_index(self.merge_key).unwrap_or(0)
    }

    /// Merge key value of a row read in registry column order, as a lookup
    /// string. `None` if the key column is null (the row is unmatchable and
    /// gets skipped with a warning by the reconcilers).
    pub fn key_of(&self, row: &[crate::store::SqlValue]) -> Option<String> {
        row.get(self.merge_key_index()).and_then(|v| v.to_key())
    }

    /// `updated_at` of a row read in registry column order, if this table
    /// carries one and the value is non-null.
    pub fn updated_at_of(&self, row: &[crate::store::SqlValue]) -> Option<i64> {
        if !self.has_timestamp {
            return None;
        }
        let idx = self.col_index(UPDATED_AT)?;
        match row.get(idx)? {
            crate::store::SqlValue::Integer(ms) => Some(*ms),
            _ => None,
        }
    }
}

/// Name of the last-write-wins governing column.
pub const UPDATED_AT: &str = "updated_at";

/// Name of the tombstone table, present on both sides.
pub const TOMBSTONE_TABLE: &str = "sync_tombstones";

const NOTES: &[Column] = &[
    col("id", ColumnType::Text),
    col("title", ColumnType::Text),
    col("content", ColumnType::Text),
    col("created_at", ColumnType::BigInt),
    col("updated_at", ColumnType::BigInt),
];

const STICKERS: &[Column] = &[
    col("id", ColumnType::Text),
    col("note_id", ColumnType::Text),
    col("content", ColumnType::Text),
    col("color", ColumnType::Text),
    col("position_x", ColumnType::Real),
    col("position_y", ColumnType::Real),
    col("created_at", ColumnType::BigInt),
    col("updated_at", ColumnType::BigInt),
];

const CANVAS_NODES: &[Column] = &[
    col("id", ColumnType::Text),
    col("label", ColumnType::Text),
    col("kind", ColumnType::Text),
    col("position_x", ColumnType::Real),
    col("position_y", ColumnType::Real),
    col("data", ColumnType::Text),
    col("created_at", ColumnType::BigInt),
    col("updated_at", ColumnType::BigInt),
];

const CANVAS_EDGES: &[Column] = &[
    col("id", ColumnType::Text),
    col("source_id", ColumnType::Text),
    col("target_id", ColumnType::Text),
    col("label", ColumnType::Text),
    col("created_at", ColumnType::BigInt),
    col("updated_at", ColumnType::BigInt),
];

const JOURNAL_ENTRIES: &[Column] = &[
    col("id", ColumnType::Text),
    col("date", ColumnType::Text),
    col("reflection_text", ColumnType::Text),
    col("mood", ColumnType::Text),
    col("created_at", ColumnType::BigInt),
    col("updated_at", ColumnType::BigInt),
];

const SETTINGS: &[Column] = &[
    col("key", ColumnType::Text),
    col("value", ColumnType::Text),
];

const TABLES: &[TableSpec] = &[
    TableSpec {
        name: "notes",
        columns: NOTES,
        merge_key: "id",
        has_timestamp: true,
    },
    TableSpec {
        name: "stickers",
        columns: STICKERS,
        merge_key: "id",
        has_timestamp: true,
    },
    TableSpec {
        name: "canvas_nodes",
        columns: CANVAS_NODES,
        merge_key: "id",
        has_timestamp: true,
    },
    TableSpec {
        name: "canvas_edges",
        columns: CANVAS_EDGES,
        merge_key: "id",
        has_timestamp: true,
    },
    TableSpec {
        name: "journal_entries",
        columns: JOURNAL_ENTRIES,
        merge_key: "date",
        has_timestamp: true,
    },
    TableSpec {
        name: "settings",
        columns: SETTINGS,
        merge_key: "key",
        has_timestamp: false,
    },
];

/// The fixed, ordered list of synchronized tables.
///
/// Sync passes iterate this order; per-table failure attribution in the
/// summary relies on it being stable.
pub fn registry() -> &'static [TableSpec] {
    TABLES
}

/// Look up a table descriptor by name.
pub fn table_spec(name: &str) -> Option<&'static TableSpec> {
    TABLES.iter().find(|t| t.name == name)
}
