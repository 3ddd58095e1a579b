// ABOUTME: jotter-sync library - local-first SQLite <-> PostgreSQL replication
// ABOUTME: Schema registry, store adapters, reconcilers, and session manager

pub mod engine;
pub mod registry;
pub mod store;

pub use engine::{ConnectionState, Outcome, SyncSession, SyncSummary, DEFAULT_SYNC_INTERVAL};
pub use store::{Dialect, PostgresStore, SqlValue, SqliteStore, Store};
