// ABOUTME: Replication engine - reconcilers, orchestrator, and session manager
// ABOUTME: Everything here is driven by the schema registry and the Store trait

pub mod orchestrator;
pub mod rows;
pub mod session;
pub mod statements;
pub mod tombstones;

#[cfg(test)]
pub(crate) mod testutil;

pub use orchestrator::{run_pass, Outcome, SyncSummary};
pub use session::{bootstrap, ConnectionState, SyncSession, DEFAULT_SYNC_INTERVAL};
