// ABOUTME: Sync orchestrator - drives one full pass over the schema registry
// ABOUTME: Tombstones before rows per table, per-table failure isolation

use std::time::Instant;

use serde::Serialize;

use super::{rows, statements::StatementCache, tombstones};
use crate::registry;
use crate::store::Store;

/// Overall result of a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// No remote store configured; sync is a no-op feature.
    Disabled,
    /// Another pass was already running; this one was rejected, not queued.
    Busy,
    /// Every table reconciled.
    Complete,
    /// Some tables reconciled, some failed.
    Partial,
    /// Nothing useful happened (connection failure, or every table failed).
    Failed,
}

/// User-facing summary of one sync pass.
///
/// This is the entire contract the presentation layer consumes: it renders
/// the counts as a notification and the errors as a detail view.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub outcome: Outcome,
    /// Rows upserted into the local store.
    pub pulled: u64,
    /// Rows upserted into the remote store.
    pub pushed: u64,
    /// Rows removed by tombstone propagation (both sides).
    pub deleted: u64,
    pub failed_tables: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl SyncSummary {
    pub fn disabled() -> Self {
        Self::empty(Outcome::Disabled)
    }

    pub fn busy() -> Self {
        Self::empty(Outcome::Busy)
    }

    pub fn failed(error: &anyhow::Error) -> Self {
        let mut summary = Self::empty(Outcome::Failed);
        summary.errors.push(format!("{:#}", error));
        summary
    }

    fn empty(outcome: Outcome) -> Self {
        Self {
            outcome,
            pulled: 0,
            pushed: 0,
            deleted: 0,
            failed_tables: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Complete)
    }
}

/// Run one full synchronization pass.
///
/// Iterates the registry in its fixed order; for each table the tombstone
/// reconciler runs strictly before the row reconciler so deletion-vs-update
/// arbitration always sees current row state. A failing table is counted and
/// logged but never aborts the remaining tables, and there is no table-level
/// transaction: a partially-applied table simply finishes converging on the
/// next pass.
pub async fn run_pass(local: &dyn Store, remote: &dyn Store) -> SyncSummary {
    let start = Instant::now();
    let mut summary = SyncSummary::empty(Outcome::Complete);
    let mut cache = StatementCache::new();
    let table_count = registry::registry().len();

    for spec in registry::registry() {
        let result = async {
            let deleted = tombstones::reconcile_table(local, remote, spec).await?;
            let counts = rows::reconcile_table(local, remote, spec, &mut cache).await?;
            anyhow::Ok((deleted, counts))
        }
        .await;

        match result {
            Ok((deleted, counts)) => {
                summary.deleted += deleted;
                summary.pulled += counts.pulled;
                summary.pushed += counts.pushed;
            }
            Err(e) => {
                tracing::error!("Failed to reconcile table '{}': {:?}", spec.name, e);
                summary.failed_tables += 1;
                summary.errors.push(format!("{}: {:#}", spec.name, e));
            }
        }
    }

    // Retention runs even after table failures; expired tombstones are dead
    // weight on both sides regardless.
    if let Err(e) = tombstones::sweep_expired(local, remote).await {
        tracing::error!("Tombstone retention sweep failed: {:?}", e);
        summary.errors.push(format!("retention sweep: {:#}", e));
    }

    summary.outcome = if summary.errors.is_empty() {
        Outcome::Complete
    } else if summary.failed_tables >= table_count {
        Outcome::Failed
    } else {
        Outcome::Partial
    };
    summary.duration_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "Sync pass finished: {:?} ({} pulled, {} pushed, {} deleted, {} failed tables) in {}ms",
        summary.outcome,
        summary.pulled,
        summary.pushed,
        summary.deleted,
        summary.failed_tables,
        summary.duration_ms
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::{
        count_rows, insert_journal_entry, insert_note, insert_setting, insert_tombstone,
        note_updated_at, synced_pair, tombstone_for,
    };

    #[tokio::test]
    async fn test_full_pass_aggregates_counts() {
        let (local, remote) = synced_pair().await;
        insert_note(&local, "n1", "local only", 100).await;
        insert_note(&remote, "n2", "remote only", 100).await;
        insert_journal_entry(&remote, "j1", "2026-08-30", "journal", 300).await;
        insert_setting(&local, "theme", "dark").await;

        let summary = run_pass(&local, &remote).await;

        assert_eq!(summary.outcome, Outcome::Complete);
        assert_eq!(summary.pulled, 2); // n2 + j1
        assert_eq!(summary.pushed, 2); // n1 + theme
        assert_eq!(summary.deleted, 0);
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn test_table_failure_is_isolated() {
        let (local, remote) = synced_pair().await;
        insert_note(&local, "n1", "cannot sync", 100).await;
        insert_setting(&local, "theme", "dark").await;
        remote.execute("DROP TABLE notes", &[]).await.unwrap();

        let summary = run_pass(&local, &remote).await;

        assert_eq!(summary.outcome, Outcome::Partial);
        assert_eq!(summary.failed_tables, 1);
        assert!(summary.errors[0].starts_with("notes:"));
        // The settings table still synced despite the notes failure.
        assert_eq!(count_rows(&remote, "settings").await, 1);
    }

    #[tokio::test]
    async fn test_every_table_failing_reports_failed() {
        let (local, remote) = synced_pair().await;
        for spec in crate::registry::registry() {
            remote
                .execute(&format!("DROP TABLE {}", spec.name), &[])
                .await
                .unwrap();
        }

        let summary = run_pass(&local, &remote).await;

        assert_eq!(summary.outcome, Outcome::Failed);
        assert_eq!(summary.failed_tables, crate::registry::registry().len());
    }

    #[tokio::test]
    async fn test_tombstones_run_before_rows() {
        let (local, remote) = synced_pair().await;
        // Deleted locally at 500; edited on the remote at 600. The tombstone
        // phase must withdraw the marker before the row phase, so the pull
        // can resurrect the note locally in the same pass.
        insert_tombstone(&local, "n2", "notes", 500).await;
        insert_note(&remote, "n2", "survivor", 600).await;

        let summary = run_pass(&local, &remote).await;

        assert_eq!(summary.outcome, Outcome::Complete);
        assert_eq!(note_updated_at(&local, "n2").await, Some(600));
        assert_eq!(note_updated_at(&remote, "n2").await, Some(600));
        assert_eq!(tombstone_for(&local, "n2").await, None);
        assert_eq!(tombstone_for(&remote, "n2").await, None);
    }

    #[tokio::test]
    async fn test_summary_serializes_for_the_ui() {
        let summary = SyncSummary::disabled();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["outcome"], "disabled");
        assert_eq!(json["pulled"], 0);
    }

    #[test]
    fn test_failed_summary_carries_error_text() {
        let err = anyhow::anyhow!("connection refused");
        let summary = SyncSummary::failed(&err);
        assert_eq!(summary.outcome, Outcome::Failed);
        assert!(summary.errors[0].contains("connection refused"));
        assert!(!summary.is_success());
    }
}
