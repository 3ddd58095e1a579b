// ABOUTME: Row reconciler - bidirectional diff-and-upsert for one table
// ABOUTME: Last-write-wins by updated_at; absence-only for the settings table

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};

use super::statements::{self, StatementCache};
use crate::registry::TableSpec;
use crate::store::{Row, SqlValue, Store};

/// Rows copied during one table's reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    /// Rows upserted into the local store.
    pub pulled: u64,
    /// Rows upserted into the remote store.
    pub pushed: u64,
}

/// Make one table's rows identical across both stores, subject to
/// last-write-wins.
///
/// Never deletes a row (that is the tombstone reconciler's job) and never
/// patches a row field-by-field: the source row replaces the target row
/// atomically, writing only its non-null columns.
///
/// Idempotent: a second run with no intervening writes performs zero upserts,
/// because ties are skipped in both directions.
pub async fn reconcile_table(
    local: &dyn Store,
    remote: &dyn Store,
    spec: &TableSpec,
    cache: &mut StatementCache,
) -> Result<RowCounts> {
    // Locally-deleted ids must not be pulled back in; the tombstone
    // reconciler ran first and already arbitrated deletion vs. update.
    let tombstoned = local
        .query(
            &statements::select_tombstoned_ids(local.dialect()),
            &[spec.name.into()],
        )
        .await
        .context("Failed to load local tombstone ids")?
        .into_iter()
        .filter_map(|row| row.first().and_then(SqlValue::to_key))
        .collect::<HashSet<String>>();

    let remote_rows = fetch_all(remote, spec)
        .await
        .with_context(|| format!("Failed to fetch remote rows for '{}'", spec.name))?;
    let local_rows = fetch_all(local, spec)
        .await
        .with_context(|| format!("Failed to fetch local rows for '{}'", spec.name))?;

    let mut counts = RowCounts::default();

    // Pull phase: remote rows missing locally or strictly newer.
    for (key, remote_row) in &remote_rows {
        if tombstoned.contains(key) {
            tracing::debug!("Skipping pull of tombstoned {}/{}", spec.name, key);
            continue;
        }
        if should_copy(spec, remote_row, local_rows.get(key)) {
            upsert_row(local, spec, cache, remote_row)
                .await
                .with_context(|| format!("Failed to pull {}/{}", spec.name, key))?;
            counts.pulled += 1;
        }
    }

    // Push phase: local rows missing remotely or strictly newer.
    for (key, local_row) in &local_rows {
        if should_copy(spec, local_row, remote_rows.get(key)) {
            upsert_row(remote, spec, cache, local_row)
                .await
                .with_context(|| format!("Failed to push {}/{}", spec.name, key))?;
            counts.pushed += 1;
        }
    }

    if counts.pulled > 0 || counts.pushed > 0 {
        tracing::info!(
            "Reconciled '{}': {} pulled, {} pushed",
            spec.name,
            counts.pulled,
            counts.pushed
        );
    } else {
        tracing::debug!("Table '{}' already converged", spec.name);
    }

    Ok(counts)
}

/// Fetch all rows of a table, indexed by merge key.
async fn fetch_all(store: &dyn Store, spec: &TableSpec) -> Result<HashMap<String, Row>> {
    let rows = store.query(&statements::select_all(spec), &[]).await?;
    let mut by_key = HashMap::with_capacity(rows.len());
    for row in rows {
        match spec.key_of(&row) {
            Some(key) => {
                by_key.insert(key, row);
            }
            None => {
                tracing::warn!("Row in '{}' has a null merge key; skipping", spec.name);
            }
        }
    }
    Ok(by_key)
}

/// Whether `src` should replace `dst` on the other side.
///
/// Missing rows always copy. Present rows copy only when both carry a
/// timestamp and the source's strictly exceeds the destination's; ties stay
/// put, and the timestamp-less table never overwrites an existing row.
fn should_copy(spec: &TableSpec, src: &Row, dst: Option<&Row>) -> bool {
    let Some(dst) = dst else {
        return true;
    };
    if !spec.has_timestamp {
        return false;
    }
    match (spec.updated_at_of(src), spec.updated_at_of(dst)) {
        (Some(src_ms), Some(dst_ms)) => src_ms > dst_ms,
        // A row missing its timestamp cannot be ordered; leave the
        // destination alone rather than guess.
        _ => false,
    }
}

/// Upsert `row` into `dst`, writing only its non-null columns.
///
/// Writing the full column list would clobber destination values with nulls
/// whenever one side's schema lags behind an additive migration.
async fn upsert_row(
    dst: &dyn Store,
    spec: &TableSpec,
    cache: &mut StatementCache,
    row: &Row,
) -> Result<()> {
    let present: Vec<usize> = row
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_null())
        .map(|(i, _)| i)
        .collect();
    let sql = cache.upsert(spec, dst.dialect(), &present);
    let params: Vec<SqlValue> = present.iter().map(|&i| row[i].clone()).collect();
    dst.execute(&sql, &params).await?;
    Ok(())
}
