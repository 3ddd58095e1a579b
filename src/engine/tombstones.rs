// ABOUTME: Tombstone reconciler - propagates deletions in both directions
// ABOUTME: A tombstone never wins against a causally later update

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;

use super::statements;
use crate::registry::TableSpec;
use crate::store::{SqlValue, Store};

/// Tombstones older than this are purged from both sides after every pass.
/// Any legitimately delayed device has had ample opportunity to observe them.
pub const RETENTION_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Propagate deletions for one table in both directions.
///
/// Runs before the row reconciler for the same table, so the override check
/// below always reads the row state the tombstone is actually contesting.
/// Returns the number of live rows deleted.
pub async fn reconcile_table(
    local: &dyn Store,
    remote: &dyn Store,
    spec: &TableSpec,
) -> Result<u64> {
    let local_ts = fetch_tombstones(local, spec)
        .await
        .context("Failed to fetch local tombstones")?;
    let remote_ts = fetch_tombstones(remote, spec)
        .await
        .context("Failed to fetch remote tombstones")?;

    let mut deleted = 0u64;

    // Pull phase: remote tombstones missing locally or locally older.
    for (id, &deleted_at) in &remote_ts {
        if local_ts.get(id).map_or(true, |&l| l < deleted_at) {
            deleted += apply_tombstone(remote, local, spec, id, deleted_at)
                .await
                .with_context(|| format!("Failed to pull tombstone {}/{}", spec.name, id))?;
        }
    }

    // Push phase: symmetric.
    for (id, &deleted_at) in &local_ts {
        if remote_ts.get(id).map_or(true, |&r| r < deleted_at) {
            deleted += apply_tombstone(local, remote, spec, id, deleted_at)
                .await
                .with_context(|| format!("Failed to push tombstone {}/{}", spec.name, id))?;
        }
    }

    Ok(deleted)
}

/// Purge tombstones older than the retention window from both sides.
pub async fn sweep_expired(local: &dyn Store, remote: &dyn Store) -> Result<u64> {
    let cutoff = SqlValue::Integer(Utc::now().timestamp_millis() - RETENTION_MS);
    let swept_local = local
        .execute(
            &statements::sweep_tombstones(local.dialect()),
            std::slice::from_ref(&cutoff),
        )
        .await
        .context("Failed to sweep local tombstones")?;
    let swept_remote = remote
        .execute(
            &statements::sweep_tombstones(remote.dialect()),
            std::slice::from_ref(&cutoff),
        )
        .await
        .context("Failed to sweep remote tombstones")?;
    if swept_local + swept_remote > 0 {
        tracing::debug!(
            "Swept {} expired tombstones ({} local, {} remote)",
            swept_local + swept_remote,
            swept_local,
            swept_remote
        );
    }
    Ok(swept_local + swept_remote)
}

/// Tombstones for one table, indexed by id.
async fn fetch_tombstones(store: &dyn Store, spec: &TableSpec) -> Result<HashMap<String, i64>> {
    let rows = store
        .query(
            &statements::select_tombstones(store.dialect()),
            &[spec.name.into()],
        )
        .await?;
    let mut by_id = HashMap::with_capacity(rows.len());
    for row in rows {
        if let (Some(id), Some(SqlValue::Integer(deleted_at))) =
            (row.first().and_then(SqlValue::to_key), row.get(1))
        {
            by_id.insert(id, *deleted_at);
        }
    }
    Ok(by_id)
}

/// Carry one tombstone from `origin` to `target`.
///
/// The contested row is re-read from `target` *now*, not taken from any
/// earlier snapshot - it may have been rewritten seconds ago. If the row
/// postdates the deletion, the tombstone is withdrawn from both sides and
/// the row survives; the row reconciler then resurrects it on the origin
/// side through its ordinary push/pull. Otherwise the tombstone is recorded
/// on `target` and the row removed.
async fn apply_tombstone(
    origin: &dyn Store,
    target: &dyn Store,
    spec: &TableSpec,
    id: &str,
    deleted_at: i64,
) -> Result<u64> {
    let probe = target
        .query(
            &statements::select_row_probe(spec, target.dialect()),
            &[id.into()],
        )
        .await
        .context("Failed to probe contested row")?;

    let row_overrides = match probe.first() {
        None => false,
        Some(row) => {
            if spec.has_timestamp {
                // A live row strictly newer than the deletion wins; an
                // unreadable timestamp cannot be ordered and loses.
                matches!(row.first(), Some(SqlValue::Integer(updated_at)) if *updated_at > deleted_at)
            } else {
                // No timestamp to compare: presence implies a more recent
                // action on this side.
                true
            }
        }
    };

    if row_overrides {
        tracing::info!(
            "Tombstone for {}/{} (deleted_at={}) overridden by a later update; withdrawing",
            spec.name,
            id,
            deleted_at
        );
        let params = [SqlValue::from(id), SqlValue::from(spec.name)];
        origin
            .execute(&statements::delete_tombstone(origin.dialect()), &params)
            .await
            .context("Failed to withdraw tombstone from origin")?;
        target
            .execute(&statements::delete_tombstone(target.dialect()), &params)
            .await
            .context("Failed to withdraw tombstone from target")?;
        return Ok(0);
    }

    target
        .execute(
            &statements::upsert_tombstone(target.dialect()),
            &[
                id.into(),
                spec.name.into(),
                SqlValue::Integer(deleted_at),
            ],
        )
        .await
        .context("Failed to record tombstone")?;
    let removed = target
        .execute(
            &statements::delete_row(spec, target.dialect()),
            &[id.into()],
        )
        .await
        .context("Failed to delete tombstoned row")?;

    if removed > 0 {
        tracing::info!(
            "Applied tombstone for {}/{} (deleted_at={})",
            spec.name,
            id,
            deleted_at
        );
    }
    Ok(removed)
}
