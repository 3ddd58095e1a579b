// ABOUTME: End-to-end engine tests over two in-memory SQLite stores
// ABOUTME: Covers convergence, LWW, tombstone precedence, retention, idempotence

use std::sync::Arc;

use jotter_sync::engine::bootstrap;
use jotter_sync::engine::tombstones::RETENTION_MS;
use jotter_sync::{Outcome, SqlValue, SqliteStore, Store, SyncSession};

async fn session_pair() -> (Arc<SqliteStore>, Arc<SqliteStore>, SyncSession) {
    let local = Arc::new(SqliteStore::open_in_memory().unwrap());
    let remote = Arc::new(SqliteStore::open_in_memory().unwrap());
    bootstrap(local.as_ref()).await.unwrap();
    bootstrap(remote.as_ref()).await.unwrap();
    let session = SyncSession::with_remote_store(local.clone(), remote.clone());
    (local, remote, session)
}

async fn insert_note(store: &dyn Store, id: &str, title: &str, updated_at: i64) {
    store
        .execute(
            "INSERT INTO notes (id, title, content, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            &[
                id.into(),
                title.into(),
                "{\"blocks\":[]}".into(),
                SqlValue::Integer(updated_at),
                SqlValue::Integer(updated_at),
            ],
        )
        .await
        .unwrap();
}

async fn insert_journal_entry(store: &dyn Store, id: &str, date: &str, text: &str, ts: i64) {
    store
        .execute(
            "INSERT INTO journal_entries (id, date, reflection_text, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            &[
                id.into(),
                date.into(),
                text.into(),
                SqlValue::Integer(ts),
                SqlValue::Integer(ts),
            ],
        )
        .await
        .unwrap();
}

async fn insert_tombstone(store: &dyn Store, id: &str, table: &str, deleted_at: i64) {
    store
        .execute(
            "INSERT INTO sync_tombstones (id, table_name, deleted_at) VALUES (?1, ?2, ?3)",
            &[id.into(), table.into(), SqlValue::Integer(deleted_at)],
        )
        .await
        .unwrap();
}

async fn scalar_i64(store: &dyn Store, sql: &str, params: &[SqlValue]) -> Option<i64> {
    let rows = store.query(sql, params).await.unwrap();
    rows.first().map(|row| match row[0] {
        SqlValue::Integer(n) => n,
        _ => panic!("expected integer scalar"),
    })
}

async fn note_updated_at(store: &dyn Store, id: &str) -> Option<i64> {
    scalar_i64(
        store,
        "SELECT updated_at FROM notes WHERE id = ?1",
        &[id.into()],
    )
    .await
}

async fn tombstone_for(store: &dyn Store, id: &str) -> Option<i64> {
    scalar_i64(
        store,
        "SELECT deleted_at FROM sync_tombstones WHERE id = ?1",
        &[id.into()],
    )
    .await
}

#[tokio::test]
async fn test_missing_local_note_is_pushed() {
    let (local, remote, session) = session_pair().await;
    // An empty pair converges trivially before the note exists.
    assert_eq!(session.sync_now().await.outcome, Outcome::Complete);
    insert_note(local.as_ref(), "n1", "first note", 100).await;

    let summary = session.sync_now().await;

    assert_eq!(summary.outcome, Outcome::Complete);
    assert_eq!(summary.pushed, 1);
    assert_eq!(note_updated_at(remote.as_ref(), "n1").await, Some(100));
}

#[tokio::test]
async fn test_newer_remote_note_wins_locally() {
    let (local, remote, session) = session_pair().await;
    assert_eq!(session.sync_now().await.outcome, Outcome::Complete);
    insert_note(local.as_ref(), "n1", "old", 100).await;
    insert_note(remote.as_ref(), "n1", "new", 200).await;

    let summary = session.sync_now().await;

    assert_eq!(summary.pulled, 1);
    assert_eq!(summary.pushed, 0);
    assert_eq!(note_updated_at(local.as_ref(), "n1").await, Some(200));
}

#[tokio::test]
async fn test_pass_is_idempotent() {
    let (local, remote, session) = session_pair().await;
    insert_note(local.as_ref(), "a", "local", 10).await;
    insert_note(remote.as_ref(), "b", "remote", 20).await;
    insert_journal_entry(remote.as_ref(), "j1", "2026-08-29", "day", 30).await;

    let first = session.sync_now().await;
    assert_eq!(first.outcome, Outcome::Complete);
    assert!(first.pulled + first.pushed > 0);

    let second = session.sync_now().await;
    assert_eq!(second.outcome, Outcome::Complete);
    assert_eq!(second.pulled, 0);
    assert_eq!(second.pushed, 0);
    assert_eq!(second.deleted, 0);
}

#[tokio::test]
async fn test_convergence_on_shared_merge_keys() {
    let (local, remote, session) = session_pair().await;
    insert_note(local.as_ref(), "n1", "mine", 50).await;
    insert_note(remote.as_ref(), "n1", "theirs", 80).await;
    insert_note(local.as_ref(), "n2", "only local", 10).await;
    insert_note(remote.as_ref(), "n3", "only remote", 10).await;

    session.sync_now().await;

    for store in [local.as_ref() as &dyn Store, remote.as_ref() as &dyn Store] {
        assert_eq!(note_updated_at(store, "n1").await, Some(80));
        assert!(note_updated_at(store, "n2").await.is_some());
        assert!(note_updated_at(store, "n3").await.is_some());
    }
}

#[tokio::test]
async fn test_journal_entries_merge_by_date_not_id() {
    let (local, remote, session) = session_pair().await;
    // Both devices journaled the same day independently, with different ids.
    insert_journal_entry(local.as_ref(), "id-local", "2026-08-30", "local words", 100).await;
    insert_journal_entry(remote.as_ref(), "id-remote", "2026-08-30", "remote words", 200).await;

    session.sync_now().await;

    let count =
        scalar_i64(local.as_ref(), "SELECT COUNT(*) FROM journal_entries", &[]).await;
    assert_eq!(count, Some(1));
    let rows = local
        .query(
            "SELECT id, reflection_text FROM journal_entries WHERE date = ?1",
            &["2026-08-30".into()],
        )
        .await
        .unwrap();
    assert_eq!(rows[0][0], SqlValue::Text("id-remote".into()));
    assert_eq!(rows[0][1], SqlValue::Text("remote words".into()));
}

#[tokio::test]
async fn test_tombstone_deletes_older_row_everywhere() {
    let (local, remote, session) = session_pair().await;
    insert_tombstone(local.as_ref(), "n2", "notes", 500).await;
    insert_note(remote.as_ref(), "n2", "stale", 499).await;

    let summary = session.sync_now().await;

    assert_eq!(summary.deleted, 1);
    assert_eq!(note_updated_at(local.as_ref(), "n2").await, None);
    assert_eq!(note_updated_at(remote.as_ref(), "n2").await, None);
    assert_eq!(tombstone_for(local.as_ref(), "n2").await, Some(500));
    assert_eq!(tombstone_for(remote.as_ref(), "n2").await, Some(500));
}

#[tokio::test]
async fn test_later_update_survives_tombstone_and_resurrects() {
    let (local, remote, session) = session_pair().await;
    // Deleted locally at 500; the remote copy was edited at 600.
    insert_tombstone(local.as_ref(), "n2", "notes", 500).await;
    insert_note(remote.as_ref(), "n2", "still alive", 600).await;

    let summary = session.sync_now().await;

    assert_eq!(summary.outcome, Outcome::Complete);
    assert_eq!(summary.deleted, 0);
    // The note survives on both sides with the newer timestamp...
    assert_eq!(note_updated_at(local.as_ref(), "n2").await, Some(600));
    assert_eq!(note_updated_at(remote.as_ref(), "n2").await, Some(600));
    // ...and no tombstone for it remains anywhere.
    assert_eq!(tombstone_for(local.as_ref(), "n2").await, None);
    assert_eq!(tombstone_for(remote.as_ref(), "n2").await, None);
}

#[tokio::test]
async fn test_expired_tombstones_are_purged_by_any_pass() {
    let (local, remote, session) = session_pair().await;
    let now = chrono::Utc::now().timestamp_millis();
    insert_tombstone(local.as_ref(), "ancient", "notes", now - RETENTION_MS - 60_000).await;
    insert_tombstone(remote.as_ref(), "ancient2", "stickers", now - RETENTION_MS - 60_000).await;

    session.sync_now().await;

    assert_eq!(tombstone_for(local.as_ref(), "ancient").await, None);
    assert_eq!(tombstone_for(remote.as_ref(), "ancient2").await, None);
}

#[tokio::test]
async fn test_unconfigured_session_reports_disabled() {
    let local = Arc::new(SqliteStore::open_in_memory().unwrap());
    let session = SyncSession::new(local, None);

    let summary = session.sync_now().await;

    assert_eq!(summary.outcome, Outcome::Disabled);
    assert_eq!(summary.pulled + summary.pushed + summary.deleted, 0);
}

#[tokio::test]
async fn test_partial_failure_still_syncs_other_tables() {
    let (local, remote, session) = session_pair().await;
    assert_eq!(session.sync_now().await.outcome, Outcome::Complete);
    insert_note(local.as_ref(), "n1", "blocked", 10).await;
    local
        .execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)",
            &["theme".into(), "dark".into()],
        )
        .await
        .unwrap();
    remote.execute("DROP TABLE notes", &[]).await.unwrap();

    let summary = session.sync_now().await;

    assert_eq!(summary.outcome, Outcome::Partial);
    assert_eq!(summary.failed_tables, 1);
    let theme = scalar_i64(remote.as_ref(), "SELECT COUNT(*) FROM settings", &[]).await;
    assert_eq!(theme, Some(1));
}
