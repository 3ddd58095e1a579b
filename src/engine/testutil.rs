// ABOUTME: Shared fixtures for engine tests
// ABOUTME: Bootstrapped in-memory store pairs and row/tombstone helpers

use super::session::bootstrap;
use crate::store::{SqlValue, SqliteStore, Store};

/// Two bootstrapped in-memory stores standing in for local and remote.
pub async fn synced_pair() -> (SqliteStore, SqliteStore) {
    let local = SqliteStore::open_in_memory().unwrap();
    let remote = SqliteStore::open_in_memory().unwrap();
    bootstrap(&local).await.unwrap();
    bootstrap(&remote).await.unwrap();
    (local, remote)
}

pub async fn insert_note(store: &dyn Store, id: &str, title: &str, updated_at: i64) {
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

pub async fn insert_journal_entry(
    store: &dyn Store,
    id: &str,
    date: &str,
    text: &str,
    updated_at: i64,
) {
    store
        .execute(
            "INSERT INTO journal_entries (id, date, reflection_text, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            &[
                id.into(),
                date.into(),
                text.into(),
                SqlValue::Integer(updated_at),
                SqlValue::Integer(updated_at),
            ],
        )
        .await
        .unwrap();
}

pub async fn insert_setting(store: &dyn Store, key: &str, value: &str) {
    store
        .execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)",
            &[key.into(), value.into()],
        )
        .await
        .unwrap();
}

pub async fn insert_tombstone(store: &dyn Store, id: &str, table: &str, deleted_at: i64) {
    store
        .execute(
            "INSERT INTO sync_tombstones (id, table_name, deleted_at) VALUES (?1, ?2, ?3)",
            &[id.into(), table.into(), SqlValue::Integer(deleted_at)],
        )
        .await
        .unwrap();
}

pub async fn count_rows(store: &dyn Store, table: &str) -> i64 {
    let rows = store
        .query(&format!("SELECT COUNT(*) FROM {}", table), &[])
        .await
        .unwrap();
    match rows[0][0] {
        SqlValue::Integer(n) => n,
        _ => panic!("COUNT(*) did not return an integer"),
    }
}

pub async fn note_updated_at(store: &dyn Store, id: &str) -> Option<i64> {
    let rows = store
        .query("SELECT updated_at FROM notes WHERE id = ?1", &[id.into()])
        .await
        .unwrap();
    rows.first().map(|row| match row[0] {
        SqlValue::Integer(ms) => ms,
        _ => panic!("updated_at was not an integer"),
    })
}

pub async fn note_title(store: &dyn Store, id: &str) -> Option<String> {
    let rows = store
        .query("SELECT title FROM notes WHERE id = ?1", &[id.into()])
        .await
        .unwrap();
    rows.first().map(|row| match &row[0] {
        SqlValue::Text(s) => s.clone(),
        other => panic!("title was not text: {:?}", other),
    })
}

pub async fn tombstone_for(store: &dyn Store, id: &str) -> Option<i64> {
    let rows = store
        .query(
            "SELECT deleted_at FROM sync_tombstones WHERE id = ?1",
            &[id.into()],
        )
        .await
        .unwrap();
    rows.first().map(|row| match row[0] {
        SqlValue::Integer(ms) => ms,
        _ => panic!("deleted_at was not an integer"),
    })
}
