//! Store tests covering claim semantics, expiry, and both backends.

use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use super::{MemoryStateStore, SqliteStateStore, StateStore};

#[tokio::test]
async fn memory_claim_is_first_writer_wins() {
    let store = MemoryStateStore::new();
    assert!(store.try_claim("msteams/conv-1/ex-1", "ex-1").await.unwrap());
    assert!(!store.try_claim("msteams/conv-1/ex-1", "ex-1").await.unwrap());
    // A different key is unaffected.
    assert!(store.try_claim("msteams/conv-1/ex-2", "ex-2").await.unwrap());
}

#[tokio::test]
async fn memory_expired_claim_can_be_retaken() {
    let store = MemoryStateStore::with_claim_ttl_ms(-1);
    assert!(store.try_claim("key", "a").await.unwrap());
    assert!(store.try_claim("key", "b").await.unwrap());
}

#[tokio::test]
async fn memory_concurrent_claims_admit_exactly_one() {
    let store = Arc::new(MemoryStateStore::new());
    let mut tasks = Vec::new();
    for index in 0..16 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store
                .try_claim("msteams/conv-1/ex-9", &format!("client-{index}"))
                .await
                .unwrap()
        }));
    }
    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn memory_session_values_round_trip() {
    let store = MemoryStateStore::new();
    let record = json!({ "step": "dedup", "options": { "command": "new ticket" } });
    store.put("dialog/msteams/conv-1", record.clone()).await.unwrap();
    assert_eq!(store.get("dialog/msteams/conv-1").await.unwrap(), Some(record));
    store.delete("dialog/msteams/conv-1").await.unwrap();
    assert_eq!(store.get("dialog/msteams/conv-1").await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_claim_is_first_writer_wins() {
    let temp = tempdir().expect("tempdir");
    let store = SqliteStateStore::open(&temp.path().join("state.sqlite")).expect("open");
    assert!(store.try_claim("msteams/conv-1/ex-1", "ex-1").await.unwrap());
    assert!(!store.try_claim("msteams/conv-1/ex-1", "ex-1").await.unwrap());
    assert!(store.try_claim("msteams/conv-2/ex-1", "ex-1").await.unwrap());
}

#[tokio::test]
async fn sqlite_expired_claim_can_be_retaken() {
    let temp = tempdir().expect("tempdir");
    let store =
        SqliteStateStore::open_with_claim_ttl_ms(&temp.path().join("state.sqlite"), -1)
            .expect("open");
    assert!(store.try_claim("key", "a").await.unwrap());
    assert!(store.try_claim("key", "b").await.unwrap());
}

#[tokio::test]
async fn sqlite_values_survive_reopen() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("state.sqlite");
    let record = json!({ "step": "prompt" });
    {
        let store = SqliteStateStore::open(&path).expect("open");
        store.put("dialog/msteams/conv-1", record.clone()).await.unwrap();
    }
    let reopened = SqliteStateStore::open(&path).expect("reopen");
    assert_eq!(
        reopened.get("dialog/msteams/conv-1").await.unwrap(),
        Some(record)
    );
}

#[tokio::test]
async fn sqlite_put_overwrites_existing_value() {
    let temp = tempdir().expect("tempdir");
    let store = SqliteStateStore::open(&temp.path().join("state.sqlite")).expect("open");
    store.put("key", json!({ "step": "prompt" })).await.unwrap();
    store.put("key", json!({ "step": "dedup" })).await.unwrap();
    assert_eq!(
        store.get("key").await.unwrap(),
        Some(json!({ "step": "dedup" }))
    );
}
