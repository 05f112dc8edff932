// Store Tests - Testing the key/value backends

use crate::storage::{KeyValueStore, MemoryStore, Settings, SqliteStore, StoreError};
use tempfile::TempDir;

fn exercise_basic_operations<S: KeyValueStore>(store: &mut S) {
    assert_eq!(store.get("missing").expect("get failed"), None);

    store.set("chat_messages_alice_bob", "one").expect("set failed");
    store.set("chat_messages_alice_eve", "two").expect("set failed");
    store.set("other_key", "three").expect("set failed");
    assert_eq!(store.get("chat_messages_alice_bob").expect("get failed").as_deref(), Some("one"));

    store.set("chat_messages_alice_bob", "uno").expect("overwrite failed");
    assert_eq!(store.get("chat_messages_alice_bob").expect("get failed").as_deref(), Some("uno"));

    let mut keys = store.keys_with_prefix("chat_messages_").expect("scan failed");
    keys.sort();
    assert_eq!(keys, vec!["chat_messages_alice_bob", "chat_messages_alice_eve"]);

    store.remove("chat_messages_alice_eve").expect("remove failed");
    store.remove("never_existed").expect("removing a missing key is fine");
    assert_eq!(store.get("chat_messages_alice_eve").expect("get failed"), None);
}

#[test]
fn test_memory_store_operations() {
    let mut store = MemoryStore::new();
    exercise_basic_operations(&mut store);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_sqlite_store_operations() {
    let mut store = SqliteStore::new_in_memory().expect("Failed to create store");
    exercise_basic_operations(&mut store);
    assert_eq!(store.len().expect("count failed"), 2);
}

#[test]
fn test_memory_store_quota() {
    let mut store = MemoryStore::with_quota(10);

    store.set("k", "123456789").expect("fits exactly");
    assert_eq!(store.used_bytes(), 10);
    assert_eq!(store.set("x", "1"), Err(StoreError::QuotaExceeded));

    // Replacing a value only counts the difference
    store.set("k", "12345678").expect("smaller replacement fits");
    store.remove("k").expect("remove failed");
    assert!(store.is_empty());
}

#[test]
fn test_sqlite_store_quota() {
    let mut store = SqliteStore::new_in_memory()
        .expect("Failed to create store")
        .with_quota(10);

    store.set("k", "123456789").expect("fits exactly");
    assert_eq!(store.set("x", "1"), Err(StoreError::QuotaExceeded));
    store.set("k", "abcdefghi").expect("same-size replacement fits");
    assert_eq!(store.get("k").expect("get failed").as_deref(), Some("abcdefghi"));
}

#[test]
fn test_sqlite_prefix_scan_treats_wildcards_literally() {
    let mut store = SqliteStore::new_in_memory().expect("Failed to create store");
    store.set("a%b_1", "v").expect("set failed");
    store.set("aXb_2", "v").expect("set failed");

    assert_eq!(store.keys_with_prefix("a%b").expect("scan failed"), vec!["a%b_1"]);
}

#[test]
fn test_sqlite_store_persists_across_reopen() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("cache.db");

    {
        let mut store = SqliteStore::new(&path).expect("Failed to create store");
        store.set("chat_messages_alice_bob", "{}").expect("set failed");
    }

    let store = SqliteStore::new(&path).expect("Failed to reopen store");
    assert_eq!(
        store.get("chat_messages_alice_bob").expect("get failed").as_deref(),
        Some("{}")
    );
}

#[test]
fn test_sqlite_store_quota_from_settings() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let settings = Settings {
        storage_quota_bytes: Some(10),
        ..Settings::default()
    };

    let mut bounded = SqliteStore::open_with_settings(dir.path().join("bounded.db"), &settings)
        .expect("Failed to create store");
    bounded.set("k", "123456789").expect("fits exactly");
    assert_eq!(bounded.set("x", "1"), Err(StoreError::QuotaExceeded));

    let mut unbounded =
        SqliteStore::open_with_settings(dir.path().join("unbounded.db"), &Settings::default())
            .expect("Failed to create store");
    unbounded.set("k", &"v".repeat(1024)).expect("no quota configured");
}
