// Cache Tests - Testing ConversationCache expiry, append and quota handling

use crate::clock::ManualClock;
use crate::storage::{
    CacheWrite, ConversationCache, KeyValueStore, MemoryStore, MessageRecord, Settings, SqliteStore,
};
use chrono::{Duration, TimeZone, Utc};

fn start_clock() -> ManualClock {
    let start = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).single();
    ManualClock::new(start.expect("valid date"))
}

fn record(id: &str, minute: u32) -> MessageRecord {
    let timestamp = format!("2026-10-19T10:{:02}:00Z", minute);
    MessageRecord::new(id, "alice", "bob", timestamp).with_content("hello")
}

fn cache_with(
    store: MemoryStore,
    clock: &ManualClock,
) -> ConversationCache<MemoryStore, ManualClock> {
    ConversationCache::with_clock(store, clock.clone(), "alice")
}

#[test]
fn test_key_is_namespaced_by_both_users() {
    let clock = start_clock();
    let cache = cache_with(MemoryStore::new(), &clock);
    assert_eq!(cache.key_for("bob"), "chat_messages_alice_bob");
}

#[test]
fn test_get_missing_is_none() {
    let clock = start_clock();
    let mut cache = cache_with(MemoryStore::new(), &clock);
    assert_eq!(cache.get("bob").expect("get failed"), None);
}

#[test]
fn test_put_then_get_within_window() {
    let clock = start_clock();
    let mut cache = cache_with(MemoryStore::new(), &clock);
    let messages = vec![record("1", 0), record("2", 5)];

    assert_eq!(cache.put("bob", &messages).expect("put failed"), CacheWrite::Stored);

    clock.advance(Duration::hours(23) + Duration::minutes(59));
    assert_eq!(cache.get("bob").expect("get failed"), Some(messages));
}

#[test]
fn test_entry_expires_after_window() {
    let clock = start_clock();
    let mut cache = cache_with(MemoryStore::new(), &clock);
    cache.put("bob", &[record("1", 0)]).expect("put failed");

    clock.advance(Duration::hours(24));

    assert_eq!(cache.get("bob").expect("get failed"), None);
    assert!(cache.store().is_empty(), "expired entry should be removed on read");
}

#[test]
fn test_put_refreshes_last_write() {
    let clock = start_clock();
    let mut cache = cache_with(MemoryStore::new(), &clock);
    cache.put("bob", &[record("1", 0)]).expect("put failed");

    clock.advance(Duration::hours(20));
    cache.put("bob", &[record("1", 0), record("2", 5)]).expect("put failed");
    clock.advance(Duration::hours(20));

    assert_eq!(cache.get("bob").expect("get failed").map(|m| m.len()), Some(2));
}

#[test]
fn test_settings_control_ttl_and_prefix() {
    let clock = start_clock();
    let settings = Settings {
        cache_ttl_hours: 1,
        cache_key_prefix: "history_".to_string(),
        ..Settings::default()
    };
    let mut cache = cache_with(MemoryStore::new(), &clock).with_settings(&settings);

    assert_eq!(cache.key_for("bob"), "history_alice_bob");
    cache.put("bob", &[record("1", 0)]).expect("put failed");
    clock.advance(Duration::minutes(61));
    assert_eq!(cache.get("bob").expect("get failed"), None);
}

#[test]
fn test_local_users_do_not_collide() {
    let clock = start_clock();
    let mut alice = cache_with(MemoryStore::new(), &clock);
    alice.put("bob", &[record("1", 0)]).expect("put failed");

    let mut carol = ConversationCache::with_clock(alice.into_store(), clock.clone(), "carol");
    assert_eq!(carol.get("bob").expect("get failed"), None);
    carol.put("bob", &[record("2", 0)]).expect("put failed");

    let mut alice = ConversationCache::with_clock(carol.into_store(), clock.clone(), "alice");
    let cached = alice.get("bob").expect("get failed").expect("alice's entry survives");
    assert_eq!(cached[0].id, "1");
}

#[test]
fn test_append_creates_entry() {
    let clock = start_clock();
    let mut cache = cache_with(MemoryStore::new(), &clock);

    cache.append("bob", record("1", 0)).expect("append failed");

    assert_eq!(cache.get("bob").expect("get failed").map(|m| m.len()), Some(1));
}

#[test]
fn test_append_keeps_order_and_replaces_known_ids() {
    let clock = start_clock();
    let mut cache = cache_with(MemoryStore::new(), &clock);
    cache.put("bob", &[record("1", 0), record("3", 10)]).expect("put failed");

    cache.append("bob", record("2", 5)).expect("append failed");
    cache
        .append("bob", record("3", 10).with_content("edited"))
        .expect("append failed");

    let cached = cache.get("bob").expect("get failed").expect("entry expected");
    let ids: Vec<&str> = cached.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(cached[2].content.as_deref(), Some("edited"));
}

#[test]
fn test_last_message_timestamp() {
    let clock = start_clock();
    let mut cache = cache_with(MemoryStore::new(), &clock);
    assert_eq!(cache.last_message_timestamp("bob").expect("read failed"), None);

    cache.put("bob", &[record("1", 0), record("2", 5)]).expect("put failed");

    assert_eq!(
        cache.last_message_timestamp("bob").expect("read failed").as_deref(),
        Some("2026-10-19T10:05:00Z")
    );
}

#[test]
fn test_unreadable_entry_is_discarded() {
    let clock = start_clock();
    let mut store = MemoryStore::new();
    store.set("chat_messages_alice_bob", "{not json").expect("set failed");
    let mut cache = cache_with(store, &clock);

    assert_eq!(cache.get("bob").expect("get failed"), None);
    assert!(cache.store().is_empty());
}

#[test]
fn test_corrupt_stamp_counts_as_expired() {
    let clock = start_clock();
    let mut store = MemoryStore::new();
    let ancient = format!(r#"{{"messages":[],"timestamp":{}}}"#, i64::MIN + 1);
    store.set("chat_messages_alice_bob", &ancient).expect("set failed");
    store.set("chat_messages_alice_eve", &ancient).expect("set failed");
    let mut cache = cache_with(store, &clock);

    assert_eq!(cache.get("bob").expect("get failed"), None);
    assert_eq!(cache.evict_expired().expect("evict failed"), 1);
    assert!(cache.store().is_empty());
}

#[test]
fn test_future_stamp_counts_as_expired() {
    let clock = start_clock();
    let mut store = MemoryStore::new();
    let future = format!(r#"{{"messages":[],"timestamp":{}}}"#, i64::MAX);
    store.set("chat_messages_alice_bob", &future).expect("set failed");
    let mut cache = cache_with(store, &clock);

    assert_eq!(cache.get("bob").expect("get failed"), None);
    assert!(cache.store().is_empty());
}

#[test]
fn test_remove_entry() {
    let clock = start_clock();
    let mut cache = cache_with(MemoryStore::new(), &clock);
    cache.put("bob", &[record("1", 0)]).expect("put failed");
    cache.remove("bob").expect("remove failed");
    assert_eq!(cache.get("bob").expect("get failed"), None);
}

#[test]
fn test_evict_expired_scans_prefix_only() {
    let clock = start_clock();
    let mut cache = cache_with(MemoryStore::new(), &clock);
    cache.put("bob", &[record("1", 0)]).expect("put failed");
    cache.store_mut().set("chat_messages_alice_broken", "garbage").expect("set failed");
    cache.store_mut().set("unrelated", "garbage").expect("set failed");

    clock.advance(Duration::hours(2));
    cache.put("eve", &[record("2", 0)]).expect("put failed");
    clock.advance(Duration::hours(23));

    // bob is 25h old, eve 23h, the broken entry is unreadable
    assert_eq!(cache.evict_expired().expect("evict failed"), 2);
    assert!(cache.get("eve").expect("get failed").is_some());
    assert!(cache.store().get("unrelated").expect("get failed").is_some());
}

/// Bytes one single-record entry occupies
fn entry_size(clock: &ManualClock) -> usize {
    let mut probe = cache_with(MemoryStore::new(), clock);
    probe.put("bob", &[record("1", 0)]).expect("put failed");
    probe.store().used_bytes()
}

#[test]
fn test_quota_pressure_evicts_expired_then_retries() {
    let clock = start_clock();
    let one_entry = entry_size(&clock);
    let mut cache = cache_with(MemoryStore::with_quota(one_entry * 3 / 2), &clock);

    cache.put("bob", &[record("1", 0)]).expect("put failed");
    clock.advance(Duration::hours(25));

    let outcome = cache.put("eve", &[record("2", 0)]).expect("put failed");

    assert_eq!(outcome, CacheWrite::StoredAfterEviction { evicted: 1 });
    assert_eq!(cache.get("bob").expect("get failed"), None);
    assert!(cache.get("eve").expect("get failed").is_some());
}

#[test]
fn test_quota_pressure_evicts_oldest_when_nothing_expired() {
    let clock = start_clock();
    let one_entry = entry_size(&clock);
    let mut cache = cache_with(MemoryStore::with_quota(one_entry * 3 / 2), &clock);

    cache.put("bob", &[record("1", 0)]).expect("put failed");
    clock.advance(Duration::hours(1));

    let outcome = cache.put("eve", &[record("2", 0)]).expect("put failed");

    assert_eq!(outcome, CacheWrite::StoredAfterEviction { evicted: 1 });
    assert_eq!(cache.get("bob").expect("get failed"), None);
}

#[test]
fn test_quota_failure_is_skipped_silently() {
    let clock = start_clock();
    let mut cache = cache_with(MemoryStore::with_quota(16), &clock);

    let outcome = cache.put("bob", &[record("1", 0)]).expect("quota failures are not errors");

    assert_eq!(outcome, CacheWrite::Skipped);
    assert_eq!(cache.get("bob").expect("get failed"), None);
}

#[test]
fn test_cache_over_sqlite_store() {
    let clock = start_clock();
    let store = SqliteStore::new_in_memory().expect("Failed to create store");
    let mut cache = ConversationCache::with_clock(store, clock.clone(), "alice");

    cache.put("bob", &[record("1", 0)]).expect("put failed");
    cache.append("bob", record("2", 5)).expect("append failed");

    assert_eq!(cache.get("bob").expect("get failed").map(|m| m.len()), Some(2));
    clock.advance(Duration::days(2));
    assert_eq!(cache.get("bob").expect("get failed"), None);
    assert_eq!(cache.store().len().expect("count failed"), 0);
}
