//! Per-conversation message cache
//!
//! One entry per (local user, peer) pair, stored as JSON
//! `{ "messages": [...], "timestamp": <epoch millis of last write> }` under the
//! key `chat_messages_{local}_{peer}`. Entries older than the freshness window
//! are dropped on read. The cache is an optimization: when the backend is full
//! it evicts stale entries, retries once, and otherwise skips the write.

use crate::{
    clock::{Clock, SystemClock},
    storage::{
        message::MessageRecord,
        settings::{Settings, DEFAULT_CACHE_KEY_PREFIX},
        store::{KeyValueStore, StoreError},
    },
    timeline::insertion_index,
    Result,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Stored value of one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Records in ascending timestamp order
    pub messages: Vec<MessageRecord>,
    /// Last write time (Unix milliseconds)
    pub timestamp: i64,
}

/// Outcome of a cache write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWrite {
    /// Written on the first attempt
    Stored,
    /// Written after evicting entries to make room
    StoredAfterEviction {
        /// Number of entries removed
        evicted: usize,
    },
    /// The backend stayed full; nothing was written
    Skipped,
}

/// Message cache for one local user
pub struct ConversationCache<S, C = SystemClock> {
    store: S,
    clock: C,
    local_user: String,
    prefix: String,
    ttl: Duration,
}

impl<S: KeyValueStore> ConversationCache<S, SystemClock> {
    /// Create a cache using wall-clock time and default settings
    pub fn new(store: S, local_user: impl Into<String>) -> Self {
        Self::with_clock(store, SystemClock, local_user)
    }
}

impl<S: KeyValueStore, C: Clock> ConversationCache<S, C> {
    /// Create a cache with an explicit time source
    pub fn with_clock(store: S, clock: C, local_user: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            local_user: local_user.into(),
            prefix: DEFAULT_CACHE_KEY_PREFIX.to_string(),
            ttl: Duration::hours(24),
        }
    }

    /// Apply key prefix and freshness window from settings
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.prefix = settings.cache_key_prefix.clone();
        self.ttl = settings.cache_ttl();
        self
    }

    /// Local user this cache belongs to
    pub fn local_user(&self) -> &str {
        &self.local_user
    }

    /// Freshness window
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Time source
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Underlying store, mutably
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Give the backend back, e.g. to hand it to another local user's cache
    pub fn into_store(self) -> S {
        self.store
    }

    /// Storage key for a conversation with `peer`
    pub fn key_for(&self, peer: &str) -> String {
        format!("{}{}_{}", self.prefix, self.local_user, peer)
    }

    /// Cached records for `peer`, or `None` if absent or expired
    ///
    /// Expired and unreadable entries are removed as a side effect.
    pub fn get(&mut self, peer: &str) -> Result<Option<Vec<MessageRecord>>> {
        let key = self.key_for(peer);
        let Some(entry) = self.read_entry(&key)? else {
            return Ok(None);
        };

        if self.is_expired(&entry) {
            tracing::debug!("Cache entry {} expired, removing", key);
            self.store.remove(&key)?;
            return Ok(None);
        }

        Ok(Some(entry.messages))
    }

    /// Overwrite the entry for `peer`, stamping it with the current time
    pub fn put(&mut self, peer: &str, messages: &[MessageRecord]) -> Result<CacheWrite> {
        let key = self.key_for(peer);
        let entry = CacheEntry {
            messages: messages.to_vec(),
            timestamp: self.clock.now_millis(),
        };
        let value = serde_json::to_string(&entry)?;

        match self.store.set(&key, &value) {
            Ok(()) => return Ok(CacheWrite::Stored),
            Err(StoreError::QuotaExceeded) => {
                tracing::warn!("Cache quota exceeded writing {}, evicting stale entries", key);
            }
            Err(err) => return Err(err.into()),
        }

        let mut evicted = self.evict_expired()?;
        if evicted == 0 {
            evicted = self.evict_oldest(&key)?;
        }

        match self.store.set(&key, &value) {
            Ok(()) => Ok(CacheWrite::StoredAfterEviction { evicted }),
            Err(StoreError::QuotaExceeded) => {
                tracing::warn!(
                    "Cache still full after evicting {} entries, skipping {}",
                    evicted,
                    key
                );
                Ok(CacheWrite::Skipped)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Add one record to the entry for `peer`
    ///
    /// A record whose id is already cached replaces the cached copy in place;
    /// anything else is inserted at its timestamp position.
    pub fn append(&mut self, peer: &str, record: MessageRecord) -> Result<CacheWrite> {
        let mut messages = self.get(peer)?.unwrap_or_default();

        match messages.iter().position(|m| m.id == record.id) {
            Some(index) => messages[index] = record,
            None => {
                let index = insertion_index(&messages, record.instant());
                messages.insert(index, record);
            }
        }

        self.put(peer, &messages)
    }

    /// Timestamp of the newest cached record for `peer`
    pub fn last_message_timestamp(&mut self, peer: &str) -> Result<Option<String>> {
        Ok(self
            .get(peer)?
            .and_then(|messages| messages.last().map(|m| m.timestamp.clone())))
    }

    /// Drop the entry for `peer`
    pub fn remove(&mut self, peer: &str) -> Result<()> {
        let key = self.key_for(peer);
        self.store.remove(&key)?;
        Ok(())
    }

    /// Remove every expired or unreadable entry under the cache prefix
    ///
    /// Covers every local user sharing the backend. Returns the number of
    /// entries removed.
    pub fn evict_expired(&mut self) -> Result<usize> {
        let mut removed = 0;
        for key in self.store.keys_with_prefix(&self.prefix)? {
            let stale = match self.store.get(&key)? {
                Some(raw) => match serde_json::from_str::<StoredStamp>(&raw) {
                    Ok(stamp) => self.is_stamp_expired(stamp.timestamp),
                    Err(_) => true,
                },
                None => false,
            };
            if stale {
                self.store.remove(&key)?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Evicted {} stale cache entries", removed);
        }
        Ok(removed)
    }

    /// Remove the least recently written entry of this local user, other than `except`
    fn evict_oldest(&mut self, except: &str) -> Result<usize> {
        let namespace = format!("{}{}_", self.prefix, self.local_user);
        let mut oldest: Option<(i64, String)> = None;

        for key in self.store.keys_with_prefix(&namespace)? {
            if key == except {
                continue;
            }
            let Some(raw) = self.store.get(&key)? else {
                continue;
            };
            let written =
                serde_json::from_str::<StoredStamp>(&raw).map_or(i64::MIN, |s| s.timestamp);
            if oldest.as_ref().is_none_or(|(ts, _)| written < *ts) {
                oldest = Some((written, key));
            }
        }

        match oldest {
            Some((_, key)) => {
                tracing::info!("Evicting oldest cache entry {}", key);
                self.store.remove(&key)?;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn read_entry(&mut self, key: &str) -> Result<Option<CacheEntry>> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                tracing::warn!("Discarding unreadable cache entry {}: {}", key, e);
                self.store.remove(key)?;
                Ok(None)
            }
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.is_stamp_expired(entry.timestamp)
    }

    /// Stamps from the future or too far in the past count as expired
    fn is_stamp_expired(&self, written_ms: i64) -> bool {
        match self.clock.now_millis().checked_sub(written_ms) {
            Some(age) if age >= 0 => age >= self.ttl.num_milliseconds(),
            _ => true,
        }
    }
}

/// Last-write stamp only, so eviction scans skip decoding messages
#[derive(Deserialize)]
struct StoredStamp {
    timestamp: i64,
}
