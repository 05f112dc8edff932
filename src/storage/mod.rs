//! Local storage module
//!
//! This module handles everything persisted on the client:
//! - `message` - Message records, attachments and delivery state
//! - `store` - Key/value backend trait and an in-memory backend
//! - `storage_db` - SQLite key/value backend
//! - `cache` - Per-conversation message cache with expiry and eviction
//! - `settings` - Settings persisted as JSON

pub mod cache;
pub mod message;
pub mod settings;
pub mod storage_db;
pub mod store;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheWrite, ConversationCache};
pub use message::{Attachment, DeliveryState, MediaKind, MessageRecord};
pub use settings::Settings;
pub use storage_db::SqliteStore;
pub use store::{KeyValueStore, MemoryStore, StoreError};
