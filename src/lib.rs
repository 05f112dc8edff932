//! Chatline - conversation timelines for one-to-one chat clients
//!
//! This library provides the data core of a chat widget: ordering and merging
//! message history from a local cache and a server fetch, confirming optimistic
//! messages, persisting a per-conversation cache with expiry, and formatting
//! message timestamps for display. Rendering and transport stay with the caller.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod clock;
pub mod conversation;
pub mod preload;
pub mod storage;
pub mod timeline;
pub mod timestamp;

/// Result type alias for Chatline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Chatline operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// History fetch failed or was rejected by the server
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Sending a message failed or was rejected by the server
    #[error("Send error: {0}")]
    Send(String),

    /// Message draft or record is not acceptable
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Attempted to open a conversation with the local user
    #[error("Cannot open a conversation with yourself ({0})")]
    SelfConversation(String),

    /// Attachment exceeds the configured size limit
    #[error("Attachment is {size} bytes, limit is {limit} bytes")]
    AttachmentTooLarge {
        /// Attachment size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Initialize the Chatline library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}
