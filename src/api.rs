//! Server contract
//!
//! The transport itself lives outside this crate. A client plugs in its HTTP
//! and push-channel plumbing by implementing [`MessageApi`] and decoding push
//! payloads with [`PushEvent::from_json`].
//!
//! - `GET /messages/{peer}` → [`FetchResponse`] (unsorted)
//! - `POST /send_message` (multipart) → [`SendResponse`]
//! - push event `new_message` → [`MessageRecord`]

use crate::{storage::message::MessageRecord, Error, Result};
use serde::{Deserialize, Serialize};

/// Name of the push event carrying a new message
pub const NEW_MESSAGE_EVENT: &str = "new_message";

/// Response of a history fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// Whether the server accepted the request
    #[serde(default)]
    pub success: bool,
    /// Conversation history, in no particular order
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

/// Response of a send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    /// Whether the message was stored
    #[serde(default)]
    pub success: bool,
    /// The stored message, with its server id and timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageRecord>,
    /// Server-provided failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResponse {
    /// The confirmed record, or the reason there is none
    pub fn into_confirmed(self) -> Result<MessageRecord> {
        match (self.success, self.message) {
            (true, Some(message)) => Ok(message),
            (true, None) => Err(Error::Send("Server response is missing the message".to_string())),
            (false, _) => Err(Error::Send(
                self.error.unwrap_or_else(|| "Error sending message".to_string()),
            )),
        }
    }
}

/// Media selected for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMedia {
    /// Original filename
    pub filename: String,
    /// MIME type
    pub mime_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

impl OutgoingMedia {
    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Multipart fields of `POST /send_message`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Receiver handle
    pub receiver: String,
    /// Text content, omitted when empty
    pub content: Option<String>,
    /// Attached file
    pub media: Option<OutgoingMedia>,
}

/// Message server operations used by a conversation
#[allow(async_fn_in_trait)]
pub trait MessageApi {
    /// Fetch the history with `peer`
    async fn fetch_messages(&self, peer: &str) -> Result<FetchResponse>;

    /// Send a message
    async fn send_message(&self, request: &SendRequest) -> Result<SendResponse>;
}

/// Events delivered over the push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A message was stored by the server, sent by or to the local user
    NewMessage(MessageRecord),
}

impl PushEvent {
    /// Decode a push event by name; unknown events yield `None`
    pub fn from_json(event: &str, payload: &str) -> Result<Option<Self>> {
        match event {
            NEW_MESSAGE_EVENT => Ok(Some(Self::NewMessage(serde_json::from_str(payload)?))),
            other => {
                tracing::debug!("Ignoring push event {}", other);
                Ok(None)
            }
        }
    }
}
