//! Message records, attachments and delivery state

use crate::timestamp::{current_timestamp, parse_timestamp};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of locally generated ids for unconfirmed records
pub const PLACEHOLDER_PREFIX: &str = "temp-";

/// Generate a fresh placeholder id
pub fn new_placeholder_id() -> String {
    format!("{}{}", PLACEHOLDER_PREFIX, uuid::Uuid::new_v4())
}

/// Whether `id` was generated locally for an unconfirmed record
pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}

/// Message delivery state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    /// Shown optimistically, waiting for the server
    Sending,
    /// Confirmed by the server
    #[default]
    Delivered,
    /// Send failed; the record stays visible
    Error,
}

/// Broad media category, derived from the MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// `image/*`
    Image,
    /// `video/*`
    Video,
    /// Anything else
    File,
}

/// Media attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attachment {
    /// Server path, or a local preview URL while unconfirmed
    pub url: Option<String>,
    /// MIME type
    pub mime_type: Option<String>,
    /// Original filename
    pub filename: Option<String>,
    /// `url` is a locally generated preview rather than a server path
    pub local_preview: bool,
}

impl Attachment {
    /// Attachment pointing at a server path
    pub fn remote(
        url: impl Into<String>,
        mime_type: Option<String>,
        filename: Option<String>,
    ) -> Self {
        Self {
            url: Some(url.into()),
            mime_type,
            filename,
            local_preview: false,
        }
    }

    /// Media category
    pub fn kind(&self) -> MediaKind {
        match self.mime_type.as_deref() {
            Some(mime) if mime.starts_with("image/") => MediaKind::Image,
            Some(mime) if mime.starts_with("video/") => MediaKind::Video,
            _ => MediaKind::File,
        }
    }

    /// Whether this is an image attachment
    pub fn is_image(&self) -> bool {
        self.kind() == MediaKind::Image
    }

    /// URL to hand to the renderer
    ///
    /// Server paths are made root-relative; local previews and absolute URLs
    /// pass through unchanged.
    pub fn display_url(&self) -> Option<String> {
        let url = self.url.as_deref().filter(|url| !url.is_empty())?;
        if self.local_preview
            || url.starts_with('/')
            || url.starts_with("data:")
            || url.contains("://")
        {
            Some(url.to_string())
        } else {
            Some(format!("/{}", url))
        }
    }

    /// Filename for file links
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("File")
    }

    /// Inline preview URL for locally selected media
    pub fn preview_data_url(mime_type: &str, bytes: &[u8]) -> String {
        format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
    }
}

/// A chat message as held in timelines and caches
///
/// On the wire this uses the server's flat layout (`has_media`, `media_url`,
/// `media_type`, `media_filename`); numeric server ids are read as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireRecord", into = "WireRecord")]
pub struct MessageRecord {
    /// Server id, or a `temp-` placeholder id while unconfirmed
    pub id: String,
    /// Sender handle
    pub sender: String,
    /// Receiver handle
    pub receiver: String,
    /// Text content
    pub content: Option<String>,
    /// ISO-8601 timestamp, the ordering key
    pub timestamp: String,
    /// Attached media
    pub attachment: Option<Attachment>,
    /// Delivery state
    pub status: DeliveryState,
}

impl MessageRecord {
    /// Create a delivered text-less record
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            receiver: receiver.into(),
            content: None,
            timestamp: timestamp.into(),
            attachment: None,
            status: DeliveryState::Delivered,
        }
    }

    /// Create an optimistic record with a fresh placeholder id
    pub fn placeholder(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: Option<String>,
        attachment: Option<Attachment>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: new_placeholder_id(),
            sender: sender.into(),
            receiver: receiver.into(),
            content: content.filter(|text| !text.is_empty()),
            timestamp: timestamp.into(),
            attachment,
            status: DeliveryState::Sending,
        }
    }

    /// Set text content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.content = (!content.is_empty()).then_some(content);
        self
    }

    /// Set attachment
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Whether the record is still waiting for server confirmation
    pub fn is_placeholder(&self) -> bool {
        is_placeholder_id(&self.id)
    }

    /// Parsed timestamp (current time if unparsable)
    pub fn instant(&self) -> DateTime<Utc> {
        parse_timestamp(&self.timestamp)
    }

    /// Mark the record as confirmed by the server
    pub fn mark_delivered(&mut self) {
        self.status = DeliveryState::Delivered;
    }

    /// Mark the record as failed to send
    pub fn mark_failed(&mut self) {
        self.status = DeliveryState::Error;
    }

    /// Get human-readable delivery status indicator
    pub fn status_indicator(&self) -> &str {
        match self.status {
            DeliveryState::Sending => "…",
            DeliveryState::Delivered => "✓",
            DeliveryState::Error => "✗",
        }
    }
}

/// Server ids are integers; cached and placeholder ids are strings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireRecord {
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default)]
    sender: String,
    #[serde(default)]
    receiver: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    has_media: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_filename: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    temp_media_url: bool,
    #[serde(default)]
    status: DeliveryState,
}

impl From<WireRecord> for MessageRecord {
    fn from(wire: WireRecord) -> Self {
        let id = match wire.id {
            Some(WireId::Number(n)) => n.to_string(),
            Some(WireId::Text(text)) if !text.is_empty() => text,
            _ => new_placeholder_id(),
        };
        let attachment = wire.has_media.then(|| Attachment {
            url: wire.media_url,
            mime_type: wire.media_type,
            filename: wire.media_filename,
            local_preview: wire.temp_media_url,
        });

        Self {
            id,
            sender: wire.sender,
            receiver: wire.receiver,
            content: wire.content.filter(|text| !text.is_empty()),
            timestamp: wire.timestamp.unwrap_or_else(current_timestamp),
            attachment,
            status: wire.status,
        }
    }
}

impl From<MessageRecord> for WireRecord {
    fn from(record: MessageRecord) -> Self {
        let has_media = record.attachment.is_some();
        let attachment = record.attachment.unwrap_or_default();

        Self {
            id: Some(WireId::Text(record.id)),
            sender: record.sender,
            receiver: record.receiver,
            content: record.content,
            timestamp: Some(record.timestamp),
            has_media,
            media_url: attachment.url,
            media_type: attachment.mime_type,
            media_filename: attachment.filename,
            temp_media_url: attachment.local_preview,
            status: record.status,
        }
    }
}
