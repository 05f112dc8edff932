//! Conversation workflows
//!
//! This module ties timelines, the message cache and the server contract
//! together into the operations a chat client performs:
//! - open a conversation and show cached history right away
//! - refresh from the server and render only what is new
//! - send optimistically and confirm by placeholder id
//! - route push notifications to the right conversation
//!
//! The local user is carried explicitly by [`ChatSession`]; nothing here
//! reads global state. Cache failures are logged and otherwise ignored, the
//! server stays the source of truth.

use crate::{
    api::{MessageApi, OutgoingMedia, PushEvent, SendRequest, SendResponse},
    clock::Clock,
    preload::{preload_images, ImageLoader, PreloadReport},
    storage::{
        cache::ConversationCache, message::Attachment, settings::Settings,
        storage_db::SqliteStore, store::KeyValueStore, MessageRecord,
    },
    timeline::{merge, sort_by_timestamp, LoadState, Timeline, TimelineChange},
    timestamp::to_timestamp_string,
    Error, Result,
};
use std::{collections::HashMap, path::Path, sync::Arc};

/// A message typed by the local user, before it is sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDraft {
    /// Text as typed
    pub content: String,
    /// Selected file
    pub media: Option<OutgoingMedia>,
}

impl MessageDraft {
    /// Text-only draft
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            media: None,
        }
    }

    /// Attach a file
    pub fn with_media(mut self, media: OutgoingMedia) -> Self {
        self.media = Some(media);
        self
    }

    /// Trimmed text, `None` when blank
    pub fn trimmed_content(&self) -> Option<String> {
        let trimmed = self.content.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Result of a completed send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// Id the optimistic record was shown under
    pub placeholder_id: String,
    /// Server id of the stored message
    pub message_id: String,
    /// How the timeline changed on confirmation
    pub change: TimelineChange,
}

/// One open conversation with a peer
#[derive(Debug, Clone)]
pub struct Conversation {
    local_user: String,
    timeline: Timeline,
    max_attachment_bytes: u64,
    preload_batch_size: usize,
}

impl Conversation {
    /// Create a conversation view between `local_user` and `peer`
    pub fn new(
        local_user: impl Into<String>,
        peer: impl Into<String>,
        settings: &Settings,
    ) -> Self {
        Self {
            local_user: local_user.into(),
            timeline: Timeline::new(peer),
            max_attachment_bytes: settings.max_attachment_bytes,
            preload_batch_size: settings.preload_batch_size,
        }
    }

    /// Peer of this conversation
    pub fn peer(&self) -> &str {
        self.timeline.peer()
    }

    /// Local user
    pub fn local_user(&self) -> &str {
        &self.local_user
    }

    /// Current view
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Whether `record` was sent by the local user
    pub fn is_outgoing(&self, record: &MessageRecord) -> bool {
        record.sender == self.local_user
    }

    /// Show cached history while the server fetch is pending
    ///
    /// Returns `true` when the cache had an entry.
    pub fn load_cached<S, C>(&mut self, cache: &mut ConversationCache<S, C>) -> bool
    where
        S: KeyValueStore,
        C: Clock,
    {
        let peer = self.peer().to_string();
        self.timeline.set_state(LoadState::Loading);

        match cache.get(&peer) {
            Ok(Some(records)) => {
                tracing::debug!("Showing {} cached messages for {}", records.len(), peer);
                let mut view = records;
                view.extend(self.timeline.pending_records());
                self.timeline.replace_all(view);
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Failed to read message cache for {}: {}", peer, e);
                false
            }
        }
    }

    /// Fetch history from the server and merge it into the view
    ///
    /// Returns the fetched records newer than what was already shown. On
    /// failure the current view is kept and the state becomes
    /// [`LoadState::Failed`].
    pub async fn refresh<A, S, C>(
        &mut self,
        api: &A,
        cache: &mut ConversationCache<S, C>,
    ) -> Result<Vec<MessageRecord>>
    where
        A: MessageApi,
        S: KeyValueStore,
        C: Clock,
    {
        let peer = self.peer().to_string();
        self.timeline.set_state(LoadState::Loading);

        let response = match api.fetch_messages(&peer).await {
            Ok(response) if response.success => response,
            Ok(_) => return Err(self.fetch_failed("Server rejected history request".to_string())),
            Err(e) => return Err(self.fetch_failed(e.to_string())),
        };

        let mut fetched = response.messages;
        sort_by_timestamp(&mut fetched);

        let shown = self.timeline.confirmed_records();
        let cached = (!shown.is_empty()).then_some(shown);
        let outcome = merge(cached.as_deref(), fetched);

        if let Err(e) = cache.put(&peer, &outcome.merged) {
            tracing::warn!("Failed to cache history for {}: {}", peer, e);
        }

        let mut view = outcome.merged;
        view.extend(self.timeline.pending_records());
        self.timeline.replace_all(view);
        self.timeline.set_state(LoadState::Ready);

        tracing::info!(
            "Loaded history with {}: {} new messages",
            peer,
            outcome.new_records.len()
        );
        Ok(outcome.new_records)
    }

    fn fetch_failed(&mut self, reason: String) -> Error {
        tracing::warn!("Error loading chat history with {}: {}", self.peer(), reason);
        self.timeline.set_state(LoadState::Failed(reason.clone()));
        Error::Fetch(reason)
    }

    /// Validate a draft and show it as a placeholder
    ///
    /// The placeholder is stamped with `clock`'s current time. Image
    /// attachments get an inline preview URL so they render before upload.
    /// Returns the placeholder id.
    pub fn begin_send<C: Clock>(&mut self, draft: &MessageDraft, clock: &C) -> Result<String> {
        let content = draft.trimmed_content();
        if content.is_none() && draft.media.is_none() {
            return Err(Error::InvalidMessage("Message is empty".to_string()));
        }

        let attachment = match &draft.media {
            Some(media) => {
                if media.size() > self.max_attachment_bytes {
                    return Err(Error::AttachmentTooLarge {
                        size: media.size(),
                        limit: self.max_attachment_bytes,
                    });
                }
                let is_image = media.mime_type.starts_with("image/");
                Some(Attachment {
                    url: is_image
                        .then(|| Attachment::preview_data_url(&media.mime_type, &media.bytes)),
                    mime_type: Some(media.mime_type.clone()),
                    filename: Some(media.filename.clone()),
                    local_preview: is_image,
                })
            }
            None => None,
        };

        let local_user = self.local_user.clone();
        let timestamp = to_timestamp_string(clock.now());
        Ok(self
            .timeline
            .push_placeholder(&local_user, content, attachment, timestamp))
    }

    /// Apply the server's answer to a send started with [`Conversation::begin_send`]
    ///
    /// On success the placeholder is confirmed and the record cached. On
    /// failure the placeholder is marked failed in place and an
    /// [`Error::Send`] returned.
    pub fn complete_send<S: KeyValueStore, C: Clock>(
        &mut self,
        placeholder_id: &str,
        response: Result<SendResponse>,
        cache: &mut ConversationCache<S, C>,
    ) -> Result<SendOutcome> {
        let confirmed = match response.and_then(SendResponse::into_confirmed) {
            Ok(confirmed) => confirmed,
            Err(e) => {
                tracing::warn!("Error sending message to {}: {}", self.peer(), e);
                self.timeline.mark_failed(placeholder_id);
                return Err(match e {
                    Error::Send(reason) => Error::Send(reason),
                    other => Error::Send(other.to_string()),
                });
            }
        };

        let message_id = confirmed.id.clone();
        let change = self.timeline.confirm(placeholder_id, confirmed.clone());
        self.cache_record(cache, confirmed);

        Ok(SendOutcome {
            placeholder_id: placeholder_id.to_string(),
            message_id,
            change,
        })
    }

    /// Send a draft: show it, upload it, confirm it
    pub async fn send<A, S, C>(
        &mut self,
        api: &A,
        cache: &mut ConversationCache<S, C>,
        draft: MessageDraft,
    ) -> Result<SendOutcome>
    where
        A: MessageApi,
        S: KeyValueStore,
        C: Clock,
    {
        let placeholder_id = self.begin_send(&draft, cache.clock())?;
        let request = SendRequest {
            receiver: self.peer().to_string(),
            content: draft.trimmed_content(),
            media: draft.media,
        };

        let response = api.send_message(&request).await;
        self.complete_send(&placeholder_id, response, cache)
    }

    /// Show a record delivered by push and add it to the cache
    ///
    /// Already-shown ids are ignored by the timeline; the cache copy is
    /// refreshed either way.
    pub fn receive<S: KeyValueStore, C: Clock>(
        &mut self,
        record: MessageRecord,
        cache: &mut ConversationCache<S, C>,
    ) -> TimelineChange {
        let change = self.timeline.insert(record.clone());
        self.cache_record(cache, record);
        change
    }

    /// Preload the images of `records` with the configured batch size
    pub async fn preload<L: ImageLoader>(
        &self,
        loader: Arc<L>,
        records: &[MessageRecord],
    ) -> PreloadReport {
        preload_images(loader, records, self.preload_batch_size).await
    }

    fn cache_record<S, C>(&self, cache: &mut ConversationCache<S, C>, record: MessageRecord)
    where
        S: KeyValueStore,
        C: Clock,
    {
        if let Err(e) = cache.append(self.peer(), record) {
            tracing::warn!("Failed to update message cache for {}: {}", self.peer(), e);
        }
    }
}

/// The local user's open conversations
#[derive(Debug, Clone)]
pub struct ChatSession {
    local_user: String,
    settings: Settings,
    conversations: HashMap<String, Conversation>,
}

impl ChatSession {
    /// Create a session for `local_user` with default settings
    pub fn new(local_user: impl Into<String>) -> Self {
        Self::with_settings(local_user, Settings::default())
    }

    /// Create a session with explicit settings
    pub fn with_settings(local_user: impl Into<String>, settings: Settings) -> Self {
        Self {
            local_user: local_user.into(),
            settings,
            conversations: HashMap::new(),
        }
    }

    /// Local user
    pub fn local_user(&self) -> &str {
        &self.local_user
    }

    /// Session settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Build a cache for this session's user on top of `store`
    pub fn cache<S, C>(&self, store: S, clock: C) -> ConversationCache<S, C>
    where
        S: KeyValueStore,
        C: Clock,
    {
        ConversationCache::with_clock(store, clock, self.local_user.clone())
            .with_settings(&self.settings)
    }

    /// Open a SQLite-backed cache at `path`, bounded by the configured storage quota
    pub fn open_cache<P, C>(&self, path: P, clock: C) -> Result<ConversationCache<SqliteStore, C>>
    where
        P: AsRef<Path>,
        C: Clock,
    {
        let store = SqliteStore::open_with_settings(path, &self.settings)?;
        Ok(self.cache(store, clock))
    }

    /// The other participant of `record`
    pub fn peer_of<'a>(&self, record: &'a MessageRecord) -> &'a str {
        if record.sender == self.local_user {
            &record.receiver
        } else {
            &record.sender
        }
    }

    /// Whether `record` was sent by the local user
    pub fn is_outgoing(&self, record: &MessageRecord) -> bool {
        record.sender == self.local_user
    }

    /// Open (or return the already open) conversation with `peer`
    pub fn open(&mut self, peer: &str) -> Result<&mut Conversation> {
        if peer == self.local_user {
            return Err(Error::SelfConversation(peer.to_string()));
        }

        let conversation = self.conversations.entry(peer.to_string()).or_insert_with(|| {
            tracing::debug!("Opening conversation with {}", peer);
            Conversation::new(self.local_user.clone(), peer, &self.settings)
        });
        Ok(conversation)
    }

    /// Open conversation with `peer`, if any
    pub fn get(&self, peer: &str) -> Option<&Conversation> {
        self.conversations.get(peer)
    }

    /// Open conversation with `peer`, mutably
    pub fn get_mut(&mut self, peer: &str) -> Option<&mut Conversation> {
        self.conversations.get_mut(peer)
    }

    /// Close the conversation with `peer`
    pub fn close(&mut self, peer: &str) -> Option<Conversation> {
        self.conversations.remove(peer)
    }

    /// Peers with an open conversation
    pub fn open_peers(&self) -> Vec<&str> {
        let mut peers: Vec<&str> = self.conversations.keys().map(String::as_str).collect();
        peers.sort_unstable();
        peers
    }

    /// Route a push event to its conversation, opening it if needed
    ///
    /// Returns the peer and how its timeline changed.
    pub fn handle_push<S: KeyValueStore, C: Clock>(
        &mut self,
        event: PushEvent,
        cache: &mut ConversationCache<S, C>,
    ) -> Result<(String, TimelineChange)> {
        let PushEvent::NewMessage(record) = event;
        let peer = self.peer_of(&record).to_string();
        let change = self.open(&peer)?.receive(record, cache);
        Ok((peer, change))
    }
}
