//! Conversation timeline: ordering, merging and placeholder confirmation
//!
//! A [`Timeline`] is the explicit per-peer view state a renderer draws from.
//! Records are kept in ascending timestamp order; ties keep arrival order.
//! Every mutation reports a [`TimelineChange`] so the renderer only touches
//! the affected row.
//!
//! Optimistic records carry a `temp-` id. When the send completes, the caller
//! hands that id to [`Timeline::confirm`] together with the server's record;
//! confirmation never guesses by timestamp or content.

use crate::storage::message::{Attachment, MessageRecord};
use crate::timestamp::parse_timestamp;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Result of merging cached history with a server fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Union of both inputs, deduplicated by id, ascending by timestamp
    pub merged: Vec<MessageRecord>,
    /// Fetched records newer than the newest cached record
    pub new_records: Vec<MessageRecord>,
}

/// Stable ascending sort by parsed timestamp
pub fn sort_by_timestamp(records: &mut [MessageRecord]) {
    records.sort_by_cached_key(|record| record.instant());
}

/// Index at which a record with `instant` goes: after every record at or before it
pub fn insertion_index(records: &[MessageRecord], instant: DateTime<Utc>) -> usize {
    records.partition_point(|record| record.instant() <= instant)
}

/// Merge cached history with freshly fetched records
///
/// Both inputs are expected in ascending order. When an id appears in both,
/// the fetched copy wins. `new_records` holds the fetched records strictly
/// newer than the last cached record, or all of them without a cache.
pub fn merge(cached: Option<&[MessageRecord]>, fetched: Vec<MessageRecord>) -> MergeOutcome {
    let cached = cached.unwrap_or_default();

    let new_records = match cached.last() {
        Some(last) => {
            let cutoff = last.instant();
            fetched
                .iter()
                .filter(|record| record.instant() > cutoff)
                .cloned()
                .collect()
        }
        None => fetched.clone(),
    };

    let mut merged: Vec<MessageRecord> = {
        let fetched_ids: HashSet<&str> = fetched.iter().map(|r| r.id.as_str()).collect();
        cached
            .iter()
            .filter(|record| !fetched_ids.contains(record.id.as_str()))
            .cloned()
            .collect()
    };

    let mut seen: HashSet<String> = merged.iter().map(|r| r.id.clone()).collect();
    merged.reserve(fetched.len());
    for record in fetched {
        if seen.insert(record.id.clone()) {
            merged.push(record);
        }
    }
    sort_by_timestamp(&mut merged);

    MergeOutcome { merged, new_records }
}

/// Loading state of a conversation view
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    /// History fetch in flight
    #[default]
    Loading,
    /// History loaded
    Ready,
    /// Last fetch failed; whatever was shown stays shown
    Failed(String),
}

/// What a timeline mutation changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineChange {
    /// A record was inserted at `index`
    Inserted {
        /// Row index
        index: usize,
    },
    /// The record at `index` was swapped for its confirmed version
    Replaced {
        /// Row index
        index: usize,
    },
    /// The record at `index` was removed
    Removed {
        /// Row index
        index: usize,
    },
    /// The record at `index` changed state
    Updated {
        /// Row index
        index: usize,
    },
    /// Nothing changed
    Unchanged,
}

/// Ordered messages of one conversation
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    peer: String,
    records: Vec<MessageRecord>,
    // Sort keys, parsed once per record and always ascending
    instants: Vec<DateTime<Utc>>,
    state: LoadState,
}

impl Timeline {
    /// Create an empty timeline for a conversation with `peer`
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            ..Self::default()
        }
    }

    /// Peer of this conversation
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Records in display order
    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the timeline is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Loading state
    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Set loading state
    pub fn set_state(&mut self, state: LoadState) {
        self.state = state;
    }

    /// Row index of the record with `id`
    pub fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|record| record.id == id)
    }

    /// Record with `id`
    pub fn get(&self, id: &str) -> Option<&MessageRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Sort key of the last record
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.instants.last().copied()
    }

    /// Server-confirmed records, in order
    pub fn confirmed_records(&self) -> Vec<MessageRecord> {
        self.records.iter().filter(|r| !r.is_placeholder()).cloned().collect()
    }

    /// Records still waiting for (or failed) confirmation
    pub fn pending_records(&self) -> Vec<MessageRecord> {
        self.records.iter().filter(|r| r.is_placeholder()).cloned().collect()
    }

    /// Replace the whole view, e.g. from the cache or a merge
    pub fn replace_all(&mut self, records: Vec<MessageRecord>) {
        let mut entries: Vec<(DateTime<Utc>, MessageRecord)> = records
            .into_iter()
            .map(|record| (parse_timestamp(&record.timestamp), record))
            .collect();
        entries.sort_by_key(|(instant, _)| *instant);

        let (instants, records) = entries.into_iter().unzip();
        self.instants = instants;
        self.records = records;
    }

    /// Insert a record at its timestamp position
    ///
    /// A record whose id is already present is ignored.
    pub fn insert(&mut self, record: MessageRecord) -> TimelineChange {
        if self.position(&record.id).is_some() {
            return TimelineChange::Unchanged;
        }

        let instant = parse_timestamp(&record.timestamp);
        let index = self.instants.partition_point(|existing| *existing <= instant);
        self.instants.insert(index, instant);
        self.records.insert(index, record);
        TimelineChange::Inserted { index }
    }

    /// Show an outgoing message before the server has confirmed it
    ///
    /// Returns the placeholder id to hand to [`Timeline::confirm`] or
    /// [`Timeline::mark_failed`].
    pub fn push_placeholder(
        &mut self,
        sender: &str,
        content: Option<String>,
        attachment: Option<Attachment>,
        timestamp: impl Into<String>,
    ) -> String {
        let record =
            MessageRecord::placeholder(sender, self.peer.clone(), content, attachment, timestamp);
        let id = record.id.clone();
        self.insert(record);
        id
    }

    /// Swap a placeholder for the server's record
    ///
    /// The confirmed record takes the placeholder's row. If the confirmed id
    /// is already shown (its push notification won the race), the placeholder
    /// is dropped instead. Without a placeholder the record is inserted.
    ///
    /// The row keeps sorting by the placeholder's time until the next
    /// [`Timeline::replace_all`], so later inserts still find their place
    /// when the server time is later than the rows that follow.
    pub fn confirm(
        &mut self,
        placeholder_id: &str,
        mut confirmed: MessageRecord,
    ) -> TimelineChange {
        confirmed.mark_delivered();

        let Some(index) = self.position(placeholder_id) else {
            return self.insert(confirmed);
        };

        if self.position(&confirmed.id).is_some() {
            self.records.remove(index);
            self.instants.remove(index);
            return TimelineChange::Removed { index };
        }

        self.records[index] = confirmed;
        TimelineChange::Replaced { index }
    }

    /// Flag a placeholder as failed; it stays where it is
    pub fn mark_failed(&mut self, placeholder_id: &str) -> TimelineChange {
        match self.position(placeholder_id) {
            Some(index) => {
                self.records[index].mark_failed();
                TimelineChange::Updated { index }
            }
            None => TimelineChange::Unchanged,
        }
    }

    /// Remove the record with `id`
    pub fn remove(&mut self, id: &str) -> TimelineChange {
        match self.position(id) {
            Some(index) => {
                self.records.remove(index);
                self.instants.remove(index);
                TimelineChange::Removed { index }
            }
            None => TimelineChange::Unchanged,
        }
    }
}
