use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::app::domain::event::{Event, NewEvent};
use crate::app::domain::types::{ConversationId, EventId};

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("Conversation not found: {conversation_id}")]
    ConversationNotFound { conversation_id: String },

    #[error("Append rejected: {message}")]
    Rejected { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Invalid page cursor: {cursor}")]
    InvalidCursor { cursor: String },

    #[error("In-memory store lock poisoned: {message}")]
    LockPoisoned { message: String },
}

impl EventStoreError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn lock_poisoned(message: impl Into<String>) -> Self {
        Self::LockPoisoned {
            message: message.into(),
        }
    }
}

/// Order in which a page lists its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    pub limit: usize,
    pub cursor: Option<String>,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Self {
            limit,
            cursor: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<Event>,
    #[serde(default)]
    pub order: ListOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl EventPage {
    /// Events oldest first, whatever order the page was listed in.
    pub fn into_chronological(self) -> Vec<Event> {
        chronological(self.events, self.order)
    }
}

/// Puts events listed in `order` into oldest-first order without otherwise
/// reordering them.
pub fn chronological(mut events: Vec<Event>, order: ListOrder) -> Vec<Event> {
    if order == ListOrder::NewestFirst {
        events.reverse();
    }
    events
}

/// Backend-provided event log for conversations.
///
/// Implementations must never change or drop an event once it has been
/// listed. Listing may return a full snapshot every time.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn list_events(
        &self,
        conversation_id: &ConversationId,
        page: Page,
    ) -> Result<EventPage, EventStoreError>;

    async fn append_event(&self, event: NewEvent) -> Result<EventId, EventStoreError>;
}

/// Event store held in memory. Lists newest first, like the hosted backend.
pub struct InMemoryEventStore {
    events: std::sync::RwLock<HashMap<ConversationId, Vec<Event>>>,
    next_id: AtomicU64,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: std::sync::RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Inserts an already-formed event, as another device or the backend
    /// would. Timestamps are taken as given and the log is kept sorted.
    pub fn insert(
        &self,
        conversation_id: &ConversationId,
        event: Event,
    ) -> Result<(), EventStoreError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| EventStoreError::lock_poisoned("events"))?;
        let log = events.entry(conversation_id.clone()).or_default();
        let at = log.partition_point(|existing| existing.timestamp <= event.timestamp);
        log.insert(at, event);
        Ok(())
    }

    /// Appends with a server-assigned id and timestamp, returning the event.
    pub fn commit(&self, event: NewEvent) -> Result<Event, EventStoreError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| EventStoreError::lock_poisoned("events"))?;
        let log = events.entry(event.conversation_id.clone()).or_default();

        let now = Utc::now().timestamp_millis();
        let timestamp = log
            .last()
            .map_or(now, |last| now.max(last.timestamp + 1));
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let committed = event.into_event(EventId::from(format!("evt_{seq}")), timestamp);
        log.push(committed.clone());
        Ok(committed)
    }

    pub fn snapshot(&self, conversation_id: &ConversationId) -> Result<Vec<Event>, EventStoreError> {
        let events = self
            .events
            .read()
            .map_err(|_| EventStoreError::lock_poisoned("events"))?;
        Ok(events.get(conversation_id).cloned().unwrap_or_default())
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn list_events(
        &self,
        conversation_id: &ConversationId,
        page: Page,
    ) -> Result<EventPage, EventStoreError> {
        let offset = match &page.cursor {
            None => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| EventStoreError::InvalidCursor {
                    cursor: cursor.clone(),
                })?,
        };
        let limit = if page.limit == 0 { usize::MAX } else { page.limit };

        let events = self
            .events
            .read()
            .map_err(|_| EventStoreError::lock_poisoned("events"))?;
        let log = events.get(conversation_id).map(Vec::as_slice).unwrap_or_default();

        let listed: Vec<Event> = log.iter().rev().skip(offset).take(limit).cloned().collect();
        let consumed = offset.saturating_add(listed.len());
        let next_cursor = (consumed < log.len()).then(|| consumed.to_string());

        Ok(EventPage {
            events: listed,
            order: ListOrder::NewestFirst,
            next_cursor,
        })
    }

    async fn append_event(&self, event: NewEvent) -> Result<EventId, EventStoreError> {
        self.commit(event).map(|committed| committed.id)
    }
}
