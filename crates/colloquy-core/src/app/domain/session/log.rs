//! Two-tier conversation log: the last confirmed snapshot from the event store
//! plus an overlay of local writes that have not shown up in a snapshot yet.
//!
//! The merged view lists confirmed events first and pending echoes after
//! them, so a freshly sent message is visible before its append round trip
//! completes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::app::domain::event::{Event, NewEvent};
use crate::app::domain::session::event_store::{EventStore, EventStoreError, Page, chronological};
use crate::app::domain::types::{ConversationId, EventId, Timestamp};

/// Maps temporary local ids to the ids the store assigned.
///
/// Owned by one [`ConversationLog`]. Entries are invalidated once the
/// confirmed snapshot contains the real event, and the whole table is cleared
/// when the log is cleared.
#[derive(Debug, Default, Clone)]
pub struct IdReplacements {
    by_temp: HashMap<EventId, EventId>,
}

impl IdReplacements {
    pub fn record(&mut self, temp: EventId, real: EventId) {
        self.by_temp.insert(temp, real);
    }

    /// Returns the confirmed id for `id`, or `id` itself when it is not a
    /// known temporary id.
    pub fn resolve(&self, id: &EventId) -> EventId {
        self.by_temp.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    pub fn invalidate(&mut self, temp: &EventId) {
        self.by_temp.remove(temp);
    }

    pub fn clear(&mut self) {
        self.by_temp.clear();
    }

    pub fn len(&self) -> usize {
        self.by_temp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_temp.is_empty()
    }
}

#[derive(Debug, Clone)]
struct PendingWrite {
    temp_id: EventId,
    confirmed_id: Option<EventId>,
    event: Event,
}

#[derive(Debug, Default)]
struct LogState {
    confirmed: Vec<Event>,
    pending: Vec<PendingWrite>,
    replacements: IdReplacements,
}

impl LogState {
    fn next_local_timestamp(&self) -> Timestamp {
        let confirmed = self.confirmed.last().map(|event| event.timestamp);
        let pending = self.pending.last().map(|write| write.event.timestamp);
        confirmed.max(pending).map_or(0, |latest| latest + 1)
    }

    fn merged(&self) -> Vec<Event> {
        let mut merged = self.confirmed.clone();
        merged.extend(self.pending.iter().map(|write| {
            let mut event = write.event.clone();
            if let Some(real) = &write.confirmed_id {
                event.id = real.clone();
            }
            event
        }));
        merged
    }

    /// Drops echoes whose real event is now part of the confirmed snapshot.
    fn evict_confirmed(&mut self) {
        let confirmed_ids: HashSet<&EventId> = self.confirmed.iter().map(|event| &event.id).collect();
        let mut evicted = Vec::new();
        self.pending.retain(|write| match &write.confirmed_id {
            Some(real) if confirmed_ids.contains(real) => {
                evicted.push(write.temp_id.clone());
                false
            }
            _ => true,
        });
        for temp in &evicted {
            self.replacements.invalidate(temp);
        }
    }
}

pub struct ConversationLog {
    conversation_id: ConversationId,
    store: Arc<dyn EventStore>,
    page_size: usize,
    state: Mutex<LogState>,
}

impl ConversationLog {
    pub fn new(conversation_id: ConversationId, store: Arc<dyn EventStore>, page_size: usize) -> Self {
        Self {
            conversation_id,
            store,
            page_size,
            state: Mutex::new(LogState::default()),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merged view: confirmed events, then pending local echoes.
    pub fn events(&self) -> Vec<Event> {
        self.state().merged()
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn resolve_id(&self, id: &EventId) -> EventId {
        self.state().replacements.resolve(id)
    }

    /// Reloads the confirmed snapshot (all pages) and returns the merged view.
    ///
    /// Duplicate deliveries of the same event id are collapsed to the first
    /// occurrence in chronological order.
    pub async fn refresh(&self) -> Result<Vec<Event>, EventStoreError> {
        let mut listed = Vec::new();
        let mut order = None;
        let mut page = Page::first(self.page_size);

        loop {
            let result = self
                .store
                .list_events(&self.conversation_id, page.clone())
                .await?;
            order.get_or_insert(result.order);
            listed.extend(result.events);
            match result.next_cursor {
                Some(cursor) if page.cursor.as_deref() != Some(cursor.as_str()) => {
                    page.cursor = Some(cursor);
                }
                _ => break,
            }
        }

        let mut seen = HashSet::new();
        let confirmed: Vec<Event> = chronological(listed, order.unwrap_or_default())
            .into_iter()
            .filter(|event| seen.insert(event.id.clone()))
            .collect();

        tracing::debug!(
            conversation_id = %self.conversation_id,
            events = confirmed.len(),
            "Refreshed conversation snapshot"
        );

        let mut state = self.state();
        state.confirmed = confirmed;
        state.evict_confirmed();
        Ok(state.merged())
    }

    /// Appends through the store with an immediate local echo.
    ///
    /// The echo is visible in [`Self::events`] under a temporary id until the
    /// store answers, then under the real id until a refresh confirms it. A
    /// rejected append removes the echo.
    pub async fn append(&self, event: NewEvent) -> Result<EventId, EventStoreError> {
        let temp_id = EventId::new_local();
        {
            let mut state = self.state();
            let timestamp = state.next_local_timestamp();
            state.pending.push(PendingWrite {
                temp_id: temp_id.clone(),
                confirmed_id: None,
                event: event.clone().into_event(temp_id.clone(), timestamp),
            });
        }

        match self.store.append_event(event).await {
            Ok(real_id) => {
                let mut state = self.state();
                if let Some(write) = state.pending.iter_mut().find(|write| write.temp_id == temp_id) {
                    write.confirmed_id = Some(real_id.clone());
                }
                state.replacements.record(temp_id, real_id.clone());
                state.evict_confirmed();
                Ok(real_id)
            }
            Err(err) => {
                tracing::warn!(
                    conversation_id = %self.conversation_id,
                    error = %err,
                    "Append failed, dropping local echo"
                );
                let mut state = self.state();
                state.pending.retain(|write| write.temp_id != temp_id);
                Err(err)
            }
        }
    }

    /// Drops the overlay and the replacement table.
    pub fn clear(&self) {
        let mut state = self.state();
        state.pending.clear();
        state.replacements.clear();
        state.confirmed.clear();
    }
}
