use std::collections::HashSet;

use crate::app::domain::event::{Attachment, Event, EventKind, MessageMode, UserMessagePayload};
use crate::app::domain::types::EventId;

/// A queued user message that still has no assistant reply.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFollowUp {
    pub message_id: EventId,
    pub attachments: Vec<Attachment>,
}

/// Returns the earliest `follow_up` user message that no `assistant_message`
/// answers via its `userMessageId`.
///
/// Nothing is returned while that message is still a local echo: it can only
/// be started once the store has assigned its real id.
pub fn next_follow_up(events: &[Event]) -> Option<PendingFollowUp> {
    let answered: HashSet<EventId> = events
        .iter()
        .filter(|event| event.kind == EventKind::AssistantMessage)
        .filter_map(Event::replied_user_message_id)
        .collect();

    events
        .iter()
        .filter(|event| event.kind == EventKind::UserMessage)
        .filter(|event| event.message_mode() == Some(MessageMode::FollowUp))
        .find(|event| !answered.contains(&event.id))
        .filter(|event| !event.id.is_local())
        .map(|event| PendingFollowUp {
            message_id: event.id.clone(),
            attachments: event
                .payload_as::<UserMessagePayload>()
                .map(|payload| payload.attachments)
                .unwrap_or_default(),
        })
}

/// Decides, on every event-list change, whether a queued follow-up should be
/// started.
///
/// Each follow-up is dispatched at most once. A run that fails before its
/// reply lands is not retried automatically.
#[derive(Debug, Default)]
pub struct FollowUpProcessor {
    dispatched: HashSet<EventId>,
}

impl FollowUpProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the follow-up to start now, if any, and records it as
    /// dispatched.
    pub fn poll(
        &mut self,
        events: &[Event],
        is_streaming: bool,
        conversation_selected: bool,
    ) -> Option<PendingFollowUp> {
        if is_streaming || !conversation_selected {
            return None;
        }
        let next = next_follow_up(events)?;
        if !self.dispatched.insert(next.message_id.clone()) {
            return None;
        }
        Some(next)
    }

    pub fn was_dispatched(&self, message_id: &EventId) -> bool {
        self.dispatched.contains(message_id)
    }

    /// Forgets dispatch history, e.g. when switching conversations.
    pub fn reset(&mut self) {
        self.dispatched.clear();
    }
}
