//! Turn reconstruction.
//!
//! A single forward pass groups a chronological event list into turns. A turn
//! opens at a `user_message` and absorbs the tool traffic and the first
//! `assistant_message` that follow it, until the next `user_message`. Steps
//! are projected per turn, over that turn's own tool events.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app::domain::event::{Event, EventKind};
use crate::app::domain::steps::{Step, project_steps};
use crate::app::domain::tasks::{Task, project_tasks};
use crate::app::domain::title::TitleOptions;
use crate::app::domain::types::EventId;

const SYNTHETIC_USER_PREFIX: &str = "synthetic-user-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: EventId,
    pub user_message: Event,
    pub assistant_message: Option<Event>,
    pub tool_events: Vec<Event>,
    pub steps: Vec<Step>,
    /// True when the turn was opened by an assistant message with no user
    /// message before it (e.g. a welcome message).
    pub synthetic: bool,
}

impl Turn {
    fn open(user_message: Event) -> Self {
        Self {
            id: user_message.id.clone(),
            user_message,
            assistant_message: None,
            tool_events: Vec::new(),
            steps: Vec::new(),
            synthetic: false,
        }
    }

    fn synthetic_for(assistant: &Event) -> Self {
        let user_message = Event {
            id: synthetic_user_id(&assistant.id),
            timestamp: assistant.timestamp,
            kind: EventKind::UserMessage,
            device_id: None,
            request_id: None,
            target_device_id: None,
            payload: json!({ "text": "" }),
        };
        Self {
            synthetic: true,
            ..Self::open(user_message)
        }
    }

    pub fn is_answered(&self) -> bool {
        self.assistant_message.is_some()
    }
}

/// Deterministic id for the empty user message of a synthetic turn.
pub fn synthetic_user_id(assistant_id: &EventId) -> EventId {
    EventId::from(format!("{SYNTHETIC_USER_PREFIX}{assistant_id}"))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub turns: Vec<Turn>,
    pub tasks: Vec<Task>,
}

/// Groups `events` (oldest first) into turns.
///
/// Pure: the same list always yields the same turns. Tool events that occur
/// before any turn is open belong to no turn. Control and task events are not
/// placed in turns.
pub fn reconstruct_turns(events: &[Event], options: TitleOptions) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();

    for event in events {
        match event.kind {
            EventKind::UserMessage => turns.push(Turn::open(event.clone())),
            EventKind::AssistantMessage => match turns.last_mut() {
                Some(open) if open.assistant_message.is_none() => {
                    open.assistant_message = Some(event.clone());
                }
                _ => {
                    let mut turn = Turn::synthetic_for(event);
                    turn.assistant_message = Some(event.clone());
                    turns.push(turn);
                }
            },
            EventKind::ToolRequest | EventKind::ToolResult => match turns.last_mut() {
                Some(open) => open.tool_events.push(event.clone()),
                None => {
                    tracing::trace!(event_id = %event.id, "Tool event before any turn, not placed");
                }
            },
            _ => {}
        }
    }

    for turn in &mut turns {
        turn.steps = project_steps(&turn.tool_events, options);
    }

    turns
}

pub fn build_transcript(events: &[Event], options: TitleOptions) -> Transcript {
    Transcript {
        turns: reconstruct_turns(events, options),
        tasks: project_tasks(events),
    }
}
