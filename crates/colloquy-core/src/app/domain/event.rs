//! Event log records and the typed payload views the projectors read.
//!
//! Events are immutable once committed. Payloads are kept as raw JSON so that
//! an event with a malformed payload can still be placed in its turn; each
//! projector parses only the view it needs and skips the event when that view
//! does not parse.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::app::domain::types::{
    AttachmentId, ConversationId, DeviceId, EventId, RequestId, TaskId, Timestamp,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserMessage,
    AssistantMessage,
    ToolRequest,
    ToolResult,
    TaskStarted,
    TaskProgress,
    TaskCompleted,
    TaskFailed,
    /// Domain-specific control event. Carried through untouched.
    #[serde(untagged)]
    Control(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::UserMessage => "user_message",
            EventKind::AssistantMessage => "assistant_message",
            EventKind::ToolRequest => "tool_request",
            EventKind::ToolResult => "tool_result",
            EventKind::TaskStarted => "task_started",
            EventKind::TaskProgress => "task_progress",
            EventKind::TaskCompleted => "task_completed",
            EventKind::TaskFailed => "task_failed",
            EventKind::Control(name) => name,
        }
    }

    pub fn is_tool_event(&self) -> bool {
        matches!(self, EventKind::ToolRequest | EventKind::ToolResult)
    }

    pub fn is_task_event(&self) -> bool {
        matches!(
            self,
            EventKind::TaskStarted
                | EventKind::TaskProgress
                | EventKind::TaskCompleted
                | EventKind::TaskFailed
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device_id: Option<DeviceId>,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn is(&self, kind: &EventKind) -> bool {
        &self.kind == kind
    }

    /// Parses the payload into a typed view. `None` means the payload is
    /// missing a field that view requires.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Option<T> {
        T::deserialize(&self.payload).ok()
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Correlation key: top-level `requestId`, else one nested in the payload.
    pub fn correlation_id(&self) -> Option<RequestId> {
        if let Some(id) = self.request_id.as_ref().filter(|id| !id.as_str().is_empty()) {
            return Some(id.clone());
        }
        ["requestId", "request_id"]
            .iter()
            .find_map(|key| self.payload_str(key))
            .filter(|id| !id.is_empty())
            .map(RequestId::from)
    }

    /// Tool name declared by a `tool_request` or echoed by a `tool_result`.
    pub fn tool_name(&self) -> Option<&str> {
        ["toolName", "tool_name", "tool"]
            .iter()
            .find_map(|key| self.payload_str(key))
            .filter(|name| !name.is_empty())
    }

    /// The user message an `assistant_message` answers.
    pub fn replied_user_message_id(&self) -> Option<EventId> {
        ["userMessageId", "user_message_id"]
            .iter()
            .find_map(|key| self.payload_str(key))
            .map(EventId::from)
    }

    pub fn message_mode(&self) -> Option<MessageMode> {
        self.payload
            .get("mode")
            .and_then(|mode| MessageMode::deserialize(mode).ok())
    }

    pub fn text(&self) -> &str {
        self.payload_str("text").unwrap_or_default()
    }
}

/// How a user message relates to a generation that was in flight when it was
/// sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageMode {
    /// Pre-empted the in-flight generation.
    Steer,
    /// Queued to run once the in-flight generation finishes.
    FollowUp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: AttachmentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessagePayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<MessageMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequestPayload {
    #[serde(alias = "tool_name", alias = "tool")]
    pub tool_name: String,
    #[serde(default, alias = "arguments", alias = "input")]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    #[serde(alias = "tool_name", alias = "tool")]
    pub tool_name: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<Value>,
}

impl ToolResultPayload {
    /// A result is an error only when it carries a non-empty error field.
    pub fn is_error(&self) -> bool {
        match &self.error {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(Value::String(message)) => !message.trim().is_empty(),
            Some(Value::Object(fields)) => !fields.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStartedPayload {
    #[serde(alias = "task_id")]
    pub task_id: TaskId,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "agent_type")]
    pub agent_type: Option<String>,
    #[serde(default, alias = "parent_task_id")]
    pub parent_task_id: Option<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdatePayload {
    #[serde(alias = "task_id")]
    pub task_id: TaskId,
    #[serde(default, alias = "message", alias = "statusText")]
    pub progress: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// An event the client asks the store to append. The store assigns id and
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub conversation_id: ConversationId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device_id: Option<DeviceId>,
    pub payload: Value,
}

impl NewEvent {
    pub fn user_message(
        conversation_id: ConversationId,
        device_id: Option<DeviceId>,
        payload: &UserMessagePayload,
    ) -> Self {
        Self {
            conversation_id,
            kind: EventKind::UserMessage,
            device_id,
            request_id: None,
            target_device_id: None,
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    pub fn into_event(self, id: EventId, timestamp: Timestamp) -> Event {
        Event {
            id,
            timestamp,
            kind: self.kind,
            device_id: self.device_id,
            request_id: self.request_id,
            target_device_id: self.target_device_id,
            payload: self.payload,
        }
    }
}
