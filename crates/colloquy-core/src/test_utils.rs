//! Test utilities for colloquy-core
//!
//! Scripted collaborators and event fixtures shared by unit tests,
//! integration tests and the CLI's replay tests.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::app::domain::delta::StreamEvent;
use crate::app::domain::event::{Attachment, Event, EventKind};
use crate::app::domain::runtime::{
    AttachmentError, AttachmentUploader, ChatRequest, ChatStream, CreateAttachment, GatewayError,
    ModelGateway, PendingAttachment,
};
use crate::app::domain::types::{AttachmentId, EventId, RequestId, Timestamp};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Script {
    Events(Vec<StreamEvent>),
    Channel(mpsc::UnboundedReceiver<StreamEvent>),
    Reject(String),
}

/// Model gateway that replays queued scripts, one per `stream_chat` call.
///
/// With nothing queued, the stream stays open until its run is cancelled.
#[derive(Default)]
pub struct ScriptedGateway {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_events(&self, events: Vec<StreamEvent>) {
        lock(&self.scripts).push_back(Script::Events(events));
    }

    /// Queues a stream fed by the returned sender. Dropping the sender ends
    /// the stream.
    pub fn push_channel(&self) -> mpsc::UnboundedSender<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.scripts).push_back(Script::Channel(rx));
        tx
    }

    pub fn push_rejection(&self, message: impl Into<String>) {
        lock(&self.scripts).push_back(Script::Reject(message.into()));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatStream, GatewayError> {
        lock(&self.requests).push(request);
        let script = lock(&self.scripts).pop_front();

        let stream = match script {
            Some(Script::Reject(message)) => return Err(GatewayError::rejected(message)),
            Some(Script::Events(events)) => futures::stream::iter(events).boxed(),
            Some(Script::Channel(rx)) => UnboundedReceiverStream::new(rx).boxed(),
            None => futures::stream::pending::<StreamEvent>().boxed(),
        };
        Ok(stream.take_until(cancel.cancelled_owned()).boxed())
    }
}

/// Uploader that fails any data URL containing `fail` and returns nothing
/// for one containing `empty`.
#[derive(Default)]
pub struct ScriptedUploader {
    calls: AtomicUsize,
    uploaded: AtomicUsize,
}

impl ScriptedUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttachmentUploader for ScriptedUploader {
    async fn create_attachment(
        &self,
        request: CreateAttachment,
    ) -> Result<Option<Attachment>, AttachmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if request.data_url.contains("fail") {
            return Err(AttachmentError::upload("scripted failure"));
        }
        if request.data_url.contains("empty") {
            return Ok(None);
        }

        let n = self.uploaded.fetch_add(1, Ordering::SeqCst) + 1;
        let mime_type = PendingAttachment::new(request.data_url.clone())
            .mime_type()
            .map(str::to_string);
        Ok(Some(Attachment {
            id: AttachmentId::from(format!("att-{n}")),
            url: Some(format!("https://files.test/att-{n}")),
            mime_type,
        }))
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub mod fixtures {
    //! Committed events for tests, built the way the backend stores them.

    use super::{Event, EventId, EventKind, RequestId, Timestamp, Value, json};

    pub fn event(id: &str, timestamp: Timestamp, kind: EventKind, payload: Value) -> Event {
        Event {
            id: EventId::from(id),
            timestamp,
            kind,
            device_id: None,
            request_id: None,
            target_device_id: None,
            payload,
        }
    }

    pub fn user(id: &str, timestamp: Timestamp, text: &str) -> Event {
        event(id, timestamp, EventKind::UserMessage, json!({ "text": text }))
    }

    pub fn follow_up(id: &str, timestamp: Timestamp, text: &str) -> Event {
        event(
            id,
            timestamp,
            EventKind::UserMessage,
            json!({ "text": text, "mode": "follow_up" }),
        )
    }

    pub fn assistant(id: &str, timestamp: Timestamp, text: &str, reply_to: Option<&str>) -> Event {
        let mut payload = json!({ "text": text });
        if let Some(reply_to) = reply_to {
            payload["userMessageId"] = json!(reply_to);
        }
        event(id, timestamp, EventKind::AssistantMessage, payload)
    }

    pub fn tool_request(id: &str, timestamp: Timestamp, tool: &str, request_id: &str, args: Value) -> Event {
        Event {
            request_id: Some(RequestId::from(request_id)),
            ..event(
                id,
                timestamp,
                EventKind::ToolRequest,
                json!({ "toolName": tool, "args": args }),
            )
        }
    }

    pub fn tool_result(id: &str, timestamp: Timestamp, tool: &str, request_id: &str) -> Event {
        Event {
            request_id: Some(RequestId::from(request_id)),
            ..event(
                id,
                timestamp,
                EventKind::ToolResult,
                json!({ "toolName": tool, "result": "ok" }),
            )
        }
    }

    pub fn tool_error(id: &str, timestamp: Timestamp, tool: &str, request_id: &str, error: &str) -> Event {
        Event {
            request_id: Some(RequestId::from(request_id)),
            ..event(
                id,
                timestamp,
                EventKind::ToolResult,
                json!({ "toolName": tool, "error": error }),
            )
        }
    }
}
