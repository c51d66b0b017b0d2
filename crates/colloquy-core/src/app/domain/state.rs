use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tokio_util::sync::CancellationToken;

use crate::app::domain::delta::StreamEvent;
use crate::app::domain::types::{EventId, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    /// A run was allocated and the gateway call is in flight.
    Starting,
    /// The gateway stream is open.
    Streaming,
    /// The previous run was cancelled for a steer message that is still
    /// being uploaded or appended.
    Steering,
}

/// Text buffer with a synchronous mirror and frame-batched commits.
///
/// `push` updates the mirror immediately; `take_commit` hands out the mirror
/// at most once per batch of changes.
#[derive(Debug, Clone, Default)]
pub struct TextAccumulator {
    mirror: String,
    dirty: bool,
}

impl TextAccumulator {
    pub fn push(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.mirror.push_str(delta);
        self.dirty = true;
    }

    pub fn latest(&self) -> &str {
        &self.mirror
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn take_commit(&mut self) -> Option<String> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.mirror.clone())
    }

    pub fn clear(&mut self) {
        self.mirror.clear();
        self.dirty = false;
    }
}

/// Committed view of the streaming session, as published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub run_id: RunId,
    pub phase: SessionPhase,
    pub is_streaming: bool,
    pub streaming_text: String,
    pub reasoning_text: String,
    pub pending_user_message_id: Option<EventId>,
    pub queue_next: bool,
}

/// The single streaming session of one conversation.
///
/// Every mutation that originates from an asynchronous continuation carries
/// the `RunId` it was created under and is ignored unless that run is still
/// the current one.
#[derive(Debug, Default)]
pub struct StreamingSession {
    run_id: RunId,
    phase: SessionPhase,
    is_streaming: bool,
    pending_user_message_id: Option<EventId>,
    queue_next: bool,
    text: TextAccumulator,
    reasoning: TextAccumulator,
    cancel: Option<CancellationToken>,
    committed_text: String,
    committed_reasoning: String,
}

impl StreamingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    /// Streaming, or between cancelling a run and starting its steer
    /// replacement.
    pub fn is_busy(&self) -> bool {
        self.is_streaming || self.phase == SessionPhase::Steering
    }

    pub fn is_current(&self, run_id: RunId) -> bool {
        self.run_id == run_id
    }

    pub fn pending_user_message_id(&self) -> Option<&EventId> {
        self.pending_user_message_id.as_ref()
    }

    pub fn queue_next(&self) -> bool {
        self.queue_next
    }

    pub fn latest_text(&self) -> &str {
        self.text.latest()
    }

    pub fn latest_reasoning(&self) -> &str {
        self.reasoning.latest()
    }

    /// Cancels the live run, if any, and moves past its `RunId` so that none
    /// of its continuations can apply.
    pub fn invalidate(&mut self) -> RunId {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.run_id = self.run_id.next();
        self.is_streaming = false;
        self.queue_next = false;
        self.clear_text();
        self.run_id
    }

    /// Cancels the live run for a steer message. The session stays marked as
    /// busy until the replacement run starts.
    pub fn begin_steer(&mut self) -> RunId {
        let run_id = self.invalidate();
        self.phase = SessionPhase::Steering;
        run_id
    }

    /// Allocates a fresh run. Any previous run is invalidated first.
    pub fn begin_run(&mut self, user_message_id: EventId) -> (RunId, CancellationToken) {
        self.invalidate();
        self.run_id = self.run_id.next();
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.phase = SessionPhase::Starting;
        self.is_streaming = true;
        self.pending_user_message_id = Some(user_message_id);
        (self.run_id, token)
    }

    pub fn mark_stream_open(&mut self, run_id: RunId) -> bool {
        if !self.is_current(run_id) || !self.is_streaming {
            return false;
        }
        self.phase = SessionPhase::Streaming;
        true
    }

    /// Applies a delta from `run_id`. Returns false for stale runs and for
    /// terminal events, which go through [`Self::reset`].
    pub fn apply_delta(&mut self, run_id: RunId, event: &StreamEvent) -> bool {
        if !self.is_current(run_id) || !self.is_streaming {
            return false;
        }
        match event {
            StreamEvent::TextDelta { delta } => self.text.push(delta),
            StreamEvent::ReasoningDelta { delta } => self.reasoning.push(delta),
            StreamEvent::Done | StreamEvent::Aborted | StreamEvent::Failed { .. } => return false,
        }
        true
    }

    pub fn set_queue_next(&mut self) {
        if self.is_streaming {
            self.queue_next = true;
        }
    }

    /// Ends `run_id`. Clears streaming flags and text; the pending user
    /// message id is cleared separately a frame later.
    pub fn reset(&mut self, run_id: RunId) -> bool {
        if !self.is_current(run_id) {
            return false;
        }
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        let was_live = self.is_streaming || self.phase != SessionPhase::Idle;
        self.is_streaming = false;
        self.queue_next = false;
        self.phase = SessionPhase::Idle;
        self.clear_text();
        was_live
    }

    pub fn clear_pending_after_reset(&mut self, run_id: RunId) -> bool {
        if !self.is_current(run_id) || self.is_streaming || self.phase != SessionPhase::Idle {
            return false;
        }
        self.pending_user_message_id.take().is_some()
    }

    /// Produces a snapshot if either buffer changed since the last commit.
    pub fn take_frame_commit(&mut self) -> Option<SessionSnapshot> {
        if !self.text.is_dirty() && !self.reasoning.is_dirty() {
            return None;
        }
        if let Some(text) = self.text.take_commit() {
            self.committed_text = text;
        }
        if let Some(reasoning) = self.reasoning.take_commit() {
            self.committed_reasoning = reasoning;
        }
        Some(self.committed())
    }

    /// Snapshot of what has been committed so far.
    pub fn committed(&self) -> SessionSnapshot {
        SessionSnapshot {
            run_id: self.run_id,
            phase: self.phase,
            is_streaming: self.is_streaming,
            streaming_text: self.committed_text.clone(),
            reasoning_text: self.committed_reasoning.clone(),
            pending_user_message_id: self.pending_user_message_id.clone(),
            queue_next: self.queue_next,
        }
    }

    /// Snapshot including text that has not been committed yet.
    pub fn latest(&self) -> SessionSnapshot {
        SessionSnapshot {
            streaming_text: self.text.latest().to_string(),
            reasoning_text: self.reasoning.latest().to_string(),
            ..self.committed()
        }
    }

    fn clear_text(&mut self) {
        self.text.clear();
        self.reasoning.clear();
        self.committed_text.clear();
        self.committed_reasoning.clear();
    }
}
