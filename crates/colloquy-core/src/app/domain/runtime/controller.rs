use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::app::domain::delta::{RunOutcome, StreamEvent};
use crate::app::domain::event::{
    Attachment, Event, EventKind, MessageMode, NewEvent, UserMessagePayload,
};
use crate::app::domain::runtime::attachments::{
    AttachmentUploader, PendingAttachment, upload_pending,
};
use crate::app::domain::runtime::gateway::{ChatRequest, ModelGateway};
use crate::app::domain::session::ConversationLog;
use crate::app::domain::state::{SessionPhase, SessionSnapshot, StreamingSession};
use crate::app::domain::types::{ConversationId, DeviceId, EventId, RunId};
use crate::config::EngineConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub device_id: Option<DeviceId>,
    /// How often accumulated text is committed to subscribers.
    pub frame_interval: Duration,
    /// Text prefix that queues a message instead of steering. Stripped before
    /// the message is stored. Empty disables prefix detection.
    pub follow_up_prefix: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ControllerConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            device_id: config.device_id.clone(),
            frame_interval: config.frame_interval(),
            follow_up_prefix: config.follow_up_prefix.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub text: String,
    /// Queue behind the live run instead of steering it.
    #[serde(default)]
    pub queue: bool,
    #[serde(default)]
    pub attachments: Vec<PendingAttachment>,
}

impl SendRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn queued(text: impl Into<String>) -> Self {
        Self {
            queue: true,
            ..Self::text(text)
        }
    }

    pub fn with_attachment(mut self, attachment: PendingAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub message_id: EventId,
    /// `None` when nothing was streaming at send time.
    pub mode: Option<MessageMode>,
    /// The run started for this message. Queued messages start no run.
    pub run_id: Option<RunId>,
}

/// Owns the single streaming session of one conversation.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct StreamingController {
    inner: Arc<Inner>,
}

struct Inner {
    conversation_id: ConversationId,
    config: ControllerConfig,
    log: Arc<ConversationLog>,
    gateway: Arc<dyn ModelGateway>,
    uploader: Arc<dyn AttachmentUploader>,
    session: Mutex<StreamingSession>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl StreamingController {
    pub fn new(
        log: Arc<ConversationLog>,
        gateway: Arc<dyn ModelGateway>,
        uploader: Arc<dyn AttachmentUploader>,
        config: ControllerConfig,
    ) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                conversation_id: log.conversation_id().clone(),
                config,
                log,
                gateway,
                uploader,
                session: Mutex::new(StreamingSession::new()),
                snapshots,
            }),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.inner.conversation_id
    }

    /// Committed snapshots, at most one per frame while text is streaming.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Last committed snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Snapshot including text not yet committed to subscribers.
    pub fn latest(&self) -> SessionSnapshot {
        self.inner.session().latest()
    }

    pub fn latest_text(&self) -> String {
        self.inner.session().latest_text().to_string()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.session().is_streaming()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.session().is_busy()
    }

    pub fn current_run(&self) -> RunId {
        self.inner.session().run_id()
    }

    pub fn pending_user_message_id(&self) -> Option<EventId> {
        self.inner.session().pending_user_message_id().cloned()
    }

    /// Starts a run for an already-appended user message. Any live run is
    /// invalidated first.
    ///
    /// The run is driven on the current tokio runtime. Called outside one,
    /// the run is reset immediately and a warning is logged.
    pub fn start(&self, user_message_id: EventId, attachments: Vec<Attachment>) -> RunId {
        self.inner.start(user_message_id, attachments)
    }

    /// Applies one stream event on behalf of `run_id`. Returns false when the
    /// run is stale.
    pub fn handle_stream_event(&self, run_id: RunId, event: &StreamEvent) -> bool {
        self.inner.handle_stream_event(run_id, event)
    }

    /// Returns the session to idle if `run_id` is still current.
    pub fn reset_streaming_state(&self, run_id: RunId) -> bool {
        self.inner.reset_streaming_state(run_id)
    }

    /// Stops whatever is in flight.
    pub fn cancel(&self) -> bool {
        let run_id = self.current_run();
        let reset = self.inner.reset_streaming_state(run_id);
        if reset {
            tracing::info!(
                conversation_id = %self.inner.conversation_id,
                run_id = %run_id,
                "Run cancelled"
            );
        }
        reset
    }

    /// Ends the live run once the confirmed reply to its user message is in
    /// the log.
    pub fn reconcile(&self, events: &[Event]) -> bool {
        self.inner.reconcile(events)
    }

    pub async fn send_message(&self, request: SendRequest) -> Result<SendOutcome> {
        self.inner.send_message(request).await
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, StreamingSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: SessionSnapshot) {
        self.snapshots.send_replace(snapshot);
    }

    fn publish_committed(&self) {
        let snapshot = self.session().committed();
        self.publish(snapshot);
    }

    fn start(self: &Arc<Self>, user_message_id: EventId, attachments: Vec<Attachment>) -> RunId {
        let (run_id, token) = self.session().begin_run(user_message_id.clone());
        self.launch(run_id, token, user_message_id, attachments);
        run_id
    }

    /// Starts the run for a steer message, but only if `expected` is still the
    /// steering run. Returns `None` when a newer run took over or the steer
    /// was cancelled in the meantime.
    fn start_steered(
        self: &Arc<Self>,
        expected: RunId,
        user_message_id: EventId,
        attachments: Vec<Attachment>,
    ) -> Option<RunId> {
        let (run_id, token) = {
            let mut session = self.session();
            if !session.is_current(expected) || session.phase() != SessionPhase::Steering {
                return None;
            }
            session.begin_run(user_message_id.clone())
        };
        self.launch(run_id, token, user_message_id, attachments);
        Some(run_id)
    }

    fn launch(
        self: &Arc<Self>,
        run_id: RunId,
        token: CancellationToken,
        user_message_id: EventId,
        attachments: Vec<Attachment>,
    ) {
        self.publish_committed();

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                conversation_id = %self.conversation_id,
                run_id = %run_id,
                "No async runtime, run not started"
            );
            self.reset_streaming_state(run_id);
            return;
        };

        tracing::info!(
            conversation_id = %self.conversation_id,
            run_id = %run_id,
            message_id = %user_message_id,
            attachments = attachments.len(),
            "Starting run"
        );

        let request = ChatRequest {
            conversation_id: self.conversation_id.clone(),
            user_message_id,
            attachments,
        };
        let inner = Arc::clone(self);
        handle.spawn(async move { inner.drive_run(run_id, token, request).await });
    }

    async fn drive_run(self: Arc<Self>, run_id: RunId, token: CancellationToken, request: ChatRequest) {
        let opened = tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::debug!(run_id = %run_id, "Run cancelled before the stream opened");
                return;
            }
            opened = self.gateway.stream_chat(request, token.clone()) => opened,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(
                    conversation_id = %self.conversation_id,
                    run_id = %run_id,
                    error = %err,
                    "Model gateway rejected the run"
                );
                self.finish(run_id, RunOutcome::Failed(err.to_string()));
                return;
            }
        };

        if !self.session().mark_stream_open(run_id) {
            return;
        }
        self.publish_committed();

        let frame = self.config.frame_interval;
        let mut frames = interval_at(Instant::now() + frame, frame);
        frames.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break RunOutcome::Superseded,
                item = stream.next() => match item {
                    Some(StreamEvent::Done) | None => break RunOutcome::Completed,
                    Some(StreamEvent::Aborted) => break RunOutcome::Aborted,
                    Some(StreamEvent::Failed { message }) => break RunOutcome::Failed(message),
                    Some(delta) => {
                        if !self.session().apply_delta(run_id, &delta) {
                            break RunOutcome::Superseded;
                        }
                    }
                },
                _ = frames.tick() => self.commit_frame(run_id),
            }
        };

        self.finish(run_id, outcome);
    }

    fn commit_frame(&self, run_id: RunId) {
        let commit = {
            let mut session = self.session();
            if !session.is_current(run_id) {
                return;
            }
            session.take_frame_commit()
        };
        if let Some(snapshot) = commit {
            self.publish(snapshot);
        }
    }

    fn handle_stream_event(self: &Arc<Self>, run_id: RunId, event: &StreamEvent) -> bool {
        let outcome = match event {
            StreamEvent::Done => RunOutcome::Completed,
            StreamEvent::Aborted => RunOutcome::Aborted,
            StreamEvent::Failed { message } => RunOutcome::Failed(message.clone()),
            StreamEvent::TextDelta { .. } | StreamEvent::ReasoningDelta { .. } => {
                return self.session().apply_delta(run_id, event);
            }
        };
        self.finish(run_id, outcome)
    }

    fn finish(self: &Arc<Self>, run_id: RunId, outcome: RunOutcome) -> bool {
        if outcome == RunOutcome::Superseded {
            tracing::debug!(run_id = %run_id, "Run superseded");
            return false;
        }

        {
            let session = self.session();
            if !session.is_current(run_id) {
                return false;
            }
            if outcome == RunOutcome::Completed && session.latest_text().is_empty() {
                tracing::debug!(run_id = %run_id, "Run completed with an empty response");
            }
        }

        match &outcome {
            RunOutcome::Failed(message) => tracing::warn!(
                conversation_id = %self.conversation_id,
                run_id = %run_id,
                error = %message,
                "Run failed"
            ),
            _ => tracing::info!(
                conversation_id = %self.conversation_id,
                run_id = %run_id,
                outcome = ?outcome,
                "Run finished"
            ),
        }

        self.reset_streaming_state(run_id)
    }

    fn reset_streaming_state(self: &Arc<Self>, run_id: RunId) -> bool {
        let snapshot = {
            let mut session = self.session();
            if !session.reset(run_id) {
                return false;
            }
            session.committed()
        };
        self.publish(snapshot);
        self.schedule_pending_clear(run_id);
        true
    }

    /// Clears the pending user-message id one frame after a reset, so the
    /// confirmed reply can replace the live preview without a gap.
    fn schedule_pending_clear(self: &Arc<Self>, run_id: RunId) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.clear_pending(run_id);
            return;
        };
        let frame = self.config.frame_interval;
        let inner = Arc::downgrade(self);
        handle.spawn(async move {
            tokio::time::sleep(frame).await;
            if let Some(inner) = inner.upgrade() {
                inner.clear_pending(run_id);
            }
        });
    }

    fn clear_pending(&self, run_id: RunId) {
        let snapshot = {
            let mut session = self.session();
            if !session.clear_pending_after_reset(run_id) {
                return;
            }
            session.committed()
        };
        self.publish(snapshot);
    }

    fn reconcile(self: &Arc<Self>, events: &[Event]) -> bool {
        let run_id = {
            let session = self.session();
            if !session.is_streaming() {
                return false;
            }
            let Some(pending) = session.pending_user_message_id() else {
                return false;
            };
            let pending = self.log.resolve_id(pending);
            let answered = events.iter().any(|event| {
                event.kind == EventKind::AssistantMessage
                    && event.replied_user_message_id().as_ref() == Some(&pending)
            });
            if !answered {
                return false;
            }
            session.run_id()
        };

        tracing::info!(
            conversation_id = %self.conversation_id,
            run_id = %run_id,
            outcome = ?RunOutcome::Reconciled,
            "Confirmed reply arrived, ending run"
        );
        self.reset_streaming_state(run_id)
    }

    async fn send_message(self: &Arc<Self>, request: SendRequest) -> Result<SendOutcome> {
        let SendRequest {
            text,
            mut queue,
            attachments,
        } = request;

        let prefix = self.config.follow_up_prefix.as_str();
        let text = match text.strip_prefix(prefix) {
            Some(rest) if !prefix.is_empty() => {
                queue = true;
                rest.to_string()
            }
            _ => text,
        };

        if text.trim().is_empty() && attachments.is_empty() {
            return Err(Error::InvalidOperation(
                "Cannot send an empty message".to_string(),
            ));
        }

        // `steer_run` fences everything this send does after its append.
        let (mode, steer_run) = {
            let mut session = self.session();
            if !session.is_busy() {
                (None, None)
            } else if queue {
                session.set_queue_next();
                (Some(MessageMode::FollowUp), None)
            } else {
                let run_id = session.begin_steer();
                tracing::debug!(run_id = %run_id, "Steering: live run cancelled");
                (Some(MessageMode::Steer), Some(run_id))
            }
        };
        if mode.is_some() {
            self.publish_committed();
        }

        let uploaded = upload_pending(
            self.uploader.as_ref(),
            &self.conversation_id,
            self.config.device_id.as_ref(),
            &attachments,
        )
        .await;

        let payload = UserMessagePayload {
            text,
            mode,
            attachments: uploaded.clone(),
        };
        let event = NewEvent::user_message(
            self.conversation_id.clone(),
            self.config.device_id.clone(),
            &payload,
        );

        let message_id = match self.log.append(event).await {
            Ok(id) => id,
            Err(err) => {
                if let Some(run_id) = steer_run {
                    self.reset_streaming_state(run_id);
                }
                return Err(err.into());
            }
        };

        tracing::debug!(
            conversation_id = %self.conversation_id,
            message_id = %message_id,
            mode = ?mode,
            "User message appended"
        );

        let run_id = match (mode, steer_run) {
            (Some(MessageMode::FollowUp), _) => None,
            (_, Some(expected)) => {
                let started = self.start_steered(expected, message_id.clone(), uploaded);
                if started.is_none() {
                    tracing::debug!(
                        message_id = %message_id,
                        "Steer superseded by a newer run, not starting"
                    );
                }
                started
            }
            _ => Some(self.start(message_id.clone(), uploaded)),
        };

        Ok(SendOutcome {
            message_id,
            mode,
            run_id,
        })
    }
}
