use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::app::domain::event::Event;
use crate::app::domain::followup::FollowUpProcessor;
use crate::app::domain::runtime::attachments::AttachmentUploader;
use crate::app::domain::runtime::controller::{
    ControllerConfig, SendOutcome, SendRequest, StreamingController,
};
use crate::app::domain::runtime::gateway::ModelGateway;
use crate::app::domain::session::{ConversationLog, EventStore};
use crate::app::domain::state::SessionSnapshot;
use crate::app::domain::title::TitleOptions;
use crate::app::domain::transcript::{Transcript, build_transcript};
use crate::app::domain::types::ConversationId;
use crate::config::EngineConfig;
use crate::error::Result;

/// Everything one open conversation needs: the optimistic log, the streaming
/// controller and the follow-up queue.
pub struct ConversationEngine {
    log: Arc<ConversationLog>,
    controller: StreamingController,
    follow_ups: Mutex<FollowUpProcessor>,
    selected: AtomicBool,
    title_options: TitleOptions,
}

impl ConversationEngine {
    pub fn new(
        conversation_id: ConversationId,
        store: Arc<dyn EventStore>,
        gateway: Arc<dyn ModelGateway>,
        uploader: Arc<dyn AttachmentUploader>,
        config: &EngineConfig,
    ) -> Self {
        let log = Arc::new(ConversationLog::new(
            conversation_id,
            store,
            config.page_size,
        ));
        let controller = StreamingController::new(
            Arc::clone(&log),
            gateway,
            uploader,
            ControllerConfig::from(config),
        );
        Self {
            log,
            controller,
            follow_ups: Mutex::new(FollowUpProcessor::new()),
            selected: AtomicBool::new(true),
            title_options: config.title_options(),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        self.log.conversation_id()
    }

    pub fn controller(&self) -> &StreamingController {
        &self.controller
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.controller.subscribe()
    }

    pub fn select(&self) {
        self.selected.store(true, Ordering::SeqCst);
    }

    /// Stops follow-ups from starting while another conversation is shown.
    /// A live run keeps streaming.
    pub fn deselect(&self) {
        self.selected.store(false, Ordering::SeqCst);
    }

    pub fn is_selected(&self) -> bool {
        self.selected.load(Ordering::SeqCst)
    }

    /// Reloads the confirmed log and reacts to whatever changed.
    pub async fn refresh(&self) -> Result<Transcript> {
        let events = self.log.refresh().await?;
        Ok(self.on_events_changed(&events))
    }

    /// Runs reconciliation and the follow-up queue over `events`, then
    /// rebuilds the transcript.
    ///
    /// A follow-up started here runs on the current tokio runtime; see
    /// [`StreamingController::start`].
    pub fn on_events_changed(&self, events: &[Event]) -> Transcript {
        self.controller.reconcile(events);

        let next = self
            .follow_ups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .poll(events, self.controller.is_busy(), self.is_selected());
        if let Some(follow_up) = next {
            tracing::info!(
                conversation_id = %self.conversation_id(),
                message_id = %follow_up.message_id,
                "Starting queued follow-up"
            );
            self.controller
                .start(follow_up.message_id, follow_up.attachments);
        }

        build_transcript(events, self.title_options)
    }

    pub async fn send(&self, request: SendRequest) -> Result<SendOutcome> {
        let outcome = self.controller.send_message(request).await?;
        self.on_events_changed(&self.log.events());
        Ok(outcome)
    }

    /// Transcript of the merged view, without touching the store.
    pub fn transcript(&self) -> Transcript {
        build_transcript(&self.log.events(), self.title_options)
    }

    /// Stops the live run and forgets local state, e.g. on conversation
    /// switch.
    pub fn close(&self) {
        self.controller.cancel();
        self.log.clear();
        self.follow_ups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        self.deselect();
    }
}
