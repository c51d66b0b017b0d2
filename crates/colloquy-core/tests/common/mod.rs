use colloquy_core::EngineConfig;
use colloquy_core::app::domain::runtime::ConversationEngine;
use colloquy_core::app::domain::session::InMemoryEventStore;
use colloquy_core::app::domain::{ConversationId, DeviceId, Event, EventId, EventKind, NewEvent};
use colloquy_core::test_utils::{ScriptedGateway, ScriptedUploader};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(2);

pub struct Harness {
    pub conversation: ConversationId,
    pub store: Arc<InMemoryEventStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub uploader: Arc<ScriptedUploader>,
    pub engine: ConversationEngine,
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        device_id: Some(DeviceId::from("device-test")),
        frame_interval_ms: 1,
        ..EngineConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let conversation = ConversationId::from("conv-1");
    let store = Arc::new(InMemoryEventStore::new());
    let gateway = Arc::new(ScriptedGateway::new());
    let uploader = Arc::new(ScriptedUploader::new());
    let engine = ConversationEngine::new(
        conversation.clone(),
        store.clone(),
        gateway.clone(),
        uploader.clone(),
        &config,
    );
    Harness {
        conversation,
        store,
        gateway,
        uploader,
        engine,
    }
}

impl Harness {
    /// Commits the backend's confirmed reply to `user_message_id`.
    pub fn confirm_reply(&self, user_message_id: &EventId, text: &str) -> Event {
        self.store
            .commit(NewEvent {
                conversation_id: self.conversation.clone(),
                kind: EventKind::AssistantMessage,
                device_id: None,
                request_id: None,
                target_device_id: None,
                payload: json!({ "text": text, "userMessageId": user_message_id }),
            })
            .unwrap()
    }

    pub fn stored(&self) -> Vec<Event> {
        self.store.snapshot(&self.conversation).unwrap()
    }
}
