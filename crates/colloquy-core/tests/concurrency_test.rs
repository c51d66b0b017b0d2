mod common;

use async_trait::async_trait;
use colloquy_core::Error;
use colloquy_core::app::domain::runtime::{ConversationEngine, SendRequest};
use colloquy_core::app::domain::session::{
    EventPage, EventStore, EventStoreError, InMemoryEventStore, Page,
};
use colloquy_core::app::domain::{ConversationId, EventId, MessageMode, NewEvent, StreamEvent};
use colloquy_core::test_utils::{ScriptedGateway, ScriptedUploader, wait_for};
use common::{WAIT, test_config};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Store whose appends can be held at the door and released one at a time.
/// Whether a held append fails is decided when it is released.
#[derive(Default)]
struct GatedStore {
    inner: InMemoryEventStore,
    hold: AtomicBool,
    reject: AtomicBool,
    waiting: AtomicUsize,
    gate: Notify,
}

impl GatedStore {
    fn hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    fn release(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
        self.gate.notify_one();
    }

    fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for GatedStore {
    async fn list_events(
        &self,
        conversation_id: &ConversationId,
        page: Page,
    ) -> Result<EventPage, EventStoreError> {
        self.inner.list_events(conversation_id, page).await
    }

    async fn append_event(&self, event: NewEvent) -> Result<EventId, EventStoreError> {
        if self.hold.load(Ordering::SeqCst) {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            if self.reject.load(Ordering::SeqCst) {
                return Err(EventStoreError::rejected("quota exceeded"));
            }
        }
        self.inner.append_event(event).await
    }
}

struct Setup {
    store: Arc<GatedStore>,
    gateway: Arc<ScriptedGateway>,
    engine: Arc<ConversationEngine>,
}

fn setup() -> Setup {
    let store = Arc::new(GatedStore::default());
    let gateway = Arc::new(ScriptedGateway::new());
    let engine = Arc::new(ConversationEngine::new(
        ConversationId::from("conv-gated"),
        store.clone(),
        gateway.clone(),
        Arc::new(ScriptedUploader::new()),
        &test_config(),
    ));
    Setup {
        store,
        gateway,
        engine,
    }
}

#[tokio::test]
async fn queued_echo_is_not_started_before_its_append_resolves() {
    let Setup {
        store,
        gateway,
        engine,
    } = setup();
    let controller = engine.controller().clone();
    let first_stream = gateway.push_channel();

    engine.send(SendRequest::text("first")).await.unwrap();
    assert!(wait_for(WAIT, || gateway.request_count() == 1).await);
    assert!(controller.is_streaming());

    store.hold(true);
    let queued = tokio::spawn({
        let engine = engine.clone();
        async move { engine.send(SendRequest::queued("second")).await }
    });
    assert!(wait_for(WAIT, || store.waiting() == 1).await);
    assert!(engine.log().events().iter().any(|e| e.id.is_local()));

    gateway.push_events(vec![StreamEvent::Done]);
    first_stream.send(StreamEvent::Done).unwrap();
    assert!(wait_for(WAIT, || !controller.is_streaming()).await);

    // The run settled while the queued message only exists as an echo.
    engine.on_events_changed(&engine.log().events());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(gateway.request_count(), 1);
    assert!(!controller.is_busy());

    store.hold(false);
    store.release(false);
    let second = queued.await.unwrap().unwrap();
    assert_eq!(second.mode, Some(MessageMode::FollowUp));
    assert!(!second.message_id.is_local());

    assert!(wait_for(WAIT, || gateway.request_count() == 2).await);
    let requests = gateway.requests();
    assert_eq!(requests[1].user_message_id, second.message_id);
    assert!(requests.iter().all(|r| !r.user_message_id.is_local()));

    // The confirmed id was dispatched once; later changes do not restart it.
    assert!(wait_for(WAIT, || !controller.is_streaming()).await);
    engine.refresh().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(gateway.request_count(), 2);
}

#[tokio::test]
async fn failed_steer_append_leaves_a_newer_steer_running() {
    let Setup {
        store,
        gateway,
        engine,
    } = setup();
    let controller = engine.controller().clone();
    let _first_stream = gateway.push_channel();
    let newer_stream = gateway.push_channel();

    engine.send(SendRequest::text("first")).await.unwrap();
    assert!(wait_for(WAIT, || gateway.request_count() == 1).await);

    store.hold(true);
    let older = tokio::spawn({
        let engine = engine.clone();
        async move { engine.send(SendRequest::text("steer one way")).await }
    });
    assert!(wait_for(WAIT, || store.waiting() == 1).await);
    store.hold(false);

    let newer = engine
        .send(SendRequest::text("no, the other way"))
        .await
        .unwrap();
    assert_eq!(newer.mode, Some(MessageMode::Steer));
    let newer_run = newer.run_id.unwrap();

    store.release(true);
    let result = older.await.unwrap();
    assert!(matches!(
        result,
        Err(Error::EventStore(EventStoreError::Rejected { .. }))
    ));

    assert!(controller.is_streaming());
    assert_eq!(controller.current_run(), newer_run);
    assert_eq!(
        controller.pending_user_message_id(),
        Some(newer.message_id.clone())
    );

    newer_stream.send(StreamEvent::text("ok")).unwrap();
    assert!(wait_for(WAIT, || controller.latest_text() == "ok").await);
    assert_eq!(gateway.request_count(), 2);
    assert_eq!(gateway.requests()[1].user_message_id, newer.message_id);
}

#[tokio::test]
async fn late_steer_append_does_not_replace_a_newer_run() {
    let Setup {
        store,
        gateway,
        engine,
    } = setup();
    let controller = engine.controller().clone();
    let _first_stream = gateway.push_channel();
    let newer_stream = gateway.push_channel();

    engine.send(SendRequest::text("first")).await.unwrap();
    assert!(wait_for(WAIT, || gateway.request_count() == 1).await);

    store.hold(true);
    let older = tokio::spawn({
        let engine = engine.clone();
        async move { engine.send(SendRequest::text("steer one way")).await }
    });
    assert!(wait_for(WAIT, || store.waiting() == 1).await);
    store.hold(false);

    let newer = engine
        .send(SendRequest::text("no, the other way"))
        .await
        .unwrap();
    let newer_run = newer.run_id.unwrap();

    store.release(false);
    let older = older.await.unwrap().unwrap();
    assert_eq!(older.mode, Some(MessageMode::Steer));
    assert_eq!(older.run_id, None);

    assert_eq!(controller.current_run(), newer_run);
    newer_stream.send(StreamEvent::text("still here")).unwrap();
    assert!(wait_for(WAIT, || controller.latest_text() == "still here").await);
    assert_eq!(gateway.request_count(), 2);
}

#[tokio::test]
async fn cancelled_steer_does_not_start_after_its_append() {
    let Setup {
        store,
        gateway,
        engine,
    } = setup();
    let controller = engine.controller().clone();
    let _first_stream = gateway.push_channel();

    engine.send(SendRequest::text("first")).await.unwrap();
    assert!(wait_for(WAIT, || gateway.request_count() == 1).await);

    store.hold(true);
    let steer = tokio::spawn({
        let engine = engine.clone();
        async move { engine.send(SendRequest::text("change of plan")).await }
    });
    assert!(wait_for(WAIT, || store.waiting() == 1).await);

    assert!(controller.cancel());
    store.hold(false);
    store.release(false);

    let steer = steer.await.unwrap().unwrap();
    assert_eq!(steer.run_id, None);
    assert!(!controller.is_busy());
    assert_eq!(gateway.request_count(), 1);
}
