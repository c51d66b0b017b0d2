#[cfg(test)]
mod tests {
    use crate::app::domain::event::{Event, EventKind};
    use crate::app::domain::session::{
        ConversationLog, EventPage, EventStore, InMemoryEventStore, ListOrder,
    };
    use crate::app::domain::steps::StepStatus;
    use crate::app::domain::title::TitleOptions;
    use crate::app::domain::transcript::{Transcript, build_transcript};
    use crate::app::domain::types::ConversationId;
    use crate::test_utils::fixtures::{assistant, tool_error, tool_request, tool_result, user};
    use serde_json::json;
    use std::sync::Arc;

    fn conversation() -> Vec<Event> {
        vec![
            user("u1", 1, "fix the build"),
            tool_request("t1", 2, "read", "r1", json!({ "path": "/src/main.rs" })),
            tool_request("t2", 3, "bash", "r2", json!({ "command": "cargo build" })),
            tool_result("t3", 4, "read", "r1"),
            tool_error("t4", 5, "bash", "r2", "exit 101"),
            assistant("a1", 6, "the build is broken", Some("u1")),
            user("u2", 7, "try again"),
            tool_request("t5", 8, "bash", "r3", json!({ "command": "cargo build" })),
        ]
    }

    fn replay(events: &[Event]) -> Transcript {
        build_transcript(events, TitleOptions::default())
    }

    #[test]
    fn replay_is_deterministic() {
        let events = conversation();
        assert_eq!(replay(&events), replay(&events));
    }

    #[test]
    fn replay_of_the_sample_log() {
        let transcript = replay(&conversation());
        assert_eq!(transcript.turns.len(), 2);

        let first = &transcript.turns[0];
        let statuses: Vec<StepStatus> = first.steps.iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![StepStatus::Completed, StepStatus::Error]);
        assert_eq!(first.steps[0].title, "Read main.rs");

        let second = &transcript.turns[1];
        assert!(second.assistant_message.is_none());
        assert_eq!(second.steps[0].status, StepStatus::Running);
    }

    #[test]
    fn newest_first_page_replays_like_oldest_first() {
        let events = conversation();
        let mut reversed = events.clone();
        reversed.reverse();

        let page = EventPage {
            events: reversed,
            order: ListOrder::NewestFirst,
            next_cursor: None,
        };
        assert_eq!(replay(&page.into_chronological()), replay(&events));
    }

    #[tokio::test]
    async fn paged_and_duplicated_delivery_replays_like_a_clean_log() {
        let conversation_id = ConversationId::from("c1");
        let store = Arc::new(InMemoryEventStore::new());
        let events = conversation();
        for event in &events {
            store.insert(&conversation_id, event.clone()).unwrap();
        }
        // Redelivered copies of already-stored events.
        store.insert(&conversation_id, events[1].clone()).unwrap();
        store.insert(&conversation_id, events[5].clone()).unwrap();

        let log = ConversationLog::new(conversation_id.clone(), store.clone(), 3);
        let merged = log.refresh().await.unwrap();

        assert_eq!(merged.len(), events.len());
        assert_eq!(replay(&merged), replay(&events));

        let listing = store
            .list_events(&conversation_id, crate::app::domain::session::Page::first(0))
            .await
            .unwrap();
        assert_eq!(listing.events.len(), events.len() + 2);
    }

    #[test]
    fn control_events_do_not_disturb_turns() {
        let mut events = conversation();
        events.insert(
            3,
            crate::test_utils::fixtures::event(
                "ctl",
                3,
                EventKind::Control("canvas_update".to_string()),
                json!({ "anything": true }),
            ),
        );
        assert_eq!(replay(&events).turns, replay(&conversation()).turns);
    }
}
