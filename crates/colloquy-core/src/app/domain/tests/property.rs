#[cfg(test)]
mod tests {
    use crate::app::domain::event::{Event, EventKind};
    use crate::app::domain::steps::{StepStatus, project_steps};
    use crate::app::domain::title::TitleOptions;
    use crate::app::domain::transcript::reconstruct_turns;
    use crate::test_utils::fixtures::{assistant, event, tool_request, tool_result, user};
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};

    #[derive(Debug, Clone)]
    enum Shape {
        User,
        Assistant,
        Request { tool: usize, key: Option<u8> },
        Result { tool: usize, key: Option<u8> },
        Control,
    }

    const TOOLS: [&str; 3] = ["read", "bash", "search"];

    fn arb_shape() -> impl Strategy<Value = Shape> {
        prop_oneof![
            2 => Just(Shape::User),
            1 => Just(Shape::Assistant),
            3 => (0..TOOLS.len(), proptest::option::of(0u8..4))
                .prop_map(|(tool, key)| Shape::Request { tool, key }),
            3 => (0..TOOLS.len(), proptest::option::of(0u8..4))
                .prop_map(|(tool, key)| Shape::Result { tool, key }),
            1 => Just(Shape::Control),
        ]
    }

    fn materialize(shapes: &[Shape]) -> Vec<Event> {
        shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| {
                let id = format!("e{i}");
                let ts = i as i64;
                match shape {
                    Shape::User => user(&id, ts, "hi"),
                    Shape::Assistant => assistant(&id, ts, "ok", None),
                    Shape::Request { tool, key } => {
                        let key = key.map_or_else(|| id.clone(), |k| format!("k{k}"));
                        tool_request(&id, ts, TOOLS[*tool], &key, json!({}))
                    }
                    Shape::Result { tool, key } => {
                        let mut result = tool_result(&id, ts, TOOLS[*tool], "unused");
                        result.request_id = key.map(|k| format!("k{k}").into());
                        result
                    }
                    Shape::Control => event(
                        &id,
                        ts,
                        EventKind::Control("presence".to_string()),
                        json!({}),
                    ),
                }
            })
            .collect()
    }

    fn arb_events() -> impl Strategy<Value = Vec<Event>> {
        proptest::collection::vec(arb_shape(), 0..40).prop_map(|shapes| materialize(&shapes))
    }

    proptest! {
        #[test]
        fn reconstruction_is_idempotent(events in arb_events()) {
            let first = reconstruct_turns(&events, TitleOptions::default());
            let second = reconstruct_turns(&events, TitleOptions::default());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn every_user_message_opens_exactly_one_turn(events in arb_events()) {
            let turns = reconstruct_turns(&events, TitleOptions::default());
            let users = events.iter().filter(|e| e.kind == EventKind::UserMessage).count();
            prop_assert_eq!(turns.iter().filter(|t| !t.synthetic).count(), users);
            for turn in &turns {
                prop_assert!(turn.assistant_message.is_some() || !turn.synthetic);
            }
        }

        #[test]
        fn tool_events_belong_to_the_preceding_turn(events in arb_events()) {
            let turns = reconstruct_turns(&events, TitleOptions::default());
            let position: HashMap<_, _> =
                events.iter().enumerate().map(|(i, e)| (e.id.clone(), i)).collect();

            for (index, turn) in turns.iter().enumerate() {
                let opened_at = turn.user_message.timestamp;
                let closed_at = turns
                    .get(index + 1)
                    .map_or(i64::MAX, |next| next.user_message.timestamp);
                for tool_event in &turn.tool_events {
                    prop_assert!(tool_event.timestamp > opened_at);
                    prop_assert!(tool_event.timestamp < closed_at);
                    prop_assert!(position.contains_key(&tool_event.id));
                }
            }
        }

        #[test]
        fn each_result_settles_at_most_one_step(events in arb_events()) {
            let steps = project_steps(&events, TitleOptions::default());
            let requests = events.iter().filter(|e| e.kind == EventKind::ToolRequest).count();
            prop_assert_eq!(steps.len(), requests);

            let mut seen = HashSet::new();
            for step in &steps {
                match &step.result_id {
                    Some(result) => {
                        prop_assert!(seen.insert(result.clone()));
                        prop_assert_ne!(step.status, StepStatus::Running);
                    }
                    None => prop_assert_eq!(step.status, StepStatus::Running),
                }
            }
        }

        #[test]
        fn fallback_never_settles_from_an_earlier_result(events in arb_events()) {
            let steps = project_steps(&events, TitleOptions::default());
            let by_id: HashMap<_, _> = events.iter().map(|e| (e.id.clone(), e)).collect();

            for step in &steps {
                let Some(result_id) = &step.result_id else { continue };
                let request = by_id[&step.id];
                let result = by_id[result_id];
                let exact = result.request_id.is_some()
                    && result.correlation_id() == request.correlation_id();
                if !exact {
                    prop_assert!(result.timestamp > request.timestamp);
                    prop_assert_eq!(result.tool_name(), request.tool_name());
                }
            }
        }
    }
}
