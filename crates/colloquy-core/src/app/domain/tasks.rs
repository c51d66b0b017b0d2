use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::Display;

use crate::app::domain::event::{Event, EventKind, TaskStartedPayload, TaskUpdatePayload};
use crate::app::domain::types::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub agent_type: Option<String>,
    pub status: TaskStatus,
    pub parent_task_id: Option<TaskId>,
    /// Latest `task_progress` text, if any.
    pub progress: Option<String>,
    pub error: Option<String>,
}

/// Builds the sub-task list from task lifecycle events, in start order.
///
/// Tasks correlate strictly on `taskId`. Updates for a task that was never
/// started are dropped, as are events whose payload has no `taskId`. A task
/// that already settled keeps its first outcome.
pub fn project_tasks(events: &[Event]) -> Vec<Task> {
    let mut tasks: Vec<Task> = Vec::new();
    let mut index: HashMap<TaskId, usize> = HashMap::new();

    for event in events.iter().filter(|event| event.kind.is_task_event()) {
        if event.kind == EventKind::TaskStarted {
            let Some(started) = event.payload_as::<TaskStartedPayload>() else {
                tracing::debug!(event_id = %event.id, "Skipping task_started without taskId");
                continue;
            };
            if index.contains_key(&started.task_id) {
                continue;
            }
            index.insert(started.task_id.clone(), tasks.len());
            tasks.push(Task {
                id: started.task_id,
                description: started.description,
                agent_type: started.agent_type,
                status: TaskStatus::Running,
                parent_task_id: started.parent_task_id,
                progress: None,
                error: None,
            });
            continue;
        }

        let Some(update) = event.payload_as::<TaskUpdatePayload>() else {
            tracing::debug!(event_id = %event.id, kind = %event.kind, "Skipping task update without taskId");
            continue;
        };
        let Some(task) = index.get(&update.task_id).and_then(|&at| tasks.get_mut(at)) else {
            continue;
        };

        match event.kind {
            EventKind::TaskProgress => {
                if update.progress.is_some() {
                    task.progress = update.progress;
                }
            }
            EventKind::TaskCompleted if task.status == TaskStatus::Running => {
                task.status = TaskStatus::Completed;
            }
            EventKind::TaskFailed if task.status == TaskStatus::Running => {
                task.status = TaskStatus::Error;
                task.error = update.error;
            }
            _ => {}
        }
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::domain::types::EventId;
    use serde_json::{Value, json};

    fn ev(id: &str, kind: EventKind, payload: Value) -> Event {
        Event {
            id: EventId::from(id),
            timestamp: 0,
            kind,
            device_id: None,
            request_id: None,
            target_device_id: None,
            payload,
        }
    }

    #[test]
    fn tracks_lifecycle_by_task_id() {
        let events = vec![
            ev("1", EventKind::TaskStarted, json!({"taskId": "t1", "description": "index repo", "agentType": "explore"})),
            ev("2", EventKind::TaskStarted, json!({"taskId": "t2", "description": "write tests", "parentTaskId": "t1"})),
            ev("3", EventKind::TaskProgress, json!({"taskId": "t1", "message": "42 files"})),
            ev("4", EventKind::TaskFailed, json!({"taskId": "t2", "error": "timeout"})),
            ev("5", EventKind::TaskCompleted, json!({"taskId": "t1"})),
        ];

        let tasks = project_tasks(&events);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[0].agent_type.as_deref(), Some("explore"));
        assert_eq!(tasks[0].progress.as_deref(), Some("42 files"));
        assert_eq!(tasks[1].status, TaskStatus::Error);
        assert_eq!(tasks[1].parent_task_id, Some(TaskId::from("t1")));
        assert_eq!(tasks[1].error.as_deref(), Some("timeout"));
    }

    #[test]
    fn updates_without_a_start_are_dropped() {
        let events = vec![
            ev("1", EventKind::TaskCompleted, json!({"taskId": "ghost"})),
            ev("2", EventKind::TaskStarted, json!({"description": "no id"})),
        ];

        assert!(project_tasks(&events).is_empty());
    }

    #[test]
    fn first_outcome_sticks() {
        let events = vec![
            ev("1", EventKind::TaskStarted, json!({"taskId": "t1"})),
            ev("2", EventKind::TaskCompleted, json!({"taskId": "t1"})),
            ev("3", EventKind::TaskFailed, json!({"taskId": "t1", "error": "late"})),
        ];

        let tasks = project_tasks(&events);
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[0].error, None);
    }
}
