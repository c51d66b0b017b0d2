//! Step projection: pairs `tool_request` events with their `tool_result`.
//!
//! Matching is two-tiered. Every request first looks for a result carrying
//! the same correlation key (its `requestId`, or its own event id when it has
//! none). Requests left unmatched then take the oldest unconsumed result for
//! the same tool that appears after them in the log. A result is consumed by
//! at most one step. The positional tier assumes results for one tool arrive
//! in request order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum_macros::Display;

use crate::app::domain::event::{Event, EventKind, ToolRequestPayload, ToolResultPayload};
use crate::app::domain::title::{TitleOptions, tool_title};
use crate::app::domain::types::{EventId, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Id of the `tool_request` event.
    pub id: EventId,
    pub tool: String,
    pub title: String,
    pub status: StepStatus,
    /// Id of the `tool_result` that settled this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<EventId>,
}

struct PendingRequest<'a> {
    position: usize,
    event: &'a Event,
    tool: String,
    key: RequestId,
    args: serde_json::Value,
}

struct CandidateResult<'a> {
    position: usize,
    event: &'a Event,
    tool: String,
    key: Option<RequestId>,
    is_error: bool,
}

/// Projects steps over `events`, which must be in chronological order.
///
/// Events that are not tool events are ignored. Requests or results whose
/// payload lacks a tool name are skipped; results that match no request are
/// dropped.
pub fn project_steps(events: &[Event], options: TitleOptions) -> Vec<Step> {
    let mut requests = Vec::new();
    let mut results = Vec::new();

    for (position, event) in events.iter().enumerate() {
        match event.kind {
            EventKind::ToolRequest => {
                let Some(payload) = event.payload_as::<ToolRequestPayload>() else {
                    tracing::debug!(event_id = %event.id, "Skipping tool_request with malformed payload");
                    continue;
                };
                let key = event
                    .correlation_id()
                    .unwrap_or_else(|| RequestId::from(event.id.as_str()));
                requests.push(PendingRequest {
                    position,
                    event,
                    tool: payload.tool_name,
                    key,
                    args: payload.args,
                });
            }
            EventKind::ToolResult => {
                let Some(payload) = event.payload_as::<ToolResultPayload>() else {
                    tracing::debug!(event_id = %event.id, "Skipping tool_result with malformed payload");
                    continue;
                };
                results.push(CandidateResult {
                    position,
                    event,
                    key: event.correlation_id(),
                    is_error: payload.is_error(),
                    tool: payload.tool_name,
                });
            }
            _ => {}
        }
    }

    let mut consumed: HashSet<usize> = HashSet::new();
    let mut matches: Vec<Option<usize>> = vec![None; requests.len()];

    for (slot, request) in requests.iter().enumerate() {
        let exact = results.iter().enumerate().find(|(index, result)| {
            !consumed.contains(index) && result.key.as_ref() == Some(&request.key)
        });
        if let Some((index, _)) = exact {
            consumed.insert(index);
            matches[slot] = Some(index);
        }
    }

    for (slot, request) in requests.iter().enumerate() {
        if matches[slot].is_some() {
            continue;
        }
        let fallback = results.iter().enumerate().find(|(index, result)| {
            !consumed.contains(index)
                && result.position > request.position
                && result.tool == request.tool
        });
        if let Some((index, _)) = fallback {
            consumed.insert(index);
            matches[slot] = Some(index);
        }
    }

    requests
        .into_iter()
        .zip(matches)
        .map(|(request, matched)| {
            let settled = matched.and_then(|index| results.get(index));
            let status = match settled {
                None => StepStatus::Running,
                Some(result) if result.is_error => StepStatus::Error,
                Some(_) => StepStatus::Completed,
            };
            Step {
                id: request.event.id.clone(),
                title: tool_title(&request.tool, &request.args, options),
                tool: request.tool,
                status,
                result_id: settled.map(|result| result.event.id.clone()),
            }
        })
        .collect()
}
