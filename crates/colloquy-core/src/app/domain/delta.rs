use serde::{Deserialize, Serialize};

/// One item yielded by a model-gateway stream.
///
/// A stream yields any number of deltas and settles with at most one terminal
/// item. Anything after the first terminal item is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta { delta: String },
    ReasoningDelta { delta: String },
    Done,
    Aborted,
    Failed { message: String },
}

impl StreamEvent {
    pub fn text(delta: impl Into<String>) -> Self {
        Self::TextDelta {
            delta: delta.into(),
        }
    }

    pub fn reasoning(delta: impl Into<String>) -> Self {
        Self::ReasoningDelta {
            delta: delta.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Done | StreamEvent::Aborted | StreamEvent::Failed { .. }
        )
    }
}

/// Why a run stopped streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted,
    Failed(String),
    /// The confirmed assistant reply landed in the event log first.
    Reconciled,
    /// A newer run pre-empted this one.
    Superseded,
}
