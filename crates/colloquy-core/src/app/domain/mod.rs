pub mod delta;
pub mod event;
pub mod followup;
pub mod runtime;
pub mod session;
pub mod state;
pub mod steps;
pub mod tasks;
pub mod title;
pub mod transcript;
pub mod types;

#[cfg(test)]
mod tests;

pub use delta::{RunOutcome, StreamEvent};
pub use event::{
    Attachment, Event, EventKind, MessageMode, NewEvent, TaskStartedPayload, TaskUpdatePayload,
    ToolRequestPayload, ToolResultPayload, UserMessagePayload,
};
pub use followup::{FollowUpProcessor, PendingFollowUp, next_follow_up};
pub use state::{SessionPhase, SessionSnapshot, StreamingSession, TextAccumulator};
pub use steps::{Step, StepStatus, project_steps};
pub use tasks::{Task, TaskStatus, project_tasks};
pub use title::{TitleOptions, tool_title};
pub use transcript::{Transcript, Turn, build_transcript, reconstruct_turns, synthetic_user_id};
pub use types::{
    AttachmentId, ConversationId, DeviceId, EventId, RequestId, RunId, TaskId, Timestamp,
};
