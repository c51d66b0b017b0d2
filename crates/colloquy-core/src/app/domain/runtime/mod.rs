pub mod attachments;
pub mod controller;
pub mod engine;
pub mod gateway;

pub use attachments::{
    AttachmentError, AttachmentUploader, CreateAttachment, PendingAttachment, upload_pending,
};
pub use controller::{ControllerConfig, SendOutcome, SendRequest, StreamingController};
pub use engine::ConversationEngine;
pub use gateway::{ChatRequest, ChatStream, GatewayError, ModelGateway};
