use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::app::domain::delta::StreamEvent;
use crate::app::domain::event::Attachment;
use crate::app::domain::types::{ConversationId, EventId};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Model gateway rejected the request: {message}")]
    Rejected { message: String },

    #[error("Model gateway unavailable: {message}")]
    Unavailable { message: String },
}

impl GatewayError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// What the gateway needs to generate a reply to one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub conversation_id: ConversationId,
    pub user_message_id: EventId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

pub type ChatStream = BoxStream<'static, StreamEvent>;

/// Streams a model reply for a user message.
///
/// The returned stream should stop promptly once `cancel` fires. The reply
/// itself is persisted by the backend as an `assistant_message` event; the
/// stream only carries the live preview.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatStream, GatewayError>;
}
