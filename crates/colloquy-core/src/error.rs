use thiserror::Error;

use crate::app::domain::runtime::{AttachmentError, GatewayError};
use crate::app::domain::session::EventStoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    EventStore(#[from] EventStoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
