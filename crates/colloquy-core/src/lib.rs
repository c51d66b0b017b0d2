// Conversation engine: turn reconstruction, streaming sessions and follow-up queueing

pub mod app;
pub mod config;
pub mod error;
pub mod test_utils;
pub mod utils;

pub use app::domain::runtime::ConversationEngine;
pub use config::EngineConfig;
pub use error::{Error, Result};
