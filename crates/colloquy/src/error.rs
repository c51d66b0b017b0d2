use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Invalid event dump: {0}")]
    EventDump(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] colloquy_core::Error),
}
