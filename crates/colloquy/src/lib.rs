pub mod cli;
pub mod commands;
pub mod error;

pub use colloquy_core::{app, config, utils};
