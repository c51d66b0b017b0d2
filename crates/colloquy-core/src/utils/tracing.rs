use chrono::Local;
use std::io;
use std::path::PathBuf;
use tracing_appender::rolling;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Environment variable naming a directory for timestamped log files.
pub const LOG_DIR_ENV: &str = "COLLOQUY_LOG_DIR";

const DEFAULT_FILTER: &str = "colloquy=info,colloquy_core=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Filtering comes from RUST_LOG.
///
/// Logs go to a timestamp-named file under `$COLLOQUY_LOG_DIR` when it is
/// set, otherwise to stderr.
pub fn init_tracing() -> io::Result<()> {
    match std::env::var_os(LOG_DIR_ENV).map(PathBuf::from) {
        Some(log_dir) => {
            std::fs::create_dir_all(&log_dir)?;
            let file_name = format!("{}.log", Local::now().format("%Y%m%d_%H%M%S"));
            let file_appender = rolling::never(&log_dir, &file_name);

            let subscriber = tracing_subscriber::registry()
                .with(
                    fmt::Layer::new()
                        .with_writer(file_appender)
                        .with_ansi(false)
                        .with_span_events(FmtSpan::CLOSE)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(env_filter());
            tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;

            tracing::debug!(
                target: "colloquy_core::utils::tracing",
                path = %log_dir.join(&file_name).display(),
                "Tracing initialized with file output"
            );
        }
        None => {
            let subscriber = tracing_subscriber::registry()
                .with(
                    fmt::Layer::default()
                        .with_writer(io::stderr)
                        .with_target(true),
                )
                .with(env_filter());
            tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;

            tracing::debug!(
                target: "colloquy_core::utils::tracing",
                "Tracing initialized with stderr output"
            );
        }
    }

    Ok(())
}
