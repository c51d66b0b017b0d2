use super::Command;
use crate::error::Error;
use async_trait::async_trait;
use colloquy_core::config::EngineConfig;
use eyre::Result;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct ConfigCommand {
    pub action: ConfigAction,
    pub config_path: Option<PathBuf>,
}

pub enum ConfigAction {
    Show,
    Init { force: bool },
}

#[async_trait]
impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        let path = resolve_path(self.config_path.as_deref())?;
        let mut stdout = std::io::stdout();
        match &self.action {
            ConfigAction::Show => show(&path, &mut stdout).map_err(Into::into),
            ConfigAction::Init { force } => init(&path, *force, &mut stdout).map_err(Into::into),
        }
    }
}

pub fn resolve_path(explicit: Option<&Path>) -> std::result::Result<PathBuf, Error> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(EngineConfig::config_path()?),
    }
}

fn show(path: &Path, out: &mut impl Write) -> std::result::Result<(), Error> {
    let config = EngineConfig::load_from(path)?;
    let origin = if path.exists() { "" } else { " (not found, showing defaults)" };

    writeln!(out, "Config file: {}{}", path.display(), origin)?;
    writeln!(out, "\n{}", toml::to_string_pretty(&config)?)?;
    Ok(())
}

fn init(path: &Path, force: bool, out: &mut impl Write) -> std::result::Result<(), Error> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }

    let mut config = EngineConfig::default();
    let device_id = config.ensure_device_id().clone();
    config.save_to(path)?;

    tracing::info!(path = %path.display(), device_id = %device_id, "Wrote engine config");
    writeln!(out, "Wrote {} (device id {})", path.display(), device_id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        let mut out = Vec::new();

        init(&path, false, &mut out).unwrap();
        let first = EngineConfig::load_from(&path).unwrap();
        assert!(first.device_id.is_some());

        assert!(matches!(init(&path, false, &mut out), Err(Error::Config(_))));

        init(&path, true, &mut out).unwrap();
        let second = EngineConfig::load_from(&path).unwrap();
        assert_ne!(first.device_id, second.device_id);
    }

    #[test]
    fn show_reports_defaults_for_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut out = Vec::new();

        show(&dir.path().join("missing.toml"), &mut out).unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("showing defaults"));
        assert!(printed.contains("follow_up_prefix"));
    }
}
