use super::Command;
use crate::commands::config::resolve_path;
use crate::error::Error;
use async_trait::async_trait;
use colloquy_core::app::domain::session::{ConversationLog, EventPage, InMemoryEventStore};
use colloquy_core::app::domain::{
    ConversationId, Event, PendingFollowUp, Transcript, build_transcript, next_follow_up,
};
use colloquy_core::config::EngineConfig;
use eyre::Result;
use serde::Deserialize;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct ReplayCommand {
    pub events: PathBuf,
    pub json: bool,
    pub config_path: Option<PathBuf>,
}

#[async_trait]
impl Command for ReplayCommand {
    async fn execute(&self) -> Result<()> {
        let path = resolve_path(self.config_path.as_deref())?;
        let config = EngineConfig::load_from(&path)?;
        let report = replay_file(&self.events, &config).await?;

        let mut stdout = std::io::stdout();
        if self.json {
            writeln!(stdout, "{}", serde_json::to_string_pretty(&report.transcript)?)?;
        } else {
            write!(stdout, "{}", render(&report))?;
        }
        Ok(())
    }
}

/// An event dump: either a bare list (any order) or a listed page that
/// declares its order.
#[derive(Deserialize)]
#[serde(untagged)]
enum EventDump {
    Page(EventPage),
    Events(Vec<Event>),
}

pub struct ReplayReport {
    pub events: usize,
    pub transcript: Transcript,
    pub pending_follow_up: Option<PendingFollowUp>,
}

const REPLAY_CONVERSATION: &str = "replay";

pub async fn replay_file(path: &Path, config: &EngineConfig) -> std::result::Result<ReplayReport, Error> {
    let raw = std::fs::read_to_string(path)?;
    replay_json(&raw, config).await
}

/// Loads the dump into an in-memory store and reads it back through a
/// conversation log, so duplicates and ordering are handled as they are for
/// a live conversation.
pub async fn replay_json(raw: &str, config: &EngineConfig) -> std::result::Result<ReplayReport, Error> {
    let events = match serde_json::from_str::<EventDump>(raw)? {
        EventDump::Page(page) => page.into_chronological(),
        EventDump::Events(events) => events,
    };

    let conversation_id = ConversationId::from(REPLAY_CONVERSATION);
    let store = Arc::new(InMemoryEventStore::new());
    for event in events {
        store
            .insert(&conversation_id, event)
            .map_err(colloquy_core::Error::from)?;
    }

    let log = ConversationLog::new(conversation_id, store, config.page_size);
    let events = log.refresh().await.map_err(colloquy_core::Error::from)?;

    tracing::debug!(events = events.len(), "Replaying event dump");

    Ok(ReplayReport {
        events: events.len(),
        transcript: build_transcript(&events, config.title_options()),
        pending_follow_up: next_follow_up(&events),
    })
}

pub fn render(report: &ReplayReport) -> String {
    let mut out = String::new();
    let transcript = &report.transcript;
    let _ = writeln!(
        out,
        "{} events, {} turns, {} tasks",
        report.events,
        transcript.turns.len(),
        transcript.tasks.len()
    );

    for (index, turn) in transcript.turns.iter().enumerate() {
        let marker = if turn.synthetic { " (synthetic)" } else { "" };
        let _ = writeln!(out, "\nTurn {}{}", index + 1, marker);
        if !turn.synthetic {
            let _ = writeln!(out, "  user: {}", turn.user_message.text());
        }
        for step in &turn.steps {
            let _ = writeln!(out, "  [{}] {}", step.status, step.title);
        }
        match &turn.assistant_message {
            Some(reply) => {
                let _ = writeln!(out, "  assistant: {}", reply.text());
            }
            None => {
                let _ = writeln!(out, "  (no reply yet)");
            }
        }
    }

    if !transcript.tasks.is_empty() {
        let _ = writeln!(out, "\nTasks");
        for task in &transcript.tasks {
            let _ = writeln!(out, "  [{}] {}", task.status, task.description);
        }
    }

    if let Some(follow_up) = &report.pending_follow_up {
        let _ = writeln!(out, "\nQueued follow-up: {}", follow_up.message_id);
    }
    out
}
