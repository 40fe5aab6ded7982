//! Conversation transcripts
//!
//! When enabled via config (transcript.enabled = true), every recorded turn
//! and every reset is written to a JSONL file under `transcript.dir`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::history::{Role, Turn};
use crate::config::TranscriptConfig;

/// One line of the transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    pub thread_id: Uuid,
    pub entry_type: EntryType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EntryType {
    UserMessage { content: String },
    AssistantMessage { content: String },
    /// Assistant turn synthesized from a failed run
    Error { message: String },
    SessionStart,
    /// The conversation was reset; `thread_id` is the abandoned thread
    SessionReset { next_thread_id: Uuid },
    SessionEnd,
}

/// Writes conversation transcripts
pub struct TranscriptLogger {
    writer: Option<BufWriter<File>>,
    log_path: Option<PathBuf>,
    last_thread_id: Option<Uuid>,
}

impl TranscriptLogger {
    pub fn disabled() -> Self {
        Self {
            writer: None,
            log_path: None,
            last_thread_id: None,
        }
    }

    /// Open a new transcript file in `dir`
    ///
    /// Failing to open the file is logged and leaves the logger disabled.
    pub fn enabled(dir: &Path) -> Self {
        let mut logger = Self::disabled();
        if let Err(e) = logger.open(dir) {
            error!("Failed to start transcript logging: {}", e);
        }
        logger
    }

    pub fn from_config(config: &TranscriptConfig) -> Self {
        if config.enabled {
            Self::enabled(&config.dir)
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    fn open(&mut self, dir: &Path) -> std::io::Result<()> {
        fs::create_dir_all(dir)?;

        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
        let log_path = dir.join(format!("conversation-{}.jsonl", timestamp));
        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

        self.writer = Some(BufWriter::new(file));
        debug!("Started transcript logging to: {}", log_path.display());
        self.log_path = Some(log_path);
        Ok(())
    }

    pub fn log_session_start(&mut self, thread_id: Uuid) {
        self.write(thread_id, EntryType::SessionStart);
    }

    pub fn log_reset(&mut self, abandoned: Uuid, next_thread_id: Uuid) {
        self.write(abandoned, EntryType::SessionReset { next_thread_id });
    }

    /// Record a turn; `failed` marks an assistant turn built from an error
    pub fn log_turn(&mut self, thread_id: Uuid, turn: &Turn, failed: bool) {
        let entry_type = match (turn.role, failed) {
            (Role::User, _) => EntryType::UserMessage {
                content: turn.content.clone(),
            },
            (Role::Assistant, false) => EntryType::AssistantMessage {
                content: turn.content.clone(),
            },
            (Role::Assistant, true) => EntryType::Error {
                message: turn.content.clone(),
            },
        };
        self.write(thread_id, entry_type);
    }

    fn write(&mut self, thread_id: Uuid, entry_type: EntryType) {
        let Some(writer) = &mut self.writer else {
            return;
        };
        self.last_thread_id = Some(thread_id);

        let entry = TranscriptEntry {
            timestamp: Utc::now(),
            thread_id,
            entry_type,
        };

        match serde_json::to_string(&entry) {
            Ok(json) => {
                if let Err(e) = writeln!(writer, "{}", json) {
                    warn!("Failed to write transcript entry: {}", e);
                }
                if let Err(e) = writer.flush() {
                    warn!("Failed to flush transcript: {}", e);
                }
            }
            Err(e) => {
                warn!("Failed to serialize transcript entry: {}", e);
            }
        }
    }
}

impl Drop for TranscriptLogger {
    fn drop(&mut self) {
        if let Some(thread_id) = self.last_thread_id {
            self.write(thread_id, EntryType::SessionEnd);
            if let Some(path) = &self.log_path {
                debug!("Transcript saved to: {}", path.display());
            }
        }
    }
}
