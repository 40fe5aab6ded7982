//! Conversation actor messages
//!
//! Commands, replies and errors for the actor pattern.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::history::Turn;
use super::session::Session;
use crate::engine::{EngineError, InvocationKind};
use crate::preferences::UserContext;

/// Rejected user input; nothing was recorded and the engine was not called
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Message is empty")]
    EmptyMessage,
}

/// Errors from a conversation turn
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("{0}")]
    Input(#[from] InputError),

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("No response from the planner for {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Still answering the previous message in conversation {thread_id}")]
    Busy { thread_id: Uuid },

    #[error("Conversation channel closed")]
    Channel,
}

/// How a dispatched turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The run finished and its full text was recorded
    Completed(Turn),

    /// The run failed; the recorded turn carries the error text
    Failed(Turn),

    /// The conversation was reset before the run finished; nothing was recorded
    Abandoned { thread_id: Uuid },
}

impl TurnOutcome {
    /// The recorded assistant turn, if any
    pub fn turn(&self) -> Option<&Turn> {
        match self {
            TurnOutcome::Completed(turn) | TurnOutcome::Failed(turn) => Some(turn),
            TurnOutcome::Abandoned { .. } => None,
        }
    }
}

/// Handle on one in-flight turn
///
/// Each snapshot is the full text accumulated so far. Snapshots may be
/// skipped when the receiver falls behind; the outcome always carries the
/// final text.
#[derive(Debug)]
pub struct TurnTicket {
    pub thread_id: Uuid,
    pub kind: InvocationKind,
    pub snapshots: mpsc::Receiver<String>,
    pub outcome: oneshot::Receiver<TurnOutcome>,
}

impl TurnTicket {
    /// Ignore progress and wait for the outcome
    pub async fn finish(self) -> Result<TurnOutcome, TurnError> {
        drop(self.snapshots);
        self.outcome.await.map_err(|_| TurnError::Channel)
    }
}

/// Commands sent to the conversation actor
#[derive(Debug)]
pub enum ConversationCommand {
    SendMessage {
        text: String,
        reply: oneshot::Sender<Result<TurnTicket, TurnError>>,
    },
    NewConversation {
        reply: oneshot::Sender<Session>,
    },
    GetHistory {
        reply: oneshot::Sender<Vec<Turn>>,
    },
    GetSession {
        reply: oneshot::Sender<Session>,
    },
    GetUserContext {
        reply: oneshot::Sender<UserContext>,
    },
    SetUserContext {
        context: UserContext,
        reply: oneshot::Sender<()>,
    },

    /// A spawned run reporting back, tagged with the thread it ran for
    RunFinished {
        thread_id: Uuid,
        result: Result<String, TurnError>,
    },

    Shutdown,
}
