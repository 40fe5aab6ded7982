//! Conversational session orchestration
//!
//! Keeps one conversation's identity, decides whether each message starts or
//! resumes the planning workflow, streams the reply back as it is produced and
//! folds failures into ordinary assistant turns.
//!
//! ```text
//! caller -> ConversationHandle -> TurnDispatcher -> WorkflowEngine
//!                                                      |
//!        <- snapshots / outcome <- StreamAggregator <--+
//! ```

mod aggregate;
mod dispatch;
mod history;
mod manager;
mod messages;
mod session;
mod transcript;

pub use aggregate::{Aggregation, ERROR_PREFIX, StreamAggregator, error_content};
pub use dispatch::{TurnDispatcher, validate_message};
pub use history::{HistoryLog, Role, Turn};
pub use manager::ConversationHandle;
pub use messages::{InputError, TurnError, TurnOutcome, TurnTicket};
pub use session::{Session, SessionRegistry, SessionState};
pub use transcript::{EntryType, TranscriptEntry, TranscriptLogger};
