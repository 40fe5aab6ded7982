//! Workflow engine boundary
//!
//! The planning workflow is an external collaborator: given a start payload or
//! a resume reply for a `thread_id`, it produces a lazy, finite stream of text
//! fragments and then goes quiet until the next invocation. Whether it finished
//! or is waiting for more input is not visible from the stream.

mod planner;
mod scripted;

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::llm::LlmError;
use crate::preferences::BudgetLevel;

pub use planner::{PlannerEngine, render_system_prompt};
pub use scripted::{ScriptedEngine, Step};

/// Ordered text fragments from one engine run
pub type ChunkStream = BoxStream<'static, Result<String, EngineError>>;

/// Failures raised by a workflow engine, before or during streaming
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Failed(String),

    #[error("No workflow is waiting on thread {0}")]
    UnknownThread(Uuid),

    #[error("{0}")]
    Llm(#[from] LlmError),

    #[error("Prompt rendering failed: {0}")]
    Prompt(String),
}

/// Initial workflow state for a new thread
///
/// A flattened copy of the traveler's preferences taken at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartPayload {
    pub user_input: String,
    pub preferred_airlines: Vec<String>,
    pub hotel_amenities: Vec<String>,
    pub budget_level: BudgetLevel,
}

/// One call into the workflow engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// First call for a thread, carrying the full initial state
    Start { thread_id: Uuid, payload: StartPayload },

    /// Continue a suspended thread with the user's reply
    Resume { thread_id: Uuid, reply: String },
}

impl Invocation {
    pub fn thread_id(&self) -> Uuid {
        match self {
            Invocation::Start { thread_id, .. } | Invocation::Resume { thread_id, .. } => *thread_id,
        }
    }

    pub fn kind(&self) -> InvocationKind {
        match self {
            Invocation::Start { .. } => InvocationKind::Start,
            Invocation::Resume { .. } => InvocationKind::Resume,
        }
    }

    /// The user's words carried by this invocation
    pub fn user_text(&self) -> &str {
        match self {
            Invocation::Start { payload, .. } => &payload.user_input,
            Invocation::Resume { reply, .. } => reply,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    Start,
    Resume,
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationKind::Start => f.write_str("start"),
            InvocationKind::Resume => f.write_str("resume"),
        }
    }
}

/// An asynchronous, suspendable planning workflow keyed by thread
///
/// Implementations own all per-thread state, including dropping threads
/// nobody resumes any more.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> Result<ChunkStream, EngineError>;
}
