//! Trip Planner - conversational front-end for a resumable planning workflow
//!
//! A traveler describes a trip in plain language; a planning workflow answers,
//! and may stop mid-plan to ask for missing details. Each follow-up message
//! resumes the same workflow thread until the traveler starts over.
//!
//! # Modules
//!
//! - [`conversation`] - Session identity, start/resume dispatch, streaming and history
//! - [`engine`] - Workflow engine trait, scripted engine and LLM planner
//! - [`llm`] - LLM client trait and OpenAI-compatible implementation
//! - [`preferences`] - Traveler preferences and their JSON store
//! - [`repl`] - Interactive chat loop
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod llm;
pub mod preferences;
pub mod repl;

// Re-export commonly used types
pub use config::{Config, ConversationConfig, LlmConfig};
pub use conversation::{
    ConversationHandle, ERROR_PREFIX, HistoryLog, InputError, Session, SessionRegistry, SessionState, StreamAggregator,
    Turn, TurnDispatcher, TurnError, TurnOutcome, TurnTicket,
};
pub use engine::{
    ChunkStream, EngineError, Invocation, InvocationKind, PlannerEngine, ScriptedEngine, StartPayload, Step,
    WorkflowEngine,
};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client};
pub use preferences::{BudgetLevel, FilePreferenceStore, PreferenceError, PreferenceStore, Preferences, UserContext};
