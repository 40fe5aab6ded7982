//! Interactive REPL for trip planning
//!
//! Streams planner replies as they arrive and offers slash commands for
//! starting over, reviewing history, editing preferences and browsing examples.

mod session;

pub use session::{EXAMPLE_QUERIES, ReplSession, print_examples, print_preferences};

use std::sync::Arc;

use eyre::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::conversation::{ConversationHandle, TranscriptLogger};
use crate::engine::{PlannerEngine, ScriptedEngine, WorkflowEngine};
use crate::llm::create_client;
use crate::preferences::{FilePreferenceStore, PreferenceStore, UserContext};

/// Build the workflow engine for a chat session
///
/// Offline mode uses the canned scripted engine and needs no API key.
pub fn build_engine(config: &Config, offline: bool) -> Result<Arc<dyn WorkflowEngine>> {
    if offline {
        info!("Using offline scripted engine");
        return Ok(Arc::new(ScriptedEngine::new()));
    }

    config.validate()?;
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    info!(model = %config.llm.model, base_url = %config.llm.base_url, "Using LLM planner engine");
    Ok(Arc::new(PlannerEngine::new(
        llm,
        config.engine.max_threads,
        config.llm.max_tokens,
    )))
}

/// Run the interactive REPL
///
/// This is the main entry point for `tp chat`.
pub async fn run_interactive(config: &Config, initial_message: Option<String>, offline: bool) -> Result<()> {
    let engine = build_engine(config, offline)?;

    let store = Arc::new(FilePreferenceStore::new(&config.preferences.path));
    let preferences = store.load().context("Failed to load preferences")?;

    let conversation = ConversationHandle::spawn(
        engine,
        config.conversation.clone(),
        UserContext::new(preferences),
        TranscriptLogger::from_config(&config.transcript),
    );

    let mut session = ReplSession::new(conversation, store);
    session.run(initial_message).await
}
