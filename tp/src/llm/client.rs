//! LlmClient trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Stateless LLM client - each call is independent
///
/// Conversation memory lives in the caller (the planner engine keeps one
/// message list per workflow thread); the client only ever sees a full request.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Streaming completion for progressive display
    ///
    /// Sends text deltas to the provided channel as they arrive.
    /// Returns the final complete response.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<CompletionResponse, LlmError>;
}
