//! OpenAI-compatible chat completion client
//!
//! Implements the LlmClient trait for the streaming Chat Completions API.
//! Any server speaking the same protocol works by pointing `base-url` at it.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, TokenUsage};
use crate::config::LlmConfig;

/// OpenAI API client
pub struct OpenAIClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl OpenAIClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(provider = %config.provider, model = %config.model, base_url = %config.base_url, "from_config: called");
        let api_key = config.get_api_key()?;

        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Build the request body for the OpenAI API
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, message_count = %request.messages.len(), "build_request_body: called");

        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];

        messages.extend(request.messages.iter().map(|msg| {
            serde_json::json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            })
        }));

        let max_tokens = request.max_tokens.min(self.max_tokens);

        // Reasoning models use max_completion_tokens instead of max_tokens
        let uses_completion_tokens =
            self.model.starts_with("gpt-5") || self.model.starts_with("o1") || self.model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, %request.max_tokens, "stream: called");
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(LlmError::Network)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            debug!(%status, "stream: API error");
            return Err(LlmError::ApiError { status, message: text });
        }

        read_events(response.bytes_stream(), chunk_tx).await
    }
}

/// Byte buffer that yields complete SSE lines
///
/// Network reads can end anywhere, including inside a multi-byte character,
/// so bytes are only decoded once a full line has arrived.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next complete line without its terminator, if one is buffered
    fn next_line(&mut self) -> Option<Result<String, LlmError>> {
        let end = self.bytes.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=end).collect();
        Some(
            std::str::from_utf8(&line[..end])
                .map(|s| s.trim().to_string())
                .map_err(|e| LlmError::InvalidResponse(format!("stream line is not UTF-8: {e}"))),
        )
    }
}

/// Read an SSE body, forwarding text deltas and collecting the full reply
async fn read_events<S, B>(body: S, chunk_tx: mpsc::Sender<String>) -> Result<CompletionResponse, LlmError>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    let mut body = std::pin::pin!(body);
    let mut lines = LineBuffer::default();
    let mut full_content = String::new();
    let mut stop_reason = StopReason::EndTurn;
    let mut usage = TokenUsage::default();

    while let Some(chunk_result) = body.next().await {
        let chunk = chunk_result.map_err(|e| {
            warn!(error = %e, "read_events: transport error");
            LlmError::Network(e)
        })?;
        lines.push(chunk.as_ref());

        while let Some(line) = lines.next_line() {
            let line = line?;
            if line.is_empty() || line == "data: [DONE]" {
                continue;
            }

            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };

            let event: OpenAIStreamChunk = match serde_json::from_str(data) {
                Ok(c) => c,
                Err(e) => {
                    debug!(error = %e, "read_events: skipping unparseable event");
                    continue;
                }
            };

            if let Some(choice) = event.choices.first() {
                if let Some(content) = &choice.delta.content
                    && !content.is_empty()
                {
                    full_content.push_str(content);
                    let _ = chunk_tx.send(content.clone()).await;
                }

                if let Some(reason) = &choice.finish_reason {
                    debug!(%reason, "read_events: finish_reason");
                    stop_reason = StopReason::from_openai(reason);
                }
            }

            if let Some(u) = event.usage {
                usage.input_tokens = u.prompt_tokens;
                usage.output_tokens = u.completion_tokens;
            }
        }
    }

    debug!(content_len = %full_content.len(), "read_events: complete");
    Ok(CompletionResponse {
        content: if full_content.is_empty() { None } else { Some(full_content) },
        stop_reason,
        usage,
    })
}

// Streaming types

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
