//! LLM error types

use thiserror::Error;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key. Please set {0} in your environment.")]
    MissingApiKey(String),

    #[error("Unknown LLM provider: '{0}'. Supported: openai")]
    UnknownProvider(String),
}
