//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::llm::LlmError;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Turn handling settings
    pub conversation: ConversationConfig,

    /// Where traveler preferences are kept
    pub preferences: PreferencesConfig,

    /// JSONL transcript logging
    pub transcript: TranscriptConfig,

    /// Planner engine limits
    pub engine: EngineConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before talking to the LLM
    ///
    /// Fails fast with a message naming the missing API key variable.
    pub fn validate(&self) -> Result<()> {
        self.llm.get_api_key()?;
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let config = Self::load_file_chain(config_path)?;
        Ok(Self {
            llm: config.llm.with_env_overrides(),
            ..config
        })
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .tripplanner.yml
        let local_config = PathBuf::from(".tripplanner.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/tripplanner/tripplanner.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tripplanner").join("tripplanner.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are swallowed; the full load reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load_file_chain(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "openai" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL, including the version segment
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 4096,
            timeout_ms: 300_000,
        }
    }
}

impl LlmConfig {
    /// Apply `BASE_URL` and `MODEL_CHOICE` environment overrides
    pub fn with_env_overrides(self) -> Self {
        let base_url = std::env::var("BASE_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let model = std::env::var("MODEL_CHOICE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        debug!(base_url_override = base_url.is_some(), model_override = model.is_some(), "with_env_overrides: called");

        Self {
            base_url: base_url.unwrap_or(self.base_url),
            model: model.unwrap_or(self.model),
            ..self
        }
    }

    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String, LlmError> {
        let key = std::env::var(&self.api_key_env).unwrap_or_default().trim().to_string();
        debug!(api_key_env = %self.api_key_env, loaded = !key.is_empty(), "get_api_key: called");
        if key.is_empty() {
            return Err(LlmError::MissingApiKey(self.api_key_env.clone()));
        }
        Ok(key)
    }
}

/// Turn handling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Longest wait for the next chunk before the turn fails (0 disables)
    #[serde(rename = "chunk-timeout-ms")]
    pub chunk_timeout_ms: u64,

    /// Capacity of the per-turn snapshot channel
    #[serde(rename = "snapshot-buffer")]
    pub snapshot_buffer: usize,

    /// chrono format string for turn timestamps
    #[serde(rename = "timestamp-format")]
    pub timestamp_format: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            chunk_timeout_ms: 120_000,
            snapshot_buffer: 64,
            timestamp_format: "%I:%M %p".to_string(),
        }
    }
}

impl ConversationConfig {
    pub fn chunk_timeout(&self) -> Option<Duration> {
        (self.chunk_timeout_ms > 0).then(|| Duration::from_millis(self.chunk_timeout_ms))
    }
}

/// Preference store location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    pub path: PathBuf,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        let path = dirs::data_local_dir()
            .map(|d| d.join("tripplanner"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("user_preferences.json");
        Self { path }
    }
}

/// Transcript logging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        let dir = dirs::data_local_dir()
            .map(|d| d.join("tripplanner"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conversations");
        Self { enabled: false, dir }
    }
}

/// Planner engine limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Workflow threads retained before the oldest is dropped
    #[serde(rename = "max-threads")]
    pub max_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_threads: 64 }
    }
}
