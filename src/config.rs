//! Service configuration
//!
//! Loaded from a TOML file. Every tunable has a default so a minimal file only
//! needs to name the remote service. Credentials are never stored in the file:
//! the config names environment variables that are resolved at runtime, and a
//! missing API key only becomes an error when a task is submitted.

use crate::remote::ProtocolVersion;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub remote: RemoteSection,
    #[serde(default)]
    pub image: ImageSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub tasks: TaskSection,
    /// Optional LLM specialist scoring (disabled when absent)
    pub llm: Option<LlmSection>,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Remote analysis service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub protocol: ProtocolVersion,
    /// Features requested from the remote analysis job
    #[serde(default = "default_features")]
    pub features: Vec<String>,
    #[serde(default = "default_upload_slot_timeout")]
    pub upload_slot_timeout_secs: u64,
    #[serde(default = "default_upload_transfer_timeout")]
    pub upload_transfer_timeout_secs: u64,
    #[serde(default = "default_call_timeout")]
    pub start_task_timeout_secs: u64,
    #[serde(default = "default_poll_call_timeout")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_call_timeout")]
    pub fetch_timeout_secs: u64,
    /// Suffix of the scoring file inside the result bundle
    #[serde(default = "default_score_file_suffix")]
    pub score_file_suffix: String,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            protocol: ProtocolVersion::default(),
            features: default_features(),
            upload_slot_timeout_secs: default_upload_slot_timeout(),
            upload_transfer_timeout_secs: default_upload_transfer_timeout(),
            start_task_timeout_secs: default_call_timeout(),
            poll_timeout_secs: default_poll_call_timeout(),
            fetch_timeout_secs: default_call_timeout(),
            score_file_suffix: default_score_file_suffix(),
        }
    }
}

fn default_base_url() -> String {
    "https://yce-api-01.makeupar.com".to_string()
}

fn default_api_key_env() -> String {
    "SKIN_API_KEY".to_string()
}

fn default_features() -> Vec<String> {
    [
        "hd_wrinkle",
        "hd_pore",
        "hd_dark_circle",
        "hd_moisture",
        "hd_acne",
        "hd_age_spot",
        "hd_radiance",
        "hd_oiliness",
        "hd_texture",
        "hd_firmness",
        "hd_redness",
        "hd_eye_bag",
        "hd_tear_trough",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_upload_slot_timeout() -> u64 {
    30
}

fn default_upload_transfer_timeout() -> u64 {
    60
}

fn default_call_timeout() -> u64 {
    30
}

fn default_poll_call_timeout() -> u64 {
    10
}

fn default_score_file_suffix() -> String {
    "score_info.json".to_string()
}

/// Image normalization bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageSection {
    /// Longer edge is scaled down to at most this many pixels
    #[serde(default = "default_max_edge")]
    pub max_edge: u32,
    /// Shorter edge is scaled up to at least this many pixels
    #[serde(default = "default_min_edge")]
    pub min_edge: u32,
    /// JPEG quality (1-100)
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for ImageSection {
    fn default() -> Self {
        Self {
            max_edge: default_max_edge(),
            min_edge: default_min_edge(),
            quality: default_quality(),
        }
    }
}

fn default_max_edge() -> u32 {
    1920
}

fn default_min_edge() -> u32 {
    480
}

fn default_quality() -> u8 {
    90
}

/// Remote status polling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingSection {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    /// Overall wall-clock deadline for the polling phase
    #[serde(default = "default_poll_deadline")]
    pub deadline_secs: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            deadline_secs: default_poll_deadline(),
        }
    }
}

fn default_poll_interval() -> u64 {
    2
}

fn default_poll_deadline() -> u64 {
    60
}

/// Task record lifetime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSection {
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

impl Default for TaskSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    600
}

/// OpenAI-compatible provider used by specialist score sources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    /// Parameter groups, one independent sub-call per group
    #[serde(default = "default_specialists")]
    pub specialists: Vec<Vec<String>>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_specialists() -> Vec<Vec<String>> {
    vec![
        vec!["radiance".to_string(), "texture".to_string()],
        vec!["redness".to_string(), "oiliness".to_string()],
    ]
}

fn default_llm_timeout() -> u64 {
    60
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServiceConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.min_edge == 0 || self.image.max_edge == 0 {
            return Err(ConfigError::InvalidConfig(
                "image edges must be positive".to_string(),
            ));
        }
        if self.image.min_edge > self.image.max_edge {
            return Err(ConfigError::InvalidConfig(format!(
                "image.min_edge ({}) exceeds image.max_edge ({})",
                self.image.min_edge, self.image.max_edge
            )));
        }
        if !(1..=100).contains(&self.image.quality) {
            return Err(ConfigError::InvalidConfig(format!(
                "image.quality must be within 1..=100, got {}",
                self.image.quality
            )));
        }
        if self.polling.interval_secs == 0
            || self.polling.interval_secs >= self.polling.deadline_secs
        {
            return Err(ConfigError::InvalidConfig(format!(
                "polling.interval_secs ({}) must be positive and below polling.deadline_secs ({})",
                self.polling.interval_secs, self.polling.deadline_secs
            )));
        }
        if self.tasks.ttl_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "tasks.ttl_secs must be positive".to_string(),
            ));
        }
        if self.remote.score_file_suffix.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "remote.score_file_suffix must not be empty".to_string(),
            ));
        }
        url::Url::parse(&self.remote.base_url).map_err(|e| {
            ConfigError::InvalidConfig(format!("remote.base_url is not a valid URL: {e}"))
        })?;
        Ok(())
    }

    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Get the remote API key from its environment variable
    pub fn get_remote_api_key(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.remote.api_key_env)
    }

    /// Get the LLM API key, if specialist scoring is configured
    pub fn get_llm_api_key(&self) -> Option<Result<String, ConfigError>> {
        self.llm
            .as_ref()
            .map(|llm| Self::get_env_var_required(&llm.api_key_env))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs)
    }

    pub fn poll_deadline(&self) -> Duration {
        Duration::from_secs(self.polling.deadline_secs)
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.tasks.ttl_secs)
    }
}
