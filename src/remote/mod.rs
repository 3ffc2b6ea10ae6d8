//! Client for the third-party skin analysis service
//!
//! The workflow executor only sees [`RemoteAnalysisClient`]. The wire format
//! differs between [`ProtocolVersion`]s; the trait surface does not.

pub mod bundle;
pub mod client;
pub mod protocol;

pub use bundle::{extract_score_document, MAX_BUNDLE_BYTES, MAX_SCORE_ENTRY_BYTES};
pub use client::{HttpSkinClient, RemoteTimeouts};
pub use protocol::ProtocolVersion;

use crate::config::ConfigError;
use crate::error::TaskFailure;
use crate::imaging::NormalizedImage;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Remote call that can fail, named in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStep {
    UploadSlot,
    UploadTransfer,
    StartTask,
    Poll,
    FetchResult,
}

impl RemoteStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStep::UploadSlot => "upload-slot",
            RemoteStep::UploadTransfer => "upload-transfer",
            RemoteStep::StartTask => "start-task",
            RemoteStep::Poll => "poll",
            RemoteStep::FetchResult => "fetch-result",
        }
    }
}

impl fmt::Display for RemoteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Connection failure, timeout or unsuccessful HTTP status
    Network,
    /// Response body missing an expected field or not valid JSON
    Parse,
    /// Credential could not be resolved
    Configuration,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{step} failed: {message}")]
pub struct RemoteError {
    pub step: RemoteStep,
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn network<S: Into<String>>(step: RemoteStep, message: S) -> Self {
        Self {
            step,
            kind: RemoteErrorKind::Network,
            message: message.into(),
        }
    }

    pub fn parse<S: Into<String>>(step: RemoteStep, message: S) -> Self {
        Self {
            step,
            kind: RemoteErrorKind::Parse,
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(step: RemoteStep, message: S) -> Self {
        Self {
            step,
            kind: RemoteErrorKind::Configuration,
            message: message.into(),
        }
    }
}

impl From<RemoteError> for TaskFailure {
    fn from(e: RemoteError) -> Self {
        let message = e.to_string();
        let failure = match e.kind {
            RemoteErrorKind::Network => TaskFailure::network(message),
            RemoteErrorKind::Parse => TaskFailure::parse(message),
            RemoteErrorKind::Configuration => {
                TaskFailure::new(crate::error::ErrorClass::Configuration, message)
            }
        };
        failure.at_step(e.step.as_str())
    }
}

/// Remote job state as reported by one poll
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    /// Any non-terminal value, carried verbatim
    Pending(String),
    Succeeded { result_url: String },
    Failed { reason: String },
}

/// Where the service credential comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ApiKey {
    Static(String),
    /// Read from the named environment variable on every use
    FromEnv(String),
}

impl ApiKey {
    pub fn resolve(&self) -> Result<String, ConfigError> {
        match self {
            ApiKey::Static(key) if !key.is_empty() => Ok(key.clone()),
            ApiKey::Static(_) => Err(ConfigError::InvalidConfig("API key is empty".to_string())),
            ApiKey::FromEnv(var) => match std::env::var(var) {
                Ok(key) if !key.trim().is_empty() => Ok(key),
                _ => Err(ConfigError::EnvVarNotFound(var.clone())),
            },
        }
    }

    pub fn is_configured(&self) -> bool {
        self.resolve().is_ok()
    }
}

/// The remote analysis protocol, one method per remote call
#[async_trait]
pub trait RemoteAnalysisClient: Send + Sync {
    fn protocol(&self) -> ProtocolVersion;

    /// Fails when no credential is currently available
    fn ensure_configured(&self) -> Result<(), ConfigError>;

    fn is_configured(&self) -> bool {
        self.ensure_configured().is_ok()
    }

    /// Upload the payload and return the remote content id.
    /// May span the `upload-slot` and `upload-transfer` steps.
    async fn upload(&self, image: &NormalizedImage) -> Result<String, RemoteError>;

    /// Start an analysis job and return its remote id
    async fn start_task(&self, content_id: &str) -> Result<String, RemoteError>;

    async fn poll_status(&self, remote_task_id: &str) -> Result<RemoteStatus, RemoteError>;

    /// Download the compressed result bundle
    async fn fetch_bundle(&self, result_url: &str) -> Result<Bytes, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn test_step_names() {
        assert_eq!(RemoteStep::UploadSlot.to_string(), "upload-slot");
        assert_eq!(RemoteStep::FetchResult.to_string(), "fetch-result");
    }

    #[test]
    fn test_remote_error_to_failure() {
        let failure: TaskFailure =
            RemoteError::network(RemoteStep::UploadTransfer, "connection reset").into();
        assert_eq!(failure.class, ErrorClass::Network);
        assert_eq!(failure.step.as_deref(), Some("upload-transfer"));
        assert!(failure.message.starts_with("upload-transfer failed"));

        let failure: TaskFailure = RemoteError::parse(RemoteStep::StartTask, "no task_id").into();
        assert_eq!(failure.class, ErrorClass::Parse);
    }

    #[test]
    fn test_api_key_resolution() {
        assert_eq!(ApiKey::Static("k".to_string()).resolve().unwrap(), "k");
        assert!(!ApiKey::Static(String::new()).is_configured());
        assert!(matches!(
            ApiKey::FromEnv("DERMASCORE_TEST_UNSET_KEY_VAR".to_string()).resolve(),
            Err(ConfigError::EnvVarNotFound(_))
        ));
    }
}
