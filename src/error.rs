//! Error taxonomy for the analysis gateway
//!
//! Executor failures never propagate as faults: they are classified into an
//! [`ErrorClass`] and written into the task record as a [`TaskFailure`].
//! Only [`ServiceError::Config`] prevents a task from being created.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

static AUTH_HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(authorization)[=:]\s*(?:\S+\s+)?\S+")
        .expect("authorization pattern is valid")
});

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+")
        .expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Classification attached to every failed task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Missing credential; raised before task creation
    #[serde(rename = "configuration_error")]
    Configuration,
    /// Undecodable payload
    #[serde(rename = "input_error")]
    Input,
    /// Timeout or connection failure on a remote call
    #[serde(rename = "network_error")]
    Network,
    /// Unexpected response shape, missing field or missing file
    #[serde(rename = "parse_error")]
    Parse,
    /// Remote service reported its own job as failed
    #[serde(rename = "remote_task_error")]
    RemoteTask,
    /// Poll deadline exceeded without a terminal remote status
    #[serde(rename = "timeout_error")]
    Timeout,
    /// Unknown or expired task id
    #[serde(rename = "not_found_error")]
    NotFound,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Configuration => "configuration_error",
            ErrorClass::Input => "input_error",
            ErrorClass::Network => "network_error",
            ErrorClass::Parse => "parse_error",
            ErrorClass::RemoteTask => "remote_task_error",
            ErrorClass::Timeout => "timeout_error",
            ErrorClass::NotFound => "not_found_error",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure recorded on a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub message: String,
    pub class: ErrorClass,
    /// Workflow step that failed, e.g. `upload-transfer`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

impl TaskFailure {
    pub fn new<S: Into<String>>(class: ErrorClass, message: S) -> Self {
        Self {
            message: sanitize_error_message(&message.into()),
            class,
            step: None,
        }
    }

    pub fn at_step<S: Into<String>>(mut self, step: S) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn input<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorClass::Input, message)
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorClass::Network, message)
    }

    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorClass::Parse, message)
    }

    /// The remote-reported reason is kept verbatim, unsanitized and untruncated
    pub fn remote_task<S: Into<String>>(reason: S) -> Self {
        Self {
            message: reason.into(),
            class: ErrorClass::RemoteTask,
            step: None,
        }
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorClass::Timeout, message)
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "[{}] {} ({})", self.class, self.message, step),
            None => write!(f, "[{}] {}", self.class, self.message),
        }
    }
}

/// Errors surfaced to callers of the service facade
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ServiceError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classification used by the HTTP layer when reporting this error.
    /// Internal errors only arise while wiring collaborators at startup.
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::Config(_) | ServiceError::Internal { .. } => ErrorClass::Configuration,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Redact secrets and sensitive paths, and bound the message length
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = AUTH_HEADER_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SECRET_PATTERN
        .replace_all(&sanitized, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}
