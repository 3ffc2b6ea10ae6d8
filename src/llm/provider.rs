//! LLM provider abstraction and trait definitions
//!
//! Specialist scorers talk to a vision-capable chat model through this trait,
//! so tests can substitute a scripted provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Attached images as `data:` URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Message {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image<S: Into<String>>(mut self, data_url: S) -> Self {
        self.images.push(data_url.into());
        self
    }
}

/// Message roles in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// LLM completion request parameters
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Sampling seed, for providers that support reproducible decoding
    pub seed: Option<u64>,
    pub response_format: Option<ResponseFormat>,
    pub metadata: HashMap<String, String>,
}

/// LLM completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
    pub metadata: HashMap<String, String>,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason why completion finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

/// Response format for structured outputs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    /// JSON object without schema validation
    Json,
}

/// LLM provider trait for dependency injection and testing
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "openai")
    fn name(&self) -> &str;

    /// Generate a completion from the given request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// LLM provider errors
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error: {0}")]
    ApiError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builders() {
        let message = Message::user("Score this photo").with_image("data:image/jpeg;base64,AAAA");
        assert_eq!(message.role, MessageRole::User);
        assert_eq!(message.images.len(), 1);

        let system = Message::system("You are a dermatology assistant.");
        assert_eq!(system.role, MessageRole::System);
        assert!(system.images.is_empty());
    }

    #[test]
    fn test_completion_request_defaults() {
        let request = CompletionRequest {
            messages: vec![Message::user("Hello!")],
            model: "gpt-4o".to_string(),
            temperature: Some(0.0),
            seed: Some(42),
            ..Default::default()
        };

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.seed, Some(42));
        assert!(request.response_format.is_none());
        assert!(request.metadata.is_empty());
    }

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(serde_json::to_string(&MessageRole::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
    }

    #[test]
    fn test_message_without_images_omits_field() {
        let json = serde_json::to_string(&Message::user("Test")).unwrap();
        assert!(!json.contains("images"));

        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.content, "Test");
        assert!(deserialized.images.is_empty());
    }

    #[test]
    fn test_llm_error_display() {
        let error = LlmError::RateLimitExceeded("slow down".to_string());
        assert_eq!(error.to_string(), "Rate limit exceeded: slow down");
    }
}
