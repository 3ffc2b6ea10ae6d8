//! Specialist score sources backed by a vision-capable LLM

use super::params::Parameter;
use super::synthesizer::{ScoreSource, SourceError, SourceReading};
use crate::imaging::NormalizedImage;
use crate::llm::{CompletionRequest, LlmError, LlmProvider, Message, ResponseFormat};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You grade facial skin photos. Reply with a single JSON object \
and nothing else. Each value is a number from 0 to 100 where higher means the concern is \
more pronounced.";

/// Scores a fixed parameter subset with one deterministic LLM call
pub struct LlmSpecialistSource {
    name: String,
    provider: Arc<dyn LlmProvider>,
    model: String,
    covers: Vec<Parameter>,
}

impl LlmSpecialistSource {
    pub fn new(provider: Arc<dyn LlmProvider>, model: String, covers: Vec<Parameter>) -> Self {
        let name = format!(
            "{}:{}",
            provider.name(),
            covers.iter().map(Parameter::name).collect::<Vec<_>>().join("+")
        );
        Self {
            name,
            provider,
            model,
            covers,
        }
    }

    fn instruction(&self) -> String {
        let keys = self
            .covers
            .iter()
            .map(|p| format!("\"{}\"", p.name()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Score this photo. Return exactly these keys: {keys}.")
    }

    fn build_request(&self, image: &NormalizedImage, seed: u64) -> CompletionRequest {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), self.name.clone());

        CompletionRequest {
            messages: vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(self.instruction()).with_image(image.data_url()),
            ],
            model: self.model.clone(),
            max_tokens: Some(200),
            temperature: Some(0.0),
            seed: Some(seed),
            response_format: Some(ResponseFormat::Json),
            metadata,
        }
    }
}

/// Parse a reply into a JSON object, tolerating a fenced code block
pub fn parse_reply(content: &str) -> Result<Map<String, Value>, SourceError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(SourceError::InvalidReply(format!(
            "expected a JSON object, got {}",
            other
        ))),
        Err(e) => Err(SourceError::InvalidReply(e.to_string())),
    }
}

impl From<LlmError> for SourceError {
    fn from(e: LlmError) -> Self {
        SourceError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl ScoreSource for LlmSpecialistSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn covers(&self) -> &[Parameter] {
        &self.covers
    }

    async fn measure(
        &self,
        image: &NormalizedImage,
        seed: u64,
    ) -> Result<SourceReading, SourceError> {
        let response = self.provider.complete(self.build_request(image, seed)).await?;
        let content = response
            .content
            .ok_or_else(|| SourceError::InvalidReply("empty reply".to_string()))?;
        let document = parse_reply(&content)?;

        let reading = SourceReading::from_named_values(&self.name, &document, &self.covers);
        debug!(source = %self.name, seed, values = reading.values.len(), "Specialist measured");
        Ok(reading)
    }
}
