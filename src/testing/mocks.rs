//! Mock implementations for testing
//!
//! Provides mock Clock, LlmProvider, RemoteAnalysisClient, ImageNormalizer and
//! ScoreSource implementations so the workflow can be driven end to end
//! without network access.

use crate::config::ConfigError;
use crate::imaging::{ImageNormalizer, NormalizeError, NormalizedImage};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use crate::remote::{
    ProtocolVersion, RemoteAnalysisClient, RemoteError, RemoteErrorKind, RemoteStatus, RemoteStep,
};
use crate::scoring::{Parameter, RawMeasurement, ScoreSource, SourceError, SourceReading};
use crate::task::Clock;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Wall clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        *self.now.lock() += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Mock LLM provider for testing
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    pub responses: Vec<String>,
    pub current_response: Mutex<usize>,
    pub should_fail: bool,
    seeds: Mutex<Vec<Option<u64>>>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            ..Default::default()
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Seeds of every request received, in order
    pub fn seeds_seen(&self) -> Vec<Option<u64>> {
        self.seeds.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.seeds.lock().push(request.seed);

        if self.should_fail {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let content = {
            let mut current = self.current_response.lock();
            let idx = *current % self.responses.len().max(1);
            *current += 1;
            self.responses
                .get(idx)
                .cloned()
                .unwrap_or_else(|| "{}".to_string())
        };

        Ok(CompletionResponse {
            content: Some(content),
            model: request.model,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            metadata: HashMap::new(),
        })
    }
}

/// How a [`MockRemoteClient`] job ends once it stops pending
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    Succeed,
    Fail(String),
    /// Stay pending forever
    Never,
}

/// Scripted remote analysis service.
///
/// The job reports `pending_status` until `pending_for` has elapsed since
/// `start_task` (measured on the tokio clock, so paused-time tests are
/// exact), then resolves to `outcome`.
pub struct MockRemoteClient {
    protocol: ProtocolVersion,
    configured: AtomicBool,
    fail_at: Option<(RemoteStep, RemoteErrorKind)>,
    pending_for: Duration,
    pending_status: String,
    outcome: MockOutcome,
    bundle: Bytes,
    started_at: Mutex<Option<Instant>>,
    upload_calls: AtomicUsize,
    start_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl Default for MockRemoteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemoteClient {
    /// Succeeds on the first poll with an all-50 score document
    pub fn new() -> Self {
        Self {
            protocol: ProtocolVersion::V1,
            configured: AtomicBool::new(true),
            fail_at: None,
            pending_for: Duration::ZERO,
            pending_status: "running".to_string(),
            outcome: MockOutcome::Succeed,
            bundle: score_bundle(&serde_json::json!({})),
            started_at: Mutex::new(None),
            upload_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn unconfigured(self) -> Self {
        self.configured.store(false, Ordering::SeqCst);
        self
    }

    pub fn failing_at(mut self, step: RemoteStep, kind: RemoteErrorKind) -> Self {
        self.fail_at = Some((step, kind));
        self
    }

    pub fn pending_for(mut self, duration: Duration) -> Self {
        self.pending_for = duration;
        self
    }

    pub fn with_pending_status(mut self, status: impl Into<String>) -> Self {
        self.pending_status = status.into();
        self
    }

    pub fn with_outcome(mut self, outcome: MockOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_bundle(mut self, bundle: Bytes) -> Self {
        self.bundle = bundle;
        self
    }

    /// Serve `document` as the score file of the result bundle
    pub fn with_score_document(self, document: &Value) -> Self {
        self.with_bundle(score_bundle(document))
    }

    pub fn set_configured(&self, configured: bool) {
        self.configured.store(configured, Ordering::SeqCst);
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn check(&self, step: RemoteStep) -> Result<(), RemoteError> {
        match self.fail_at {
            Some((at, kind)) if at == step => Err(RemoteError {
                step,
                kind,
                message: "scripted failure".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteAnalysisClient for MockRemoteClient {
    fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    fn ensure_configured(&self) -> Result<(), ConfigError> {
        if self.configured.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConfigError::EnvVarNotFound("SKIN_API_KEY".to_string()))
        }
    }

    async fn upload(&self, _image: &NormalizedImage) -> Result<String, RemoteError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.protocol == ProtocolVersion::V2 {
            self.check(RemoteStep::UploadSlot)?;
        }
        self.check(RemoteStep::UploadTransfer)?;
        Ok("content-1".to_string())
    }

    async fn start_task(&self, _content_id: &str) -> Result<String, RemoteError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.check(RemoteStep::StartTask)?;
        *self.started_at.lock() = Some(Instant::now());
        Ok("remote-task-1".to_string())
    }

    async fn poll_status(&self, _remote_task_id: &str) -> Result<RemoteStatus, RemoteError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.check(RemoteStep::Poll)?;

        let elapsed = self
            .started_at
            .lock()
            .map(|started| started.elapsed())
            .unwrap_or_default();

        if elapsed < self.pending_for {
            return Ok(RemoteStatus::Pending(self.pending_status.clone()));
        }

        Ok(match &self.outcome {
            MockOutcome::Succeed => RemoteStatus::Succeeded {
                result_url: "https://results.example.com/bundle.zip".to_string(),
            },
            MockOutcome::Fail(reason) => RemoteStatus::Failed {
                reason: reason.clone(),
            },
            MockOutcome::Never => RemoteStatus::Pending(self.pending_status.clone()),
        })
    }

    async fn fetch_bundle(&self, _result_url: &str) -> Result<Bytes, RemoteError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check(RemoteStep::FetchResult)?;
        Ok(self.bundle.clone())
    }
}

/// Zip archive holding `document` as `skinanalysis/score_info.json`
pub fn score_bundle(document: &Value) -> Bytes {
    bundle_with_entries(&[
        ("skinanalysis/mask_overlay.png", b"\x89PNG".to_vec()),
        (
            "skinanalysis/score_info.json",
            document.to_string().into_bytes(),
        ),
    ])
}

pub fn bundle_with_entries(entries: &[(&str, Vec<u8>)]) -> Bytes {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, body) in entries {
        writer
            .start_file(*name, options)
            .expect("in-memory zip entry");
        writer.write_all(body).expect("in-memory zip write");
    }
    Bytes::from(writer.finish().expect("in-memory zip finish").into_inner())
}

/// Normalizer that skips decoding
#[derive(Debug, Default)]
pub struct MockNormalizer {
    pub should_fail: bool,
    calls: AtomicUsize,
}

impl MockNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageNormalizer for MockNormalizer {
    fn normalize(&self, raw: &[u8]) -> Result<NormalizedImage, NormalizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if raw.is_empty() {
            return Err(NormalizeError::Empty);
        }
        if self.should_fail {
            return Err(NormalizeError::Undecodable("mock decode failure".to_string()));
        }
        Ok(NormalizedImage::new(Bytes::copy_from_slice(raw), 640, 480))
    }
}

/// Score source returning fixed values
pub struct MockScoreSource {
    name: String,
    covers: Vec<Parameter>,
    values: Vec<(Parameter, RawMeasurement)>,
    should_fail: bool,
    seeds: Mutex<Vec<u64>>,
}

impl MockScoreSource {
    pub fn new(name: impl Into<String>, values: Vec<(Parameter, f64)>) -> Self {
        Self {
            name: name.into(),
            covers: values.iter().map(|(p, _)| *p).collect(),
            values: values
                .into_iter()
                .map(|(p, v)| (p, RawMeasurement::Number(v)))
                .collect(),
            should_fail: false,
            seeds: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: impl Into<String>, covers: Vec<Parameter>) -> Self {
        Self {
            name: name.into(),
            covers,
            values: Vec::new(),
            should_fail: true,
            seeds: Mutex::new(Vec::new()),
        }
    }

    pub fn seeds_seen(&self) -> Vec<u64> {
        self.seeds.lock().clone()
    }
}

#[async_trait]
impl ScoreSource for MockScoreSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn covers(&self) -> &[Parameter] {
        &self.covers
    }

    async fn measure(
        &self,
        _image: &NormalizedImage,
        seed: u64,
    ) -> Result<SourceReading, SourceError> {
        self.seeds.lock().push(seed);
        if self.should_fail {
            return Err(SourceError::Unavailable(format!("{} is down", self.name)));
        }
        Ok(self
            .values
            .iter()
            .cloned()
            .fold(SourceReading::new(&self.name), |reading, (p, v)| {
                reading.with_value(p, v)
            }))
    }
}
