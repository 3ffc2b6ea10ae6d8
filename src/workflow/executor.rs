//! Per-task state machine driving the remote analysis protocol
//!
//! One executor run owns one task: it is the only writer of that task's
//! outcome, it never retries a remote step, and it never returns an error to
//! whoever spawned it. Every failure ends up classified in the task record.

use super::stage::WorkflowStage;
use crate::config::ServiceConfig;
use crate::error::TaskFailure;
use crate::imaging::{ImageNormalizer, NormalizedImage};
use crate::observability::metrics;
use crate::remote::{extract_score_document, RemoteAnalysisClient, RemoteStatus, RemoteStep};
use crate::scoring::{CalibrationContext, ScoreSet, ScoreSynthesizer, SourceReading};
use crate::task::{StoreError, TaskId, TaskStore};
use crate::task_span;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Name under which the remote score document is merged
pub const REMOTE_SOURCE: &str = "remote";

/// Synthesized scores plus the remote document they were read from
type Analysis = (ScoreSet, Map<String, Value>);

/// What a submission hands to its executor
#[derive(Debug, Clone)]
pub struct TaskPayload {
    pub image: Bytes,
    pub context: Option<CalibrationContext>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    pub poll_interval: Duration,
    pub poll_deadline: Duration,
    pub score_file_suffix: String,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_config(&ServiceConfig::default())
    }
}

impl ExecutorSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            poll_deadline: config.poll_deadline(),
            score_file_suffix: config.remote.score_file_suffix.clone(),
        }
    }
}

pub struct WorkflowExecutor {
    store: Arc<TaskStore>,
    client: Arc<dyn RemoteAnalysisClient>,
    normalizer: Arc<dyn ImageNormalizer>,
    synthesizer: Arc<ScoreSynthesizer>,
    settings: ExecutorSettings,
}

impl WorkflowExecutor {
    pub fn new(
        store: Arc<TaskStore>,
        client: Arc<dyn RemoteAnalysisClient>,
        normalizer: Arc<dyn ImageNormalizer>,
        synthesizer: Arc<ScoreSynthesizer>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            store,
            client,
            normalizer,
            synthesizer,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Run `id` on its own tokio task and register it with the store
    pub fn spawn(self: &Arc<Self>, id: TaskId, payload: TaskPayload) -> JoinHandle<()> {
        let executor = Arc::clone(self);
        let span = task_span!(task_id = %id, protocol = %self.client.protocol());
        let handle = tokio::spawn(async move { executor.run(id, payload).await }.instrument(span));
        if !self.store.attach_worker(&id, handle.abort_handle()) {
            debug!(task_id = %id, "Task removed before its executor was attached");
        }
        handle
    }

    /// Drive the task to a terminal state. Never fails.
    pub async fn run(&self, id: TaskId, payload: TaskPayload) {
        let started = Instant::now();
        metrics().task_started();

        let outcome = self.execute(&id, payload).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok((scores, raw_scores)) => {
                metrics().task_succeeded(elapsed);
                let write = self.store.complete_with_raw(&id, scores, Some(raw_scores));
                self.settle(&id, write.map(|_| ()));
                info!(task_id = %id, elapsed_ms = elapsed.as_millis() as u64, "Analysis completed");
            }
            Err(failure) => {
                metrics().task_failed(failure.class, elapsed);
                warn!(
                    task_id = %id,
                    class = %failure.class,
                    step = failure.step.as_deref().unwrap_or("-"),
                    "Analysis failed: {}",
                    failure.message
                );
                let write = self.store.fail(&id, failure);
                self.settle(&id, write.map(|_| ()));
            }
        }
    }

    /// Terminal writes to a vanished record are discarded
    fn settle(&self, id: &TaskId, write: Result<(), StoreError>) {
        match write {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                metrics().write_discarded();
                debug!(task_id = %id, "Task deleted or expired before completion, result discarded");
            }
            Err(e) => warn!(task_id = %id, error = %e, "Terminal write rejected"),
        }
    }

    /// Progress labels are best effort: a deleted record does not stop the run
    fn mark(&self, id: &TaskId, label: &str) {
        if let Err(e) = self.store.set_sub_status(id, label) {
            debug!(task_id = %id, label, error = %e, "Progress update skipped");
        }
    }

    async fn execute(&self, id: &TaskId, payload: TaskPayload) -> Result<Analysis, TaskFailure> {
        self.mark(id, WorkflowStage::PreparingPayload.label());
        let image = self.prepare(payload.image).await?;

        self.mark(id, WorkflowStage::UploadingRemote.label());
        let content_id = self.client.upload(&image).await?;
        debug!(task_id = %id, content_id = %content_id, "Payload uploaded");

        self.mark(id, WorkflowStage::StartingRemoteTask.label());
        let remote_task_id = self.client.start_task(&content_id).await?;
        if let Err(e) = self.store.set_external_task_id(id, &remote_task_id) {
            debug!(task_id = %id, error = %e, "Remote task id not recorded");
        }
        info!(task_id = %id, remote_task_id = %remote_task_id, "Remote task started");

        self.mark(id, WorkflowStage::PollingRemote.label());
        let result_url = self.poll_until_terminal(id, &remote_task_id).await?;

        self.mark(id, WorkflowStage::FetchingResult.label());
        let bundle = self.client.fetch_bundle(&result_url).await?;
        let document = self.extract(bundle).await?;

        let primary = SourceReading::from_remote_document(REMOTE_SOURCE, &document);
        let scores = self
            .synthesizer
            .synthesize(&image, primary, payload.context.as_ref())
            .await;
        Ok((scores, document))
    }

    async fn prepare(&self, raw: Bytes) -> Result<NormalizedImage, TaskFailure> {
        let normalizer = Arc::clone(&self.normalizer);
        let normalized = tokio::task::spawn_blocking(move || normalizer.normalize(&raw))
            .await
            .map_err(|e| TaskFailure::input(format!("image normalization aborted: {e}")))?;

        normalized.map_err(|e| {
            TaskFailure::input(e.to_string()).at_step(WorkflowStage::PreparingPayload.label())
        })
    }

    /// Decompression runs off the async workers
    async fn extract(&self, bundle: Bytes) -> Result<Map<String, Value>, TaskFailure> {
        let suffix = self.settings.score_file_suffix.clone();
        let document = tokio::task::spawn_blocking(move || extract_score_document(&bundle, &suffix))
            .await
            .map_err(|e| {
                TaskFailure::parse(format!("result extraction aborted: {e}"))
                    .at_step(RemoteStep::FetchResult.as_str())
            })??;
        Ok(document)
    }

    /// Poll until a terminal remote status or the deadline.
    ///
    /// The wait between polls never overshoots the deadline, and one last poll
    /// is made at the deadline itself before giving up.
    async fn poll_until_terminal(
        &self,
        id: &TaskId,
        remote_task_id: &str,
    ) -> Result<String, TaskFailure> {
        let deadline = Instant::now() + self.settings.poll_deadline;

        loop {
            match self.client.poll_status(remote_task_id).await? {
                RemoteStatus::Succeeded { result_url } => return Ok(result_url),
                RemoteStatus::Failed { reason } => {
                    return Err(TaskFailure::remote_task(reason).at_step("poll"))
                }
                RemoteStatus::Pending(status) => {
                    debug!(task_id = %id, remote_status = %status, "Remote task pending");
                    self.mark(id, &status);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TaskFailure::timeout(format!(
                    "remote task {remote_task_id} not finished within {}s",
                    self.settings.poll_deadline.as_secs()
                ))
                .at_step("poll"));
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }
}
