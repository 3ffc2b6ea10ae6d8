//! Submit / poll / delete facade over the task store and executor
//!
//! This is the surface the HTTP layer talks to. Submission only creates a
//! record and spawns its executor; it never waits on the remote service.

use crate::config::ServiceConfig;
use crate::error::{ErrorClass, ServiceError, ServiceResult};
use crate::imaging::{ImageNormalizer, JpegNormalizer};
use crate::llm::{OpenAiConfig, OpenAiProvider};
use crate::observability::metrics;
use crate::remote::{HttpSkinClient, RemoteAnalysisClient};
use crate::scoring::{
    CalibrationContext, LlmSpecialistSource, Parameter, ScoreSet, ScoreSource, ScoreSynthesizer,
};
use crate::task::{Task, TaskCounts, TaskId, TaskStatus, TaskStore};
use crate::workflow::{ExecutorSettings, TaskPayload, WorkflowExecutor};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Suggested client poll cadence while a task is processing
pub const RECOMMENDED_POLL_SECONDS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub task_id: String,
    pub status: &'static str,
    pub poll_path: String,
}

/// Exactly one of the four shapes a poll can return
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollOutcome {
    Success {
        #[serde(rename = "taskId")]
        task_id: String,
        scores: ScoreSet,
        #[serde(rename = "overallHealth")]
        overall_health: u8,
        /// Remote score document as parsed, before calibration
        #[serde(rename = "rawScores", skip_serializing_if = "Option::is_none")]
        raw_scores: Option<Map<String, Value>>,
    },
    Failed {
        #[serde(rename = "taskId")]
        task_id: String,
        #[serde(rename = "errorMessage")]
        error_message: String,
        classification: ErrorClass,
        #[serde(rename = "failedStep", skip_serializing_if = "Option::is_none")]
        failed_step: Option<String>,
    },
    Processing {
        #[serde(rename = "taskId")]
        task_id: String,
        #[serde(rename = "subStatus")]
        sub_status: String,
        #[serde(rename = "elapsedSeconds")]
        elapsed_seconds: u64,
        #[serde(rename = "recommendedPollSeconds")]
        recommended_poll_seconds: u64,
    },
    NotFound {
        classification: ErrorClass,
        message: String,
    },
}

impl PollOutcome {
    fn not_found() -> Self {
        PollOutcome::NotFound {
            classification: ErrorClass::NotFound,
            message: "Task not found or expired".to_string(),
        }
    }

    fn from_task(task: Task, elapsed_seconds: u64) -> Self {
        let task_id = task.id.to_string();
        match (task.status, task.result, task.error) {
            (TaskStatus::Success, Some(scores), _) => PollOutcome::Success {
                task_id,
                overall_health: scores.overall_health(),
                scores,
                raw_scores: task.raw_scores,
            },
            (TaskStatus::Failed, _, Some(error)) => PollOutcome::Failed {
                task_id,
                error_message: error.message,
                classification: error.class,
                failed_step: error.step,
            },
            _ => PollOutcome::Processing {
                task_id,
                sub_status: task.sub_status,
                elapsed_seconds,
                recommended_poll_seconds: RECOMMENDED_POLL_SECONDS,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PollOutcome::NotFound { .. })
    }
}

/// Diagnostic readiness booleans
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub api_key_configured: bool,
    pub normalizer_ready: bool,
    pub tasks_tracked: usize,
    pub tasks: TaskCounts,
    pub specialist_sources: usize,
}

/// Entry point for submit, poll and delete
///
/// ```rust
/// use dermascore::scoring::ScoreSynthesizer;
/// use dermascore::service::{AnalysisService, PollOutcome};
/// use dermascore::task::TaskStore;
/// use dermascore::testing::{MockNormalizer, MockRemoteClient};
/// use dermascore::workflow::ExecutorSettings;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let service = AnalysisService::new(
///     Arc::new(TaskStore::default()),
///     Arc::new(MockRemoteClient::new()),
///     Arc::new(MockNormalizer::new()),
///     Arc::new(ScoreSynthesizer::new()),
///     ExecutorSettings::default(),
/// );
///
/// let receipt = service.submit(bytes::Bytes::from_static(b"photo"), None)?;
/// assert!(matches!(
///     service.poll(&receipt.task_id),
///     PollOutcome::Processing { .. } | PollOutcome::Success { .. }
/// ));
/// assert!(service.poll("not-a-task").is_not_found());
/// # Ok::<(), dermascore::ServiceError>(())
/// # }).unwrap();
/// ```
pub struct AnalysisService {
    store: Arc<TaskStore>,
    executor: Arc<WorkflowExecutor>,
    client: Arc<dyn RemoteAnalysisClient>,
    normalizer: Arc<dyn ImageNormalizer>,
    synthesizer: Arc<ScoreSynthesizer>,
}

impl AnalysisService {
    pub fn new(
        store: Arc<TaskStore>,
        client: Arc<dyn RemoteAnalysisClient>,
        normalizer: Arc<dyn ImageNormalizer>,
        synthesizer: Arc<ScoreSynthesizer>,
        settings: ExecutorSettings,
    ) -> Self {
        let executor = Arc::new(WorkflowExecutor::new(
            Arc::clone(&store),
            Arc::clone(&client),
            Arc::clone(&normalizer),
            Arc::clone(&synthesizer),
            settings,
        ));
        Self {
            store,
            executor,
            client,
            normalizer,
            synthesizer,
        }
    }

    /// Wire the production collaborators from configuration
    pub fn from_config(config: &ServiceConfig) -> ServiceResult<Self> {
        config.validate()?;

        let store = Arc::new(TaskStore::new(config.task_ttl()));
        let client: Arc<dyn RemoteAnalysisClient> =
            Arc::new(HttpSkinClient::from_config(&config.remote)?);
        let normalizer: Arc<dyn ImageNormalizer> =
            Arc::new(JpegNormalizer::from_config(&config.image));
        let synthesizer = Arc::new(Self::build_synthesizer(config)?);

        if !client.is_configured() {
            warn!(
                env = %config.remote.api_key_env,
                "Remote API key not set; submissions will be rejected until it is"
            );
        }

        Ok(Self::new(
            store,
            client,
            normalizer,
            synthesizer,
            ExecutorSettings::from_config(config),
        ))
    }

    fn build_synthesizer(config: &ServiceConfig) -> ServiceResult<ScoreSynthesizer> {
        let (Some(llm), Some(key)) = (config.llm.as_ref(), config.get_llm_api_key()) else {
            return Ok(ScoreSynthesizer::new());
        };

        let api_key = match key {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Specialist scoring disabled");
                return Ok(ScoreSynthesizer::new());
            }
        };

        let provider = Arc::new(
            OpenAiProvider::new(OpenAiConfig {
                api_key,
                base_url: llm.base_url.clone(),
                timeout: Duration::from_secs(llm.timeout_secs),
            })
            .map_err(|e| ServiceError::internal(e.to_string()))?,
        );

        let mut specialists: Vec<Arc<dyn ScoreSource>> = Vec::new();
        for group in &llm.specialists {
            let covers = group
                .iter()
                .map(|name| name.parse::<Parameter>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    ServiceError::Config(crate::config::ConfigError::InvalidConfig(e))
                })?;
            specialists.push(Arc::new(LlmSpecialistSource::new(
                provider.clone(),
                llm.model.clone(),
                covers,
            )));
        }

        info!(count = specialists.len(), model = %llm.model, "Specialist score sources enabled");
        Ok(ScoreSynthesizer::with_specialists(specialists))
    }

    /// Create a task and start its executor. Fails only on missing configuration.
    pub fn submit(
        &self,
        image: Bytes,
        context: Option<CalibrationContext>,
    ) -> ServiceResult<SubmitReceipt> {
        if let Err(e) = self.client.ensure_configured() {
            metrics().task_rejected();
            return Err(ServiceError::Config(e));
        }

        let id = self.store.create();
        metrics().task_submitted();
        info!(task_id = %id, bytes = image.len(), calibrated = context.is_some(), "Analysis submitted");

        self.executor.spawn(id, TaskPayload { image, context });

        Ok(SubmitReceipt {
            task_id: id.to_string(),
            status: "processing",
            poll_path: format!("/analyze/{id}"),
        })
    }

    /// Malformed and unknown ids both read as NotFound
    pub fn poll(&self, raw_id: &str) -> PollOutcome {
        let Ok(id) = raw_id.parse::<TaskId>() else {
            return PollOutcome::not_found();
        };

        match self.store.get(&id) {
            Ok(task) => {
                let elapsed = task.elapsed_seconds(self.store.now());
                PollOutcome::from_task(task, elapsed)
            }
            Err(_) => PollOutcome::not_found(),
        }
    }

    /// Always succeeds; returns whether a record was removed
    pub fn delete(&self, raw_id: &str) -> bool {
        raw_id
            .parse::<TaskId>()
            .map(|id| self.store.delete(&id))
            .unwrap_or(false)
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            api_key_configured: self.client.is_configured(),
            normalizer_ready: self.normalizer.is_ready(),
            tasks_tracked: self.store.len(),
            tasks: self.store.counts(),
            specialist_sources: self.synthesizer.specialist_count(),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Abort in-flight executors. Returns how many were stopped.
    pub fn shutdown(&self) -> usize {
        let aborted = self.store.abort_all();
        info!(aborted, "Analysis service shut down");
        aborted
    }
}
