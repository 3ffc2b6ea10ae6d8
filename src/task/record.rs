//! Task record and its lifecycle invariants

use crate::error::TaskFailure;
use crate::scoring::ScoreSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Label of a freshly created task
pub const QUEUED: &str = "queued";

/// Opaque task identifier, UUID v4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Stored status. Expiry is a read-time projection, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Processing,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    pub sub_status: String,
    pub created_at: DateTime<Utc>,
    pub result: Option<ScoreSet>,
    /// The remote score document as parsed, kept alongside a successful result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_scores: Option<Map<String, Value>>,
    pub error: Option<TaskFailure>,
    pub external_task_id: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: TaskStatus::Processing,
            sub_status: QUEUED.to_string(),
            created_at,
            result: None,
            raw_scores: None,
            error: None,
            external_task_id: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whole seconds since creation, never negative
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.created_at).num_seconds().max(0) as u64
    }

    /// `now - created_at > ttl`, whatever the status
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now - self.created_at;
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age > ttl,
            Err(_) => false,
        }
    }

    /// Result is present iff Success, error iff Failed. Raw scores only ride on success.
    pub fn is_consistent(&self) -> bool {
        if self.raw_scores.is_some() && self.status != TaskStatus::Success {
            return false;
        }
        match self.status {
            TaskStatus::Processing => self.result.is_none() && self.error.is_none(),
            TaskStatus::Success => self.result.is_some() && self.error.is_none(),
            TaskStatus::Failed => self.result.is_none() && self.error.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_queued() {
        let task = Task::new(TaskId::new(), Utc::now());
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.sub_status, "queued");
        assert!(task.is_consistent());
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_task_id_round_trip() {
        let id = TaskId::new();
        assert_eq!(id.to_string().parse::<TaskId>().unwrap(), id);
        assert!("not-a-uuid".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_expiry_is_strictly_greater() {
        let created = Utc::now();
        let task = Task::new(TaskId::new(), created);
        let ttl = Duration::from_secs(600);

        assert!(!task.is_expired(created + chrono::Duration::seconds(600), ttl));
        assert!(task.is_expired(created + chrono::Duration::seconds(601), ttl));
    }

    #[test]
    fn test_elapsed_seconds() {
        let created = Utc::now();
        let task = Task::new(TaskId::new(), created);
        assert_eq!(task.elapsed_seconds(created + chrono::Duration::seconds(42)), 42);
        assert_eq!(task.elapsed_seconds(created - chrono::Duration::seconds(5)), 0);
    }

    #[test]
    fn test_consistency_rules() {
        let mut task = Task::new(TaskId::new(), Utc::now());
        task.status = TaskStatus::Success;
        assert!(!task.is_consistent());
        task.result = Some(ScoreSet::default());
        assert!(task.is_consistent());
        task.error = Some(TaskFailure::parse("x"));
        assert!(!task.is_consistent());
    }

    #[test]
    fn test_raw_scores_only_on_success() {
        let mut task = Task::new(TaskId::new(), Utc::now());
        task.raw_scores = Some(Map::new());
        assert!(!task.is_consistent());

        task.status = TaskStatus::Success;
        task.result = Some(ScoreSet::default());
        assert!(task.is_consistent());
    }
}
