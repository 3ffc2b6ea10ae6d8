//! In-memory task registry with time-based expiry
//!
//! Records live in a sharded [`DashMap`]; readers always receive clones taken
//! under the entry lock, so a partially written record is never observed.
//!
//! Expiry is lazy. Every `get` checks the requested record first, and a full
//! sweep of stale records runs at most once per `sweep_interval`.

use super::record::{Task, TaskId, TaskStatus};
use crate::error::TaskFailure;
use crate::scoring::ScoreSet;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),
    #[error("Task {0} already reached a terminal status")]
    AlreadyTerminal(TaskId),
    #[error("Rejected mutation of task {id}: {reason}")]
    InvalidRecord { id: TaskId, reason: String },
}

/// Wall clock used for creation stamps and expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct StoreEntry {
    task: Task,
    worker: Option<AbortHandle>,
}

/// Per-status tallies of live records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    pub processing: usize,
    pub success: usize,
    pub failed: usize,
}

pub struct TaskStore {
    entries: DashMap<TaskId, StoreEntry>,
    ttl: Duration,
    sweep_interval: Duration,
    last_sweep: Mutex<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl TaskStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            entries: DashMap::new(),
            ttl,
            sweep_interval: ttl / 10,
            last_sweep: Mutex::new(now),
            clock,
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Insert a fresh Processing record. No I/O.
    pub fn create(&self) -> TaskId {
        let id = TaskId::new();
        let task = Task::new(id, self.clock.now());
        self.entries.insert(id, StoreEntry { task, worker: None });
        debug!(task_id = %id, "Task created");
        id
    }

    /// Snapshot of a live record. Expired records read as NotFound.
    pub fn get(&self, id: &TaskId) -> Result<Task, StoreError> {
        let now = self.clock.now();
        let lookup = self.entries.get(id).map(|entry| {
            if entry.task.is_expired(now, self.ttl) {
                None
            } else {
                Some(entry.task.clone())
            }
        });

        let result = match lookup {
            Some(Some(task)) => Ok(task),
            Some(None) => {
                self.evict_if_expired(id, now);
                Err(StoreError::NotFound(*id))
            }
            None => Err(StoreError::NotFound(*id)),
        };

        self.maybe_sweep(now);
        result
    }

    /// Apply `mutation` atomically to a non-terminal record.
    ///
    /// The mutation runs on a copy; the copy only replaces the record if it
    /// keeps the identity fields and is internally consistent.
    pub fn update<F>(&self, id: &TaskId, mutation: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task),
    {
        let now = self.clock.now();
        let outcome = match self.entries.get_mut(id) {
            None => Err(StoreError::NotFound(*id)),
            Some(mut entry) => {
                if entry.task.is_expired(now, self.ttl) {
                    Err(StoreError::NotFound(*id))
                } else if entry.task.is_terminal() {
                    Err(StoreError::AlreadyTerminal(*id))
                } else {
                    let mut candidate = entry.task.clone();
                    mutation(&mut candidate);
                    Self::validate_transition(&entry.task, &candidate)?;
                    entry.task = candidate.clone();
                    Ok(candidate)
                }
            }
        };

        if matches!(outcome, Err(StoreError::NotFound(_))) {
            self.evict_if_expired(id, now);
        }
        outcome
    }

    fn validate_transition(current: &Task, candidate: &Task) -> Result<(), StoreError> {
        let reject = |reason: &str| StoreError::InvalidRecord {
            id: current.id,
            reason: reason.to_string(),
        };

        if candidate.id != current.id || candidate.created_at != current.created_at {
            return Err(reject("identity fields are immutable"));
        }
        if !candidate.is_consistent() {
            return Err(reject("result and error must match the status"));
        }
        Ok(())
    }

    pub fn set_sub_status(&self, id: &TaskId, label: &str) -> Result<(), StoreError> {
        self.update(id, |task| task.sub_status = label.to_string())
            .map(|_| ())
    }

    pub fn set_external_task_id(&self, id: &TaskId, remote_id: &str) -> Result<(), StoreError> {
        self.update(id, |task| task.external_task_id = Some(remote_id.to_string()))
            .map(|_| ())
    }

    /// Terminal success write
    pub fn complete(&self, id: &TaskId, scores: ScoreSet) -> Result<Task, StoreError> {
        self.complete_with_raw(id, scores, None)
    }

    /// Terminal success write that also keeps the parsed remote document
    pub fn complete_with_raw(
        &self,
        id: &TaskId,
        scores: ScoreSet,
        raw_scores: Option<Map<String, Value>>,
    ) -> Result<Task, StoreError> {
        self.update(id, |task| {
            task.status = TaskStatus::Success;
            task.sub_status = "completed".to_string();
            task.result = Some(scores);
            task.raw_scores = raw_scores;
        })
    }

    /// Terminal failure write
    pub fn fail(&self, id: &TaskId, failure: TaskFailure) -> Result<Task, StoreError> {
        self.update(id, |task| {
            task.status = TaskStatus::Failed;
            task.sub_status = "failed".to_string();
            task.error = Some(failure);
        })
    }

    /// Remove a record. Idempotent; a running executor is left alone.
    pub fn delete(&self, id: &TaskId) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            debug!(task_id = %id, "Task deleted");
        }
        removed
    }

    /// Track the executor driving `id`. Returns false if the record is gone.
    pub fn attach_worker(&self, id: &TaskId, handle: AbortHandle) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.worker = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Abort every tracked executor. Only used at shutdown.
    pub fn abort_all(&self) -> usize {
        let mut aborted = 0;
        for mut entry in self.entries.iter_mut() {
            if let Some(handle) = entry.worker.take() {
                if !handle.is_finished() {
                    handle.abort();
                    aborted += 1;
                }
            }
        }
        aborted
    }

    /// Evict every record older than the TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        *self.last_sweep.lock() = now;
        self.sweep_at(now)
    }

    fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.task.is_expired(now, self.ttl));
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, "Expired tasks swept");
        }
        evicted
    }

    fn maybe_sweep(&self, now: DateTime<Utc>) {
        let due = {
            let mut last = self.last_sweep.lock();
            let interval = chrono::Duration::from_std(self.sweep_interval)
                .unwrap_or_else(|_| chrono::Duration::zero());
            if now - *last >= interval {
                *last = now;
                true
            } else {
                false
            }
        };
        if due {
            self.sweep_at(now);
        }
    }

    fn evict_if_expired(&self, id: &TaskId, now: DateTime<Utc>) {
        self.entries
            .remove_if(id, |_, entry| entry.task.is_expired(now, self.ttl));
    }

    /// Number of stored records, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counts(&self) -> TaskCounts {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|entry| !entry.task.is_expired(now, self.ttl))
            .fold(TaskCounts::default(), |mut counts, entry| {
                match entry.task.status {
                    TaskStatus::Processing => counts.processing += 1,
                    TaskStatus::Success => counts.success += 1,
                    TaskStatus::Failed => counts.failed += 1,
                }
                counts
            })
    }
}
