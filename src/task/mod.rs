//! Task records and the in-memory store that owns them

pub mod record;
pub mod store;

pub use record::{Task, TaskId, TaskStatus, QUEUED};
pub use store::{Clock, StoreError, SystemClock, TaskCounts, TaskStore, DEFAULT_TTL};
