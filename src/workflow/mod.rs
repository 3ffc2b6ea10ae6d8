//! Task workflow: the executor state machine and its stages

pub mod executor;
pub mod stage;

pub use executor::{ExecutorSettings, TaskPayload, WorkflowExecutor, REMOTE_SOURCE};
pub use stage::WorkflowStage;
