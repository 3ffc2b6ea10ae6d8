//! dermascore - asynchronous skin-analysis gateway
//!
//! Exposes a slow, multi-step third-party analysis (upload, start a remote
//! job, poll, fetch a result bundle) behind a non-blocking submit/poll
//! interface, and synthesizes a bounded, calibrated score set from one or more
//! scoring sources.
//!
//! # Overview
//!
//! - [`task`]: in-memory task store with expiry
//! - [`workflow`]: per-task executor driving the remote protocol
//! - [`remote`]: HTTP client for the remote analysis service (`v1` / `v2`)
//! - [`scoring`]: normalization, merging, derivation and calibration of scores
//! - [`service`] and [`api`]: submit / poll / delete facade and its warp routes
//!
//! # Quick Start
//!
//! ```rust
//! use dermascore::scoring::{synthesize, Parameter, RawMeasurement, SourceReading};
//!
//! let remote = SourceReading::new("remote")
//!     .with_value(Parameter::Wrinkles, RawMeasurement::Number(30.0))
//!     .with_value(Parameter::Acne, RawMeasurement::Number(140.0));
//!
//! let scores = synthesize(&[remote]);
//! assert_eq!(scores.wrinkles, 30);
//! assert_eq!(scores.acne, 100);
//! // Parameters no source measured fall back to the default
//! assert_eq!(scores.pores, 50);
//! assert!(scores.is_bounded());
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod imaging;
pub mod llm;
pub mod observability;
pub mod remote;
pub mod scoring;
pub mod service;
pub mod task;
pub mod testing;
pub mod workflow;

pub use config::{ConfigError, ServiceConfig};
pub use error::{ErrorClass, ServiceError, ServiceResult, TaskFailure};
pub use scoring::{CalibrationContext, Parameter, ScoreSet};
pub use service::{AnalysisService, HealthReport, PollOutcome, SubmitReceipt};
pub use task::{Task, TaskId, TaskStatus, TaskStore};
