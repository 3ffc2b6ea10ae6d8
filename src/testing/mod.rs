//! Testing utilities and mock implementations
//!
//! Scripted collaborators for exercising the analysis workflow without the
//! remote service, an LLM provider or real image decoding.

pub mod mocks;

pub use mocks::*;
