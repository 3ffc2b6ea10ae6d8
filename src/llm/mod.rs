//! LLM provider abstraction layer
//!
//! Vision-capable chat models back the specialist score sources.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;
