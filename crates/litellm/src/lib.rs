//! LiteMaaS LiteLLM integration
//!
//! Thin HTTP wrapper over the LiteLLM proxy admin API: daily spend activity,
//! model info, key and team provisioning. A mock mode serves deterministic
//! data for development without a running gateway.

pub mod client;
pub mod error;
pub mod mock;
pub mod types;

pub use client::{LiteLlmClient, LiteLlmConfig};
pub use error::{LiteLlmError, LiteLlmResult};
pub use types::*;
