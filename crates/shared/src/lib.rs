//! LiteMaaS Shared Types and Utilities
//!
//! This crate contains types, errors, and utilities shared across the LiteMaaS backend.

pub mod db;
pub mod error;
pub mod rate_limit;
pub mod types;

pub use db::*;
pub use error::*;
pub use rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use types::*;
