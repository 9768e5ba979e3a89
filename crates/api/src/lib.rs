//! LiteMaaS API Library
//!
//! HTTP server components for the LiteMaaS portal: auth, resource services
//! and the admin usage analytics endpoints.

pub mod audit_constants;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
