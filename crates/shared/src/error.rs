//! Error types for LiteMaaS shared infrastructure

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedError {
    #[error("Invalid database configuration: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type SharedResult<T> = Result<T, SharedError>;
