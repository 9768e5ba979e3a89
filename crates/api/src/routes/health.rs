//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub litellm: String,
}

fn label(healthy: bool) -> String {
    if healthy { "healthy" } else { "unhealthy" }.to_string()
}

async fn database_healthy(state: &AppState) -> Option<bool> {
    if !state.config.has_database() {
        return None;
    }
    Some(sqlx::query("SELECT 1").execute(&state.pool).await.is_ok())
}

/// Health check endpoint. Only the database decides the status code; a
/// LiteLLM outage degrades analytics and key creation but not the portal.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (db, litellm) = tokio::join!(database_healthy(&state), state.litellm.health());
    let db_healthy = db.unwrap_or(true);

    let status = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if db_healthy && litellm {
                "healthy".to_string()
            } else if db_healthy {
                "degraded".to_string()
            } else {
                "unhealthy".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: db.map_or_else(|| "disabled".to_string(), label),
            litellm: label(litellm),
        }),
    )
}

/// Liveness probe (just returns 200 if the server is running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe (checks if the service is ready to accept traffic)
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match database_healthy(&state).await {
        Some(false) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    }
}
