//! Model catalogue routes

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use litemaas_shared::Model;
use serde::Deserialize;
use serde_json::json;

use crate::{
    audit_constants::{action, resource_type},
    auth::AuthUser,
    error::{ApiError, ApiResult},
    services::SyncSummary,
    state::AppState,
};

const MODEL_COLUMNS: &str = r#"
    id, name, provider, description, context_length, input_cost_per_token,
    output_cost_per_token, supports_vision, supports_function_calling,
    is_available, created_at, updated_at
"#;

#[derive(Debug, Default, Deserialize)]
pub struct ListModelsQuery {
    /// Include models no longer offered by the gateway
    #[serde(default)]
    pub include_unavailable: bool,
    pub provider: Option<String>,
}

pub async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ListModelsQuery>,
) -> ApiResult<Json<Vec<Model>>> {
    let models = sqlx::query_as::<_, Model>(&format!(
        r#"
        SELECT {} FROM models
        WHERE ($1 OR is_available) AND ($2::TEXT IS NULL OR provider = $2)
        ORDER BY provider, name
        "#,
        MODEL_COLUMNS
    ))
    .bind(query.include_unavailable)
    .bind(query.provider.as_deref())
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(models))
}

pub async fn get_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> ApiResult<Json<Model>> {
    let model = sqlx::query_as::<_, Model>(&format!(
        "SELECT {} FROM models WHERE id = $1",
        MODEL_COLUMNS
    ))
    .bind(&model_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(model))
}

/// Pull the catalogue from LiteLLM now instead of waiting for the worker
pub async fn sync_models(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<SyncSummary>> {
    auth_user.require_admin_write()?;

    let summary = state.model_sync().sync().await?;
    state
        .audit()
        .log(
            auth_user.user_id,
            action::MODELS_SYNCED,
            resource_type::MODEL,
            "catalogue",
            json!({
                "added": summary.added.len(),
                "updated": summary.updated.len(),
                "unavailable": summary.unavailable,
            }),
        )
        .await;

    Ok(Json(summary))
}
