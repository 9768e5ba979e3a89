//! API key routes

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use litemaas_shared::ApiKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::ApiResult,
    services::{CreateApiKeyRequest, CreatedApiKey},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListApiKeysQuery {
    /// Admin-readable callers may list every user's keys
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyListResponse {
    pub api_keys: Vec<ApiKey>,
    pub total: usize,
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListApiKeysQuery>,
) -> ApiResult<Json<ApiKeyListResponse>> {
    if query.all {
        auth_user.require_admin_read()?;
    }
    let api_keys = state.api_keys().list(auth_user.user_id, query.all).await?;
    Ok(Json(ApiKeyListResponse {
        total: api_keys.len(),
        api_keys,
    }))
}

pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateApiKeyRequest>,
) -> ApiResult<(StatusCode, Json<CreatedApiKey>)> {
    let created = state
        .api_keys()
        .create(auth_user.user_id, &auth_user.username, req)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_api_key(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(key_id): Path<Uuid>,
) -> ApiResult<Json<ApiKey>> {
    let key = state
        .api_keys()
        .get(key_id, auth_user.user_id, auth_user.role.can_read_admin())
        .await?;
    Ok(Json(key))
}

/// Revoke a key. Owners may revoke their own; admins may revoke any.
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(key_id): Path<Uuid>,
) -> ApiResult<Json<ApiKey>> {
    let key = state
        .api_keys()
        .revoke(key_id, auth_user.user_id, auth_user.is_admin())
        .await?;
    Ok(Json(key))
}
