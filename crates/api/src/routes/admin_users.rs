//! Admin user management routes

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use litemaas_shared::{PaginatedResponse, User};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::ApiResult,
    services::{UpdateUserRequest, UserListQuery},
    state::AppState,
};

/// List users (admin or adminReadonly)
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Json<PaginatedResponse<User>>> {
    auth_user.require_admin_read()?;
    Ok(Json(state.users().list(query).await?))
}

/// Update roles or activation (admin only)
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    auth_user.require_admin_write()?;
    let user = state.users().update(auth_user.user_id, user_id, req).await?;
    Ok(Json(user))
}
