//! Team routes
//!
//! Any user may read teams; only admins create, delete or change membership.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use litemaas_shared::Team;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::ApiResult,
    services::{AddMemberRequest, CreateTeamRequest, TeamWithMembers},
    state::AppState,
};

pub async fn list_teams(State(state): State<AppState>) -> ApiResult<Json<Vec<Team>>> {
    Ok(Json(state.teams().list().await?))
}

pub async fn get_team(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
) -> ApiResult<Json<TeamWithMembers>> {
    Ok(Json(state.teams().get(team_id).await?))
}

pub async fn create_team(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateTeamRequest>,
) -> ApiResult<(StatusCode, Json<Team>)> {
    auth_user.require_admin_write()?;
    let team = state.teams().create(auth_user.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn delete_team(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(team_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    auth_user.require_admin_write()?;
    state.teams().delete(auth_user.user_id, team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(team_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<TeamWithMembers>)> {
    auth_user.require_admin_write()?;
    let team = state.teams().add_member(auth_user.user_id, team_id, req).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((team_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    auth_user.require_admin_write()?;
    state
        .teams()
        .remove_member(auth_user.user_id, team_id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
