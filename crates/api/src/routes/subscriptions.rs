//! Subscription routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use litemaas_shared::Subscription;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::ApiResult,
    services::CreateSubscriptionRequest,
    state::AppState,
};

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Subscription>>> {
    Ok(Json(state.subscriptions().list(auth_user.user_id).await?))
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<Subscription>)> {
    let subscription = state.subscriptions().subscribe(auth_user.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<Subscription>> {
    let subscription = state
        .subscriptions()
        .cancel(auth_user.user_id, subscription_id)
        .await?;
    Ok(Json(subscription))
}
