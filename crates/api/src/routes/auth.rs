//! Authentication routes
//!
//! Login proper happens through the OAuth provider in front of the portal.
//! `dev-login` is the local stand-in and is disabled unless explicitly enabled.

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use litemaas_shared::{User, UserRole};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{AuthUser, TokenSubject},
    error::{ApiError, ApiResult},
    routes::extract_client_ip,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct DevLoginRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub roles: Vec<String>,
    pub role: UserRole,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let role = user.effective_role();
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            roles: user.roles,
            role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

fn issue_tokens(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    let subject = TokenSubject {
        user_id: user.id,
        email: &user.email,
        username: &user.username,
        roles: &user.roles,
    };
    let (access_token, _) = state.jwt_manager.generate_access_token(subject).map_err(|e| {
        tracing::error!(error = %e, "Failed to issue access token");
        ApiError::Internal
    })?;
    let (refresh_token, _) = state.jwt_manager.generate_refresh_token(subject).map_err(|e| {
        tracing::error!(error = %e, "Failed to issue refresh token");
        ApiError::Internal
    })?;

    Ok(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_manager.access_token_expiry_seconds(),
        user: user.into(),
    })
}

/// Public token endpoints are limited per client IP
async fn throttle(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let ip = extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    let result = state
        .rate_limiter
        .check_key(&format!("ratelimit:auth:{}", ip))
        .await;
    if result.allowed {
        Ok(())
    } else {
        tracing::warn!(ip = %ip, "Auth rate limit exceeded");
        Err(ApiError::RateLimited {
            retry_after_seconds: result.retry_after_seconds.unwrap_or(60),
        })
    }
}

/// Without a database there is no user table; dev logins get a throwaway
/// admin identity carried entirely in the token.
fn detached_user(id: Uuid, email: &str, username: &str, roles: Vec<String>) -> User {
    let now = OffsetDateTime::now_utc();
    User {
        id,
        username: username.to_string(),
        email: email.to_string(),
        full_name: None,
        roles,
        is_active: true,
        last_login_at: Some(now),
        created_at: now,
        updated_at: now,
    }
}

/// Issue tokens for a provisioned user by email (development only)
pub async fn dev_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DevLoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if !state.config.enable_dev_login {
        return Err(ApiError::NotFound);
    }
    throttle(&state, &headers).await?;

    let email = req.email.trim();
    if !state.config.has_database() {
        if email.is_empty() {
            return Err(ApiError::Validation("email is required".to_string()));
        }
        let username = email.split('@').next().unwrap_or(email);
        let user = detached_user(
            Uuid::new_v4(),
            email,
            username,
            vec![UserRole::Admin.to_string(), UserRole::User.to_string()],
        );
        tracing::info!(user_id = %user.id, "Dev login without database");
        return Ok(Json(issue_tokens(&state, user)?));
    }

    let users = state.users();
    let user = users
        .find_by_email(email)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !user.is_active {
        return Err(ApiError::AccountDisabled);
    }

    users.touch_last_login(user.id).await?;
    tracing::info!(user_id = %user.id, "Dev login");

    Ok(Json(issue_tokens(&state, user)?))
}

/// Exchange a refresh token for a new token pair
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    throttle(&state, &headers).await?;
    let claims = state
        .jwt_manager
        .validate_refresh_token(&req.refresh_token)
        .map_err(|_| ApiError::InvalidToken)?;

    if !state.config.has_database() {
        let user = detached_user(claims.sub, &claims.email, &claims.username, claims.roles);
        return Ok(Json(issue_tokens(&state, user)?));
    }

    let user = state.users().get(claims.sub).await.map_err(|e| match e {
        ApiError::NotFound => ApiError::InvalidToken,
        other => other,
    })?;
    if !user.is_active {
        return Err(ApiError::AccountDisabled);
    }

    Ok(Json(issue_tokens(&state, user)?))
}

/// Current user profile
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<UserResponse>> {
    if !state.config.has_database() {
        let user = detached_user(
            auth_user.user_id,
            &auth_user.email,
            &auth_user.username,
            auth_user.roles,
        );
        return Ok(Json(user.into()));
    }

    let user = state.users().get(auth_user.user_id).await?;
    Ok(Json(user.into()))
}
