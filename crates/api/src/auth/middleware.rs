//! Request authentication and rate limiting middleware

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use litemaas_shared::UserRole;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// The authenticated caller, inserted as a request extension
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub roles: Vec<String>,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.can_write_admin()
    }

    /// admin or adminReadonly
    pub fn require_admin_read(&self) -> ApiResult<()> {
        if self.role.can_read_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// admin only
    pub fn require_admin_write(&self) -> ApiResult<()> {
        if self.role.can_write_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Require a valid access token for an active user
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthorized)?;

    let claims = state.jwt_manager.validate_access_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        ApiError::InvalidToken
    })?;

    // Roles come from the database so role changes apply without re-login.
    // Without one, the signed claims are all there is.
    let roles = if state.config.has_database() {
        let row: Option<(bool, Vec<String>)> =
            sqlx::query_as("SELECT is_active, roles FROM users WHERE id = $1")
                .bind(claims.sub)
                .fetch_optional(&state.pool)
                .await?;

        let (is_active, roles) = row.ok_or(ApiError::InvalidToken)?;
        if !is_active {
            return Err(ApiError::AccountDisabled);
        }
        roles
    } else {
        claims.roles
    };

    let role = UserRole::highest(roles.iter().map(String::as_str));
    req.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        email: claims.email,
        username: claims.username,
        roles,
        role,
    });

    Ok(next.run(req).await)
}

/// Per-user fixed-window rate limit; must run after [`require_auth`]
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(user_id) = req.extensions().get::<AuthUser>().map(|u| u.user_id) else {
        return next.run(req).await;
    };

    let result = state.rate_limiter.check_user(user_id).await;
    if !result.allowed {
        tracing::warn!(user_id = %user_id, limit = result.limit, "Rate limit exceeded");
        return ApiError::RateLimited {
            retry_after_seconds: result.retry_after_seconds.unwrap_or(60),
        }
        .into_response();
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", result.limit.into());
    headers.insert("x-ratelimit-remaining", result.remaining.into());
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user(role: UserRole) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            email: "u@example.com".to_string(),
            username: "u".to_string(),
            roles: vec![role.as_str().to_string()],
            role,
        }
    }

    #[test]
    fn test_admin_checks() {
        assert!(user(UserRole::Admin).require_admin_write().is_ok());
        assert!(user(UserRole::AdminReadonly).require_admin_read().is_ok());
        assert!(matches!(
            user(UserRole::AdminReadonly).require_admin_write(),
            Err(ApiError::Forbidden)
        ));
        assert!(matches!(
            user(UserRole::User).require_admin_read(),
            Err(ApiError::Forbidden)
        ));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}
