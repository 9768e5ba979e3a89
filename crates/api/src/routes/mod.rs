//! API routes

pub mod admin_usage;
pub mod admin_users;
pub mod api_keys;
pub mod auth;
pub mod health;
pub mod models;
pub mod subscriptions;
pub mod teams;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderMap,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use crate::{
    auth::{rate_limit, require_auth},
    error::ApiError,
    state::AppState,
};

/// JSON bodies are small; nothing here uploads files
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Extract client IP address from request headers.
/// Checks common proxy headers in order of preference.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-real-ip")
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|h| h.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Split a comma-separated query value into trimmed, non-empty items
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a path segment or query value into a UUID
pub fn parse_uuid(value: &str, field: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(value.trim())
        .map_err(|_| ApiError::Validation(format!("{} must be a UUID, got '{}'", field, value)))
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (no auth required) - under /api/v1
    let public_api_routes = Router::new()
        .route("/auth/dev-login", post(auth::dev_login))
        .route("/auth/refresh", post(auth::refresh));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        // Auth
        .route("/auth/me", get(auth::me))
        // API keys
        .route("/api-keys", get(api_keys::list_api_keys))
        .route("/api-keys", post(api_keys::create_api_key))
        .route("/api-keys/:key_id", get(api_keys::get_api_key))
        .route("/api-keys/:key_id", delete(api_keys::revoke_api_key))
        // Subscriptions
        .route("/subscriptions", get(subscriptions::list_subscriptions))
        .route("/subscriptions", post(subscriptions::create_subscription))
        .route("/subscriptions/:subscription_id", delete(subscriptions::cancel_subscription))
        // Models
        .route("/models", get(models::list_models))
        .route("/models/:model_id", get(models::get_model))
        // Teams
        .route("/teams", get(teams::list_teams))
        .route("/teams", post(teams::create_team))
        .route("/teams/:team_id", get(teams::get_team))
        .route("/teams/:team_id", delete(teams::delete_team))
        .route("/teams/:team_id/members", post(teams::add_member))
        .route("/teams/:team_id/members/:user_id", delete(teams::remove_member))
        // Admin: models and users
        .route("/admin/models/sync", post(models::sync_models))
        .route("/admin/users", get(admin_users::list_users))
        .route("/admin/users/:user_id", patch(admin_users::update_user))
        // Admin: usage analytics
        .route("/admin/usage/analytics", get(admin_usage::analytics))
        .route("/admin/usage/breakdown/:dimension", get(admin_usage::breakdown))
        .route("/admin/usage/filter-options", get(admin_usage::filter_options))
        .route("/admin/usage/export", get(admin_usage::export))
        .route("/admin/usage/refresh-today", post(admin_usage::refresh_today))
        .route("/admin/usage/cache/cleanup", post(admin_usage::cleanup_cache))
        // Layers run bottom-up: auth first, then the per-user limiter
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use litemaas_analytics::UsageCalendar;
    use litemaas_litellm::LiteLlmConfig;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            bind_address: "127.0.0.1:0".to_string(),
            cors_origins: vec![],
            database_url: Some("postgres://localhost/litemaas_test".to_string()),
            database_max_connections: 1,
            jwt_secret: "test-jwt-secret-must-be-at-least-32-characters-long".to_string(),
            jwt_expiry_hours: 1,
            enable_dev_login: false,
            litellm: LiteLlmConfig {
                mock_mode: true,
                ..Default::default()
            },
            usage_cache_ttl: Duration::from_secs(300),
            usage_cache_retention_days: 365,
            usage_calendar: UsageCalendar::utc(),
            rate_limit_per_minute: 120,
            model_sync_cron: "0 */30 * * * *".to_string(),
            usage_refresh_cron: "0 */5 * * * *".to_string(),
            usage_cleanup_cron: "0 15 3 * * *".to_string(),
        }
    }

    /// Router over a lazy pool; only routes that never reach the database
    /// are exercised here.
    fn test_router() -> Router {
        let config = test_config();
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/litemaas_test")
            .unwrap();
        create_router(AppState::new(pool, config).unwrap())
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_usage_analytics_without_database() {
        let config = Config {
            database_url: None,
            enable_dev_login: true,
            ..test_config()
        };
        let app = create_router(AppState::new(crate::state::detached_pool(), config).unwrap());

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/auth/dev-login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email":"admin@example.com"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let login = json_body(response).await;
        assert_eq!(login["user"]["role"], "admin");
        let token = login["access_token"].as_str().unwrap().to_string();

        let yesterday = litemaas_analytics::calendar::format_date(
            time::OffsetDateTime::now_utc().date() - time::Duration::days(1),
        );
        let uri = format!(
            "/api/v1/admin/usage/analytics?startDate={}&endDate={}",
            yesterday, yesterday
        );
        let response = app
            .clone()
            .oneshot(
                Request::get(uri.as_str())
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let analytics = json_body(response).await;
        assert!(analytics["totals"]["requests"].as_i64().unwrap() > 0);
        assert!(analytics["errors"].as_array().unwrap().is_empty());
        assert!(!analytics["top_providers"].as_array().unwrap().is_empty());

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["database"], "disabled");
    }

    #[tokio::test]
    async fn test_liveness() {
        let response = test_router()
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        for uri in ["/api/v1/auth/me", "/api/v1/admin/usage/analytics"] {
            let response = test_router()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }

        let response = test_router()
            .oneshot(
                Request::get("/api/v1/api-keys")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_dev_login_disabled_by_default() {
        let response = test_router()
            .oneshot(
                Request::post("/api/v1/auth/dev-login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email":"admin@example.com"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_extract_client_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers), None);

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.7"));

        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("198.51.100.2"));
    }

    #[test]
    fn test_split_list() {
        assert!(split_list(None).is_empty());
        assert!(split_list(Some("")).is_empty());
        assert_eq!(
            split_list(Some("gpt-4o, ,llama-3 ,")),
            vec!["gpt-4o".to_string(), "llama-3".to_string()]
        );
    }

    #[test]
    fn test_parse_uuid() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(parse_uuid(&format!(" {} ", id), "user_id").unwrap(), id);
        assert!(matches!(
            parse_uuid("nope", "user_id"),
            Err(ApiError::Validation(_))
        ));
    }
}
