//! In-memory request rate limiting
//!
//! Fixed one-minute windows keyed by caller identity. The API applies
//! `RATE_LIMIT_PER_MINUTE` per authenticated user.

use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per minute allowed
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 120,
        }
    }
}

/// Rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: OffsetDateTime,
    pub retry_after_seconds: Option<u32>,
}

/// Store: key -> (count, window_start)
#[derive(Default)]
struct WindowStore {
    windows: RwLock<HashMap<String, (u32, i64)>>,
}

impl WindowStore {
    async fn check(&self, key: &str, config: &RateLimitConfig, now: i64) -> RateLimitResult {
        let window_start = now - (now % 60);

        let mut windows = self.windows.write().await;
        let entry = windows.entry(key.to_string()).or_insert((0, window_start));

        // Reset if in new window
        if entry.1 != window_start {
            entry.0 = 0;
            entry.1 = window_start;
        }

        let current_count = entry.0;
        let allowed = current_count < config.requests_per_minute;
        if allowed {
            entry.0 += 1;
        }

        let remaining = config
            .requests_per_minute
            .saturating_sub(current_count + u32::from(allowed));
        let reset_at = OffsetDateTime::from_unix_timestamp(window_start + 60)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        RateLimitResult {
            allowed,
            limit: config.requests_per_minute,
            remaining,
            reset_at,
            retry_after_seconds: (!allowed).then(|| (window_start + 60 - now).max(1) as u32),
        }
    }

    async fn cleanup(&self, now: i64) {
        let cutoff = now - 120;
        let mut windows = self.windows.write().await;
        windows.retain(|_, (_, start)| *start > cutoff);
    }
}

/// Rate limiter service
#[derive(Clone, Default)]
pub struct RateLimiter {
    inner: Arc<WindowStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(WindowStore::default()),
            config,
        }
    }

    /// Check and count one request for a user
    pub async fn check_user(&self, user_id: Uuid) -> RateLimitResult {
        let key = format!("ratelimit:user:{}", user_id);
        self.inner
            .check(&key, &self.config, OffsetDateTime::now_utc().unix_timestamp())
            .await
    }

    /// Check and count one request for an arbitrary key (e.g. client IP)
    pub async fn check_key(&self, key: &str) -> RateLimitResult {
        self.inner
            .check(key, &self.config, OffsetDateTime::now_utc().unix_timestamp())
            .await
    }

    /// Drop windows that can no longer affect a decision
    pub async fn cleanup(&self) {
        self.inner
            .cleanup(OffsetDateTime::now_utc().unix_timestamp())
            .await
    }
}
