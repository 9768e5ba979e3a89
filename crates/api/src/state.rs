//! Shared application state

use litemaas_analytics::{
    AdminUsageEnrichmentService, AdminUsageExportService, AdminUsageStatsService,
    DailyUsageCacheManager, IdentityResolver, MemoryIdentityResolver, MemoryUsageCacheStore,
    PgIdentityResolver, PgUsageCacheStore, UsageCacheStore,
};
use litemaas_litellm::{mock, LiteLlmClient, LiteLlmResult};
use litemaas_shared::rate_limit::{RateLimitConfig, RateLimiter};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::JwtManager;
use crate::config::Config;
use crate::services::{
    ApiKeyService, AuditLogger, ModelSyncService, SubscriptionService, TeamService, UserService,
};

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt_manager: Arc<JwtManager>,
    pub litellm: LiteLlmClient,
    pub usage_stats: AdminUsageStatsService,
    pub usage_export: AdminUsageExportService,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> LiteLlmResult<Self> {
        let litellm = LiteLlmClient::new(config.litellm.clone())?;
        let usage_stats = build_usage_stats(&pool, &config, &litellm);

        Ok(Self {
            jwt_manager: Arc::new(JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours)),
            rate_limiter: RateLimiter::new(RateLimitConfig {
                requests_per_minute: config.rate_limit_per_minute,
            }),
            usage_export: AdminUsageExportService::new(),
            usage_stats,
            litellm,
            config: Arc::new(config),
            pool,
        })
    }

    pub fn audit(&self) -> AuditLogger {
        if self.config.has_database() {
            AuditLogger::new(self.pool.clone())
        } else {
            AuditLogger::disabled()
        }
    }

    pub fn api_keys(&self) -> ApiKeyService {
        ApiKeyService::new(self.pool.clone(), self.litellm.clone(), self.audit())
    }

    pub fn teams(&self) -> TeamService {
        TeamService::new(self.pool.clone(), self.litellm.clone(), self.audit())
    }

    pub fn subscriptions(&self) -> SubscriptionService {
        SubscriptionService::new(self.pool.clone(), self.audit())
    }

    pub fn model_sync(&self) -> ModelSyncService {
        ModelSyncService::new(self.pool.clone(), self.litellm.clone())
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.pool.clone(), self.litellm.clone(), self.audit())
    }
}

/// Pool for running without `DATABASE_URL`. It never connects up front and
/// gives up quickly, so database-backed routes fail instead of hanging.
pub fn detached_pool() -> PgPool {
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(1))
        .connect_lazy_with(PgConnectOptions::new())
}

/// Wire the usage analytics pipeline against Postgres and LiteLLM.
/// Shared with the worker so both processes read and write the same cache.
///
/// Without a database the day cache and identity lookups live in memory and
/// the model catalogue is the mock gateway's.
pub fn build_usage_stats(
    pool: &PgPool,
    config: &Config,
    litellm: &LiteLlmClient,
) -> AdminUsageStatsService {
    let (store, resolver): (Arc<dyn UsageCacheStore>, Arc<dyn IdentityResolver>) =
        if config.has_database() {
            (
                Arc::new(PgUsageCacheStore::new(pool.clone())),
                Arc::new(PgIdentityResolver::new(pool.clone())),
            )
        } else {
            tracing::warn!("No database configured; usage cache is in-memory");
            let models = mock::model_info()
                .into_iter()
                .map(|m| {
                    let provider = m.provider();
                    (m.model_name, provider)
                });
            (
                Arc::new(MemoryUsageCacheStore::new()),
                Arc::new(MemoryIdentityResolver::with_models(models)),
            )
        };

    let cache = DailyUsageCacheManager::new(store, config.usage_calendar)
        .with_ttl(config.usage_cache_ttl);
    let enrichment = AdminUsageEnrichmentService::new(resolver);

    AdminUsageStatsService::new(cache, enrichment, Arc::new(litellm.clone()))
}
