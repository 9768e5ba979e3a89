//! Scheduled job bodies
//!
//! Each job logs its own failures and returns; a failed run never stops the
//! scheduler, the next tick simply tries again.

use litemaas_analytics::AdminUsageStatsService;
use litemaas_api::services::ModelSyncService;
use std::time::Instant;
use tracing::{error, info};

/// Pull the model catalogue from LiteLLM
pub async fn sync_models(service: &ModelSyncService) {
    let started = Instant::now();
    match service.sync().await {
        Ok(summary) => info!(
            added = summary.added.len(),
            updated = summary.updated.len(),
            unavailable = summary.unavailable.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scheduled model sync finished"
        ),
        Err(e) => error!(error = %e, "Scheduled model sync failed"),
    }
}

/// Re-read today so dashboards stay close to live
pub async fn refresh_usage(stats: &AdminUsageStatsService) {
    match stats.refresh_today().await {
        Ok(totals) => info!(
            requests = totals.requests,
            total_tokens = totals.total_tokens,
            spend = totals.spend,
            "Refreshed today's usage"
        ),
        Err(e) => error!(error = %e, "Usage refresh failed"),
    }
}

/// Drop cached days past the retention window
pub async fn cleanup_usage_cache(stats: &AdminUsageStatsService, retention_days: u32) -> u64 {
    match stats.cache().cleanup(retention_days).await {
        Ok(deleted) => {
            info!(deleted, retention_days, "Usage cache cleanup finished");
            deleted
        }
        Err(e) => {
            error!(error = %e, retention_days, "Usage cache cleanup failed");
            0
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use litemaas_analytics::{
        AdminUsageEnrichmentService, DailyActivitySource, DailyUsageCacheManager,
        MemoryIdentityResolver, MemoryUsageCacheStore, UsageCalendar,
    };
    use litemaas_litellm::{DailyActivityDay, LiteLlmError, LiteLlmResult};
    use std::sync::Arc;
    use time::{Date, Duration};

    struct EmptySource;

    #[async_trait]
    impl DailyActivitySource for EmptySource {
        async fn daily_activity(&self, _date: Date) -> LiteLlmResult<DailyActivityDay> {
            Ok(DailyActivityDay::empty("ignored"))
        }
    }

    struct DownSource;

    #[async_trait]
    impl DailyActivitySource for DownSource {
        async fn daily_activity(&self, _date: Date) -> LiteLlmResult<DailyActivityDay> {
            Err(LiteLlmError::InvalidResponse("gateway down".to_string()))
        }
    }

    fn stats(
        source: Arc<dyn DailyActivitySource>,
    ) -> (AdminUsageStatsService, Arc<MemoryUsageCacheStore>) {
        let store = Arc::new(MemoryUsageCacheStore::new());
        let cache = DailyUsageCacheManager::new(store.clone(), UsageCalendar::utc());
        let enrichment =
            AdminUsageEnrichmentService::new(Arc::new(MemoryIdentityResolver::new()));
        (AdminUsageStatsService::new(cache, enrichment, source), store)
    }

    #[tokio::test]
    async fn test_refresh_caches_today() {
        let (stats, store) = stats(Arc::new(EmptySource));
        refresh_usage(&stats).await;

        let today = stats.cache().today();
        let record = stats.cache().get(today).await.unwrap().unwrap();
        assert!(!record.is_complete);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_swallowed() {
        let (stats, store) = stats(Arc::new(DownSource));
        refresh_usage(&stats).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_days() {
        let (stats, store) = stats(Arc::new(EmptySource));
        let today = stats.cache().today();
        for days_ago in [0, 10, 400] {
            let date = today - Duration::days(days_ago);
            stats
                .get_range(
                    litemaas_analytics::DateRange::new(date, date).unwrap(),
                    &Default::default(),
                )
                .await;
        }
        assert_eq!(store.len().await, 3);

        assert_eq!(cleanup_usage_cache(&stats, 365).await, 1);
        assert_eq!(store.len().await, 2);
    }
}
