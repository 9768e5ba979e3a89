//! End-to-end tests for the admin usage pipeline: upstream source, enrichment,
//! day cache, range aggregation and export.
//!
//! Everything runs against the in-memory store and resolver, so no database
//! or gateway is needed:
//! ```bash
//! cargo test -p litemaas-analytics --test usage_pipeline
//! ```
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use litemaas_analytics::calendar::format_date;
use litemaas_analytics::{
    AdminUsageEnrichmentService, AdminUsageExportService, AdminUsageStatsService, AnalyticsError,
    AnalyticsResult, BreakdownQuery, CachedDay, DailyActivitySource, DailyUsageCacheManager,
    DateRange, Dimension, ExportFormat, KeyIdentity, MemoryIdentityResolver, MemoryUsageCacheStore,
    SortBy, SortOrder, TrendDirection, UsageCacheStore, UsageCalendar, UsageFilters,
};
use litemaas_litellm::{DailyActivityDay, LiteLlmError, LiteLlmResult};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use time::{Date, Duration};
use uuid::Uuid;

// ============================================================================
// Test Utilities
// ============================================================================

/// Upstream fake: two keys on one model; requests per day configurable
struct FakeSource {
    requests: Mutex<HashMap<Date, i64>>,
    failing: Mutex<HashSet<Date>>,
    calls: Mutex<HashMap<Date, usize>>,
}

impl FakeSource {
    fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn set(&self, date: Date, requests: i64) {
        self.requests.lock().unwrap().insert(date, requests);
    }

    fn fail(&self, date: Date) {
        self.failing.lock().unwrap().insert(date);
    }

    fn calls(&self, date: Date) -> usize {
        self.calls.lock().unwrap().get(&date).copied().unwrap_or(0)
    }
}

#[async_trait]
impl DailyActivitySource for FakeSource {
    async fn daily_activity(&self, date: Date) -> LiteLlmResult<DailyActivityDay> {
        *self.calls.lock().unwrap().entry(date).or_insert(0) += 1;
        if self.failing.lock().unwrap().contains(&date) {
            return Err(LiteLlmError::Upstream {
                status: 503,
                body: "gateway unavailable".to_string(),
            });
        }

        let n = self.requests.lock().unwrap().get(&date).copied().unwrap_or(0);
        let day = format_date(date);
        if n == 0 {
            return Ok(DailyActivityDay::empty(&day));
        }

        let bob = n / 4;
        let alice = n - bob;
        Ok(serde_json::from_value(serde_json::json!({
            "date": day,
            "metrics": {"api_requests": n, "successful_requests": n, "spend": n as f64 * 0.01},
            "breakdown": {"models": {"openai/gpt-4o": {
                "metrics": {"api_requests": n},
                "api_key_breakdown": {
                    "hash-alice": {"metrics": {
                        "api_requests": alice, "successful_requests": alice,
                        "total_tokens": alice * 100, "spend": alice as f64 * 0.01
                    }},
                    "hash-bob": {"metrics": {
                        "api_requests": bob, "successful_requests": bob,
                        "total_tokens": bob * 100, "spend": bob as f64 * 0.01
                    }}
                }
            }}}
        }))
        .unwrap())
    }
}

/// Memory store whose reads or writes fail for chosen days
struct FlakyStore {
    inner: MemoryUsageCacheStore,
    failing_reads: Mutex<HashSet<Date>>,
    failing_writes: Mutex<HashSet<Date>>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryUsageCacheStore::new(),
            failing_reads: Mutex::new(HashSet::new()),
            failing_writes: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl UsageCacheStore for FlakyStore {
    async fn get(&self, date: Date) -> AnalyticsResult<Option<CachedDay>> {
        if self.failing_reads.lock().unwrap().contains(&date) {
            return Err(AnalyticsError::Database("connection reset".to_string()));
        }
        self.inner.get(date).await
    }

    async fn upsert_unless_complete(&self, day: &CachedDay) -> AnalyticsResult<bool> {
        if self.failing_writes.lock().unwrap().contains(&day.date) {
            return Err(AnalyticsError::Database("disk full".to_string()));
        }
        self.inner.upsert_unless_complete(day).await
    }

    async fn delete(&self, date: Date) -> AnalyticsResult<bool> {
        self.inner.delete(date).await
    }

    async fn delete_before(&self, cutoff: Date) -> AnalyticsResult<u64> {
        self.inner.delete_before(cutoff).await
    }
}

struct Harness {
    stats: AdminUsageStatsService,
    source: Arc<FakeSource>,
    store: Arc<MemoryUsageCacheStore>,
    alice: KeyIdentity,
    today: Date,
}

async fn harness() -> Harness {
    let resolver = Arc::new(MemoryIdentityResolver::new());
    let alice = KeyIdentity {
        api_key_id: Uuid::new_v4(),
        api_key_name: "alice-laptop".to_string(),
        litellm_key_hash: Some("hash-alice".to_string()),
        litellm_key_alias: None,
        user_id: Uuid::new_v4(),
        username: "alice".to_string(),
        email: "alice@example.com".to_string(),
        team_id: None,
    };
    resolver.add_key(alice.clone()).await;

    let store = Arc::new(MemoryUsageCacheStore::new());
    let cache = DailyUsageCacheManager::new(store.clone(), UsageCalendar::utc());
    let today = cache.today();
    let source = Arc::new(FakeSource::new());
    let stats = AdminUsageStatsService::new(
        cache,
        AdminUsageEnrichmentService::new(resolver),
        source.clone(),
    );

    Harness {
        stats,
        source,
        store,
        alice,
        today,
    }
}

fn last_days(today: Date, n: i64) -> DateRange {
    DateRange::new(today - Duration::days(n - 1), today).unwrap()
}

// ============================================================================
// Cache behaviour
// ============================================================================

#[tokio::test]
async fn test_past_days_fetched_once() {
    let h = harness().await;
    let range = last_days(h.today, 3);
    for d in range.days() {
        h.source.set(d, 8);
    }

    let first = h.stats.get_range(range, &UsageFilters::default()).await;
    assert!(first.errors.is_empty());
    assert_eq!(first.totals().requests, 24);

    // Upstream changes are not observed for completed days
    h.source.set(h.today - Duration::days(1), 1_000);
    let second = h.stats.get_range(range, &UsageFilters::default()).await;
    assert_eq!(second.totals().requests, 24);

    assert_eq!(h.source.calls(h.today - Duration::days(2)), 1);
    assert_eq!(h.source.calls(h.today - Duration::days(1)), 1);
    // Today is within TTL on the second read
    assert_eq!(h.source.calls(h.today), 1);
    assert_eq!(h.store.len().await, 3);
}

#[tokio::test]
async fn test_refresh_today_refetches() {
    let h = harness().await;
    h.source.set(h.today, 4);
    let range = last_days(h.today, 1);

    h.stats.get_range(range, &UsageFilters::default()).await;
    h.source.set(h.today, 12);

    let totals = h.stats.refresh_today().await.unwrap();
    assert_eq!(totals.requests, 12);
    assert_eq!(h.source.calls(h.today), 2);

    let record = h.stats.cache().get(h.today).await.unwrap().unwrap();
    assert!(!record.is_complete);
}

#[tokio::test]
async fn test_future_days_skipped() {
    let h = harness().await;
    let range = DateRange::new(h.today - Duration::days(1), h.today + Duration::days(5)).unwrap();

    let usage = h.stats.get_range(range, &UsageFilters::default()).await;
    assert_eq!(usage.days.len(), 2);
    assert_eq!(h.source.calls(h.today + Duration::days(1)), 0);
}

// ============================================================================
// Failure policy
// ============================================================================

#[tokio::test]
async fn test_failed_day_does_not_fail_range() {
    let h = harness().await;
    let range = last_days(h.today, 4);
    for d in range.days() {
        h.source.set(d, 4);
    }
    let broken = h.today - Duration::days(2);
    h.source.fail(broken);

    let usage = h.stats.get_range(range, &UsageFilters::default()).await;
    assert_eq!(usage.days.len(), 3);
    assert_eq!(usage.totals().requests, 12);
    assert_eq!(usage.errors.len(), 1);
    assert_eq!(usage.errors[0].date, format_date(broken));
    assert!(usage.errors[0].message.contains("503"));

    // Nothing was cached for the failed day
    assert!(h.stats.cache().get(broken).await.unwrap().is_none());
}

#[tokio::test]
async fn test_storage_failure_reported_per_day() {
    let store = Arc::new(FlakyStore::new());
    let cache = DailyUsageCacheManager::new(store.clone(), UsageCalendar::utc());
    let today = cache.today();
    let source = Arc::new(FakeSource::new());
    let stats = AdminUsageStatsService::new(
        cache,
        AdminUsageEnrichmentService::new(Arc::new(MemoryIdentityResolver::new())),
        source.clone(),
    );

    let range = DateRange::new(today - Duration::days(3), today - Duration::days(1)).unwrap();
    for d in range.days() {
        source.set(d, 8);
    }
    let unreadable = today - Duration::days(3);
    let unwritable = today - Duration::days(2);
    store.failing_reads.lock().unwrap().insert(unreadable);
    store.failing_writes.lock().unwrap().insert(unwritable);

    let usage = stats.get_range(range, &UsageFilters::default()).await;

    // A failed read falls back to upstream; a failed write loses the day
    assert_eq!(usage.days.len(), 2);
    assert_eq!(usage.totals().requests, 16);
    assert_eq!(usage.errors.len(), 1);
    assert_eq!(usage.errors[0].date, format_date(unwritable));
    assert!(usage.errors[0].message.contains("disk full"));

    assert!(store.inner.get(unreadable).await.unwrap().is_some());
    assert!(store.inner.get(unwritable).await.unwrap().is_none());
}

// ============================================================================
// Aggregation
// ============================================================================

#[tokio::test]
async fn test_breakdown_attribution_and_filters() {
    let h = harness().await;
    let range = last_days(h.today, 2);
    for d in range.days() {
        h.source.set(d, 8);
    }

    let result = h
        .stats
        .get_breakdown(
            Dimension::User,
            range,
            &UsageFilters::default(),
            BreakdownQuery::default(),
        )
        .await
        .unwrap();
    assert_eq!(result.page.total, 2);
    // alice: 6/day, unknown (bob's key is not local): 2/day
    assert_eq!(result.page.data[0].name, "alice");
    assert_eq!(result.page.data[0].metrics.requests, 12);
    assert_eq!(result.page.data[1].name, "unknown");
    assert_eq!(result.totals.requests, 16);

    let filtered = h
        .stats
        .get_breakdown(
            Dimension::Model,
            range,
            &UsageFilters {
                user_ids: vec![h.alice.user_id],
                ..Default::default()
            },
            BreakdownQuery::default(),
        )
        .await
        .unwrap();
    assert_eq!(filtered.totals.requests, 12);
    assert_eq!(filtered.page.data[0].metrics.requests, 12);
    assert_eq!(filtered.page.data[0].provider.as_deref(), Some("openai"));
}

#[tokio::test]
async fn test_breakdown_pagination_and_validation() {
    let h = harness().await;
    let range = last_days(h.today, 1);
    h.source.set(h.today, 8);

    let page = h
        .stats
        .get_breakdown(
            Dimension::ApiKey,
            range,
            &UsageFilters::default(),
            BreakdownQuery {
                page: 2,
                limit: 1,
                sort_by: SortBy::Requests,
                sort_order: SortOrder::Desc,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.page.total, 2);
    assert_eq!(page.page.total_pages, 2);
    assert_eq!(page.page.data.len(), 1);
    assert_eq!(page.page.data[0].metrics.requests, 2);

    let invalid = h
        .stats
        .get_breakdown(
            Dimension::ApiKey,
            range,
            &UsageFilters::default(),
            BreakdownQuery {
                limit: 501,
                ..Default::default()
            },
        )
        .await;
    assert!(invalid.is_err());
}

#[tokio::test]
async fn test_analytics_trends_against_previous_period() {
    let h = harness().await;
    let current = DateRange::new(h.today - Duration::days(3), h.today - Duration::days(2)).unwrap();
    let previous = current.previous();
    for d in current.days() {
        h.source.set(d, 20);
    }
    for d in previous.days() {
        h.source.set(d, 10);
    }

    let analytics = h
        .stats
        .get_analytics(current, &UsageFilters::default())
        .await
        .unwrap();

    assert_eq!(analytics.totals.requests, 40);
    assert_eq!(analytics.trends.requests.previous, 20.0);
    assert_eq!(analytics.trends.requests.direction, TrendDirection::Up);
    assert_eq!(analytics.trends.success_rate.direction, TrendDirection::Stable);
    assert_eq!(analytics.daily.len(), 2);
    assert_eq!(analytics.active_users, 1);
    assert_eq!(analytics.top_models[0].name, "openai/gpt-4o");
}

#[tokio::test]
async fn test_filter_options_and_export() {
    let h = harness().await;
    let range = last_days(h.today, 1);
    h.source.set(h.today, 8);

    let options = h.stats.get_filter_options(range).await;
    assert_eq!(options.users.len(), 2);
    assert_eq!(options.providers[0].id, "openai");
    assert!(options
        .api_keys
        .iter()
        .any(|k| k.id == h.alice.api_key_id.to_string() && k.name == "alice-laptop"));

    let (rows, errors) = h
        .stats
        .get_breakdown_rows(
            Dimension::User,
            range,
            &UsageFilters::default(),
            SortBy::Spend,
            SortOrder::Desc,
        )
        .await;
    assert!(errors.is_empty());

    let file = AdminUsageExportService::new()
        .export(&rows, Dimension::User, ExportFormat::Csv, range)
        .unwrap();
    let text = String::from_utf8(file.bytes).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.contains("alice@example.com"));
}
