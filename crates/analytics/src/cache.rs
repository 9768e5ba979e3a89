//! Day-bucketed usage cache
//!
//! One record per calendar day. Days strictly before today are immutable once
//! stored as complete; today's record is always incomplete and is refetched
//! once it is older than the TTL. A past day still marked incomplete was
//! cached while it was "today" and is refetched as well.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use time::{Date, Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::aggregate::{DayAggregates, ModelAggregate, ProviderAggregate, UserAggregate};
use crate::calendar::UsageCalendar;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::metrics::{EnrichedDay, UsageEntry, UsageMetrics};

/// Default freshness window for today's record (5 minutes)
pub const DEFAULT_CACHE_TTL: StdDuration = StdDuration::from_secs(300);

/// A cached day
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDay {
    pub date: Date,
    /// Upstream payload as received
    pub raw_data: serde_json::Value,
    pub entries: Vec<UsageEntry>,
    pub aggregates: DayAggregates,
    pub cached_at: OffsetDateTime,
    pub is_complete: bool,
}

impl CachedDay {
    pub fn new(
        day: EnrichedDay,
        raw_data: serde_json::Value,
        cached_at: OffsetDateTime,
        is_complete: bool,
    ) -> Self {
        let aggregates = DayAggregates::from_entries(&day.entries);
        Self {
            date: day.date,
            raw_data,
            entries: day.entries,
            aggregates,
            cached_at,
            is_complete,
        }
    }
}

/// Persistence for cached days
#[async_trait]
pub trait UsageCacheStore: Send + Sync {
    async fn get(&self, date: Date) -> AnalyticsResult<Option<CachedDay>>;

    /// Insert or replace, unless the stored record is complete.
    /// Returns whether anything was written.
    async fn upsert_unless_complete(&self, day: &CachedDay) -> AnalyticsResult<bool>;

    async fn delete(&self, date: Date) -> AnalyticsResult<bool>;

    /// Delete every record dated before `cutoff`
    async fn delete_before(&self, cutoff: Date) -> AnalyticsResult<u64>;
}

// =============================================================================
// PostgreSQL store
// =============================================================================

#[derive(FromRow)]
struct CachedDayRow {
    date: Date,
    raw_data: serde_json::Value,
    enriched_entries: Json<Vec<UsageEntry>>,
    aggregated_by_user: Json<std::collections::BTreeMap<String, UserAggregate>>,
    aggregated_by_model: Json<std::collections::BTreeMap<String, ModelAggregate>>,
    aggregated_by_provider: Json<std::collections::BTreeMap<String, ProviderAggregate>>,
    total_metrics: Json<UsageMetrics>,
    cached_at: OffsetDateTime,
    is_complete: bool,
}

impl From<CachedDayRow> for CachedDay {
    fn from(row: CachedDayRow) -> Self {
        Self {
            date: row.date,
            raw_data: row.raw_data,
            entries: row.enriched_entries.0,
            aggregates: DayAggregates {
                by_user: row.aggregated_by_user.0,
                by_model: row.aggregated_by_model.0,
                by_provider: row.aggregated_by_provider.0,
                totals: row.total_metrics.0,
            },
            cached_at: row.cached_at,
            is_complete: row.is_complete,
        }
    }
}

/// `daily_usage_cache` table store
#[derive(Clone)]
pub struct PgUsageCacheStore {
    pool: PgPool,
}

impl PgUsageCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageCacheStore for PgUsageCacheStore {
    async fn get(&self, date: Date) -> AnalyticsResult<Option<CachedDay>> {
        let row: Option<CachedDayRow> = sqlx::query_as(
            r#"
            SELECT date, raw_data, enriched_entries, aggregated_by_user, aggregated_by_model,
                   aggregated_by_provider, total_metrics, cached_at, is_complete
            FROM daily_usage_cache
            WHERE date = $1
            "#,
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CachedDay::from))
    }

    async fn upsert_unless_complete(&self, day: &CachedDay) -> AnalyticsResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO daily_usage_cache (
                date, raw_data, enriched_entries, aggregated_by_user, aggregated_by_model,
                aggregated_by_provider, total_metrics, cached_at, is_complete
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (date) DO UPDATE SET
                raw_data = EXCLUDED.raw_data,
                enriched_entries = EXCLUDED.enriched_entries,
                aggregated_by_user = EXCLUDED.aggregated_by_user,
                aggregated_by_model = EXCLUDED.aggregated_by_model,
                aggregated_by_provider = EXCLUDED.aggregated_by_provider,
                total_metrics = EXCLUDED.total_metrics,
                cached_at = EXCLUDED.cached_at,
                is_complete = EXCLUDED.is_complete
            WHERE daily_usage_cache.is_complete = false
            "#,
        )
        .bind(day.date)
        .bind(&day.raw_data)
        .bind(Json(&day.entries))
        .bind(Json(&day.aggregates.by_user))
        .bind(Json(&day.aggregates.by_model))
        .bind(Json(&day.aggregates.by_provider))
        .bind(Json(&day.aggregates.totals))
        .bind(day.cached_at)
        .bind(day.is_complete)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, date: Date) -> AnalyticsResult<bool> {
        let result = sqlx::query("DELETE FROM daily_usage_cache WHERE date = $1")
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_before(&self, cutoff: Date) -> AnalyticsResult<u64> {
        let result = sqlx::query("DELETE FROM daily_usage_cache WHERE date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store, used in tests and when running without a database
#[derive(Default)]
pub struct MemoryUsageCacheStore {
    days: RwLock<HashMap<Date, CachedDay>>,
}

impl MemoryUsageCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.days.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.days.read().await.is_empty()
    }
}

#[async_trait]
impl UsageCacheStore for MemoryUsageCacheStore {
    async fn get(&self, date: Date) -> AnalyticsResult<Option<CachedDay>> {
        Ok(self.days.read().await.get(&date).cloned())
    }

    async fn upsert_unless_complete(&self, day: &CachedDay) -> AnalyticsResult<bool> {
        let mut days = self.days.write().await;
        if days.get(&day.date).is_some_and(|existing| existing.is_complete) {
            return Ok(false);
        }
        days.insert(day.date, day.clone());
        Ok(true)
    }

    async fn delete(&self, date: Date) -> AnalyticsResult<bool> {
        Ok(self.days.write().await.remove(&date).is_some())
    }

    async fn delete_before(&self, cutoff: Date) -> AnalyticsResult<u64> {
        let mut days = self.days.write().await;
        let before = days.len();
        days.retain(|date, _| *date >= cutoff);
        Ok((before - days.len()) as u64)
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Freshness and immutability rules over a [`UsageCacheStore`]
#[derive(Clone)]
pub struct DailyUsageCacheManager {
    store: Arc<dyn UsageCacheStore>,
    calendar: UsageCalendar,
    ttl: Duration,
}

impl DailyUsageCacheManager {
    pub fn new(store: Arc<dyn UsageCacheStore>, calendar: UsageCalendar) -> Self {
        Self {
            store,
            calendar,
            ttl: Duration::seconds(DEFAULT_CACHE_TTL.as_secs() as i64),
        }
    }

    pub fn with_ttl(mut self, ttl: StdDuration) -> Self {
        self.ttl = Duration::seconds(ttl.as_secs() as i64);
        self
    }

    pub fn calendar(&self) -> UsageCalendar {
        self.calendar
    }

    pub fn today(&self) -> Date {
        self.calendar.today()
    }

    pub async fn get(&self, date: Date) -> AnalyticsResult<Option<CachedDay>> {
        self.store.get(date).await
    }

    /// Store a freshly enriched day. Today's record is written incomplete,
    /// any other day complete. Returns false if a complete record already exists.
    pub async fn put(
        &self,
        day: EnrichedDay,
        raw_data: serde_json::Value,
        is_current_day: bool,
    ) -> AnalyticsResult<bool> {
        let date = day.date;
        let record = CachedDay::new(day, raw_data, OffsetDateTime::now_utc(), !is_current_day);
        let written = self.store.upsert_unless_complete(&record).await?;
        if written {
            tracing::debug!(
                date = %date,
                entries = record.entries.len(),
                is_complete = record.is_complete,
                "Cached usage day"
            );
        } else {
            tracing::debug!(date = %date, "Usage day already complete, not overwritten");
        }
        Ok(written)
    }

    /// Whether a record can be served without refetching
    pub fn is_usable(&self, record: &CachedDay, today: Date, now: OffsetDateTime) -> bool {
        if record.date < today {
            record.is_complete
        } else if record.date == today {
            now - record.cached_at < self.ttl
        } else {
            false
        }
    }

    /// Drop today's record so the next read refetches it
    pub async fn invalidate_today(&self) -> AnalyticsResult<bool> {
        let today = self.today();
        let removed = self.store.delete(today).await?;
        tracing::info!(date = %today, removed, "Invalidated today's usage cache");
        Ok(removed)
    }

    /// Delete records older than `today - retention_days`
    pub async fn cleanup(&self, retention_days: u32) -> AnalyticsResult<u64> {
        let cutoff = self
            .today()
            .checked_sub(Duration::days(i64::from(retention_days)))
            .ok_or_else(|| {
                AnalyticsError::Validation(format!(
                    "retention of {} days reaches before the earliest supported date",
                    retention_days
                ))
            })?;
        let deleted = self.store.delete_before(cutoff).await?;
        tracing::info!(cutoff = %cutoff, deleted, "Cleaned up usage cache");
        Ok(deleted)
    }
}
