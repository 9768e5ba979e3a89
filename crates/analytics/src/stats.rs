//! Admin usage statistics over cached days

use async_trait::async_trait;
use litemaas_litellm::{DailyActivityDay, LiteLlmClient, LiteLlmResult};
use litemaas_shared::PaginatedResponse;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::aggregate::{breakdown, sort_rows, BreakdownRow, SortBy, SortOrder, Trends};
use crate::cache::DailyUsageCacheManager;
use crate::calendar::{format_date, DateRange};
use crate::enrichment::AdminUsageEnrichmentService;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::metrics::{Dimension, UsageEntry, UsageFilters, UsageMetrics, UNKNOWN};

/// Rows shown in the analytics "top" lists
const TOP_N: usize = 10;

pub const DEFAULT_BREAKDOWN_LIMIT: i64 = 50;
pub const MAX_BREAKDOWN_LIMIT: i64 = 500;

/// Source of raw per-day activity
#[async_trait]
pub trait DailyActivitySource: Send + Sync {
    async fn daily_activity(&self, date: Date) -> LiteLlmResult<DailyActivityDay>;
}

#[async_trait]
impl DailyActivitySource for LiteLlmClient {
    async fn daily_activity(&self, date: Date) -> LiteLlmResult<DailyActivityDay> {
        self.get_daily_activity(date).await
    }
}

// =============================================================================
// Result types
// =============================================================================

/// A day that could not be loaded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayError {
    pub date: String,
    pub message: String,
}

/// Entries for one day after filtering
#[derive(Debug, Clone)]
pub struct DayUsage {
    pub date: Date,
    pub entries: Vec<UsageEntry>,
}

/// Filtered usage over a range
#[derive(Debug, Clone)]
pub struct RangeUsage {
    pub range: DateRange,
    pub days: Vec<DayUsage>,
    pub errors: Vec<DayError>,
}

impl RangeUsage {
    pub fn entries(&self) -> impl Iterator<Item = &UsageEntry> {
        self.days.iter().flat_map(|d| d.entries.iter())
    }

    pub fn totals(&self) -> UsageMetrics {
        let mut totals = UsageMetrics::default();
        for entry in self.entries() {
            totals.add(&entry.metrics);
        }
        totals
    }

    pub fn breakdown(&self, dimension: Dimension) -> Vec<BreakdownRow> {
        breakdown(dimension, self.entries())
    }

    /// One point per loaded day, in date order
    pub fn daily(&self) -> Vec<DailyPoint> {
        self.days
            .iter()
            .map(|d| {
                let mut metrics = UsageMetrics::default();
                for entry in &d.entries {
                    metrics.add(&entry.metrics);
                }
                DailyPoint {
                    date: format_date(d.date),
                    success_rate: metrics.success_rate(),
                    metrics,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: String,
    #[serde(flatten)]
    pub metrics: UsageMetrics,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodInfo {
    pub start: String,
    pub end: String,
    pub days: i64,
}

impl From<DateRange> for PeriodInfo {
    fn from(range: DateRange) -> Self {
        Self {
            start: format_date(range.start),
            end: format_date(range.end),
            days: range.len_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageAnalytics {
    pub period: PeriodInfo,
    pub previous_period: PeriodInfo,
    pub totals: UsageMetrics,
    pub success_rate: f64,
    pub active_users: usize,
    pub daily: Vec<DailyPoint>,
    pub top_users: Vec<BreakdownRow>,
    pub top_models: Vec<BreakdownRow>,
    pub top_providers: Vec<BreakdownRow>,
    pub trends: Trends,
    pub errors: Vec<DayError>,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakdownQuery {
    pub page: i64,
    pub limit: i64,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for BreakdownQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_BREAKDOWN_LIMIT,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl BreakdownQuery {
    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.page < 1 {
            return Err(AnalyticsError::Validation("page must be at least 1".to_string()));
        }
        if !(1..=MAX_BREAKDOWN_LIMIT).contains(&self.limit) {
            return Err(AnalyticsError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_BREAKDOWN_LIMIT
            )));
        }
        Ok(())
    }

    /// Rows to skip for the requested page
    pub fn offset(&self) -> AnalyticsResult<usize> {
        self.validate()?;
        (self.page - 1)
            .checked_mul(self.limit)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or_else(|| {
                AnalyticsError::Validation(format!("page {} is out of range", self.page))
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakdownResult {
    pub dimension: Dimension,
    pub period: PeriodInfo,
    #[serde(flatten)]
    pub page: PaginatedResponse<BreakdownRow>,
    pub totals: UsageMetrics,
    pub errors: Vec<DayError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOption {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub users: Vec<FilterOption>,
    pub models: Vec<FilterOption>,
    pub providers: Vec<FilterOption>,
    pub api_keys: Vec<FilterOption>,
    pub errors: Vec<DayError>,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone)]
pub struct AdminUsageStatsService {
    cache: DailyUsageCacheManager,
    enrichment: AdminUsageEnrichmentService,
    source: Arc<dyn DailyActivitySource>,
}

impl AdminUsageStatsService {
    pub fn new(
        cache: DailyUsageCacheManager,
        enrichment: AdminUsageEnrichmentService,
        source: Arc<dyn DailyActivitySource>,
    ) -> Self {
        Self {
            cache,
            enrichment,
            source,
        }
    }

    pub fn cache(&self) -> &DailyUsageCacheManager {
        &self.cache
    }

    /// Load every day of the range, filtered. Per-day failures are collected,
    /// not returned.
    pub async fn get_range(&self, range: DateRange, filters: &UsageFilters) -> RangeUsage {
        let today = self.cache.today();
        let mut days = Vec::new();
        let mut errors = Vec::new();

        for date in range.days().take_while(|d| *d <= today) {
            match self.load_day(date, today).await {
                Ok(entries) => {
                    let entries = if filters.is_empty() {
                        entries
                    } else {
                        entries.into_iter().filter(|e| filters.matches(e)).collect()
                    };
                    days.push(DayUsage { date, entries });
                }
                Err(e) => {
                    tracing::warn!(date = %date, error = %e, "Failed to load usage day");
                    errors.push(DayError {
                        date: format_date(date),
                        message: e.to_string(),
                    });
                }
            }
        }

        RangeUsage {
            range,
            days,
            errors,
        }
    }

    async fn load_day(&self, date: Date, today: Date) -> AnalyticsResult<Vec<UsageEntry>> {
        match self.cache.get(date).await {
            Ok(Some(record)) if self.cache.is_usable(&record, today, OffsetDateTime::now_utc()) => {
                return Ok(record.entries);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(date = %date, error = %e, "Usage cache read failed, refetching");
            }
        }

        let raw = self.source.daily_activity(date).await?;
        let enriched = self.enrichment.enrich(date, &raw).await?;
        let entries = enriched.entries.clone();
        self.cache
            .put(enriched, serde_json::to_value(&raw)?, date == today)
            .await?;
        Ok(entries)
    }

    pub async fn get_analytics(
        &self,
        range: DateRange,
        filters: &UsageFilters,
    ) -> AnalyticsResult<UsageAnalytics> {
        let current = self.get_range(range, filters).await;
        let previous_range = range.previous();
        let previous = self.get_range(previous_range, filters).await;
        if !previous.errors.is_empty() {
            tracing::warn!(
                failed_days = previous.errors.len(),
                "Previous period incomplete, trends may be skewed"
            );
        }

        let totals = current.totals();
        let trends = Trends::between(&totals, &previous.totals());

        let top = |dimension| {
            let mut rows = current.breakdown(dimension);
            sort_rows(&mut rows, SortBy::Spend, SortOrder::Desc);
            rows.truncate(TOP_N);
            rows
        };
        let top_users = top(Dimension::User);
        let top_models = top(Dimension::Model);
        let top_providers = top(Dimension::Provider);

        let active_users = current
            .breakdown(Dimension::User)
            .iter()
            .filter(|r| r.id != Uuid::nil().to_string())
            .count();

        tracing::info!(
            start = %range.start,
            end = %range.end,
            requests = totals.requests,
            failed_days = current.errors.len(),
            "Computed usage analytics"
        );

        Ok(UsageAnalytics {
            period: range.into(),
            previous_period: previous_range.into(),
            success_rate: totals.success_rate(),
            totals,
            active_users,
            daily: current.daily(),
            top_users,
            top_models,
            top_providers,
            trends,
            errors: current.errors,
        })
    }

    pub async fn get_breakdown(
        &self,
        dimension: Dimension,
        range: DateRange,
        filters: &UsageFilters,
        query: BreakdownQuery,
    ) -> AnalyticsResult<BreakdownResult> {
        let offset = query.offset()?;
        let usage = self.get_range(range, filters).await;

        let mut rows = usage.breakdown(dimension);
        sort_rows(&mut rows, query.sort_by, query.sort_order);

        let total = rows.len() as i64;
        let data: Vec<BreakdownRow> = rows
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .collect();

        Ok(BreakdownResult {
            dimension,
            period: range.into(),
            page: PaginatedResponse::new(data, total, query.page, query.limit),
            totals: usage.totals(),
            errors: usage.errors,
        })
    }

    /// All rows of a breakdown in the requested order, for export
    pub async fn get_breakdown_rows(
        &self,
        dimension: Dimension,
        range: DateRange,
        filters: &UsageFilters,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> (Vec<BreakdownRow>, Vec<DayError>) {
        let usage = self.get_range(range, filters).await;
        let mut rows = usage.breakdown(dimension);
        sort_rows(&mut rows, sort_by, sort_order);
        (rows, usage.errors)
    }

    pub async fn get_filter_options(&self, range: DateRange) -> FilterOptions {
        let usage = self.get_range(range, &UsageFilters::default()).await;

        let mut users = BTreeMap::new();
        let mut models = BTreeMap::new();
        let mut providers = BTreeMap::new();
        let mut api_keys = BTreeMap::new();
        for entry in usage.entries() {
            users
                .entry(entry.user_id.to_string())
                .or_insert_with(|| entry.username.clone());
            models
                .entry(entry.model.clone())
                .or_insert_with(|| entry.model.clone());
            providers
                .entry(entry.provider.clone())
                .or_insert_with(|| entry.provider.clone());
            if entry.key_hash != UNKNOWN {
                api_keys
                    .entry(entry.api_key_ref())
                    .or_insert_with(|| entry.api_key_label());
            }
        }

        let options = |map: BTreeMap<String, String>| {
            let mut opts: Vec<FilterOption> = map
                .into_iter()
                .map(|(id, name)| FilterOption { id, name })
                .collect();
            opts.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            opts
        };

        FilterOptions {
            users: options(users),
            models: options(models),
            providers: options(providers),
            api_keys: options(api_keys),
            errors: usage.errors,
        }
    }

    /// Drop and reload today's record
    pub async fn refresh_today(&self) -> AnalyticsResult<UsageMetrics> {
        self.cache.invalidate_today().await?;
        let today = self.cache.today();
        let entries = self.load_day(today, today).await?;

        let mut totals = UsageMetrics::default();
        for entry in &entries {
            totals.add(&entry.metrics);
        }
        tracing::info!(date = %today, requests = totals.requests, "Refreshed today's usage");
        Ok(totals)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn query(page: i64, limit: i64) -> BreakdownQuery {
        BreakdownQuery {
            page,
            limit,
            ..Default::default()
        }
    }

    #[test]
    fn test_breakdown_offset() {
        assert_eq!(query(1, 50).offset().unwrap(), 0);
        assert_eq!(query(3, 20).offset().unwrap(), 40);
    }

    #[test]
    fn test_breakdown_offset_out_of_range() {
        assert!(matches!(
            query(i64::MAX, MAX_BREAKDOWN_LIMIT).offset(),
            Err(AnalyticsError::Validation(_))
        ));
        assert!(matches!(query(0, 50).offset(), Err(AnalyticsError::Validation(_))));
        assert!(matches!(query(1, 501).offset(), Err(AnalyticsError::Validation(_))));
    }
}
