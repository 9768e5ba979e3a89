//! LiteMaaS admin usage analytics
//!
//! Pulls per-day activity from LiteLLM, attributes it to local users and keys,
//! caches each day, and serves range aggregates, breakdowns and exports.

pub mod aggregate;
pub mod cache;
pub mod calendar;
pub mod enrichment;
pub mod error;
pub mod export;
pub mod metrics;
pub mod stats;

pub use aggregate::{BreakdownRow, SortBy, SortOrder, Trend, TrendDirection, Trends};
pub use cache::{
    CachedDay, DailyUsageCacheManager, MemoryUsageCacheStore, PgUsageCacheStore, UsageCacheStore,
};
pub use calendar::{DateRange, UsageCalendar};
pub use enrichment::{
    AdminUsageEnrichmentService, IdentityResolver, KeyIdentity, MemoryIdentityResolver,
    PgIdentityResolver,
};
pub use error::{AnalyticsError, AnalyticsResult};
pub use export::{AdminUsageExportService, ExportFile, ExportFormat};
pub use metrics::{Dimension, EnrichedDay, UsageEntry, UsageFilters, UsageMetrics};
pub use stats::{
    AdminUsageStatsService, BreakdownQuery, BreakdownResult, DailyActivitySource, DayError,
    FilterOptions, RangeUsage, UsageAnalytics,
};
