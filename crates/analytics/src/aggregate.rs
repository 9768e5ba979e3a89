//! Folding entries into per-dimension aggregates, sorting and trends

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::error::AnalyticsError;
use crate::metrics::{Dimension, UsageEntry, UsageMetrics};

// =============================================================================
// Stored day aggregates
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAggregate {
    pub username: String,
    pub email: Option<String>,
    pub metrics: UsageMetrics,
    pub models: BTreeMap<String, UsageMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelAggregate {
    pub provider: String,
    pub metrics: UsageMetrics,
    /// Keyed by user id
    pub users: BTreeMap<String, UsageMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAggregate {
    pub metrics: UsageMetrics,
    pub models: BTreeMap<String, UsageMetrics>,
}

/// Per-day aggregates persisted next to the entries they are computed from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayAggregates {
    pub by_user: BTreeMap<String, UserAggregate>,
    pub by_model: BTreeMap<String, ModelAggregate>,
    pub by_provider: BTreeMap<String, ProviderAggregate>,
    pub totals: UsageMetrics,
}

impl DayAggregates {
    pub fn from_entries(entries: &[UsageEntry]) -> Self {
        let mut agg = Self::default();
        for entry in entries {
            let m = &entry.metrics;
            agg.totals.add(m);

            let user = agg
                .by_user
                .entry(entry.user_id.to_string())
                .or_insert_with(|| UserAggregate {
                    username: entry.username.clone(),
                    email: entry.email.clone(),
                    ..Default::default()
                });
            user.metrics.add(m);
            user.models.entry(entry.model.clone()).or_default().add(m);

            let model = agg.by_model.entry(entry.model.clone()).or_insert_with(|| ModelAggregate {
                provider: entry.provider.clone(),
                ..Default::default()
            });
            model.metrics.add(m);
            model.users.entry(entry.user_id.to_string()).or_default().add(m);

            let provider = agg.by_provider.entry(entry.provider.clone()).or_default();
            provider.metrics.add(m);
            provider.models.entry(entry.model.clone()).or_default().add(m);
        }
        agg
    }
}

// =============================================================================
// Breakdown rows
// =============================================================================

/// One row of a dimension breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub id: String,
    pub name: String,
    /// User email (user dimension)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Provider of the model (model dimension)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Owning username (api_key dimension)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(flatten)]
    pub metrics: UsageMetrics,
    pub success_rate: f64,
}

/// Group entries along a dimension; output is sorted by id
pub fn breakdown<'a, I>(dimension: Dimension, entries: I) -> Vec<BreakdownRow>
where
    I: IntoIterator<Item = &'a UsageEntry>,
{
    let mut rows: HashMap<String, BreakdownRow> = HashMap::new();
    for entry in entries {
        let (id, name) = dimension.key_of(entry);
        let row = rows.entry(id.clone()).or_insert_with(|| BreakdownRow {
            id,
            name,
            email: (dimension == Dimension::User).then(|| entry.email.clone()).flatten(),
            provider: (dimension == Dimension::Model).then(|| entry.provider.clone()),
            owner: (dimension == Dimension::ApiKey).then(|| entry.username.clone()),
            metrics: UsageMetrics::default(),
            success_rate: 0.0,
        });
        row.metrics.add(&entry.metrics);
    }

    let mut rows: Vec<BreakdownRow> = rows
        .into_values()
        .map(|mut row| {
            row.success_rate = row.metrics.success_rate();
            row
        })
        .collect();
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    rows
}

// =============================================================================
// Sorting
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Requests,
    Tokens,
    #[default]
    Spend,
    Name,
    SuccessRate,
}

impl FromStr for SortBy {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requests" | "totalRequests" => Ok(Self::Requests),
            "tokens" | "totalTokens" => Ok(Self::Tokens),
            "spend" | "cost" | "totalCost" => Ok(Self::Spend),
            "name" => Ok(Self::Name),
            "success_rate" | "successRate" => Ok(Self::SuccessRate),
            other => Err(AnalyticsError::Validation(format!("unknown sort key '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(AnalyticsError::Validation(format!("unknown sort order '{}'", other))),
        }
    }
}

/// Sort rows in place; ties always fall back to ascending name, then id
pub fn sort_rows(rows: &mut [BreakdownRow], sort_by: SortBy, order: SortOrder) {
    rows.sort_by(|a, b| {
        let primary = match sort_by {
            SortBy::Requests => a.metrics.requests.cmp(&b.metrics.requests),
            SortBy::Tokens => a.metrics.total_tokens.cmp(&b.metrics.total_tokens),
            SortBy::Spend => a.metrics.spend.total_cmp(&b.metrics.spend),
            SortBy::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortBy::SuccessRate => a.success_rate.total_cmp(&b.success_rate),
        };
        let primary = match order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

// =============================================================================
// Trends
// =============================================================================

/// Changes smaller than this (in percent) are reported as stable
const STABLE_THRESHOLD_PERCENT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    pub current: f64,
    pub previous: f64,
    pub percentage_change: f64,
    pub direction: TrendDirection,
}

impl Trend {
    pub fn compare(current: f64, previous: f64) -> Self {
        let percentage_change = if previous == 0.0 {
            if current > 0.0 {
                100.0
            } else {
                0.0
            }
        } else {
            (current - previous) / previous.abs() * 100.0
        };
        let direction = if percentage_change.abs() < STABLE_THRESHOLD_PERCENT {
            TrendDirection::Stable
        } else if percentage_change > 0.0 {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        };
        Self {
            current,
            previous,
            percentage_change,
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trends {
    pub requests: Trend,
    pub tokens: Trend,
    pub spend: Trend,
    pub success_rate: Trend,
}

impl Trends {
    pub fn between(current: &UsageMetrics, previous: &UsageMetrics) -> Self {
        Self {
            requests: Trend::compare(current.requests as f64, previous.requests as f64),
            tokens: Trend::compare(current.total_tokens as f64, previous.total_tokens as f64),
            spend: Trend::compare(current.spend, previous.spend),
            success_rate: Trend::compare(current.success_rate(), previous.success_rate()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metrics::tests::entry;
    use uuid::Uuid;

    #[test]
    fn test_day_aggregates_cross_reference() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let entries = vec![
            entry(alice, "gpt-4o", "openai", 10, 1.0),
            entry(alice, "granite", "watsonx", 5, 0.5),
            entry(bob, "gpt-4o", "openai", 2, 0.2),
        ];

        let agg = DayAggregates::from_entries(&entries);
        assert_eq!(agg.totals.requests, 17);
        assert_eq!(agg.by_user[&alice.to_string()].metrics.requests, 15);
        assert_eq!(agg.by_user[&alice.to_string()].models["granite"].requests, 5);
        assert_eq!(agg.by_model["gpt-4o"].users[&bob.to_string()].requests, 2);
        assert_eq!(agg.by_model["gpt-4o"].provider, "openai");
        assert_eq!(agg.by_provider["openai"].metrics.requests, 12);
    }

    #[test]
    fn test_breakdown_totals_match() {
        let alice = Uuid::new_v4();
        let entries = vec![
            entry(alice, "gpt-4o", "openai", 3, 0.3),
            entry(alice, "gpt-4o", "openai", 4, 0.4),
            entry(Uuid::nil(), "gpt-4o", "openai", 1, 0.1),
        ];

        let by_user = breakdown(Dimension::User, &entries);
        assert_eq!(by_user.len(), 2);
        let sum: i64 = by_user.iter().map(|r| r.metrics.requests).sum();
        assert_eq!(sum, 8);

        let by_model = breakdown(Dimension::Model, &entries);
        assert_eq!(by_model.len(), 1);
        assert_eq!(by_model[0].provider.as_deref(), Some("openai"));
        assert_eq!(by_model[0].success_rate, 100.0);
    }

    #[test]
    fn test_sort_default_spend_desc_with_name_ties() {
        let mut rows = breakdown(
            Dimension::Model,
            &[
                entry(Uuid::nil(), "b-model", "x", 1, 1.0),
                entry(Uuid::nil(), "a-model", "x", 1, 1.0),
                entry(Uuid::nil(), "c-model", "x", 1, 5.0),
            ],
        );
        sort_rows(&mut rows, SortBy::default(), SortOrder::default());
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["c-model", "a-model", "b-model"]);

        sort_rows(&mut rows, SortBy::Name, SortOrder::Asc);
        assert_eq!(rows[0].name, "a-model");
    }

    #[test]
    fn test_trend_directions() {
        let up = Trend::compare(110.0, 100.0);
        assert_eq!(up.direction, TrendDirection::Up);
        assert!((up.percentage_change - 10.0).abs() < 1e-9);

        assert_eq!(Trend::compare(80.0, 100.0).direction, TrendDirection::Down);
        assert_eq!(Trend::compare(100.5, 100.0).direction, TrendDirection::Stable);

        let from_zero = Trend::compare(5.0, 0.0);
        assert_eq!(from_zero.percentage_change, 100.0);
        assert_eq!(from_zero.direction, TrendDirection::Up);

        assert_eq!(Trend::compare(0.0, 0.0).direction, TrendDirection::Stable);
    }

    #[test]
    fn test_sort_parsing() {
        assert_eq!("successRate".parse::<SortBy>().unwrap(), SortBy::SuccessRate);
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("latency".parse::<SortBy>().is_err());
    }
}
