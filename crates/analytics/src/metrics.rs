//! Usage metrics, enriched entries and query filters

use litemaas_litellm::SpendMetrics;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::Date;
use uuid::Uuid;

use crate::error::AnalyticsError;

/// Name used for usage that cannot be attributed
pub const UNKNOWN: &str = "unknown";

/// Additive request/token/spend counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub requests: i64,
    pub successful_requests: i64,
    pub failed_requests: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub spend: f64,
}

impl UsageMetrics {
    pub fn add(&mut self, other: &UsageMetrics) {
        self.requests += other.requests;
        self.successful_requests += other.successful_requests;
        self.failed_requests += other.failed_requests;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.spend += other.spend;
    }

    /// Percentage of successful requests, 0 when there were none
    pub fn success_rate(&self) -> f64 {
        if self.requests > 0 {
            self.successful_requests as f64 / self.requests as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requests == 0 && self.total_tokens == 0 && self.spend == 0.0
    }
}

impl From<&SpendMetrics> for UsageMetrics {
    fn from(m: &SpendMetrics) -> Self {
        let total_tokens = if m.total_tokens > 0 {
            m.total_tokens
        } else {
            m.prompt_tokens + m.completion_tokens
        };
        // Older gateway builds only report api_requests
        let (successful, failed) = if m.successful_requests + m.failed_requests == 0 {
            (m.api_requests, 0)
        } else {
            (m.successful_requests, m.failed_requests)
        };
        Self {
            requests: m.api_requests,
            successful_requests: successful,
            failed_requests: failed,
            prompt_tokens: m.prompt_tokens,
            completion_tokens: m.completion_tokens,
            total_tokens,
            spend: m.spend,
        }
    }
}

/// One day of usage for one (API key x model) pair, joined to local identities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    /// LiteLLM token hash; `unknown` when the payload had no key breakdown
    pub key_hash: String,
    pub key_alias: Option<String>,
    pub api_key_id: Option<Uuid>,
    pub api_key_name: Option<String>,
    /// Nil for unattributed usage
    pub user_id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub team_id: Option<Uuid>,
    pub model: String,
    pub provider: String,
    pub metrics: UsageMetrics,
}

impl UsageEntry {
    pub fn is_unattributed(&self) -> bool {
        self.user_id.is_nil()
    }

    /// Identifier used for the api_key dimension and filter
    pub fn api_key_ref(&self) -> String {
        self.api_key_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| self.key_hash.clone())
    }

    pub fn api_key_label(&self) -> String {
        self.api_key_name
            .clone()
            .or_else(|| self.key_alias.clone())
            .unwrap_or_else(|| short_hash(&self.key_hash))
    }
}

fn short_hash(hash: &str) -> String {
    if hash.chars().count() > 12 {
        format!("{}...", hash.chars().take(12).collect::<String>())
    } else {
        hash.to_string()
    }
}

/// The enriched form of one upstream day
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedDay {
    pub date: Date,
    pub entries: Vec<UsageEntry>,
}

impl EnrichedDay {
    pub fn totals(&self) -> UsageMetrics {
        let mut totals = UsageMetrics::default();
        for entry in &self.entries {
            totals.add(&entry.metrics);
        }
        totals
    }
}

/// Breakdown dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    User,
    Model,
    Provider,
    ApiKey,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
            Self::Provider => "provider",
            Self::ApiKey => "api_key",
        }
    }

    /// (id, display name) of an entry along this dimension
    pub fn key_of(&self, entry: &UsageEntry) -> (String, String) {
        match self {
            Self::User => (entry.user_id.to_string(), entry.username.clone()),
            Self::Model => (entry.model.clone(), entry.model.clone()),
            Self::Provider => (entry.provider.clone(), entry.provider.clone()),
            Self::ApiKey => (entry.api_key_ref(), entry.api_key_label()),
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" | "users" => Ok(Self::User),
            "model" | "models" => Ok(Self::Model),
            "provider" | "providers" => Ok(Self::Provider),
            "api_key" | "api-key" | "apiKey" | "api_keys" => Ok(Self::ApiKey),
            other => Err(AnalyticsError::Validation(format!(
                "unknown dimension '{}'",
                other
            ))),
        }
    }
}

/// Entry-level filters; an empty list means "no restriction"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageFilters {
    pub user_ids: Vec<Uuid>,
    pub model_ids: Vec<String>,
    pub provider_ids: Vec<String>,
    /// Local API key ids or LiteLLM key hashes
    pub api_key_ids: Vec<String>,
}

impl UsageFilters {
    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
            && self.model_ids.is_empty()
            && self.provider_ids.is_empty()
            && self.api_key_ids.is_empty()
    }

    pub fn matches(&self, entry: &UsageEntry) -> bool {
        (self.user_ids.is_empty() || self.user_ids.contains(&entry.user_id))
            && (self.model_ids.is_empty() || self.model_ids.contains(&entry.model))
            && (self.provider_ids.is_empty() || self.provider_ids.contains(&entry.provider))
            && (self.api_key_ids.is_empty()
                || self.api_key_ids.contains(&entry.key_hash)
                || entry
                    .api_key_id
                    .is_some_and(|id| self.api_key_ids.contains(&id.to_string())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn entry(
        user: Uuid,
        model: &str,
        provider: &str,
        requests: i64,
        spend: f64,
    ) -> UsageEntry {
        let username = if user.is_nil() {
            UNKNOWN.to_string()
        } else {
            format!("user-{}", &user.to_string()[..4])
        };
        UsageEntry {
            key_hash: format!("hash-{}-{}", user, model),
            key_alias: None,
            api_key_id: None,
            api_key_name: None,
            user_id: user,
            username,
            email: None,
            team_id: None,
            model: model.to_string(),
            provider: provider.to_string(),
            metrics: UsageMetrics {
                requests,
                successful_requests: requests,
                failed_requests: 0,
                prompt_tokens: requests * 10,
                completion_tokens: requests * 5,
                total_tokens: requests * 15,
                spend,
            },
        }
    }

    #[test]
    fn test_metrics_from_spend_fills_gaps() {
        let upstream = SpendMetrics {
            spend: 0.5,
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 0,
            api_requests: 4,
            successful_requests: 0,
            failed_requests: 0,
        };
        let m = UsageMetrics::from(&upstream);
        assert_eq!(m.total_tokens, 150);
        assert_eq!(m.successful_requests, 4);
        assert_eq!(m.success_rate(), 100.0);
    }

    #[test]
    fn test_success_rate_without_requests() {
        assert_eq!(UsageMetrics::default().success_rate(), 0.0);
    }

    #[test]
    fn test_dimension_parsing() {
        assert_eq!("api-key".parse::<Dimension>().unwrap(), Dimension::ApiKey);
        assert_eq!("users".parse::<Dimension>().unwrap(), Dimension::User);
        assert!("team".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_filters() {
        let alice = Uuid::new_v4();
        let e = entry(alice, "gpt-4o", "openai", 1, 0.1);

        assert!(UsageFilters::default().matches(&e));
        assert!(UsageFilters {
            user_ids: vec![alice],
            provider_ids: vec!["openai".into()],
            ..Default::default()
        }
        .matches(&e));
        assert!(!UsageFilters {
            model_ids: vec!["granite".into()],
            ..Default::default()
        }
        .matches(&e));
        assert!(UsageFilters {
            api_key_ids: vec![e.key_hash.clone()],
            ..Default::default()
        }
        .matches(&e));
    }
}
