//! Joins upstream daily activity against local keys, users and models

use async_trait::async_trait;
use litemaas_litellm::{DailyActivityDay, KeyActivity, SpendMetrics};
use sqlx::{FromRow, PgPool};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use time::Date;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AnalyticsResult;
use crate::metrics::{EnrichedDay, UsageEntry, UsageMetrics, UNKNOWN};

/// A local API key together with its owner
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct KeyIdentity {
    pub api_key_id: Uuid,
    pub api_key_name: String,
    pub litellm_key_hash: Option<String>,
    pub litellm_key_alias: Option<String>,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub team_id: Option<Uuid>,
}

/// Lookup of local identities for upstream keys and models
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Keys matching any of the token hashes or aliases, revoked keys included
    async fn keys(
        &self,
        hashes: &[String],
        aliases: &[String],
    ) -> AnalyticsResult<Vec<KeyIdentity>>;

    /// Provider per model id or name
    async fn model_providers(&self, models: &[String]) -> AnalyticsResult<HashMap<String, String>>;
}

// =============================================================================
// PostgreSQL resolver
// =============================================================================

#[derive(Clone)]
pub struct PgIdentityResolver {
    pool: PgPool,
}

impl PgIdentityResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityResolver for PgIdentityResolver {
    async fn keys(
        &self,
        hashes: &[String],
        aliases: &[String],
    ) -> AnalyticsResult<Vec<KeyIdentity>> {
        if hashes.is_empty() && aliases.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<KeyIdentity> = sqlx::query_as(
            r#"
            SELECT k.id AS api_key_id, k.name AS api_key_name,
                   k.litellm_key_hash, k.litellm_key_alias,
                   u.id AS user_id, u.username, u.email, k.team_id
            FROM api_keys k
            JOIN users u ON u.id = k.user_id
            WHERE k.litellm_key_hash = ANY($1) OR k.litellm_key_alias = ANY($2)
            "#,
        )
        .bind(hashes)
        .bind(aliases)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn model_providers(&self, models: &[String]) -> AnalyticsResult<HashMap<String, String>> {
        if models.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT id, name, provider
            FROM models
            WHERE id = ANY($1) OR name = ANY($1)
            "#,
        )
        .bind(models)
        .fetch_all(&self.pool)
        .await?;

        let mut providers = HashMap::new();
        for (id, name, provider) in rows {
            providers.insert(name, provider.clone());
            providers.insert(id, provider);
        }
        Ok(providers)
    }
}

// =============================================================================
// In-memory resolver
// =============================================================================

#[derive(Default)]
pub struct MemoryIdentityResolver {
    keys: RwLock<Vec<KeyIdentity>>,
    providers: RwLock<HashMap<String, String>>,
}

impl MemoryIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that knows only a fixed model catalogue; every key is unattributed
    pub fn with_models<I, M, P>(models: I) -> Self
    where
        I: IntoIterator<Item = (M, P)>,
        M: Into<String>,
        P: Into<String>,
    {
        Self {
            keys: RwLock::default(),
            providers: RwLock::new(
                models
                    .into_iter()
                    .map(|(model, provider)| (model.into(), provider.into()))
                    .collect(),
            ),
        }
    }

    pub async fn add_key(&self, key: KeyIdentity) {
        self.keys.write().await.push(key);
    }

    pub async fn add_model(&self, model: &str, provider: &str) {
        self.providers
            .write()
            .await
            .insert(model.to_string(), provider.to_string());
    }
}

#[async_trait]
impl IdentityResolver for MemoryIdentityResolver {
    async fn keys(
        &self,
        hashes: &[String],
        aliases: &[String],
    ) -> AnalyticsResult<Vec<KeyIdentity>> {
        Ok(self
            .keys
            .read()
            .await
            .iter()
            .filter(|k| {
                k.litellm_key_hash.as_ref().is_some_and(|h| hashes.contains(h))
                    || k.litellm_key_alias.as_ref().is_some_and(|a| aliases.contains(a))
            })
            .cloned()
            .collect())
    }

    async fn model_providers(&self, models: &[String]) -> AnalyticsResult<HashMap<String, String>> {
        let providers = self.providers.read().await;
        Ok(models
            .iter()
            .filter_map(|m| providers.get(m).map(|p| (m.clone(), p.clone())))
            .collect())
    }
}

// =============================================================================
// Enrichment
// =============================================================================

/// Turns upstream daily activity into attributed [`UsageEntry`] rows
#[derive(Clone)]
pub struct AdminUsageEnrichmentService {
    resolver: Arc<dyn IdentityResolver>,
}

struct KeyIndex {
    by_hash: HashMap<String, KeyIdentity>,
    by_alias: HashMap<String, KeyIdentity>,
}

impl KeyIndex {
    fn new(keys: Vec<KeyIdentity>) -> Self {
        let mut by_hash = HashMap::new();
        let mut by_alias = HashMap::new();
        for key in keys {
            if let Some(alias) = &key.litellm_key_alias {
                by_alias.insert(alias.clone(), key.clone());
            }
            if let Some(hash) = &key.litellm_key_hash {
                by_hash.insert(hash.clone(), key);
            }
        }
        Self { by_hash, by_alias }
    }

    fn lookup(&self, hash: &str, alias: Option<&str>) -> Option<&KeyIdentity> {
        self.by_hash
            .get(hash)
            .or_else(|| alias.and_then(|a| self.by_alias.get(a)))
    }
}

impl AdminUsageEnrichmentService {
    pub fn new(resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { resolver }
    }

    pub async fn enrich(&self, date: Date, day: &DailyActivityDay) -> AnalyticsResult<EnrichedDay> {
        let breakdown = &day.breakdown;

        let mut hashes = BTreeSet::new();
        let mut aliases = BTreeSet::new();
        let key_buckets = breakdown
            .models
            .values()
            .flat_map(|m| m.api_key_breakdown.iter())
            .chain(breakdown.api_keys.iter());
        for (hash, activity) in key_buckets {
            hashes.insert(hash.clone());
            if let Some(alias) = &activity.metadata.key_alias {
                aliases.insert(alias.clone());
            }
        }

        let hashes: Vec<String> = hashes.into_iter().collect();
        let aliases: Vec<String> = aliases.into_iter().collect();
        let models: Vec<String> = breakdown.models.keys().cloned().collect();

        let index = KeyIndex::new(self.resolver.keys(&hashes, &aliases).await?);
        let providers = self.resolver.model_providers(&models).await?;

        let mut entries = Vec::new();

        for (model, activity) in &breakdown.models {
            let provider = resolve_provider(model, &providers);
            if activity.api_key_breakdown.is_empty() {
                if !is_zero(&activity.metrics) {
                    entries.push(unattributed(model, &provider, &activity.metrics));
                }
                continue;
            }
            for (hash, key_activity) in &activity.api_key_breakdown {
                entries.push(attributed(&index, hash, key_activity, model, &provider));
            }
        }

        // Payloads without a model split still carry per-key totals
        if breakdown.models.is_empty() {
            for (hash, key_activity) in &breakdown.api_keys {
                entries.push(attributed(&index, hash, key_activity, UNKNOWN, UNKNOWN));
            }
        }

        if entries.is_empty() && !is_zero(&day.metrics) {
            entries.push(unattributed(UNKNOWN, UNKNOWN, &day.metrics));
        }

        let unresolved = entries.iter().filter(|e| e.is_unattributed()).count();
        if unresolved > 0 {
            tracing::debug!(date = %date, unresolved, "Usage entries attributed to unknown user");
        }

        Ok(EnrichedDay { date, entries })
    }
}

fn is_zero(m: &SpendMetrics) -> bool {
    m.api_requests == 0 && m.total_tokens == 0 && m.prompt_tokens == 0 && m.spend == 0.0
}

/// Local catalogue first, then the `provider/` prefix of the model name
fn resolve_provider(model: &str, providers: &HashMap<String, String>) -> String {
    providers
        .get(model)
        .cloned()
        .or_else(|| {
            model
                .split_once('/')
                .map(|(prefix, _)| prefix.to_string())
                .filter(|p| !p.is_empty())
        })
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn attributed(
    index: &KeyIndex,
    hash: &str,
    activity: &KeyActivity,
    model: &str,
    provider: &str,
) -> UsageEntry {
    let alias = activity.metadata.key_alias.as_deref();
    let metrics = UsageMetrics::from(&activity.metrics);
    match index.lookup(hash, alias) {
        Some(key) => UsageEntry {
            key_hash: hash.to_string(),
            key_alias: alias.map(str::to_string).or_else(|| key.litellm_key_alias.clone()),
            api_key_id: Some(key.api_key_id),
            api_key_name: Some(key.api_key_name.clone()),
            user_id: key.user_id,
            username: key.username.clone(),
            email: Some(key.email.clone()),
            team_id: key.team_id,
            model: model.to_string(),
            provider: provider.to_string(),
            metrics,
        },
        None => UsageEntry {
            key_hash: hash.to_string(),
            key_alias: alias.map(str::to_string),
            api_key_id: None,
            api_key_name: None,
            user_id: Uuid::nil(),
            username: UNKNOWN.to_string(),
            email: None,
            team_id: None,
            model: model.to_string(),
            provider: provider.to_string(),
            metrics,
        },
    }
}

fn unattributed(model: &str, provider: &str, metrics: &SpendMetrics) -> UsageEntry {
    UsageEntry {
        key_hash: UNKNOWN.to_string(),
        key_alias: None,
        api_key_id: None,
        api_key_name: None,
        user_id: Uuid::nil(),
        username: UNKNOWN.to_string(),
        email: None,
        team_id: None,
        model: model.to_string(),
        provider: provider.to_string(),
        metrics: UsageMetrics::from(metrics),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::macros::date;

    fn alice_key() -> KeyIdentity {
        KeyIdentity {
            api_key_id: Uuid::new_v4(),
            api_key_name: "alice-prod".to_string(),
            litellm_key_hash: Some("hash-alice".to_string()),
            litellm_key_alias: Some("alias-alice".to_string()),
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            team_id: None,
        }
    }

    fn payload() -> DailyActivityDay {
        serde_json::from_value(serde_json::json!({
            "date": "2025-08-15",
            "metrics": {"api_requests": 10, "spend": 1.0},
            "breakdown": {
                "models": {
                    "openai/gpt-4o": {
                        "metrics": {"api_requests": 6},
                        "api_key_breakdown": {
                            "hash-alice": {"metrics": {"api_requests": 4, "spend": 0.4}},
                            "hash-other": {"metrics": {"api_requests": 2, "spend": 0.2},
                                           "metadata": {"key_alias": "alias-alice"}}
                        }
                    },
                    "granite": {
                        "metrics": {"api_requests": 3, "spend": 0.3}
                    },
                    "mystery": {
                        "metrics": {"api_requests": 1, "spend": 0.1},
                        "api_key_breakdown": {
                            "hash-stranger": {"metrics": {"api_requests": 1, "spend": 0.1}}
                        }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_enrich_attributes_keys_and_providers() {
        let resolver = Arc::new(MemoryIdentityResolver::new());
        let alice = alice_key();
        resolver.add_key(alice.clone()).await;
        resolver.add_model("granite", "watsonx").await;

        let service = AdminUsageEnrichmentService::new(resolver);
        let day = service.enrich(date!(2025 - 08 - 15), &payload()).await.unwrap();

        assert_eq!(day.entries.len(), 4);
        assert_eq!(day.totals().requests, 10);

        let by_hash = |h: &str| day.entries.iter().find(|e| e.key_hash == h).unwrap();

        let direct = by_hash("hash-alice");
        assert_eq!(direct.user_id, alice.user_id);
        assert_eq!(direct.provider, "openai");
        assert_eq!(direct.api_key_id, Some(alice.api_key_id));

        // Falls back to alias when the hash is unknown
        assert_eq!(by_hash("hash-other").user_id, alice.user_id);

        let stranger = by_hash("hash-stranger");
        assert!(stranger.is_unattributed());
        assert_eq!(stranger.username, UNKNOWN);
        assert_eq!(stranger.provider, UNKNOWN);

        let granite = day.entries.iter().find(|e| e.model == "granite").unwrap();
        assert!(granite.is_unattributed());
        assert_eq!(granite.provider, "watsonx");
    }

    #[tokio::test]
    async fn test_resolver_seeded_with_models() {
        let resolver = MemoryIdentityResolver::with_models([("granite", "watsonx")]);
        let providers = resolver
            .model_providers(&["granite".to_string(), "other".to_string()])
            .await
            .unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers["granite"], "watsonx");
        assert!(resolver.keys(&["hash-alice".to_string()], &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enrich_empty_day() {
        let service = AdminUsageEnrichmentService::new(Arc::new(MemoryIdentityResolver::new()));
        let day = service
            .enrich(date!(2025 - 08 - 16), &DailyActivityDay::empty("2025-08-16"))
            .await
            .unwrap();
        assert!(day.entries.is_empty());
    }

    #[tokio::test]
    async fn test_enrich_totals_without_breakdown() {
        let service = AdminUsageEnrichmentService::new(Arc::new(MemoryIdentityResolver::new()));
        let mut raw = DailyActivityDay::empty("2025-08-17");
        raw.metrics.api_requests = 7;

        let day = service.enrich(date!(2025 - 08 - 17), &raw).await.unwrap();
        assert_eq!(day.entries.len(), 1);
        assert_eq!(day.totals().requests, 7);
        assert!(day.entries[0].is_unattributed());
    }
}
