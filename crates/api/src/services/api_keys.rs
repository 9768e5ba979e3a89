//! API key lifecycle
//!
//! Keys are minted by LiteLLM. The portal stores the hash LiteLLM reports
//! spend under, plus a display prefix; the secret is returned exactly once.

use litemaas_litellm::{GenerateKeyRequest, LiteLlmClient};
use litemaas_shared::ApiKey;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::audit_constants::{action, resource_type};
use crate::auth::ApiKeyManager;
use crate::error::{ApiError, ApiResult};
use crate::services::AuditLogger;

const MAX_NAME_LEN: usize = 100;
const MAX_EXPIRY_DAYS: i64 = 365;

const API_KEY_COLUMNS: &str = r#"
    id, user_id, team_id, name, key_prefix, key_hash, litellm_key_hash,
    litellm_key_alias, models, max_budget, tpm_limit, rpm_limit, status,
    expires_at, last_used_at, created_at, revoked_at
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub models: Vec<String>,
    pub team_id: Option<Uuid>,
    pub max_budget: Option<f64>,
    pub tpm_limit: Option<i32>,
    pub rpm_limit: Option<i32>,
    pub expires_in_days: Option<i64>,
}

impl CreateApiKeyRequest {
    fn validate(&self) -> ApiResult<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("Key name is required".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ApiError::Validation(format!(
                "Key name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        if self.models.is_empty() {
            return Err(ApiError::Validation(
                "At least one model is required".to_string(),
            ));
        }
        if self.max_budget.is_some_and(|b| b < 0.0) {
            return Err(ApiError::Validation("max_budget must not be negative".to_string()));
        }
        if self.tpm_limit.is_some_and(|l| l <= 0) || self.rpm_limit.is_some_and(|l| l <= 0) {
            return Err(ApiError::Validation("Rate limits must be positive".to_string()));
        }
        if let Some(days) = self.expires_in_days {
            if !(1..=MAX_EXPIRY_DAYS).contains(&days) {
                return Err(ApiError::Validation(format!(
                    "expires_in_days must be between 1 and {}",
                    MAX_EXPIRY_DAYS
                )));
            }
        }
        Ok(())
    }

    /// Requested models, trimmed and de-duplicated in request order
    fn model_ids(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::with_capacity(self.models.len());
        for model in self.models.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
            if !models.iter().any(|m| m == model) {
                models.push(model.to_string());
            }
        }
        models
    }
}

/// A freshly created key; `key` is never retrievable again
#[derive(Debug, Serialize)]
pub struct CreatedApiKey {
    #[serde(flatten)]
    pub api_key: ApiKey,
    pub key: String,
}

#[derive(Clone)]
pub struct ApiKeyService {
    pool: PgPool,
    litellm: LiteLlmClient,
    audit: AuditLogger,
}

impl ApiKeyService {
    pub fn new(pool: PgPool, litellm: LiteLlmClient, audit: AuditLogger) -> Self {
        Self {
            pool,
            litellm,
            audit,
        }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        username: &str,
        req: CreateApiKeyRequest,
    ) -> ApiResult<CreatedApiKey> {
        req.validate()?;
        let models = req.model_ids();
        if models.is_empty() {
            return Err(ApiError::Validation(
                "At least one model is required".to_string(),
            ));
        }

        // Every requested model needs an active subscription
        let subscribed: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT model_id FROM subscriptions
            WHERE user_id = $1 AND status = 'active' AND model_id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(&models)
        .fetch_all(&self.pool)
        .await?;

        let missing: Vec<&str> = models
            .iter()
            .filter(|m| !subscribed.contains(m))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ApiError::Validation(format!(
                "No active subscription for model(s): {}",
                missing.join(", ")
            )));
        }

        let litellm_team_id = match req.team_id {
            Some(team_id) => self.member_team_litellm_id(team_id, user_id).await?,
            None => None,
        };

        let key_id = Uuid::new_v4();
        let alias = ApiKeyManager::key_alias(username, key_id);
        let expires_at = req
            .expires_in_days
            .map(|days| OffsetDateTime::now_utc() + Duration::days(days));

        let generated = self
            .litellm
            .generate_key(&GenerateKeyRequest {
                key_alias: Some(alias.clone()),
                models: models.clone(),
                max_budget: req.max_budget,
                tpm_limit: req.tpm_limit,
                rpm_limit: req.rpm_limit,
                user_id: Some(user_id.to_string()),
                team_id: litellm_team_id,
                duration: req.expires_in_days.map(|d| format!("{}d", d)),
            })
            .await?;

        let key_hash = ApiKeyManager::hash_key(&generated.key);
        let litellm_key_hash = generated.token.clone().unwrap_or_else(|| key_hash.clone());

        let inserted = sqlx::query_as::<_, ApiKey>(&format!(
            r#"
            INSERT INTO api_keys (
                id, user_id, team_id, name, key_prefix, key_hash, litellm_key_hash,
                litellm_key_alias, models, max_budget, tpm_limit, rpm_limit, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            API_KEY_COLUMNS
        ))
        .bind(key_id)
        .bind(user_id)
        .bind(req.team_id)
        .bind(req.name.trim())
        .bind(ApiKeyManager::extract_prefix(&generated.key))
        .bind(&key_hash)
        .bind(&litellm_key_hash)
        .bind(generated.key_alias.as_deref().unwrap_or(&alias))
        .bind(&models)
        .bind(req.max_budget)
        .bind(req.tpm_limit)
        .bind(req.rpm_limit)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await;

        let api_key = match inserted {
            Ok(key) => key,
            Err(e) => {
                // Don't leave an orphaned key usable in the gateway
                if let Err(cleanup) = self.litellm.delete_keys(&[litellm_key_hash]).await {
                    tracing::error!(
                        key_id = %key_id,
                        error = %cleanup,
                        "Failed to delete orphaned LiteLLM key"
                    );
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            key_id = %api_key.id,
            user_id = %user_id,
            models = ?models,
            "API key created"
        );
        self.audit
            .log(
                user_id,
                action::API_KEY_CREATED,
                resource_type::API_KEY,
                api_key.id,
                json!({ "name": api_key.name, "models": models, "team_id": req.team_id }),
            )
            .await;

        Ok(CreatedApiKey {
            api_key,
            key: generated.key,
        })
    }

    /// Keys owned by `user_id`, or every key when `all` is set
    pub async fn list(&self, user_id: Uuid, all: bool) -> ApiResult<Vec<ApiKey>> {
        let keys = if all {
            sqlx::query_as::<_, ApiKey>(&format!(
                "SELECT {} FROM api_keys ORDER BY created_at DESC",
                API_KEY_COLUMNS
            ))
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, ApiKey>(&format!(
                "SELECT {} FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC",
                API_KEY_COLUMNS
            ))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(keys)
    }

    /// Fetch a key visible to the caller. Other users' keys read as not found.
    pub async fn get(&self, key_id: Uuid, user_id: Uuid, is_admin: bool) -> ApiResult<ApiKey> {
        let key = sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {} FROM api_keys WHERE id = $1",
            API_KEY_COLUMNS
        ))
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApiError::NotFound)?;

        if key.user_id != user_id && !is_admin {
            return Err(ApiError::NotFound);
        }
        Ok(key)
    }

    pub async fn revoke(&self, key_id: Uuid, user_id: Uuid, is_admin: bool) -> ApiResult<ApiKey> {
        let key = self.get(key_id, user_id, is_admin).await?;
        if key.revoked_at.is_some() {
            return Err(ApiError::Conflict("API key is already revoked".to_string()));
        }

        if let Some(hash) = &key.litellm_key_hash {
            self.litellm.delete_keys(std::slice::from_ref(hash)).await?;
        }

        let revoked = sqlx::query_as::<_, ApiKey>(&format!(
            r#"
            UPDATE api_keys SET status = 'revoked', revoked_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            API_KEY_COLUMNS
        ))
        .bind(key_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(key_id = %key_id, revoked_by = %user_id, "API key revoked");
        self.audit
            .log(
                user_id,
                action::API_KEY_REVOKED,
                resource_type::API_KEY,
                key_id,
                json!({ "owner": key.user_id }),
            )
            .await;

        Ok(revoked)
    }

    /// Revoke every live key of a user; returns how many were revoked
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> ApiResult<u64> {
        let hashes: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT litellm_key_hash FROM api_keys
            WHERE user_id = $1 AND revoked_at IS NULL AND litellm_key_hash IS NOT NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.litellm.delete_keys(&hashes).await?;

        let result = sqlx::query(
            r#"
            UPDATE api_keys SET status = 'revoked', revoked_at = NOW()
            WHERE user_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// LiteLLM id of a live team the user belongs to
    async fn member_team_litellm_id(
        &self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> ApiResult<Option<String>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            SELECT t.litellm_team_id
            FROM teams t
            JOIN team_members m ON m.team_id = t.id
            WHERE t.id = $1 AND m.user_id = $2 AND t.deleted_at IS NULL
            "#,
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id,)| id).ok_or(ApiError::Forbidden)
    }
}
