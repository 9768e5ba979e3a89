//! Model subscriptions

use litemaas_shared::{Subscription, SubscriptionStatus};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit_constants::{action, resource_type};
use crate::error::{ApiError, ApiResult};
use crate::services::AuditLogger;

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, user_id, model_id, status, quota_requests, quota_tokens,
    used_requests, used_tokens, created_at, updated_at
"#;

const DEFAULT_QUOTA_REQUESTS: i64 = 10_000;
const DEFAULT_QUOTA_TOKENS: i64 = 1_000_000;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub model_id: String,
    pub quota_requests: Option<i64>,
    pub quota_tokens: Option<i64>,
}

impl CreateSubscriptionRequest {
    fn quotas(&self) -> ApiResult<(i64, i64)> {
        let requests = self.quota_requests.unwrap_or(DEFAULT_QUOTA_REQUESTS);
        let tokens = self.quota_tokens.unwrap_or(DEFAULT_QUOTA_TOKENS);
        if requests <= 0 || tokens <= 0 {
            return Err(ApiError::Validation("Quotas must be positive".to_string()));
        }
        Ok((requests, tokens))
    }
}

#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
    audit: AuditLogger,
}

impl SubscriptionService {
    pub fn new(pool: PgPool, audit: AuditLogger) -> Self {
        Self { pool, audit }
    }

    /// Subscribe to an available model. An existing live subscription is a
    /// conflict; a cancelled or inactive one is reactivated in place.
    pub async fn subscribe(
        &self,
        user_id: Uuid,
        req: CreateSubscriptionRequest,
    ) -> ApiResult<Subscription> {
        let (quota_requests, quota_tokens) = req.quotas()?;
        let model_id = req.model_id.trim();
        if model_id.is_empty() {
            return Err(ApiError::Validation("model_id is required".to_string()));
        }

        let available: Option<bool> =
            sqlx::query_scalar("SELECT is_available FROM models WHERE id = $1")
                .bind(model_id)
                .fetch_optional(&self.pool)
                .await?;
        match available {
            None => return Err(ApiError::NotFound),
            Some(false) => {
                return Err(ApiError::Validation(format!(
                    "Model {} is not available",
                    model_id
                )))
            }
            Some(true) => {}
        }

        let existing = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1 AND model_id = $2",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await?;

        let (subscription, audit_action) = match existing {
            Some(sub)
                if matches!(
                    sub.status,
                    SubscriptionStatus::Active | SubscriptionStatus::Suspended
                ) =>
            {
                return Err(ApiError::Conflict(format!(
                    "Already subscribed to {}",
                    model_id
                )));
            }
            Some(sub) => {
                let reactivated = sqlx::query_as::<_, Subscription>(&format!(
                    r#"
                    UPDATE subscriptions
                    SET status = 'active', quota_requests = $2, quota_tokens = $3,
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    SUBSCRIPTION_COLUMNS
                ))
                .bind(sub.id)
                .bind(quota_requests)
                .bind(quota_tokens)
                .fetch_one(&self.pool)
                .await?;
                (reactivated, action::SUBSCRIPTION_REACTIVATED)
            }
            None => {
                let created = sqlx::query_as::<_, Subscription>(&format!(
                    r#"
                    INSERT INTO subscriptions (user_id, model_id, quota_requests, quota_tokens)
                    VALUES ($1, $2, $3, $4)
                    RETURNING {}
                    "#,
                    SUBSCRIPTION_COLUMNS
                ))
                .bind(user_id)
                .bind(model_id)
                .bind(quota_requests)
                .bind(quota_tokens)
                .fetch_one(&self.pool)
                .await?;
                (created, action::SUBSCRIPTION_CREATED)
            }
        };

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %user_id,
            model_id = %model_id,
            action = audit_action,
            "Subscription saved"
        );
        self.audit
            .log(
                user_id,
                audit_action,
                resource_type::SUBSCRIPTION,
                subscription.id,
                json!({ "model_id": model_id }),
            )
            .await;

        Ok(subscription)
    }

    pub async fn list(&self, user_id: Uuid) -> ApiResult<Vec<Subscription>> {
        let subs = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    /// Soft cancel; the row is kept so the user can resubscribe later
    pub async fn cancel(&self, user_id: Uuid, subscription_id: Uuid) -> ApiResult<Subscription> {
        let cancelled = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND status <> 'cancelled'
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApiError::NotFound)?;

        self.audit
            .log(
                user_id,
                action::SUBSCRIPTION_CANCELLED,
                resource_type::SUBSCRIPTION,
                subscription_id,
                json!({ "model_id": cancelled.model_id }),
            )
            .await;

        Ok(cancelled)
    }

    /// Suspend every active subscription of a user
    pub async fn suspend_all_for_user(&self, user_id: Uuid) -> ApiResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET status = 'suspended', updated_at = NOW()
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_defaults_and_validation() {
        let req = CreateSubscriptionRequest {
            model_id: "gpt-4o".to_string(),
            quota_requests: None,
            quota_tokens: None,
        };
        assert!(matches!(
            req.quotas(),
            Ok((DEFAULT_QUOTA_REQUESTS, DEFAULT_QUOTA_TOKENS))
        ));

        let req = CreateSubscriptionRequest {
            quota_tokens: Some(0),
            ..req
        };
        assert!(matches!(req.quotas(), Err(ApiError::Validation(_))));
    }
}
