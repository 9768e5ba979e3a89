//! Model catalogue sync from LiteLLM

use litemaas_litellm::{LiteLlmClient, ModelInfoEntry};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashSet;

use crate::error::ApiResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncSummary {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub unavailable: Vec<String>,
    pub subscriptions_deactivated: u64,
}

#[derive(Clone)]
pub struct ModelSyncService {
    pool: PgPool,
    litellm: LiteLlmClient,
}

impl ModelSyncService {
    pub fn new(pool: PgPool, litellm: LiteLlmClient) -> Self {
        Self { pool, litellm }
    }

    /// Upsert every upstream model, then mark the rest unavailable and
    /// deactivate their subscriptions.
    pub async fn sync(&self) -> ApiResult<SyncSummary> {
        let upstream = dedupe_by_name(self.litellm.get_model_info().await?);

        let known: HashSet<String> = sqlx::query_scalar("SELECT id FROM models")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();

        let mut summary = SyncSummary::default();
        let mut tx = self.pool.begin().await?;

        for entry in &upstream {
            sqlx::query(
                r#"
                INSERT INTO models (
                    id, name, provider, context_length, input_cost_per_token,
                    output_cost_per_token, supports_vision, supports_function_calling, is_available
                )
                VALUES ($1, $1, $2, $3, $4, $5, $6, $7, TRUE)
                ON CONFLICT (id) DO UPDATE SET
                    provider = EXCLUDED.provider,
                    context_length = EXCLUDED.context_length,
                    input_cost_per_token = EXCLUDED.input_cost_per_token,
                    output_cost_per_token = EXCLUDED.output_cost_per_token,
                    supports_vision = EXCLUDED.supports_vision,
                    supports_function_calling = EXCLUDED.supports_function_calling,
                    is_available = TRUE,
                    updated_at = NOW()
                "#,
            )
            .bind(&entry.model_name)
            .bind(entry.provider())
            .bind(entry.context_length().and_then(|c| i32::try_from(c).ok()))
            .bind(entry.model_info.input_cost_per_token)
            .bind(entry.model_info.output_cost_per_token)
            .bind(entry.model_info.supports_vision.unwrap_or(false))
            .bind(entry.model_info.supports_function_calling.unwrap_or(false))
            .execute(&mut *tx)
            .await?;

            if known.contains(&entry.model_name) {
                summary.updated.push(entry.model_name.clone());
            } else {
                summary.added.push(entry.model_name.clone());
            }
        }

        // An empty catalogue is far more likely a gateway hiccup than a real
        // removal of every model
        if upstream.is_empty() {
            tracing::warn!("LiteLLM returned no models; skipping availability update");
        } else {
            let names: Vec<String> = upstream.iter().map(|e| e.model_name.clone()).collect();
            summary.unavailable = sqlx::query_scalar(
                r#"
                UPDATE models SET is_available = FALSE, updated_at = NOW()
                WHERE is_available AND NOT (id = ANY($1))
                RETURNING id
                "#,
            )
            .bind(&names)
            .fetch_all(&mut *tx)
            .await?;

            if !summary.unavailable.is_empty() {
                summary.subscriptions_deactivated = sqlx::query(
                    r#"
                    UPDATE subscriptions SET status = 'inactive', updated_at = NOW()
                    WHERE status = 'active' AND model_id = ANY($1)
                    "#,
                )
                .bind(&summary.unavailable)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            }
        }

        tx.commit().await?;

        tracing::info!(
            added = summary.added.len(),
            updated = summary.updated.len(),
            unavailable = summary.unavailable.len(),
            subscriptions_deactivated = summary.subscriptions_deactivated,
            "Model sync complete"
        );
        Ok(summary)
    }
}

/// LiteLLM lists one entry per deployment; keep the first per model name
fn dedupe_by_name(entries: Vec<ModelInfoEntry>) -> Vec<ModelInfoEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| !e.model_name.trim().is_empty())
        .filter(|e| seen.insert(e.model_name.clone()))
        .collect()
}
