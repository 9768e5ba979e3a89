//! Audit log writer

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct AuditLogger {
    pool: Option<PgPool>,
}

impl AuditLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Some(pool) }
    }

    /// Logger for running without a database; entries only reach the trace log
    pub fn disabled() -> Self {
        Self { pool: None }
    }

    /// Record a mutation. A failed insert is logged and never fails the
    /// operation that triggered it.
    pub async fn log(
        &self,
        user_id: Uuid,
        action: &str,
        resource_type: &str,
        resource_id: impl ToString,
        metadata: Value,
    ) {
        let resource_id = resource_id.to_string();
        let Some(pool) = &self.pool else {
            tracing::info!(
                user_id = %user_id,
                action = %action,
                resource_type = %resource_type,
                resource_id = %resource_id,
                "Audit event (not persisted)"
            );
            return;
        };

        if let Err(e) = sqlx::query(
            r#"
            INSERT INTO audit_logs (user_id, action, resource_type, resource_id, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(action)
        .bind(resource_type)
        .bind(&resource_id)
        .bind(&metadata)
        .execute(pool)
        .await
        {
            tracing::warn!(
                error = %e,
                action = %action,
                resource_type = %resource_type,
                resource_id = %resource_id,
                "Failed to write audit log"
            );
        }
    }
}
