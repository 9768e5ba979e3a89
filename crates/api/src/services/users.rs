//! Users: profile lookup and admin management

use litemaas_litellm::LiteLlmClient;
use litemaas_shared::{PaginatedResponse, User, UserRole};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit_constants::{action, resource_type};
use crate::error::{ApiError, ApiResult};
use crate::services::{ApiKeyService, AuditLogger, SubscriptionService};

const USER_COLUMNS: &str = r#"
    id, username, email, full_name, roles, is_active, last_login_at, created_at, updated_at
"#;

const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct UserListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    pub search: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

impl Default for UserListQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
            search: None,
        }
    }
}

impl UserListQuery {
    /// Row offset of the requested page
    pub fn offset(&self) -> ApiResult<i64> {
        if self.page < 1 || !(1..=MAX_PER_PAGE).contains(&self.per_page) {
            return Err(ApiError::Validation(format!(
                "page must be >= 1 and per_page between 1 and {}",
                MAX_PER_PAGE
            )));
        }
        (self.page - 1)
            .checked_mul(self.per_page)
            .ok_or_else(|| ApiError::Validation(format!("page {} is out of range", self.page)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub roles: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl UpdateUserRequest {
    /// Canonical role names, always including `user`
    fn normalized_roles(&self) -> ApiResult<Option<Vec<String>>> {
        let Some(roles) = &self.roles else {
            return Ok(None);
        };

        let mut parsed = vec![UserRole::User];
        for name in roles {
            let role: UserRole = name.parse().map_err(ApiError::Validation)?;
            if !parsed.contains(&role) {
                parsed.push(role);
            }
        }
        parsed.sort_by_key(|r| std::cmp::Reverse(r.level()));
        Ok(Some(parsed.iter().map(|r| r.as_str().to_string()).collect()))
    }
}

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
    litellm: LiteLlmClient,
    audit: AuditLogger,
}

impl UserService {
    pub fn new(pool: PgPool, litellm: LiteLlmClient, audit: AuditLogger) -> Self {
        Self {
            pool,
            litellm,
            audit,
        }
    }

    pub async fn get(&self, user_id: Uuid) -> ApiResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ApiError::NotFound)
    }

    pub async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn touch_last_login(&self, user_id: Uuid) -> ApiResult<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list(&self, query: UserListQuery) -> ApiResult<PaginatedResponse<User>> {
        let offset = query.offset()?;
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users
            WHERE $1::TEXT IS NULL OR LOWER(username) LIKE $1 OR LOWER(email) LIKE $1
            "#,
        )
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {} FROM users
            WHERE $1::TEXT IS NULL OR LOWER(username) LIKE $1 OR LOWER(email) LIKE $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            USER_COLUMNS
        ))
        .bind(pattern.as_deref())
        .bind(query.per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(PaginatedResponse::new(users, total, query.page, query.per_page))
    }

    /// Admin update of roles and activation. Deactivation revokes the user's
    /// keys and suspends their subscriptions.
    pub async fn update(
        &self,
        actor: Uuid,
        user_id: Uuid,
        req: UpdateUserRequest,
    ) -> ApiResult<User> {
        let roles = req.normalized_roles()?;
        if actor == user_id && (req.is_active == Some(false) || roles.is_some()) {
            return Err(ApiError::Validation(
                "Admins cannot change their own roles or deactivate themselves".to_string(),
            ));
        }

        let before = self.get(user_id).await?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                roles = COALESCE($2, roles),
                is_active = COALESCE($3, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(roles.as_ref())
        .bind(req.is_active)
        .fetch_one(&self.pool)
        .await?;

        let deactivated = before.is_active && !user.is_active;
        if deactivated {
            let api_keys =
                ApiKeyService::new(self.pool.clone(), self.litellm.clone(), self.audit.clone());
            let keys = api_keys.revoke_all_for_user(user_id).await?;
            let subscriptions = SubscriptionService::new(self.pool.clone(), self.audit.clone())
                .suspend_all_for_user(user_id)
                .await?;

            tracing::info!(user_id = %user_id, keys, subscriptions, "User deactivated");
            self.audit
                .log(
                    actor,
                    action::USER_DEACTIVATED,
                    resource_type::USER,
                    user_id,
                    json!({ "keys_revoked": keys, "subscriptions_suspended": subscriptions }),
                )
                .await;
        }

        self.audit
            .log(
                actor,
                action::USER_UPDATED,
                resource_type::USER,
                user_id,
                json!({
                    "roles": { "from": before.roles, "to": user.roles },
                    "is_active": { "from": before.is_active, "to": user.is_active },
                }),
            )
            .await;

        Ok(user)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn update(roles: &[&str]) -> UpdateUserRequest {
        UpdateUserRequest {
            roles: Some(roles.iter().map(|r| r.to_string()).collect()),
            is_active: None,
        }
    }

    #[test]
    fn test_roles_are_normalized() {
        let roles = update(&["adminReadonly", "admin-readonly"])
            .normalized_roles()
            .unwrap()
            .unwrap();
        assert_eq!(roles, vec!["adminReadonly", "user"]);

        let roles = update(&["user", "admin"]).normalized_roles().unwrap().unwrap();
        assert_eq!(roles, vec!["admin", "user"]);
    }

    #[test]
    fn test_list_offset() {
        let query = |page, per_page| UserListQuery {
            page,
            per_page,
            search: None,
        };
        assert_eq!(UserListQuery::default().offset().unwrap(), 0);
        assert_eq!(query(4, 25).offset().unwrap(), 75);
        assert!(matches!(query(i64::MAX, 100).offset(), Err(ApiError::Validation(_))));
        assert!(matches!(query(0, 20).offset(), Err(ApiError::Validation(_))));
        assert!(matches!(query(1, 101).offset(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_unknown_role_rejected() {
        assert!(matches!(
            update(&["root"]).normalized_roles(),
            Err(ApiError::Validation(_))
        ));
        assert!(UpdateUserRequest::default().normalized_roles().unwrap().is_none());
    }
}
