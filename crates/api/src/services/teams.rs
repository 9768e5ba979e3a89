//! Teams and team membership

use litemaas_litellm::{CreateTeamRequest as LiteLlmTeamRequest, LiteLlmClient};
use litemaas_shared::Team;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit_constants::{action, resource_type};
use crate::error::{ApiError, ApiResult};
use crate::services::AuditLogger;

const TEAM_COLUMNS: &str = r#"
    id, name, description, litellm_team_id, max_budget, created_by,
    created_at, updated_at, deleted_at
"#;

const MEMBER_ROLES: [&str; 2] = ["member", "admin"];

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub description: Option<String>,
    pub max_budget: Option<f64>,
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default = "default_member_role")]
    pub role: String,
}

fn default_member_role() -> String {
    "member".to_string()
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TeamMember {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamWithMembers {
    #[serde(flatten)]
    pub team: Team,
    pub members: Vec<TeamMember>,
}

#[derive(Clone)]
pub struct TeamService {
    pool: PgPool,
    litellm: LiteLlmClient,
    audit: AuditLogger,
}

impl TeamService {
    pub fn new(pool: PgPool, litellm: LiteLlmClient, audit: AuditLogger) -> Self {
        Self {
            pool,
            litellm,
            audit,
        }
    }

    pub async fn create(&self, created_by: Uuid, req: CreateTeamRequest) -> ApiResult<Team> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("Team name is required".to_string()));
        }
        if req.max_budget.is_some_and(|b| b < 0.0) {
            return Err(ApiError::Validation("max_budget must not be negative".to_string()));
        }

        let team_id = Uuid::new_v4();
        let upstream = self
            .litellm
            .create_team(&LiteLlmTeamRequest {
                team_alias: name.to_string(),
                team_id: Some(team_id.to_string()),
                max_budget: req.max_budget,
                models: req.models.clone(),
            })
            .await?;

        let team = sqlx::query_as::<_, Team>(&format!(
            r#"
            INSERT INTO teams (id, name, description, litellm_team_id, max_budget, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            TEAM_COLUMNS
        ))
        .bind(team_id)
        .bind(name)
        .bind(req.description.as_deref())
        .bind(&upstream.team_id)
        .bind(req.max_budget)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(team_id = %team.id, litellm_team_id = %upstream.team_id, "Team created");
        self.audit
            .log(
                created_by,
                action::TEAM_CREATED,
                resource_type::TEAM,
                team.id,
                json!({ "name": team.name, "litellm_team_id": upstream.team_id }),
            )
            .await;

        Ok(team)
    }

    pub async fn list(&self) -> ApiResult<Vec<Team>> {
        let teams = sqlx::query_as::<_, Team>(&format!(
            "SELECT {} FROM teams WHERE deleted_at IS NULL ORDER BY name",
            TEAM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(teams)
    }

    pub async fn get(&self, team_id: Uuid) -> ApiResult<TeamWithMembers> {
        let team = self.find_live(team_id).await?;
        let members = sqlx::query_as::<_, TeamMember>(
            r#"
            SELECT u.id AS user_id, u.username, u.email, m.role, m.joined_at
            FROM team_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.team_id = $1
            ORDER BY m.joined_at
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(TeamWithMembers { team, members })
    }

    pub async fn add_member(
        &self,
        actor: Uuid,
        team_id: Uuid,
        req: AddMemberRequest,
    ) -> ApiResult<TeamWithMembers> {
        if !MEMBER_ROLES.contains(&req.role.as_str()) {
            return Err(ApiError::Validation(format!(
                "Invalid member role: {}",
                req.role
            )));
        }
        self.find_live(team_id).await?;

        let user_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(req.user_id)
                .fetch_one(&self.pool)
                .await?;
        if !user_exists {
            return Err(ApiError::NotFound);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO team_members (team_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (team_id, user_id) DO NOTHING
            "#,
        )
        .bind(team_id)
        .bind(req.user_id)
        .bind(&req.role)
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(ApiError::Conflict("User is already a team member".to_string()));
        }

        self.audit
            .log(
                actor,
                action::TEAM_MEMBER_ADDED,
                resource_type::TEAM_MEMBER,
                team_id,
                json!({ "user_id": req.user_id, "role": req.role }),
            )
            .await;

        self.get(team_id).await
    }

    pub async fn remove_member(&self, actor: Uuid, team_id: Uuid, user_id: Uuid) -> ApiResult<()> {
        self.find_live(team_id).await?;

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if removed.rows_affected() == 0 {
            return Err(ApiError::NotFound);
        }

        // The user's keys no longer bill to this team
        sqlx::query("UPDATE api_keys SET team_id = NULL WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.audit
            .log(
                actor,
                action::TEAM_MEMBER_REMOVED,
                resource_type::TEAM_MEMBER,
                team_id,
                json!({ "user_id": user_id }),
            )
            .await;
        Ok(())
    }

    /// Soft delete: memberships are removed and team keys detached
    pub async fn delete(&self, actor: Uuid, team_id: Uuid) -> ApiResult<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            UPDATE teams SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(team_id)
        .execute(&mut *tx)
        .await?;
        if deleted.rows_affected() == 0 {
            return Err(ApiError::NotFound);
        }

        let members = sqlx::query("DELETE FROM team_members WHERE team_id = $1")
            .bind(team_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let keys = sqlx::query("UPDATE api_keys SET team_id = NULL WHERE team_id = $1")
            .bind(team_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        tracing::info!(team_id = %team_id, members, keys, "Team deleted");
        self.audit
            .log(
                actor,
                action::TEAM_DELETED,
                resource_type::TEAM,
                team_id,
                json!({ "members_removed": members, "keys_detached": keys }),
            )
            .await;
        Ok(())
    }

    async fn find_live(&self, team_id: Uuid) -> ApiResult<Team> {
        sqlx::query_as::<_, Team>(&format!(
            "SELECT {} FROM teams WHERE id = $1 AND deleted_at IS NULL",
            TEAM_COLUMNS
        ))
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApiError::NotFound)
    }
}
