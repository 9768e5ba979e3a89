//! Admin usage analytics routes
//!
//! Every query takes `startDate`/`endDate` (`YYYY-MM-DD`, inclusive) and the
//! optional comma-separated filters `userIds`, `modelIds`, `providerIds` and
//! `apiKeyIds`.

use axum::{
    extract::{Extension, Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use litemaas_analytics::{
    BreakdownQuery, BreakdownResult, DateRange, Dimension, ExportFormat, FilterOptions, SortBy,
    SortOrder, UsageAnalytics, UsageFilters, UsageMetrics,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    audit_constants::{action, resource_type},
    auth::AuthUser,
    error::{ApiError, ApiResult},
    routes::{parse_uuid, split_list},
    state::AppState,
};

// =============================================================================
// Query types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub user_ids: Option<String>,
    pub model_ids: Option<String>,
    pub provider_ids: Option<String>,
    pub api_key_ids: Option<String>,
}

impl UsageQuery {
    pub fn range(&self) -> ApiResult<DateRange> {
        let start = self
            .start_date
            .as_deref()
            .ok_or_else(|| ApiError::Validation("startDate is required".to_string()))?;
        let end = self
            .end_date
            .as_deref()
            .ok_or_else(|| ApiError::Validation("endDate is required".to_string()))?;
        Ok(DateRange::parse(start, end)?)
    }

    pub fn filters(&self) -> ApiResult<UsageFilters> {
        let user_ids = split_list(self.user_ids.as_deref())
            .iter()
            .map(|id| parse_uuid(id, "userIds"))
            .collect::<ApiResult<Vec<_>>>()?;

        Ok(UsageFilters {
            user_ids,
            model_ids: split_list(self.model_ids.as_deref()),
            provider_ids: split_list(self.provider_ids.as_deref()),
            api_key_ids: split_list(self.api_key_ids.as_deref()),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl SortQuery {
    fn sort(&self) -> ApiResult<(SortBy, SortOrder)> {
        let sort_by = match self.sort_by.as_deref() {
            Some(s) => s.parse()?,
            None => SortBy::default(),
        };
        let sort_order = match self.sort_order.as_deref() {
            Some(s) => s.parse()?,
            None => SortOrder::default(),
        };
        Ok((sort_by, sort_order))
    }

    fn breakdown(&self) -> ApiResult<BreakdownQuery> {
        let defaults = BreakdownQuery::default();
        let (sort_by, sort_order) = self.sort()?;
        Ok(BreakdownQuery {
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
            sort_by,
            sort_order,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    pub dimension: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub retention_days: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub date: String,
    pub totals: UsageMetrics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub retention_days: u32,
    pub deleted: u64,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn analytics(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<UsageQuery>,
) -> ApiResult<Json<UsageAnalytics>> {
    auth_user.require_admin_read()?;
    let range = query.range()?;
    let filters = query.filters()?;

    let analytics = state.usage_stats.get_analytics(range, &filters).await?;
    Ok(Json(analytics))
}

pub async fn breakdown(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(dimension): Path<String>,
    Query(query): Query<UsageQuery>,
    Query(sort): Query<SortQuery>,
) -> ApiResult<Json<BreakdownResult>> {
    auth_user.require_admin_read()?;
    let dimension: Dimension = dimension.parse()?;
    let range = query.range()?;
    let filters = query.filters()?;

    let result = state
        .usage_stats
        .get_breakdown(dimension, range, &filters, sort.breakdown()?)
        .await?;
    Ok(Json(result))
}

pub async fn filter_options(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<UsageQuery>,
) -> ApiResult<Json<FilterOptions>> {
    auth_user.require_admin_read()?;
    let range = query.range()?;
    Ok(Json(state.usage_stats.get_filter_options(range).await))
}

/// Download a breakdown as a CSV or JSON attachment
pub async fn export(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<UsageQuery>,
    Query(sort): Query<SortQuery>,
    Query(export): Query<ExportQuery>,
) -> ApiResult<impl IntoResponse> {
    auth_user.require_admin_read()?;
    let range = query.range()?;
    let filters = query.filters()?;
    let (sort_by, sort_order) = sort.sort()?;
    let dimension: Dimension = match export.dimension.as_deref() {
        Some(d) => d.parse()?,
        None => Dimension::User,
    };
    let format: ExportFormat = match export.format.as_deref() {
        Some(f) => f.parse()?,
        None => ExportFormat::default(),
    };

    let (rows, errors) = state
        .usage_stats
        .get_breakdown_rows(dimension, range, &filters, sort_by, sort_order)
        .await;
    if !errors.is_empty() {
        tracing::warn!(
            failed_days = errors.len(),
            "Exporting usage with days missing"
        );
    }

    let file = state.usage_export.export(&rows, dimension, format, range)?;

    state
        .audit()
        .log(
            auth_user.user_id,
            action::USAGE_EXPORTED,
            resource_type::USAGE_CACHE,
            &file.filename,
            json!({ "rows": rows.len(), "failed_days": errors.len() }),
        )
        .await;

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.bytes,
    ))
}

/// Drop today's cached record and reload it from LiteLLM
pub async fn refresh_today(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<RefreshResponse>> {
    auth_user.require_admin_write()?;

    let totals = state.usage_stats.refresh_today().await?;
    let date = litemaas_analytics::calendar::format_date(state.usage_stats.cache().today());

    state
        .audit()
        .log(
            auth_user.user_id,
            action::USAGE_TODAY_REFRESHED,
            resource_type::USAGE_CACHE,
            &date,
            json!({ "requests": totals.requests }),
        )
        .await;

    Ok(Json(RefreshResponse { date, totals }))
}

/// Delete cached days older than the retention window
pub async fn cleanup_cache(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    body: Option<Json<CleanupRequest>>,
) -> ApiResult<Json<CleanupResponse>> {
    auth_user.require_admin_write()?;

    let retention_days = body
        .and_then(|Json(req)| req.retention_days)
        .unwrap_or(state.config.usage_cache_retention_days);
    if retention_days == 0 {
        return Err(ApiError::Validation(
            "retentionDays must be at least 1".to_string(),
        ));
    }

    let deleted = state.usage_stats.cache().cleanup(retention_days).await?;

    state
        .audit()
        .log(
            auth_user.user_id,
            action::USAGE_CACHE_CLEANED,
            resource_type::USAGE_CACHE,
            "daily_usage_cache",
            json!({ "retention_days": retention_days, "deleted": deleted }),
        )
        .await;

    Ok(Json(CleanupResponse {
        retention_days,
        deleted,
    }))
}
