//! Usage counters.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use service_core::error::AppError;
use service_core::extract::ValidatedJson;
use service_core::response::{ApiListResponse, ApiResponse, PageQuery};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::authorize;
use crate::dtos::IncrementUsageRequest;
use crate::middleware::AuthUser;
use crate::models::{MemberRole, OrganizationUsage, UsageField, UsageReport};
use crate::startup::AppState;

/// GET /organizations/:organization_id/usage
pub async fn get_current_usage(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiResponse<Option<OrganizationUsage>>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    let usage = state.usage.get_current_usage(organization_id).await?;
    let message = if usage.is_some() {
        "Success"
    } else {
        "No usage recorded for the current period"
    };
    Ok(ApiResponse::with_message(message, usage))
}

/// GET /organizations/:organization_id/usage/report
pub async fn usage_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiResponse<UsageReport>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(ApiResponse::success(
        state.overview.usage_report(organization_id).await?,
    ))
}

/// GET /organizations/:organization_id/usage/history
pub async fn usage_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<ApiListResponse<OrganizationUsage>, AppError> {
    let page = query.page()?;
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(state
        .usage
        .usage_history(organization_id, page)
        .await?
        .into())
}

/// POST /organizations/:organization_id/usage/increment
pub async fn increment_usage(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<IncrementUsageRequest>,
) -> Result<ApiResponse<OrganizationUsage>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(ApiResponse::success(
        state
            .usage
            .increment_usage(organization_id, req.field, req.delta)
            .await?,
    ))
}

/// PUT /organizations/:organization_id/usage
///
/// Body is a map of counter name to absolute value.
pub async fn set_usage(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    payload: Result<Json<BTreeMap<UsageField, i64>>, JsonRejection>,
) -> Result<ApiResponse<OrganizationUsage>, AppError> {
    let Json(values) =
        payload.map_err(|e| AppError::BadRequest(anyhow::anyhow!("Json parse error: {}", e)))?;
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    Ok(ApiResponse::success(
        state
            .usage
            .upsert_current_usage(organization_id, &values)
            .await?,
    ))
}
