//! Aggregated billing views.

use axum::extract::{Path, Query, State};
use service_core::error::AppError;
use service_core::response::{ApiListResponse, ApiResponse, PageQuery};
use uuid::Uuid;

use super::authorize;
use crate::middleware::AuthUser;
use crate::models::{BillingEvent, BillingHistoryItem, BillingOverview, MemberRole};
use crate::startup::AppState;

/// GET /organizations/:organization_id/billing/overview
pub async fn billing_overview(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiResponse<BillingOverview>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(ApiResponse::success(
        state.overview.overview(organization_id).await?,
    ))
}

/// GET /organizations/:organization_id/billing/history
pub async fn billing_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<ApiListResponse<BillingHistoryItem>, AppError> {
    let page = query.page()?;
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(state
        .overview
        .billing_history(organization_id, page)
        .await?
        .into())
}

/// GET /organizations/:organization_id/billing/events
pub async fn billing_events(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<ApiListResponse<BillingEvent>, AppError> {
    let page = query.page()?;
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    Ok(state
        .events
        .list_events(organization_id, page)
        .await?
        .into())
}
