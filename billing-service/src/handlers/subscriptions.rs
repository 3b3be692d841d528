//! Subscription lifecycle endpoints.

use axum::extract::{Path, State};
use axum::Json;
use service_core::error::AppError;
use service_core::extract::ValidatedJson;
use service_core::response::{ApiListResponse, ApiResponse};
use uuid::Uuid;

use super::{authorize, ensure_same_organization};
use crate::dtos::{CancelSubscriptionRequest, ChangePlanRequest, CreateSubscriptionRequest};
use crate::middleware::AuthUser;
use crate::models::{CreateSubscription, MemberRole, Subscription};
use crate::services::RolloverOutcome;
use crate::startup::AppState;

fn no_active_subscription() -> AppError {
    AppError::NotFound(anyhow::anyhow!("No active subscription found"))
}

/// GET /organizations/:organization_id/subscription
pub async fn get_active_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiResponse<Subscription>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    let subscription = state
        .subscriptions
        .get_active_subscription(organization_id)
        .await?
        .ok_or_else(no_active_subscription)?;
    Ok(ApiResponse::success(subscription))
}

/// GET /organizations/:organization_id/subscription/latest
pub async fn get_latest_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiResponse<Subscription>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    let subscription = state
        .subscriptions
        .get_subscription(organization_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No subscription found")))?;
    Ok(ApiResponse::success(subscription))
}

/// GET /organizations/:organization_id/subscriptions
pub async fn list_subscription_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiListResponse<Subscription>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(ApiListResponse::unpaged(
        state.subscriptions.list_history(organization_id).await?,
    ))
}

/// GET /organizations/:organization_id/subscriptions/:subscription_id
pub async fn get_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, subscription_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<Subscription>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    let subscription = state.subscriptions.get_by_id(subscription_id).await?;
    ensure_same_organization(subscription.organization_id, organization_id, "Subscription")?;
    Ok(ApiResponse::success(subscription))
}

/// POST /organizations/:organization_id/subscription
#[tracing::instrument(skip(state, user, req), fields(organization_id = %organization_id, plan_id = %req.plan_id))]
pub async fn create_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateSubscriptionRequest>,
) -> Result<ApiResponse<Subscription>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    let subscription = state
        .subscriptions
        .create_subscription(&CreateSubscription {
            organization_id,
            plan_id: req.plan_id,
            billing_cycle: req.billing_cycle,
            external_subscription_id: req.external_subscription_id,
            created_by: user.user_id,
        })
        .await?;
    Ok(ApiResponse::created(subscription))
}

/// POST /organizations/:organization_id/subscriptions/:subscription_id/activate
pub async fn activate_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, subscription_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<Subscription>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    let subscription = state
        .subscriptions
        .activate_subscription(organization_id, subscription_id)
        .await?;
    Ok(ApiResponse::with_message("Subscription activated", subscription))
}

/// PUT /organizations/:organization_id/subscription/plan
pub async fn change_plan(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ChangePlanRequest>,
) -> Result<ApiResponse<Subscription>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    let subscription = state
        .subscriptions
        .change_plan(organization_id, req.plan_id, req.billing_cycle)
        .await?;
    Ok(ApiResponse::with_message("Plan changed", subscription))
}

/// POST /organizations/:organization_id/subscription/cancel
pub async fn cancel_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    body: Option<Json<CancelSubscriptionRequest>>,
) -> Result<ApiResponse<Subscription>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    // No body means the default: cancel at period end.
    let at_period_end = body.map_or(true, |Json(req)| req.at_period_end);
    let subscription = state
        .subscriptions
        .cancel_subscription(organization_id, at_period_end)
        .await?;
    let message = if at_period_end {
        "Subscription will be cancelled at the end of the billing period"
    } else {
        "Subscription cancelled"
    };
    Ok(ApiResponse::with_message(message, subscription))
}

/// POST /organizations/:organization_id/subscription/reactivate
pub async fn reactivate_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiResponse<Subscription>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    let subscription = state
        .subscriptions
        .reactivate_subscription(organization_id)
        .await?;
    Ok(ApiResponse::with_message("Subscription reactivated", subscription))
}

/// POST /organizations/:organization_id/subscription/rollover
pub async fn rollover_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiResponse<RolloverOutcome>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    Ok(ApiResponse::success(
        state
            .subscriptions
            .rollover_subscription(organization_id)
            .await?,
    ))
}
