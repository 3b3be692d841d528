//! Stored payment methods.

use axum::extract::{Path, State};
use service_core::error::AppError;
use service_core::extract::ValidatedJson;
use service_core::response::{ApiListResponse, ApiResponse};
use uuid::Uuid;

use super::authorize;
use crate::dtos::{CreatePaymentMethodRequest, UpdatePaymentMethodRequest};
use crate::middleware::AuthUser;
use crate::models::{MemberRole, PaymentMethod};
use crate::startup::AppState;

/// GET /organizations/:organization_id/payment-methods
pub async fn list_payment_methods(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiListResponse<PaymentMethod>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(ApiListResponse::unpaged(
        state.payment_methods.list(organization_id).await?,
    ))
}

/// POST /organizations/:organization_id/payment-methods
pub async fn create_payment_method(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreatePaymentMethodRequest>,
) -> Result<ApiResponse<PaymentMethod>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    let method = state
        .payment_methods
        .create(organization_id, user.user_id, &req.into())
        .await?;
    Ok(ApiResponse::created(method))
}

/// GET /organizations/:organization_id/payment-methods/:payment_method_id
pub async fn get_payment_method(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, payment_method_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<PaymentMethod>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(ApiResponse::success(
        state
            .payment_methods
            .get(organization_id, payment_method_id)
            .await?,
    ))
}

/// PUT /organizations/:organization_id/payment-methods/:payment_method_id
pub async fn update_payment_method(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, payment_method_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<UpdatePaymentMethodRequest>,
) -> Result<ApiResponse<PaymentMethod>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    Ok(ApiResponse::success(
        state
            .payment_methods
            .update(organization_id, payment_method_id, &req.into())
            .await?,
    ))
}

/// DELETE /organizations/:organization_id/payment-methods/:payment_method_id
pub async fn delete_payment_method(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, payment_method_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<()>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    state
        .payment_methods
        .deactivate(organization_id, payment_method_id)
        .await?;
    Ok(ApiResponse::message("Payment method removed"))
}

/// POST /organizations/:organization_id/payment-methods/:payment_method_id/default
pub async fn set_default_payment_method(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, payment_method_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<PaymentMethod>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    Ok(ApiResponse::success(
        state
            .payment_methods
            .set_default(organization_id, payment_method_id)
            .await?,
    ))
}
