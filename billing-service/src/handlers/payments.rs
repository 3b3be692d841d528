//! Payment ledger endpoints.

use axum::extract::{Path, Query, State};
use service_core::error::AppError;
use service_core::extract::ValidatedJson;
use service_core::response::{ApiListResponse, ApiResponse, PageQuery};
use uuid::Uuid;

use super::{authorize, ensure_same_organization};
use crate::dtos::{PaymentFailureRequest, RecordPaymentRequest, UpdatePaymentStatusRequest};
use crate::middleware::AuthUser;
use crate::models::{CreatePayment, MemberRole, Payment};
use crate::startup::AppState;

async fn load_owned(
    state: &AppState,
    organization_id: Uuid,
    payment_id: Uuid,
) -> Result<Payment, AppError> {
    let payment = state.payments.get_by_id(payment_id).await?;
    ensure_same_organization(payment.organization_id, organization_id, "Payment")?;
    Ok(payment)
}

/// GET /organizations/:organization_id/payments
pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<ApiListResponse<Payment>, AppError> {
    let page = query.page()?;
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(state
        .payments
        .list_by_organization(organization_id, page)
        .await?
        .into())
}

/// POST /organizations/:organization_id/payments
#[tracing::instrument(skip(state, user, req), fields(organization_id = %organization_id))]
pub async fn record_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<RecordPaymentRequest>,
) -> Result<ApiResponse<Payment>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;

    let payment = state
        .payments
        .record_payment(&CreatePayment {
            organization_id,
            invoice_id: req.invoice_id,
            subscription_id: req.subscription_id,
            external_payment_id: req.external_payment_id,
            external_payer_id: req.external_payer_id,
            amount: req.amount,
            currency: req
                .currency
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| state.config.billing.default_currency.clone()),
        })
        .await?;
    Ok(ApiResponse::created(payment))
}

/// GET /organizations/:organization_id/payments/:payment_id
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, payment_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<Payment>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(ApiResponse::success(
        load_owned(&state, organization_id, payment_id).await?,
    ))
}

/// PUT /organizations/:organization_id/payments/:payment_id/status
pub async fn update_payment_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, payment_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<UpdatePaymentStatusRequest>,
) -> Result<ApiResponse<Payment>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    load_owned(&state, organization_id, payment_id).await?;
    Ok(ApiResponse::success(
        state.payments.update_status(payment_id, req.status).await?,
    ))
}

/// POST /organizations/:organization_id/payments/:payment_id/fail
pub async fn fail_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, payment_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<PaymentFailureRequest>,
) -> Result<ApiResponse<Payment>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    load_owned(&state, organization_id, payment_id).await?;
    Ok(ApiResponse::success(
        state
            .payments
            .update_failure_reason(payment_id, &req.reason)
            .await?,
    ))
}

/// GET /organizations/:organization_id/subscriptions/:subscription_id/payments
pub async fn list_subscription_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, subscription_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiListResponse<Payment>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    let subscription = state.subscriptions.get_by_id(subscription_id).await?;
    ensure_same_organization(subscription.organization_id, organization_id, "Subscription")?;
    Ok(ApiListResponse::unpaged(
        state.payments.list_by_subscription(subscription_id).await?,
    ))
}
