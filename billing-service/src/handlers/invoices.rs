//! Invoice endpoints.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use serde::Serialize;
use service_core::error::AppError;
use service_core::extract::ValidatedJson;
use service_core::response::{ApiListResponse, ApiResponse, PageQuery};
use uuid::Uuid;

use super::{authorize, ensure_same_organization};
use crate::dtos::{CreateInvoiceRequest, PayInvoiceRequest, UpdateInvoiceStatusRequest};
use crate::middleware::AuthUser;
use crate::models::{
    CreateInvoice, Invoice, InvoiceStatus, InvoiceWithLineItems, MemberRole, Payment,
};
use crate::startup::AppState;

#[derive(Debug, Serialize)]
pub struct DownloadLink {
    pub invoice_id: Uuid,
    pub url: String,
}

async fn load_owned(
    state: &AppState,
    organization_id: Uuid,
    invoice_id: Uuid,
) -> Result<InvoiceWithLineItems, AppError> {
    let invoice = state.invoices.get_invoice(invoice_id).await?;
    ensure_same_organization(invoice.invoice.organization_id, organization_id, "Invoice")?;
    Ok(invoice)
}

/// GET /organizations/:organization_id/invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<ApiListResponse<InvoiceWithLineItems>, AppError> {
    let page = query.page()?;
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(state
        .invoices
        .list_invoices(organization_id, page)
        .await?
        .into())
}

/// GET /organizations/:organization_id/invoices/unpaid
pub async fn list_unpaid_invoices(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiListResponse<InvoiceWithLineItems>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(ApiListResponse::unpaged(
        state.invoices.list_unpaid(organization_id).await?,
    ))
}

/// POST /organizations/:organization_id/invoices
#[tracing::instrument(skip(state, user, req), fields(organization_id = %organization_id))]
pub async fn create_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateInvoiceRequest>,
) -> Result<ApiResponse<InvoiceWithLineItems>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;

    let input = CreateInvoice {
        organization_id,
        subscription_id: req.subscription_id,
        currency: req
            .currency
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| state.config.billing.default_currency.clone()),
        tax_amount: req.tax_amount.unwrap_or_default(),
        status: req.status.unwrap_or(InvoiceStatus::Draft),
        billing_period_start: req.billing_period_start,
        billing_period_end: req.billing_period_end,
        due_date: req.due_date,
        invoice_url: req.invoice_url,
        line_items: req.line_items.into_iter().map(Into::into).collect(),
    };

    let invoice = state.invoices.create_invoice(&input).await?;
    Ok(ApiResponse::created(invoice))
}

/// GET /organizations/:organization_id/invoices/:invoice_id
pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, invoice_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<InvoiceWithLineItems>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(ApiResponse::success(
        load_owned(&state, organization_id, invoice_id).await?,
    ))
}

/// GET /organizations/:organization_id/invoices/number/:invoice_number
pub async fn get_invoice_by_number(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, invoice_number)): Path<(Uuid, String)>,
) -> Result<ApiResponse<InvoiceWithLineItems>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    let invoice = state.invoices.get_by_number(&invoice_number).await?;
    ensure_same_organization(invoice.invoice.organization_id, organization_id, "Invoice")?;
    Ok(ApiResponse::success(invoice))
}

/// PUT /organizations/:organization_id/invoices/:invoice_id/status
pub async fn update_invoice_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, invoice_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<UpdateInvoiceStatusRequest>,
) -> Result<ApiResponse<Invoice>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    load_owned(&state, organization_id, invoice_id).await?;
    Ok(ApiResponse::success(
        state.invoices.update_status(invoice_id, req.status).await?,
    ))
}

/// POST /organizations/:organization_id/invoices/:invoice_id/pay
pub async fn pay_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, invoice_id)): Path<(Uuid, Uuid)>,
    body: Bytes,
) -> Result<ApiResponse<Payment>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    load_owned(&state, organization_id, invoice_id).await?;

    // The body is optional; an empty one means no external references.
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        PayInvoiceRequest::default()
    } else {
        serde_json::from_slice::<PayInvoiceRequest>(&body)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Json parse error: {}", e)))?
    };
    validator::Validate::validate(&req)?;

    let payment = state.invoices.pay_invoice(invoice_id, &req.into()).await?;
    Ok(ApiResponse::with_message("Invoice paid", payment))
}

/// DELETE /organizations/:organization_id/invoices/:invoice_id
pub async fn delete_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, invoice_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<()>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    load_owned(&state, organization_id, invoice_id).await?;
    state.invoices.delete_invoice(invoice_id).await?;
    Ok(ApiResponse::message("Invoice deleted"))
}

/// GET /organizations/:organization_id/invoices/:invoice_id/download
pub async fn download_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, invoice_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<DownloadLink>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    load_owned(&state, organization_id, invoice_id).await?;
    let url = state.invoices.download_url(invoice_id).await?;
    Ok(ApiResponse::success(DownloadLink { invoice_id, url }))
}

/// GET /organizations/:organization_id/invoices/:invoice_id/payments
pub async fn list_invoice_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, invoice_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiListResponse<Payment>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    load_owned(&state, organization_id, invoice_id).await?;
    Ok(ApiListResponse::unpaged(
        state.payments.list_by_invoice(invoice_id).await?,
    ))
}
