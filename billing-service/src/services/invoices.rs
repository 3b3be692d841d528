//! Invoicing engine: invoices with line items, numbering, status, and paying
//! an invoice.

use crate::models::{
    format_invoice_number, invoice_year, BillingEventType, CreateInvoice, CreatePayment, Invoice,
    InvoiceLineItem, InvoiceStatus, InvoiceWithLineItems, Payment, PaymentStatus,
};
use crate::services::database::commit;
use crate::services::events::record_event;
use crate::services::metrics::{record_error, record_invoice_created, record_payment, DB_QUERY_DURATION};
use crate::services::payments::insert_payment;
use crate::services::Database;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use service_core::error::AppError;
use service_core::response::{page_offset, Page, PAGE_SIZE};
use sqlx::postgres::{PgConnection, PgExecutor};
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

macro_rules! invoice_columns {
    () => {
        "id, organization_id, subscription_id, invoice_number, amount, tax_amount, total_amount, currency, status, billing_period_start, billing_period_end, due_date, paid_at, invoice_url, created_at, updated_at"
    };
}

const INVOICE_NUMBER_CONSTRAINT: &str = "invoices_invoice_number_key";
const MAX_NUMBERING_ATTEMPTS: u32 = 3;

/// External references supplied when an invoice is paid.
#[derive(Debug, Clone, Default)]
pub struct PayInvoice {
    pub external_payment_id: Option<String>,
    pub external_payer_id: Option<String>,
}

/// Amount columns are NUMERIC(10, 2).
const MONEY_LIMIT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);
const MAX_DESCRIPTION_LEN: usize = 255;

/// Non-negative, whole cents, and storable in an amount column.
pub(crate) fn is_money(value: Decimal) -> bool {
    value >= Decimal::ZERO && value < MONEY_LIMIT && value.round_dp(2) == value
}

pub(crate) fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// Reject inputs the schema would refuse, with a message the caller can act on.
pub(crate) fn validate_invoice(input: &CreateInvoice) -> Result<(), AppError> {
    let bad = |msg: &str| Err(AppError::BadRequest(anyhow::anyhow!(msg.to_string())));

    if input.line_items.is_empty() {
        return bad("An invoice needs at least one line item");
    }
    if !matches!(input.status, InvoiceStatus::Draft | InvoiceStatus::Sent) {
        return bad("Invoices start as draft or sent");
    }
    if !is_currency_code(&input.currency) {
        return bad("Currency must be a three-letter upper-case code");
    }
    if !is_money(input.tax_amount) {
        return bad("Tax amount must be non-negative, below 100000000 and in whole cents");
    }
    for item in &input.line_items {
        if item.description.trim().is_empty() {
            return bad("Line item description is required");
        }
        if item.description.chars().count() > MAX_DESCRIPTION_LEN {
            return bad("Line item description must be at most 255 characters");
        }
        if item.quantity < 1 {
            return bad("Line item quantity must be at least 1");
        }
        if !is_money(item.unit_price) {
            return bad("Unit price must be non-negative, below 100000000 and in whole cents");
        }
        if !is_money(item.total()) {
            return bad("Line item total must be below 100000000");
        }
    }
    if !is_money(input.totals().total_amount) {
        return bad("Invoice total must be below 100000000");
    }
    if let (Some(start), Some(end)) = (input.billing_period_start, input.billing_period_end) {
        if end <= start {
            return bad("Billing period end must be after its start");
        }
    }
    Ok(())
}

/// Allocate the next number for `year`. The counter row stays locked until
/// the surrounding transaction ends, so concurrent invoices queue here.
async fn next_invoice_number(conn: &mut PgConnection, year: i32) -> Result<String, sqlx::Error> {
    let sequence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoice_number_sequences (year, last_value)
        VALUES ($1, 1)
        ON CONFLICT (year) DO UPDATE SET last_value = invoice_number_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(year)
    .fetch_one(conn)
    .await?;

    Ok(format_invoice_number(year, sequence))
}

/// Move the counter for `year` past every number already stored. Runs on its
/// own connection so the bump survives the rollback of the failed insert.
async fn resync_invoice_sequence<'e, E>(executor: E, year: i32) -> Result<i64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO invoice_number_sequences (year, last_value)
        SELECT $1, COALESCE(MAX(CAST(split_part(invoice_number, '-', 3) AS BIGINT)), 0)
        FROM invoices
        WHERE invoice_number LIKE 'INV-' || $1::text || '-%'
        ON CONFLICT (year) DO UPDATE
            SET last_value = GREATEST(invoice_number_sequences.last_value, EXCLUDED.last_value)
        RETURNING last_value
        "#,
    )
    .bind(year)
    .fetch_one(executor)
    .await
}

/// Insert an invoice and its line items on an open transaction.
pub(crate) async fn insert_invoice(
    conn: &mut PgConnection,
    input: &CreateInvoice,
) -> Result<InvoiceWithLineItems, sqlx::Error> {
    let totals = input.totals();
    let invoice_number = next_invoice_number(&mut *conn, invoice_year(Utc::now())).await?;

    let invoice = sqlx::query_as::<_, Invoice>(concat!(
        r#"
        INSERT INTO invoices (id, organization_id, subscription_id, invoice_number, amount, tax_amount, total_amount, currency, status, billing_period_start, billing_period_end, due_date, invoice_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING "#,
        invoice_columns!()
    ))
    .bind(Uuid::new_v4())
    .bind(input.organization_id)
    .bind(input.subscription_id)
    .bind(&invoice_number)
    .bind(totals.amount)
    .bind(totals.tax_amount)
    .bind(totals.total_amount)
    .bind(&input.currency)
    .bind(input.status.as_str())
    .bind(input.billing_period_start)
    .bind(input.billing_period_end)
    .bind(input.due_date)
    .bind(&input.invoice_url)
    .fetch_one(&mut *conn)
    .await?;

    let mut line_items = Vec::with_capacity(input.line_items.len());
    for item in &input.line_items {
        let line_item = sqlx::query_as::<_, InvoiceLineItem>(
            r#"
            INSERT INTO invoice_line_items (id, invoice_id, description, quantity, unit_price, total_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, invoice_id, description, quantity, unit_price, total_price, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice.id)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total())
        .fetch_one(&mut *conn)
        .await?;
        line_items.push(line_item);
    }

    Ok(InvoiceWithLineItems {
        invoice,
        line_items,
    })
}

pub(crate) fn is_invoice_number_collision(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(INVOICE_NUMBER_CONSTRAINT)
        }
        _ => false,
    }
}

#[derive(Clone)]
pub struct InvoicingEngine {
    db: Database,
}

impl InvoicingEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    /// Create an invoice with its line items. Amounts are derived from the
    /// line items; the number is allocated inside the same transaction.
    #[instrument(skip(self, input), fields(organization_id = %input.organization_id))]
    pub async fn create_invoice(
        &self,
        input: &CreateInvoice,
    ) -> Result<InvoiceWithLineItems, AppError> {
        validate_invoice(input)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        for attempt in 1..=MAX_NUMBERING_ATTEMPTS {
            let mut tx = self.db.begin().await?;

            if let Some(subscription_id) = input.subscription_id {
                let owned: Option<Uuid> = sqlx::query_scalar(
                    "SELECT id FROM subscriptions WHERE id = $1 AND organization_id = $2",
                )
                .bind(subscription_id)
                .bind(input.organization_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to verify subscription: {}", e))
                })?;
                if owned.is_none() {
                    return Err(AppError::NotFound(anyhow::anyhow!("Subscription not found")));
                }
            }

            let created = match insert_invoice(&mut tx, input).await {
                Ok(created) => created,
                Err(e) if is_invoice_number_collision(&e) => {
                    tx.rollback().await.map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!("Failed to roll back: {}", e))
                    })?;
                    let last_value =
                        resync_invoice_sequence(self.db.pool(), invoice_year(Utc::now()))
                            .await
                            .map_err(|e| {
                                AppError::DatabaseError(anyhow::anyhow!(
                                    "Failed to advance invoice numbering: {}",
                                    e
                                ))
                            })?;
                    warn!(attempt, last_value, "Invoice number collision, retrying");
                    continue;
                }
                Err(sqlx::Error::Database(ref db_err)) if db_err.is_foreign_key_violation() => {
                    return Err(AppError::NotFound(anyhow::anyhow!("Organization not found")));
                }
                Err(e) => {
                    return Err(AppError::DatabaseError(anyhow::anyhow!(
                        "Failed to create invoice: {}",
                        e
                    )))
                }
            };

            record_event(
                &mut tx,
                input.organization_id,
                BillingEventType::InvoiceCreated,
                json!({
                    "invoice_id": created.invoice.id,
                    "invoice_number": created.invoice.invoice_number,
                    "total_amount": created.invoice.total_amount,
                }),
            )
            .await?;

            commit(tx).await?;

            timer.observe_duration();
            record_invoice_created(&created.invoice.currency, "api");
            info!(
                invoice_id = %created.invoice.id,
                invoice_number = %created.invoice.invoice_number,
                total_amount = %created.invoice.total_amount,
                "Invoice created"
            );

            return Ok(created);
        }

        record_error("invoice_number_conflict", "create_invoice");
        Err(AppError::Conflict(anyhow::anyhow!(
            "Could not allocate a unique invoice number, please retry"
        )))
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<InvoiceWithLineItems, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(concat!(
            "SELECT ",
            invoice_columns!(),
            " FROM invoices WHERE id = $1"
        ))
        .bind(invoice_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        self.attach_line_items(vec![invoice])
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
    }

    #[instrument(skip(self), fields(invoice_number = %invoice_number))]
    pub async fn get_by_number(
        &self,
        invoice_number: &str,
    ) -> Result<InvoiceWithLineItems, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(concat!(
            "SELECT ",
            invoice_columns!(),
            " FROM invoices WHERE invoice_number = $1"
        ))
        .bind(invoice_number)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        self.attach_line_items(vec![invoice])
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
    }

    /// Invoices for an organization, newest first.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_invoices(
        &self,
        organization_id: Uuid,
        page: i64,
    ) -> Result<Page<InvoiceWithLineItems>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_one(self.db.pool())
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to count invoices: {}", e))
                })?;

        let invoices = sqlx::query_as::<_, Invoice>(concat!(
            "SELECT ",
            invoice_columns!(),
            " FROM invoices WHERE organization_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(organization_id)
        .bind(PAGE_SIZE)
        .bind(page_offset(page, PAGE_SIZE))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        let items = self.attach_line_items(invoices).await?;
        timer.observe_duration();

        Ok(Page {
            items,
            page,
            limit: PAGE_SIZE,
            total,
        })
    }

    /// Draft and sent invoices, newest first.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_unpaid(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<InvoiceWithLineItems>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(concat!(
            "SELECT ",
            invoice_columns!(),
            " FROM invoices WHERE organization_id = $1 AND status IN ('draft', 'sent') ORDER BY created_at DESC, id DESC"
        ))
        .bind(organization_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list unpaid invoices: {}", e))
        })?;

        self.attach_line_items(invoices).await
    }

    /// Every invoice header for an organization, newest first.
    pub async fn list_all_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<Invoice>, AppError> {
        sqlx::query_as::<_, Invoice>(concat!(
            "SELECT ",
            invoice_columns!(),
            " FROM invoices WHERE organization_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(organization_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))
    }

    /// Move an invoice forward. `paid` stamps `paid_at` in the same statement.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, status = status.as_str()))]
    pub async fn update_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Invoice, AppError> {
        let mut tx = self.db.begin().await?;

        let current = lock_invoice(&mut tx, invoice_id).await?;
        if !current.status().can_transition_to(status) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invoice cannot move from {} to {}",
                current.status,
                status.as_str()
            )));
        }

        let invoice = sqlx::query_as::<_, Invoice>(concat!(
            r#"
            UPDATE invoices
            SET status = $2,
                paid_at = CASE WHEN $2 = 'paid' THEN NOW() ELSE paid_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            invoice_columns!()
        ))
        .bind(invoice_id)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice status: {}", e))
        })?;

        commit(tx).await?;
        info!(invoice_id = %invoice.id, status = %invoice.status, "Invoice status updated");

        Ok(invoice)
    }

    /// Settle an invoice: record a completed payment for its total and mark
    /// it paid, atomically. Paid, cancelled and refunded invoices are refused
    /// before anything is written.
    #[instrument(skip(self, request), fields(invoice_id = %invoice_id))]
    pub async fn pay_invoice(
        &self,
        invoice_id: Uuid,
        request: &PayInvoice,
    ) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["pay_invoice"])
            .start_timer();

        let mut tx = self.db.begin().await?;

        let invoice = lock_invoice(&mut tx, invoice_id).await?;
        match invoice.status() {
            InvoiceStatus::Paid => {
                return Err(AppError::BadRequest(anyhow::anyhow!("Invoice is already paid")))
            }
            InvoiceStatus::Cancelled | InvoiceStatus::Refunded => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Invoice cannot be paid in status {}",
                    invoice.status
                )))
            }
            InvoiceStatus::Draft | InvoiceStatus::Sent => {}
        }

        let payment = insert_payment(
            &mut tx,
            &CreatePayment {
                organization_id: invoice.organization_id,
                invoice_id: Some(invoice.id),
                subscription_id: invoice.subscription_id,
                external_payment_id: request.external_payment_id.clone(),
                external_payer_id: request.external_payer_id.clone(),
                amount: invoice.total_amount,
                currency: invoice.currency.clone(),
            },
            PaymentStatus::Completed,
        )
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::BadRequest(anyhow::anyhow!("External payment id already recorded"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to record payment: {}", e)),
        })?;

        sqlx::query(
            "UPDATE invoices SET status = 'paid', paid_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(invoice.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to mark invoice paid: {}", e)))?;

        record_event(
            &mut tx,
            invoice.organization_id,
            BillingEventType::PaymentSucceeded,
            json!({
                "invoice_id": invoice.id,
                "payment_id": payment.id,
                "amount": payment.amount,
                "currency": payment.currency,
            }),
        )
        .await?;

        commit(tx).await?;

        timer.observe_duration();
        record_payment(PaymentStatus::Completed.as_str());
        info!(
            invoice_id = %invoice.id,
            payment_id = %payment.id,
            amount = %payment.amount,
            "Invoice paid"
        );

        Ok(payment)
    }

    /// Delete a draft or cancelled invoice and its line items.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, invoice_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;

        let invoice = lock_invoice(&mut tx, invoice_id).await?;
        if !matches!(
            invoice.status(),
            InvoiceStatus::Draft | InvoiceStatus::Cancelled
        ) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only draft or cancelled invoices can be deleted"
            )));
        }

        sqlx::query("DELETE FROM invoice_line_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete line items: {}", e))
            })?;

        sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e)))?;

        commit(tx).await?;
        info!(invoice_id = %invoice_id, "Invoice deleted");

        Ok(())
    }

    /// Hosted document location for an invoice.
    pub async fn download_url(&self, invoice_id: Uuid) -> Result<String, AppError> {
        let invoice = self.get_invoice(invoice_id).await?;
        invoice
            .invoice
            .invoice_url
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice download not available")))
    }

    async fn attach_line_items(
        &self,
        invoices: Vec<Invoice>,
    ) -> Result<Vec<InvoiceWithLineItems>, AppError> {
        if invoices.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = invoices.iter().map(|i| i.id).collect();
        let items = sqlx::query_as::<_, InvoiceLineItem>(
            r#"
            SELECT id, invoice_id, description, quantity, unit_price, total_price, created_at
            FROM invoice_line_items
            WHERE invoice_id = ANY($1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load line items: {}", e)))?;

        let mut by_invoice: HashMap<Uuid, Vec<InvoiceLineItem>> = HashMap::new();
        for item in items {
            by_invoice.entry(item.invoice_id).or_default().push(item);
        }

        Ok(invoices
            .into_iter()
            .map(|invoice| {
                let line_items = by_invoice.remove(&invoice.id).unwrap_or_default();
                InvoiceWithLineItems {
                    invoice,
                    line_items,
                }
            })
            .collect())
    }
}

async fn lock_invoice(conn: &mut PgConnection, invoice_id: Uuid) -> Result<Invoice, AppError> {
    sqlx::query_as::<_, Invoice>(concat!(
        "SELECT ",
        invoice_columns!(),
        " FROM invoices WHERE id = $1 FOR UPDATE"
    ))
    .bind(invoice_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock invoice: {}", e)))?
    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewLineItem;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn input() -> CreateInvoice {
        CreateInvoice {
            organization_id: Uuid::new_v4(),
            subscription_id: None,
            currency: "USD".to_string(),
            tax_amount: Decimal::ZERO,
            status: InvoiceStatus::Draft,
            billing_period_start: None,
            billing_period_end: None,
            due_date: None,
            invoice_url: None,
            line_items: vec![NewLineItem {
                description: "Seat".to_string(),
                quantity: 2,
                unit_price: dec("10.00"),
            }],
        }
    }

    #[test]
    fn accepts_well_formed_invoice() {
        assert!(validate_invoice(&input()).is_ok());
    }

    #[test]
    fn rejects_invoice_without_line_items() {
        let mut invoice = input();
        invoice.line_items.clear();
        assert!(matches!(
            validate_invoice(&invoice),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn rejects_sub_cent_prices_and_negative_tax() {
        let mut invoice = input();
        invoice.line_items[0].unit_price = dec("10.005");
        assert!(validate_invoice(&invoice).is_err());

        let mut invoice = input();
        invoice.tax_amount = dec("-1.00");
        assert!(validate_invoice(&invoice).is_err());
    }

    #[test]
    fn rejects_zero_quantity_and_bad_currency() {
        let mut invoice = input();
        invoice.line_items[0].quantity = 0;
        assert!(validate_invoice(&invoice).is_err());

        let mut invoice = input();
        invoice.currency = "usd".to_string();
        assert!(validate_invoice(&invoice).is_err());
    }

    #[test]
    fn rejects_amounts_and_descriptions_the_columns_cannot_hold() {
        let mut invoice = input();
        invoice.line_items[0].description = "x".repeat(256);
        assert!(validate_invoice(&invoice).is_err());
        invoice.line_items[0].description = "x".repeat(255);
        assert!(validate_invoice(&invoice).is_ok());

        let mut invoice = input();
        invoice.line_items[0].unit_price = dec("100000000.00");
        assert!(validate_invoice(&invoice).is_err());

        let mut invoice = input();
        invoice.line_items[0].quantity = 1_000;
        invoice.line_items[0].unit_price = dec("99999999.99");
        assert!(validate_invoice(&invoice).is_err());

        let mut invoice = input();
        invoice.line_items[0].unit_price = dec("60000000.00");
        invoice.line_items[0].quantity = 1;
        invoice.tax_amount = dec("50000000.00");
        assert!(matches!(
            validate_invoice(&invoice),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn money_bounds_follow_the_column_precision() {
        assert!(is_money(dec("99999999.99")));
        assert!(!is_money(dec("100000000.00")));
        assert!(!is_money(dec("-0.01")));
        assert!(!is_money(dec("0.001")));
    }

    #[test]
    fn rejects_paid_as_initial_status() {
        let mut invoice = input();
        invoice.status = InvoiceStatus::Paid;
        assert!(validate_invoice(&invoice).is_err());
    }
}
