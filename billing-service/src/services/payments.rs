//! Payment ledger: payment attempts and their outcomes.

use crate::models::{BillingEventType, CreatePayment, Payment, PaymentMethodKind, PaymentStatus};
use crate::services::database::commit;
use crate::services::events::record_event;
use crate::services::invoices::{is_currency_code, is_money};
use crate::services::metrics::{record_payment, DB_QUERY_DURATION};
use crate::services::Database;
use serde_json::json;
use service_core::error::AppError;
use service_core::response::{page_offset, Page, PAGE_SIZE};
use sqlx::postgres::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

macro_rules! payment_columns {
    () => {
        "id, organization_id, invoice_id, subscription_id, external_payment_id, external_payer_id, amount, currency, payment_method, status, failure_reason, processed_at, created_at, updated_at"
    };
}

/// Insert a payment row on an open connection or transaction.
pub(crate) async fn insert_payment(
    conn: &mut PgConnection,
    input: &CreatePayment,
    status: PaymentStatus,
) -> Result<Payment, sqlx::Error> {
    sqlx::query_as::<_, Payment>(concat!(
        r#"
        INSERT INTO payments (id, organization_id, invoice_id, subscription_id, external_payment_id, external_payer_id, amount, currency, payment_method, status, processed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, CASE WHEN $10 = 'completed' THEN NOW() END)
        RETURNING "#,
        payment_columns!()
    ))
    .bind(Uuid::new_v4())
    .bind(input.organization_id)
    .bind(input.invoice_id)
    .bind(input.subscription_id)
    .bind(&input.external_payment_id)
    .bind(&input.external_payer_id)
    .bind(input.amount)
    .bind(&input.currency)
    .bind(PaymentMethodKind::ExternalProcessor.as_str())
    .bind(status.as_str())
    .fetch_one(conn)
    .await
}

#[derive(Clone)]
pub struct PaymentLedger {
    db: Database,
}

impl PaymentLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a pending payment attempt.
    #[instrument(skip(self, input), fields(organization_id = %input.organization_id))]
    pub async fn record_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        if !is_money(input.amount) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Amount must be non-negative, below 100000000 and in whole cents"
            )));
        }
        if !is_currency_code(&input.currency) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Currency must be a three-letter upper-case code"
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        let mut tx = self.db.begin().await?;

        if let Some(invoice_id) = input.invoice_id {
            let owned: Option<Uuid> = sqlx::query_scalar(
                "SELECT id FROM invoices WHERE id = $1 AND organization_id = $2",
            )
            .bind(invoice_id)
            .bind(input.organization_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to verify invoice: {}", e)))?;
            if owned.is_none() {
                return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
            }
        }

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

        let payment = insert_payment(&mut tx, input, PaymentStatus::Pending)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AppError::BadRequest(anyhow::anyhow!("External payment id already recorded"))
                }
                sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                    AppError::NotFound(anyhow::anyhow!("Organization not found"))
                }
                _ => AppError::DatabaseError(anyhow::anyhow!("Failed to record payment: {}", e)),
            })?;

        commit(tx).await?;

        timer.observe_duration();
        record_payment(PaymentStatus::Pending.as_str());
        info!(payment_id = %payment.id, amount = %payment.amount, "Payment recorded");

        Ok(payment)
    }

    /// Move a payment to `status`. The allowed source statuses are part of the
    /// UPDATE predicate, so of two racing writers only the first succeeds.
    #[instrument(skip(self), fields(payment_id = %payment_id, status = status.as_str()))]
    pub async fn update_status(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Payment, AppError> {
        let predecessors: Vec<String> = status
            .allowed_predecessors()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut tx = self.db.begin().await?;

        let payment = sqlx::query_as::<_, Payment>(concat!(
            r#"
            UPDATE payments
            SET status = $2,
                processed_at = CASE WHEN $2 = 'completed' THEN NOW() ELSE processed_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            RETURNING "#,
            payment_columns!()
        ))
        .bind(payment_id)
        .bind(status.as_str())
        .bind(&predecessors)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update payment status: {}", e))
        })?;

        let Some(payment) = payment else {
            drop(tx);
            return Err(self.transition_error(payment_id, status).await);
        };

        let event_type = match status {
            PaymentStatus::Completed => Some(BillingEventType::PaymentSucceeded),
            PaymentStatus::Failed => Some(BillingEventType::PaymentFailed),
            _ => None,
        };
        if let Some(event_type) = event_type {
            record_event(
                &mut tx,
                payment.organization_id,
                event_type,
                json!({
                    "payment_id": payment.id,
                    "invoice_id": payment.invoice_id,
                    "amount": payment.amount,
                }),
            )
            .await?;
        }

        commit(tx).await?;
        record_payment(status.as_str());
        info!(payment_id = %payment.id, status = %payment.status, "Payment status updated");

        Ok(payment)
    }

    /// Mark a pending payment failed with a reason, in one statement.
    #[instrument(skip(self, reason), fields(payment_id = %payment_id))]
    pub async fn update_failure_reason(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Payment, AppError> {
        let mut tx = self.db.begin().await?;

        let payment = sqlx::query_as::<_, Payment>(concat!(
            r#"
            UPDATE payments
            SET status = 'failed', failure_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING "#,
            payment_columns!()
        ))
        .bind(payment_id)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record payment failure: {}", e))
        })?;

        let Some(payment) = payment else {
            drop(tx);
            return Err(self.transition_error(payment_id, PaymentStatus::Failed).await);
        };

        record_event(
            &mut tx,
            payment.organization_id,
            BillingEventType::PaymentFailed,
            json!({ "payment_id": payment.id, "reason": reason }),
        )
        .await?;

        commit(tx).await?;
        record_payment(PaymentStatus::Failed.as_str());
        info!(payment_id = %payment.id, "Payment marked failed");

        Ok(payment)
    }

    async fn transition_error(&self, payment_id: Uuid, status: PaymentStatus) -> AppError {
        match self.get_by_id(payment_id).await {
            Ok(current) => AppError::BadRequest(anyhow::anyhow!(
                "Payment cannot move from {} to {}",
                current.status,
                status.as_str()
            )),
            Err(e) => e,
        }
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn get_by_id(&self, payment_id: Uuid) -> Result<Payment, AppError> {
        sqlx::query_as::<_, Payment>(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))
    }

    #[instrument(skip(self))]
    pub async fn get_by_external_id(&self, external_payment_id: &str) -> Result<Payment, AppError> {
        sqlx::query_as::<_, Payment>(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE external_payment_id = $1"
        ))
        .bind(external_payment_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))
    }

    /// Payments for an organization, newest first.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_by_organization(
        &self,
        organization_id: Uuid,
        page: i64,
    ) -> Result<Page<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_one(self.db.pool())
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to count payments: {}", e))
                })?;

        let items = sqlx::query_as::<_, Payment>(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE organization_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(organization_id)
        .bind(PAGE_SIZE)
        .bind(page_offset(page, PAGE_SIZE))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();

        Ok(Page {
            items,
            page,
            limit: PAGE_SIZE,
            total,
        })
    }

    pub async fn list_by_invoice(&self, invoice_id: Uuid) -> Result<Vec<Payment>, AppError> {
        sqlx::query_as::<_, Payment>(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE invoice_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(invoice_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))
    }

    pub async fn list_by_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        sqlx::query_as::<_, Payment>(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE subscription_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(subscription_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))
    }

    /// The `limit` most recent payments.
    pub async fn list_recent(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Payment>, AppError> {
        sqlx::query_as::<_, Payment>(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE organization_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
        ))
        .bind(organization_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list recent payments: {}", e))
        })
    }

    pub async fn list_all_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        sqlx::query_as::<_, Payment>(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE organization_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(organization_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))
    }
}
