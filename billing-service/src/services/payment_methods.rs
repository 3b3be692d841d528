//! Stored payment methods with a single active default per organization.

use crate::models::{CreatePaymentMethod, PaymentMethod, PaymentMethodKind, UpdatePaymentMethod};
use crate::services::database::{commit, lock_organization};
use crate::services::Database;
use service_core::error::AppError;
use sqlx::postgres::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

macro_rules! payment_method_columns {
    () => {
        "id, organization_id, external_payer_id, external_email, method_type, is_default, is_active, created_by, created_at, updated_at"
    };
}

#[derive(Clone)]
pub struct PaymentMethods {
    db: Database,
}

impl PaymentMethods {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Active payment methods, default first.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list(&self, organization_id: Uuid) -> Result<Vec<PaymentMethod>, AppError> {
        sqlx::query_as::<_, PaymentMethod>(concat!(
            "SELECT ",
            payment_method_columns!(),
            " FROM payment_methods WHERE organization_id = $1 AND is_active = TRUE ORDER BY is_default DESC, created_at DESC"
        ))
        .bind(organization_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list payment methods: {}", e))
        })
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, payment_method_id = %payment_method_id))]
    pub async fn get(
        &self,
        organization_id: Uuid,
        payment_method_id: Uuid,
    ) -> Result<PaymentMethod, AppError> {
        sqlx::query_as::<_, PaymentMethod>(concat!(
            "SELECT ",
            payment_method_columns!(),
            " FROM payment_methods WHERE id = $1 AND organization_id = $2 AND is_active = TRUE"
        ))
        .bind(payment_method_id)
        .bind(organization_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment method: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment method not found")))
    }

    /// Store a payment method. A new default displaces the previous one in
    /// the same transaction.
    #[instrument(skip(self, input), fields(organization_id = %organization_id))]
    pub async fn create(
        &self,
        organization_id: Uuid,
        created_by: Uuid,
        input: &CreatePaymentMethod,
    ) -> Result<PaymentMethod, AppError> {
        let mut tx = self.db.begin().await?;
        lock_organization(&mut tx, organization_id).await?;

        if input.is_default {
            clear_default(&mut tx, organization_id).await?;
        }

        let method = sqlx::query_as::<_, PaymentMethod>(concat!(
            r#"
            INSERT INTO payment_methods (id, organization_id, external_payer_id, external_email, method_type, is_default, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING "#,
            payment_method_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(&input.external_payer_id)
        .bind(&input.external_email)
        .bind(PaymentMethodKind::ExternalProcessor.as_str())
        .bind(input.is_default)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create payment method: {}", e))
        })?;

        commit(tx).await?;
        info!(payment_method_id = %method.id, is_default = method.is_default, "Payment method created");

        Ok(method)
    }

    /// Partial update. Setting `is_default = true` runs the default swap in
    /// the same transaction; `false` simply clears the flag.
    #[instrument(skip(self, input), fields(organization_id = %organization_id, payment_method_id = %payment_method_id))]
    pub async fn update(
        &self,
        organization_id: Uuid,
        payment_method_id: Uuid,
        input: &UpdatePaymentMethod,
    ) -> Result<PaymentMethod, AppError> {
        let mut tx = self.db.begin().await?;
        lock_organization(&mut tx, organization_id).await?;
        lock_method(&mut tx, organization_id, payment_method_id).await?;

        if input.is_default == Some(true) {
            clear_default(&mut tx, organization_id).await?;
        }

        let method = sqlx::query_as::<_, PaymentMethod>(concat!(
            r#"
            UPDATE payment_methods
            SET external_payer_id = COALESCE($2, external_payer_id),
                external_email = COALESCE($3, external_email),
                is_default = COALESCE($4, is_default),
                updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            payment_method_columns!()
        ))
        .bind(payment_method_id)
        .bind(&input.external_payer_id)
        .bind(&input.external_email)
        .bind(input.is_default)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update payment method: {}", e))
        })?;

        commit(tx).await?;
        info!(payment_method_id = %method.id, "Payment method updated");

        Ok(method)
    }

    /// Soft delete. A deactivated method is never the default.
    #[instrument(skip(self), fields(organization_id = %organization_id, payment_method_id = %payment_method_id))]
    pub async fn deactivate(
        &self,
        organization_id: Uuid,
        payment_method_id: Uuid,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_methods
            SET is_active = FALSE, is_default = FALSE, updated_at = NOW()
            WHERE id = $1 AND organization_id = $2 AND is_active = TRUE
            "#,
        )
        .bind(payment_method_id)
        .bind(organization_id)
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete payment method: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Payment method not found"
            )));
        }

        info!(payment_method_id = %payment_method_id, "Payment method deactivated");
        Ok(())
    }

    /// Make one method the default: clear all, then set one, atomically.
    #[instrument(skip(self), fields(organization_id = %organization_id, payment_method_id = %payment_method_id))]
    pub async fn set_default(
        &self,
        organization_id: Uuid,
        payment_method_id: Uuid,
    ) -> Result<PaymentMethod, AppError> {
        let mut tx = self.db.begin().await?;
        lock_organization(&mut tx, organization_id).await?;
        lock_method(&mut tx, organization_id, payment_method_id).await?;

        clear_default(&mut tx, organization_id).await?;

        let method = sqlx::query_as::<_, PaymentMethod>(concat!(
            "UPDATE payment_methods SET is_default = TRUE, updated_at = NOW() WHERE id = $1 RETURNING ",
            payment_method_columns!()
        ))
        .bind(payment_method_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to set default payment method: {}", e))
        })?;

        commit(tx).await?;
        info!(payment_method_id = %method.id, "Default payment method set");

        Ok(method)
    }
}

async fn clear_default(conn: &mut PgConnection, organization_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE payment_methods
        SET is_default = FALSE, updated_at = NOW()
        WHERE organization_id = $1 AND is_default = TRUE
        "#,
    )
    .bind(organization_id)
    .execute(conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to clear default payment method: {}", e))
    })?;
    Ok(())
}

async fn lock_method(
    conn: &mut PgConnection,
    organization_id: Uuid,
    payment_method_id: Uuid,
) -> Result<(), AppError> {
    let found: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM payment_methods WHERE id = $1 AND organization_id = $2 AND is_active = TRUE FOR UPDATE",
    )
    .bind(payment_method_id)
    .bind(organization_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock payment method: {}", e)))?;

    found
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment method not found")))
}
