//! Subscription manager: the subscription state machine plus the
//! organization's denormalized plan pointer.
//!
//! Every mutation runs in one transaction that first locks the organization
//! row, so writes for a single organization are serialized. The partial
//! unique index on active subscriptions backs the same rule at the storage
//! level.

use crate::config::BillingSettings;
use crate::models::{
    BillingCycle, BillingEventType, CreateInvoice, CreateSubscription, InvoiceStatus,
    InvoiceWithLineItems, NewLineItem, Subscription, SubscriptionStatus,
};
use crate::services::database::{commit, lock_organization};
use crate::services::events::record_event;
use crate::services::invoices::{insert_invoice, is_invoice_number_collision};
use crate::services::metrics::{record_invoice_created, record_subscription_operation, DB_QUERY_DURATION};
use crate::services::plans::{fetch_active_plan, fetch_plan};
use crate::services::Database;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use service_core::error::AppError;
use sqlx::postgres::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

macro_rules! subscription_columns {
    () => {
        "id, organization_id, plan_id, external_subscription_id, status, billing_cycle, current_period_start, current_period_end, trial_end, cancel_at_period_end, cancelled_at, created_by, created_at, updated_at"
    };
}

const ACTIVE_SUBSCRIPTION_INDEX: &str = "idx_subscriptions_one_active_per_org";

/// Result of closing out an elapsed billing period.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RolloverOutcome {
    /// The current period has not ended yet.
    NotDue { subscription: Subscription },
    /// Cancellation was scheduled for the period end and has now happened.
    Cancelled { subscription: Subscription },
    /// A new period started. Paid plans get an invoice for it.
    Renewed {
        subscription: Subscription,
        invoice: Option<InvoiceWithLineItems>,
    },
}

fn already_active() -> AppError {
    AppError::BadRequest(anyhow::anyhow!(
        "Organization already has an active subscription"
    ))
}

fn is_active_index_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(ACTIVE_SUBSCRIPTION_INDEX)
        }
        _ => false,
    }
}

fn period_end(cycle: BillingCycle, start: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
    cycle
        .period_end(start)
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Billing period out of range")))
}

async fn find_active_for_update(
    conn: &mut PgConnection,
    organization_id: Uuid,
) -> Result<Option<Subscription>, AppError> {
    sqlx::query_as::<_, Subscription>(concat!(
        "SELECT ",
        subscription_columns!(),
        " FROM subscriptions WHERE organization_id = $1 AND status = 'active' FOR UPDATE"
    ))
    .bind(organization_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to get active subscription: {}", e))
    })
}

/// Copy the subscription's plan, cycle and status onto its organization.
async fn mirror_onto_organization(
    conn: &mut PgConnection,
    subscription: &Subscription,
) -> Result<(), AppError> {
    let next_billing_date = match subscription.status() {
        SubscriptionStatus::Pending | SubscriptionStatus::Active => {
            Some(subscription.current_period_end)
        }
        _ => None,
    };

    sqlx::query(
        r#"
        UPDATE organizations
        SET plan_id = $2,
            billing_cycle = $3,
            subscription_status = $4,
            next_billing_date = $5,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(subscription.organization_id)
    .bind(subscription.plan_id)
    .bind(&subscription.billing_cycle)
    .bind(&subscription.status)
    .bind(next_billing_date)
    .execute(conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to update organization plan: {}", e))
    })?;

    Ok(())
}

#[derive(Clone)]
pub struct SubscriptionManager {
    db: Database,
    settings: BillingSettings,
}

impl SubscriptionManager {
    pub fn new(db: Database, settings: BillingSettings) -> Self {
        Self { db, settings }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start a subscription in `pending`. The organization must not already
    /// have an active one.
    #[instrument(skip(self, input), fields(organization_id = %input.organization_id, plan_id = %input.plan_id))]
    pub async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_subscription"])
            .start_timer();

        let mut tx = self.db.begin().await?;
        lock_organization(&mut tx, input.organization_id).await?;
        let plan = fetch_active_plan(&mut *tx, input.plan_id).await?;

        if find_active_for_update(&mut tx, input.organization_id)
            .await?
            .is_some()
        {
            return Err(already_active());
        }

        let now = Utc::now();
        let end = period_end(input.billing_cycle, now)?;
        let external_id = input
            .external_subscription_id
            .clone()
            .unwrap_or_else(|| format!("pending_{}", Uuid::new_v4().simple()));

        let subscription = sqlx::query_as::<_, Subscription>(concat!(
            r#"
            INSERT INTO subscriptions (id, organization_id, plan_id, external_subscription_id, status, billing_cycle, current_period_start, current_period_end, created_by)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8)
            RETURNING "#,
            subscription_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(input.organization_id)
        .bind(plan.id)
        .bind(&external_id)
        .bind(input.billing_cycle.as_str())
        .bind(now)
        .bind(end)
        .bind(input.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::BadRequest(anyhow::anyhow!("External subscription id already in use"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create subscription: {}", e)),
        })?;

        mirror_onto_organization(&mut tx, &subscription).await?;
        record_event(
            &mut tx,
            subscription.organization_id,
            BillingEventType::SubscriptionCreated,
            json!({
                "subscription_id": subscription.id,
                "plan_id": plan.id,
                "billing_cycle": subscription.billing_cycle,
            }),
        )
        .await?;

        commit(tx).await?;

        timer.observe_duration();
        record_subscription_operation("create");
        info!(subscription_id = %subscription.id, plan = %plan.slug, "Subscription created");

        Ok(subscription)
    }

    /// Confirm a pending subscription, making it the organization's active one.
    #[instrument(skip(self), fields(organization_id = %organization_id, subscription_id = %subscription_id))]
    pub async fn activate_subscription(
        &self,
        organization_id: Uuid,
        subscription_id: Uuid,
    ) -> Result<Subscription, AppError> {
        let mut tx = self.db.begin().await?;
        lock_organization(&mut tx, organization_id).await?;

        let current = sqlx::query_as::<_, Subscription>(concat!(
            "SELECT ",
            subscription_columns!(),
            " FROM subscriptions WHERE id = $1 AND organization_id = $2 FOR UPDATE"
        ))
        .bind(subscription_id)
        .bind(organization_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Subscription not found")))?;

        if current.status() != SubscriptionStatus::Pending {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only pending subscriptions can be activated"
            )));
        }
        if find_active_for_update(&mut tx, organization_id)
            .await?
            .is_some()
        {
            return Err(already_active());
        }

        let subscription = sqlx::query_as::<_, Subscription>(concat!(
            "UPDATE subscriptions SET status = 'active', updated_at = NOW() WHERE id = $1 RETURNING ",
            subscription_columns!()
        ))
        .bind(subscription_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_active_index_violation(&e) {
                already_active()
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to activate subscription: {}", e))
            }
        })?;

        mirror_onto_organization(&mut tx, &subscription).await?;
        record_event(
            &mut tx,
            organization_id,
            BillingEventType::SubscriptionActivated,
            json!({ "subscription_id": subscription.id }),
        )
        .await?;

        commit(tx).await?;
        record_subscription_operation("activate");
        info!(subscription_id = %subscription.id, "Subscription activated");

        Ok(subscription)
    }

    /// Switch the active subscription to another plan and/or cycle in place.
    /// The current period is left untouched; there is no proration.
    #[instrument(skip(self), fields(organization_id = %organization_id, plan_id = %plan_id))]
    pub async fn change_plan(
        &self,
        organization_id: Uuid,
        plan_id: Uuid,
        billing_cycle: BillingCycle,
    ) -> Result<Subscription, AppError> {
        let mut tx = self.db.begin().await?;
        lock_organization(&mut tx, organization_id).await?;
        let plan = fetch_active_plan(&mut *tx, plan_id).await?;

        let current = find_active_for_update(&mut tx, organization_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No active subscription found")))?;

        let subscription = sqlx::query_as::<_, Subscription>(concat!(
            r#"
            UPDATE subscriptions
            SET plan_id = $2, billing_cycle = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            subscription_columns!()
        ))
        .bind(current.id)
        .bind(plan.id)
        .bind(billing_cycle.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to change plan: {}", e)))?;

        mirror_onto_organization(&mut tx, &subscription).await?;
        record_event(
            &mut tx,
            organization_id,
            BillingEventType::PlanChanged,
            json!({
                "subscription_id": subscription.id,
                "old_plan_id": current.plan_id,
                "new_plan_id": plan.id,
                "old_billing_cycle": current.billing_cycle,
                "new_billing_cycle": subscription.billing_cycle,
            }),
        )
        .await?;

        commit(tx).await?;
        record_subscription_operation("change_plan");
        info!(subscription_id = %subscription.id, plan = %plan.slug, "Subscription plan changed");

        Ok(subscription)
    }

    /// Cancel the active subscription, either at the end of the paid period
    /// (flag only) or right away.
    #[instrument(skip(self), fields(organization_id = %organization_id, at_period_end = at_period_end))]
    pub async fn cancel_subscription(
        &self,
        organization_id: Uuid,
        at_period_end: bool,
    ) -> Result<Subscription, AppError> {
        let mut tx = self.db.begin().await?;
        lock_organization(&mut tx, organization_id).await?;

        let current = find_active_for_update(&mut tx, organization_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No active subscription found")))?;

        let sql = if at_period_end {
            concat!(
                "UPDATE subscriptions SET cancel_at_period_end = TRUE, updated_at = NOW() WHERE id = $1 RETURNING ",
                subscription_columns!()
            )
        } else {
            concat!(
                "UPDATE subscriptions SET status = 'cancelled', cancel_at_period_end = FALSE, cancelled_at = NOW(), updated_at = NOW() WHERE id = $1 RETURNING ",
                subscription_columns!()
            )
        };

        let subscription = sqlx::query_as::<_, Subscription>(sql)
            .bind(current.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to cancel subscription: {}", e))
            })?;

        mirror_onto_organization(&mut tx, &subscription).await?;
        record_event(
            &mut tx,
            organization_id,
            BillingEventType::SubscriptionCancelled,
            json!({ "subscription_id": subscription.id, "at_period_end": at_period_end }),
        )
        .await?;

        commit(tx).await?;
        record_subscription_operation("cancel");
        info!(subscription_id = %subscription.id, at_period_end = at_period_end, "Subscription cancelled");

        Ok(subscription)
    }

    /// Undo a cancellation while the paid period is still running.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn reactivate_subscription(
        &self,
        organization_id: Uuid,
    ) -> Result<Subscription, AppError> {
        let mut tx = self.db.begin().await?;
        lock_organization(&mut tx, organization_id).await?;

        let latest = sqlx::query_as::<_, Subscription>(concat!(
            "SELECT ",
            subscription_columns!(),
            " FROM subscriptions WHERE organization_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1 FOR UPDATE"
        ))
        .bind(organization_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No subscription found")))?;

        latest
            .reactivation_check(Utc::now())
            .map_err(|reason| AppError::BadRequest(anyhow::anyhow!(reason)))?;

        if latest.status() == SubscriptionStatus::Cancelled {
            if let Some(other) = find_active_for_update(&mut tx, organization_id).await? {
                if other.id != latest.id {
                    return Err(already_active());
                }
            }
        }

        let subscription = sqlx::query_as::<_, Subscription>(concat!(
            r#"
            UPDATE subscriptions
            SET status = 'active', cancel_at_period_end = FALSE, cancelled_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            subscription_columns!()
        ))
        .bind(latest.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_active_index_violation(&e) {
                already_active()
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to reactivate subscription: {}", e))
            }
        })?;

        mirror_onto_organization(&mut tx, &subscription).await?;
        record_event(
            &mut tx,
            organization_id,
            BillingEventType::SubscriptionReactivated,
            json!({ "subscription_id": subscription.id, "previous_status": latest.status }),
        )
        .await?;

        commit(tx).await?;
        record_subscription_operation("reactivate");
        info!(subscription_id = %subscription.id, "Subscription reactivated");

        Ok(subscription)
    }

    /// Close out the active subscription's period once it has elapsed:
    /// cancel it if cancellation was scheduled, otherwise start the next
    /// period and invoice it.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn rollover_subscription(
        &self,
        organization_id: Uuid,
    ) -> Result<RolloverOutcome, AppError> {
        self.rollover_at(organization_id, Utc::now()).await
    }

    pub(crate) async fn rollover_at(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RolloverOutcome, AppError> {
        let mut tx = self.db.begin().await?;
        lock_organization(&mut tx, organization_id).await?;

        let current = find_active_for_update(&mut tx, organization_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No active subscription found")))?;

        if current.current_period_end > now {
            return Ok(RolloverOutcome::NotDue {
                subscription: current,
            });
        }

        if current.cancel_at_period_end {
            let subscription = sqlx::query_as::<_, Subscription>(concat!(
                "UPDATE subscriptions SET status = 'cancelled', cancel_at_period_end = FALSE, cancelled_at = NOW(), updated_at = NOW() WHERE id = $1 RETURNING ",
                subscription_columns!()
            ))
            .bind(current.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to cancel subscription: {}", e))
            })?;

            mirror_onto_organization(&mut tx, &subscription).await?;
            record_event(
                &mut tx,
                organization_id,
                BillingEventType::SubscriptionCancelled,
                json!({ "subscription_id": subscription.id, "at_period_end": true }),
            )
            .await?;

            commit(tx).await?;
            record_subscription_operation("rollover_cancel");
            info!(subscription_id = %subscription.id, "Scheduled cancellation applied");

            return Ok(RolloverOutcome::Cancelled { subscription });
        }

        let cycle = current.billing_cycle();
        let plan = fetch_plan(&mut *tx, current.plan_id, false)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan not found")))?;

        let new_start = current.current_period_end;
        let new_end = period_end(cycle, new_start)?;

        let subscription = sqlx::query_as::<_, Subscription>(concat!(
            r#"
            UPDATE subscriptions
            SET current_period_start = $2, current_period_end = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            subscription_columns!()
        ))
        .bind(current.id)
        .bind(new_start)
        .bind(new_end)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to renew subscription: {}", e)))?;

        let price = plan.price_for(cycle);
        let invoice = if price > Decimal::ZERO {
            let input = CreateInvoice {
                organization_id,
                subscription_id: Some(subscription.id),
                currency: self.settings.default_currency.clone(),
                tax_amount: Decimal::ZERO,
                status: InvoiceStatus::Sent,
                billing_period_start: Some(new_start),
                billing_period_end: Some(new_end),
                due_date: Some(new_start + Duration::days(self.settings.invoice_due_days)),
                invoice_url: None,
                line_items: vec![NewLineItem {
                    description: format!("{} plan ({})", plan.name, cycle.as_str()),
                    quantity: 1,
                    unit_price: price,
                }],
            };
            let created = insert_invoice(&mut tx, &input).await.map_err(|e| {
                if is_invoice_number_collision(&e) {
                    AppError::Conflict(anyhow::anyhow!(
                        "Could not allocate a unique invoice number, please retry"
                    ))
                } else {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e))
                }
            })?;
            record_event(
                &mut tx,
                organization_id,
                BillingEventType::InvoiceCreated,
                json!({
                    "invoice_id": created.invoice.id,
                    "invoice_number": created.invoice.invoice_number,
                    "total_amount": created.invoice.total_amount,
                }),
            )
            .await?;
            Some(created)
        } else {
            None
        };

        mirror_onto_organization(&mut tx, &subscription).await?;
        record_event(
            &mut tx,
            organization_id,
            BillingEventType::SubscriptionRenewed,
            json!({
                "subscription_id": subscription.id,
                "period_start": new_start,
                "period_end": new_end,
            }),
        )
        .await?;

        commit(tx).await?;

        record_subscription_operation("renew");
        if let Some(created) = &invoice {
            record_invoice_created(&created.invoice.currency, "renewal");
        }
        info!(subscription_id = %subscription.id, period_end = %new_end, "Subscription renewed");

        Ok(RolloverOutcome::Renewed {
            subscription,
            invoice,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The organization's active subscription, if any.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn get_active_subscription(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_active_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(concat!(
            "SELECT ",
            subscription_columns!(),
            " FROM subscriptions WHERE organization_id = $1 AND status = 'active' ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(organization_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get active subscription: {}", e))
        })?;

        timer.observe_duration();
        Ok(subscription)
    }

    /// The most recently created subscription, whatever its status.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn get_subscription(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        sqlx::query_as::<_, Subscription>(concat!(
            "SELECT ",
            subscription_columns!(),
            " FROM subscriptions WHERE organization_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(organization_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e)))
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn get_by_id(&self, subscription_id: Uuid) -> Result<Subscription, AppError> {
        sqlx::query_as::<_, Subscription>(concat!(
            "SELECT ",
            subscription_columns!(),
            " FROM subscriptions WHERE id = $1"
        ))
        .bind(subscription_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Subscription not found")))
    }

    #[instrument(skip(self))]
    pub async fn get_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Subscription, AppError> {
        sqlx::query_as::<_, Subscription>(concat!(
            "SELECT ",
            subscription_columns!(),
            " FROM subscriptions WHERE external_subscription_id = $1"
        ))
        .bind(external_subscription_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Subscription not found")))
    }

    /// Every subscription the organization ever had, newest first.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_history(&self, organization_id: Uuid) -> Result<Vec<Subscription>, AppError> {
        sqlx::query_as::<_, Subscription>(concat!(
            "SELECT ",
            subscription_columns!(),
            " FROM subscriptions WHERE organization_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(organization_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list subscriptions: {}", e))
        })
    }
}
