//! Billing event trail. Events are appended inside the transaction of the
//! mutation they describe, so a rolled back change leaves no event behind.

use crate::models::{BillingEvent, BillingEventType};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::Database;
use service_core::error::AppError;
use service_core::response::{page_offset, Page, PAGE_SIZE};
use sqlx::postgres::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub(crate) async fn record_event(
    conn: &mut PgConnection,
    organization_id: Uuid,
    event_type: BillingEventType,
    data: serde_json::Value,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO billing_events (id, organization_id, event_type, event_data)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(organization_id)
    .bind(event_type.as_str())
    .bind(data)
    .execute(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record billing event: {}", e)))?;

    Ok(())
}

#[derive(Clone)]
pub struct BillingEvents {
    db: Database,
}

impl BillingEvents {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Events for an organization, newest first.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_events(
        &self,
        organization_id: Uuid,
        page: i64,
    ) -> Result<Page<BillingEvent>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_billing_events"])
            .start_timer();

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM billing_events WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_one(self.db.pool())
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to count events: {}", e))
                })?;

        let items = sqlx::query_as::<_, BillingEvent>(
            r#"
            SELECT id, organization_id, event_type, event_data, created_at
            FROM billing_events
            WHERE organization_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(organization_id)
        .bind(PAGE_SIZE)
        .bind(page_offset(page, PAGE_SIZE))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list events: {}", e)))?;

        timer.observe_duration();

        Ok(Page {
            items,
            page,
            limit: PAGE_SIZE,
            total,
        })
    }
}
