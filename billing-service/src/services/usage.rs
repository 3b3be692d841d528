//! Usage meter: one row of counters per organization per calendar month.

use crate::models::{OrganizationUsage, UsageField, UsagePeriod};
use crate::services::metrics::{record_usage_update, DB_QUERY_DURATION};
use crate::services::Database;
use chrono::Utc;
use service_core::error::AppError;
use service_core::response::{page_offset, Page, PAGE_SIZE};
use sqlx::postgres::PgConnection;
use sqlx::{Postgres, QueryBuilder};
use std::collections::BTreeMap;
use tracing::{info, instrument};
use uuid::Uuid;

macro_rules! usage_columns {
    () => {
        "id, organization_id, period_start, period_end, users_count, projects_count, environments_count, schemas_count, test_records_count, api_requests_count, recorded_at"
    };
}

pub(crate) fn current_period() -> Result<UsagePeriod, AppError> {
    UsagePeriod::containing(Utc::now())
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Failed to compute usage period")))
}

/// Add `delta` to one counter of the current period in a single statement.
/// The row is created on first use; counters never drop below zero.
pub(crate) async fn increment_in(
    conn: &mut PgConnection,
    organization_id: Uuid,
    field: UsageField,
    delta: i64,
) -> Result<OrganizationUsage, AppError> {
    let period = current_period()?;
    let column = field.column();

    let sql = format!(
        r#"
        INSERT INTO organization_usage (id, organization_id, period_start, period_end, {column}, recorded_at)
        VALUES ($1, $2, $3, $4, GREATEST($5, 0), NOW())
        ON CONFLICT (organization_id, period_start, period_end)
        DO UPDATE SET {column} = GREATEST(organization_usage.{column} + $5, 0), recorded_at = NOW()
        RETURNING {columns}
        "#,
        column = column,
        columns = usage_columns!(),
    );

    let usage = sqlx::query_as::<_, OrganizationUsage>(&sql)
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(period.start)
        .bind(period.end)
        .bind(delta)
        .fetch_one(conn)
        .await
        .map_err(|e| usage_write_error(e, organization_id, "increment"))?;

    record_usage_update(column, "increment");
    Ok(usage)
}

#[derive(Clone)]
pub struct UsageMeter {
    db: Database,
}

impl UsageMeter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Counters for the current month, `None` when nothing was recorded yet.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn get_current_usage(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<OrganizationUsage>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_current_usage"])
            .start_timer();

        let period = current_period()?;
        let usage = sqlx::query_as::<_, OrganizationUsage>(concat!(
            "SELECT ",
            usage_columns!(),
            " FROM organization_usage WHERE organization_id = $1 AND period_start = $2 AND period_end = $3"
        ))
        .bind(organization_id)
        .bind(period.start)
        .bind(period.end)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get usage: {}", e)))?;

        timer.observe_duration();
        Ok(usage)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, field = field.column()))]
    pub async fn increment_usage(
        &self,
        organization_id: Uuid,
        field: UsageField,
        delta: i64,
    ) -> Result<OrganizationUsage, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["increment_usage"])
            .start_timer();

        let mut conn = self.db.pool().acquire().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to acquire connection: {}", e))
        })?;
        let usage = increment_in(&mut conn, organization_id, field, delta).await?;

        timer.observe_duration();
        Ok(usage)
    }

    /// Set counters to absolute values. Fields missing from `values` keep
    /// their stored value (zero for a freshly created row).
    #[instrument(skip(self, values), fields(organization_id = %organization_id))]
    pub async fn upsert_current_usage(
        &self,
        organization_id: Uuid,
        values: &BTreeMap<UsageField, i64>,
    ) -> Result<OrganizationUsage, AppError> {
        if values.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "At least one usage field is required"
            )));
        }
        if values.values().any(|v| *v < 0) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Usage values cannot be negative"
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_usage"])
            .start_timer();

        let period = current_period()?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO organization_usage (id, organization_id, period_start, period_end, recorded_at",
        );
        for field in values.keys() {
            qb.push(", ").push(field.column());
        }
        qb.push(") VALUES (")
            .push_bind(Uuid::new_v4())
            .push(", ")
            .push_bind(organization_id)
            .push(", ")
            .push_bind(period.start)
            .push(", ")
            .push_bind(period.end)
            .push(", NOW()");
        for value in values.values() {
            qb.push(", ").push_bind(*value);
        }
        qb.push(
            ") ON CONFLICT (organization_id, period_start, period_end) DO UPDATE SET recorded_at = NOW()",
        );
        for field in values.keys() {
            qb.push(format!(", {0} = EXCLUDED.{0}", field.column()));
        }
        qb.push(concat!(" RETURNING ", usage_columns!()));

        let usage = qb
            .build_query_as::<OrganizationUsage>()
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| usage_write_error(e, organization_id, "upsert"))?;

        timer.observe_duration();
        for field in values.keys() {
            record_usage_update(field.column(), "set");
        }
        info!(organization_id = %organization_id, "Usage updated");

        Ok(usage)
    }

    /// Past and current periods, newest first.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn usage_history(
        &self,
        organization_id: Uuid,
        page: i64,
    ) -> Result<Page<OrganizationUsage>, AppError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM organization_usage WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_one(self.db.pool())
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to count usage: {}", e))
                })?;

        let items = sqlx::query_as::<_, OrganizationUsage>(concat!(
            "SELECT ",
            usage_columns!(),
            " FROM organization_usage WHERE organization_id = $1 ORDER BY period_start DESC LIMIT $2 OFFSET $3"
        ))
        .bind(organization_id)
        .bind(PAGE_SIZE)
        .bind(page_offset(page, PAGE_SIZE))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list usage: {}", e)))?;

        Ok(Page {
            items,
            page,
            limit: PAGE_SIZE,
            total,
        })
    }
}

/// A foreign-key failure on a usage write means the organization does not exist.
fn usage_write_error(e: sqlx::Error, organization_id: Uuid, action: &str) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            AppError::NotFound(anyhow::anyhow!("Organization {} not found", organization_id))
        }
        _ => AppError::DatabaseError(anyhow::anyhow!("Failed to {} usage: {}", action, e)),
    }
}
