//! Plan catalog.

use crate::models::{CreatePlan, Plan};
use crate::services::invoices::is_money;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::Database;
use service_core::error::AppError;
use sqlx::postgres::PgExecutor;
use tracing::{info, instrument};
use uuid::Uuid;

macro_rules! plan_columns {
    () => {
        "id, name, slug, description, price_monthly, price_yearly, max_users, max_projects, max_environments, max_schemas, max_test_records_per_schema, features, is_active, created_at, updated_at"
    };
}

/// Fetch a plan on any executor, so callers holding a transaction look it up
/// on their own connection.
pub(crate) async fn fetch_plan<'e, E>(
    executor: E,
    plan_id: Uuid,
    active_only: bool,
) -> Result<Option<Plan>, AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Plan>(concat!(
        "SELECT ",
        plan_columns!(),
        " FROM plans WHERE id = $1 AND (is_active OR NOT $2)"
    ))
    .bind(plan_id)
    .bind(active_only)
    .fetch_optional(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get plan: {}", e)))
}

/// Active plan or `NotFound`.
pub(crate) async fn fetch_active_plan<'e, E>(executor: E, plan_id: Uuid) -> Result<Plan, AppError>
where
    E: PgExecutor<'e>,
{
    fetch_plan(executor, plan_id, true)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan not found")))
}

/// Read access to subscription tiers, plus the few administrative writes.
#[derive(Clone)]
pub struct PlanCatalog {
    db: Database,
}

impl PlanCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Active plans, cheapest first.
    #[instrument(skip(self))]
    pub async fn list_active(&self) -> Result<Vec<Plan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_plans"])
            .start_timer();

        let plans = sqlx::query_as::<_, Plan>(concat!(
            "SELECT ",
            plan_columns!(),
            " FROM plans WHERE is_active = TRUE ORDER BY price_monthly ASC, name ASC"
        ))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list plans: {}", e)))?;

        timer.observe_duration();
        Ok(plans)
    }

    /// Same set as [`Self::list_active`]; comparison happens client-side.
    pub async fn compare(&self) -> Result<Vec<Plan>, AppError> {
        self.list_active().await
    }

    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn get_by_id(&self, plan_id: Uuid) -> Result<Plan, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan"])
            .start_timer();

        let plan = fetch_active_plan(self.db.pool(), plan_id).await;

        timer.observe_duration();
        plan
    }

    #[instrument(skip(self), fields(slug = %slug))]
    pub async fn get_by_slug(&self, slug: &str) -> Result<Plan, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan_by_slug"])
            .start_timer();

        let plan = sqlx::query_as::<_, Plan>(concat!(
            "SELECT ",
            plan_columns!(),
            " FROM plans WHERE slug = $1 AND is_active = TRUE"
        ))
        .bind(slug)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get plan by slug: {}", e))
        })?;

        timer.observe_duration();
        plan.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan not found")))
    }

    /// Resolve a plan even when it has been deactivated. Existing
    /// subscriptions keep pointing at retired plans.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn find_any(&self, plan_id: Uuid) -> Result<Option<Plan>, AppError> {
        fetch_plan(self.db.pool(), plan_id, false).await
    }

    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create_plan(&self, input: &CreatePlan) -> Result<Plan, AppError> {
        for price in [input.price_monthly, input.price_yearly] {
            if !is_money(price) {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Plan prices must be non-negative, below 100000000 and in whole cents"
                )));
            }
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, Plan>(concat!(
            r#"
            INSERT INTO plans (id, name, slug, description, price_monthly, price_yearly, max_users, max_projects, max_environments, max_schemas, max_test_records_per_schema, features)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING "#,
            plan_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.price_monthly)
        .bind(input.price_yearly)
        .bind(input.limits.max_users)
        .bind(input.limits.max_projects)
        .bind(input.limits.max_environments)
        .bind(input.limits.max_schemas)
        .bind(input.limits.max_test_records_per_schema)
        .bind(serde_json::json!(input.features))
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::BadRequest(anyhow::anyhow!("Plan slug already exists"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create plan: {}", e)),
        })?;

        timer.observe_duration();
        info!(plan_id = %plan.id, slug = %plan.slug, "Plan created");

        Ok(plan)
    }

    /// Retire a plan. Plans are never physically deleted.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn deactivate_plan(&self, plan_id: Uuid) -> Result<Plan, AppError> {
        let plan = sqlx::query_as::<_, Plan>(concat!(
            "UPDATE plans SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING ",
            plan_columns!()
        ))
        .bind(plan_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to deactivate plan: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan not found")))?;

        info!(plan_id = %plan.id, "Plan deactivated");
        Ok(plan)
    }
}
