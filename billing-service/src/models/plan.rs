//! Plan catalog model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::BillingCycle;

/// Subscription tier with resource limits and prices.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_monthly: Decimal,
    pub price_yearly: Decimal,
    pub max_users: i32,
    pub max_projects: i32,
    pub max_environments: i32,
    pub max_schemas: i32,
    pub max_test_records_per_schema: i32,
    pub features: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn price_for(&self, cycle: BillingCycle) -> Decimal {
        match cycle {
            BillingCycle::Monthly => self.price_monthly,
            BillingCycle::Yearly => self.price_yearly,
        }
    }

    pub fn limits(&self) -> PlanLimits {
        PlanLimits {
            max_users: self.max_users,
            max_projects: self.max_projects,
            max_environments: self.max_environments,
            max_schemas: self.max_schemas,
            max_test_records_per_schema: self.max_test_records_per_schema,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_users: i32,
    pub max_projects: i32,
    pub max_environments: i32,
    pub max_schemas: i32,
    pub max_test_records_per_schema: i32,
}

/// Input for creating a plan.
#[derive(Debug, Clone)]
pub struct CreatePlan {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_monthly: Decimal,
    pub price_yearly: Decimal,
    pub limits: PlanLimits,
    pub features: Vec<String>,
}
