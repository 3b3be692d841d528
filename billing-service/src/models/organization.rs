//! Organization (tenant) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{BillingCycle, SubscriptionStatus};

/// Tenant root. Carries a denormalized copy of its current plan so reads
/// don't have to resolve the subscription history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub status: String,
    pub plan_id: Option<Uuid>,
    pub billing_cycle: Option<String>,
    pub subscription_status: Option<String>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn billing_cycle(&self) -> Option<BillingCycle> {
        self.billing_cycle.as_deref().map(BillingCycle::from_string)
    }

    pub fn subscription_status(&self) -> Option<SubscriptionStatus> {
        self.subscription_status
            .as_deref()
            .map(SubscriptionStatus::from_string)
    }
}

/// Input for creating an organization.
#[derive(Debug, Clone)]
pub struct CreateOrganization {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}
