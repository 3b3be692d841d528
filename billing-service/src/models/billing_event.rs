//! Billing event (audit trail) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventType {
    SubscriptionCreated,
    SubscriptionActivated,
    SubscriptionCancelled,
    SubscriptionReactivated,
    SubscriptionRenewed,
    PlanChanged,
    InvoiceCreated,
    PaymentSucceeded,
    PaymentFailed,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::SubscriptionCreated => "subscription_created",
            BillingEventType::SubscriptionActivated => "subscription_activated",
            BillingEventType::SubscriptionCancelled => "subscription_cancelled",
            BillingEventType::SubscriptionReactivated => "subscription_reactivated",
            BillingEventType::SubscriptionRenewed => "subscription_renewed",
            BillingEventType::PlanChanged => "plan_changed",
            BillingEventType::InvoiceCreated => "invoice_created",
            BillingEventType::PaymentSucceeded => "payment_succeeded",
            BillingEventType::PaymentFailed => "payment_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillingEvent {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub event_type: String,
    pub event_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
