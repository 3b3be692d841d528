//! Payment ledger model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "completed" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            "cancelled" => PaymentStatus::Cancelled,
            "refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }

    /// Statuses a payment may be in for it to move to `self`.
    pub fn allowed_predecessors(&self) -> &'static [&'static str] {
        match self {
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Cancelled => {
                &["pending"]
            }
            PaymentStatus::Refunded => &["completed"],
            PaymentStatus::Pending => &[],
        }
    }
}

/// How the payer was charged. Only the external processor exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    ExternalProcessor,
}

impl PaymentMethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodKind::ExternalProcessor => "external_processor",
        }
    }
}

/// Payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub external_payment_id: Option<String>,
    pub external_payer_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.status)
    }
}

/// Input for recording a payment attempt.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub organization_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub external_payment_id: Option<String>,
    pub external_payer_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_only_follow_pending() {
        for status in [
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
        ] {
            assert_eq!(status.allowed_predecessors(), &["pending"]);
        }
    }

    #[test]
    fn refund_requires_completed_payment() {
        assert_eq!(PaymentStatus::Refunded.allowed_predecessors(), &["completed"]);
        assert!(PaymentStatus::Pending.allowed_predecessors().is_empty());
    }
}
