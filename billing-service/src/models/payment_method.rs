//! Stored payment method model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payer reference at the external processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub external_payer_id: Option<String>,
    pub external_email: Option<String>,
    pub method_type: String,
    pub is_default: bool,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a payment method.
#[derive(Debug, Clone)]
pub struct CreatePaymentMethod {
    pub external_payer_id: Option<String>,
    pub external_email: Option<String>,
    pub is_default: bool,
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdatePaymentMethod {
    pub external_payer_id: Option<String>,
    pub external_email: Option<String>,
    pub is_default: Option<bool>,
}
