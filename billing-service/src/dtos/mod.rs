//! Request bodies accepted by the HTTP API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{
    BillingCycle, CreateOrganization, CreatePaymentMethod, InviteMember, InvoiceStatus,
    MemberRole, NewLineItem, PaymentStatus, UpdatePaymentMethod,
};
use crate::services::PayInvoice;

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    let valid = !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("slug")
            .with_message("Slug may contain lowercase letters, digits and inner hyphens".into()))
    }
}

fn default_true() -> bool {
    true
}

fn default_delta() -> i64 {
    1
}

// ===== Organizations =====

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 100), custom(function = "validate_slug"))]
    pub slug: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

impl From<CreateOrganizationRequest> for CreateOrganization {
    fn from(req: CreateOrganizationRequest) -> Self {
        Self {
            name: req.name.trim().to_string(),
            slug: req.slug,
            description: req.description,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct InviteMemberRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub role: MemberRole,
}

impl From<InviteMemberRequest> for InviteMember {
    fn from(req: InviteMemberRequest) -> Self {
        Self {
            email: req.email,
            role: req.role,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInvitationRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMemberRoleRequest {
    pub role: MemberRole,
}

// ===== Subscriptions =====

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    pub plan_id: Uuid,
    pub billing_cycle: BillingCycle,
    #[validate(length(min = 1, max = 100))]
    pub external_subscription_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePlanRequest {
    pub plan_id: Uuid,
    pub billing_cycle: BillingCycle,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelSubscriptionRequest {
    #[serde(default = "default_true")]
    pub at_period_end: bool,
}

// ===== Usage =====

#[derive(Debug, Deserialize, Validate)]
pub struct IncrementUsageRequest {
    pub field: crate::models::UsageField,
    #[serde(default = "default_delta")]
    pub delta: i64,
}

// ===== Invoices =====

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LineItemRequest {
    #[validate(length(min = 1, max = 255, message = "Description must be 1 to 255 characters"))]
    pub description: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl From<LineItemRequest> for NewLineItem {
    fn from(req: LineItemRequest) -> Self {
        Self {
            description: req.description,
            quantity: req.quantity,
            unit_price: req.unit_price,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub subscription_id: Option<Uuid>,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,
    pub tax_amount: Option<Decimal>,
    pub status: Option<InvoiceStatus>,
    pub billing_period_start: Option<DateTime<Utc>>,
    pub billing_period_end: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    #[validate(url)]
    pub invoice_url: Option<String>,
    #[validate(length(min = 1, message = "At least one line item is required"), nested)]
    pub line_items: Vec<LineItemRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateInvoiceStatusRequest {
    pub status: InvoiceStatus,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PayInvoiceRequest {
    #[validate(length(min = 1, max = 255))]
    pub external_payment_id: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub external_payer_id: Option<String>,
}

impl From<PayInvoiceRequest> for PayInvoice {
    fn from(req: PayInvoiceRequest) -> Self {
        Self {
            external_payment_id: req.external_payment_id,
            external_payer_id: req.external_payer_id,
        }
    }
}

// ===== Payments =====

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub invoice_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub external_payment_id: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub external_payer_id: Option<String>,
    pub amount: Decimal,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePaymentStatusRequest {
    pub status: PaymentStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentFailureRequest {
    #[validate(length(min = 1, max = 1000, message = "Reason is required"))]
    pub reason: String,
}

// ===== Payment methods =====

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentMethodRequest {
    #[validate(length(min = 1, max = 255))]
    pub external_payer_id: Option<String>,
    #[validate(email)]
    pub external_email: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl From<CreatePaymentMethodRequest> for CreatePaymentMethod {
    fn from(req: CreatePaymentMethodRequest) -> Self {
        Self {
            external_payer_id: req.external_payer_id,
            external_email: req.external_email,
            is_default: req.is_default,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePaymentMethodRequest {
    #[validate(length(min = 1, max = 255))]
    pub external_payer_id: Option<String>,
    #[validate(email)]
    pub external_email: Option<String>,
    pub is_default: Option<bool>,
}

impl From<UpdatePaymentMethodRequest> for UpdatePaymentMethod {
    fn from(req: UpdatePaymentMethodRequest) -> Self {
        Self {
            external_payer_id: req.external_payer_id,
            external_email: req.external_email,
            is_default: req.is_default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slug_rules() {
        assert!(validate_slug("acme-corp").is_ok());
        assert!(validate_slug("acme2").is_ok());
        assert!(validate_slug("Acme").is_err());
        assert!(validate_slug("-acme").is_err());
        assert!(validate_slug("acme corp").is_err());
    }

    #[test]
    fn invoice_request_requires_line_items() {
        let req: CreateInvoiceRequest = serde_json::from_value(json!({ "line_items": [] })).unwrap();
        assert!(req.validate().is_err());

        let req: CreateInvoiceRequest = serde_json::from_value(json!({
            "line_items": [{ "description": "Seats", "quantity": 2, "unit_price": "10.00" }]
        }))
        .unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn line_item_description_fits_its_column() {
        let req: CreateInvoiceRequest = serde_json::from_value(json!({
            "line_items": [{ "description": "x".repeat(256), "quantity": 1, "unit_price": "1.00" }]
        }))
        .unwrap();
        assert!(req.validate().is_err());

        let req: CreateInvoiceRequest = serde_json::from_value(json!({
            "line_items": [{ "description": "x".repeat(255), "quantity": 1, "unit_price": "1.00" }]
        }))
        .unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn zero_quantity_line_item_is_rejected() {
        let req: CreateInvoiceRequest = serde_json::from_value(json!({
            "line_items": [{ "description": "Seats", "quantity": 0, "unit_price": "10.00" }]
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let req: InviteMemberRequest =
            serde_json::from_value(json!({ "email": "a@example.com", "role": "admin" })).unwrap();
        assert!(req.validate().is_ok());
        assert!(serde_json::from_value::<InviteMemberRequest>(
            json!({ "email": "a@example.com", "role": "superuser" })
        )
        .is_err());
    }

    #[test]
    fn cancel_defaults_to_period_end() {
        let req: CancelSubscriptionRequest = serde_json::from_value(json!({})).unwrap();
        assert!(req.at_period_end);
    }

    #[test]
    fn unknown_usage_field_is_rejected() {
        assert!(serde_json::from_value::<IncrementUsageRequest>(
            json!({ "field": "widgets_count" })
        )
        .is_err());
        let req: IncrementUsageRequest =
            serde_json::from_value(json!({ "field": "projects_count" })).unwrap();
        assert_eq!(req.delta, 1);
    }
}
