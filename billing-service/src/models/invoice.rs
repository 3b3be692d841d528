//! Invoice and line item models.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Cancelled,
    Refunded,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Refunded => "refunded",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => InvoiceStatus::Sent,
            "paid" => InvoiceStatus::Paid,
            "cancelled" => InvoiceStatus::Cancelled,
            "refunded" => InvoiceStatus::Refunded,
            _ => InvoiceStatus::Draft,
        }
    }

    /// Statuses move forward only.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Draft, Paid) | (Draft, Cancelled) | (Sent, Paid) | (Sent, Cancelled) | (Paid, Refunded)
        )
    }

    /// Statuses that still expect a payment.
    pub fn is_unpaid(&self) -> bool {
        matches!(self, InvoiceStatus::Draft | InvoiceStatus::Sent)
    }
}

/// Invoice header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub invoice_number: String,
    pub amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: String,
    pub billing_period_start: Option<DateTime<Utc>>,
    pub billing_period_end: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub invoice_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }
}

/// Invoice line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InvoiceLineItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Invoice together with its line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceWithLineItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub line_items: Vec<InvoiceLineItem>,
}

/// Line item to be created with an invoice.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl NewLineItem {
    pub fn total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

/// Input for creating an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub organization_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub currency: String,
    pub tax_amount: Decimal,
    pub status: InvoiceStatus,
    pub billing_period_start: Option<DateTime<Utc>>,
    pub billing_period_end: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub invoice_url: Option<String>,
    pub line_items: Vec<NewLineItem>,
}

/// Amounts derived from line items and tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

impl CreateInvoice {
    pub fn totals(&self) -> InvoiceTotals {
        let amount: Decimal = self.line_items.iter().map(NewLineItem::total).sum();
        InvoiceTotals {
            amount,
            tax_amount: self.tax_amount,
            total_amount: amount + self.tax_amount,
        }
    }
}

/// `INV-<year>-<sequence>`; the sequence is zero-padded to six digits and
/// grows past that without truncation.
pub fn format_invoice_number(year: i32, sequence: i64) -> String {
    format!("INV-{}-{:06}", year, sequence)
}

pub fn invoice_year(at: DateTime<Utc>) -> i32 {
    at.year()
}
