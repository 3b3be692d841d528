//! Read models composed by the billing overview aggregator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    Invoice, InvoiceWithLineItems, Payment, Plan, PlanLimits, Subscription, UsageMetrics,
    UsagePeriod,
};

/// Billing dashboard for one organization. Absent sections are `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingOverview {
    pub current_subscription: Option<Subscription>,
    pub current_plan: Option<Plan>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub next_billing_amount: Option<Decimal>,
    pub current_usage: UsageMetrics,
    pub plan_limits: Option<PlanLimits>,
    pub unpaid_invoices: Vec<InvoiceWithLineItems>,
    pub recent_payments: Vec<Payment>,
}

/// Current usage against plan limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub organization_id: Uuid,
    pub period: UsagePeriod,
    pub usage: UsageMetrics,
    pub limits: Option<PlanLimits>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryItemKind {
    Invoice,
    Payment,
}

/// One row of the merged invoice/payment feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingHistoryItem {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: HistoryItemKind,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub description: String,
    pub date: DateTime<Utc>,
}

impl From<&Invoice> for BillingHistoryItem {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id,
            kind: HistoryItemKind::Invoice,
            amount: invoice.total_amount,
            currency: invoice.currency.clone(),
            status: invoice.status.clone(),
            description: format!("Invoice {}", invoice.invoice_number),
            date: invoice.created_at,
        }
    }
}

impl From<&Payment> for BillingHistoryItem {
    fn from(payment: &Payment) -> Self {
        let description = match payment.invoice_id {
            Some(_) => "Invoice payment".to_string(),
            None => "Payment".to_string(),
        };
        Self {
            id: payment.id,
            kind: HistoryItemKind::Payment,
            amount: payment.amount,
            currency: payment.currency.clone(),
            status: payment.status.clone(),
            description,
            date: payment.processed_at.unwrap_or(payment.created_at),
        }
    }
}
