//! Billing overview aggregator: read-only views composed from the other
//! components.

use crate::config::BillingSettings;
use crate::models::{
    BillingCycle, BillingHistoryItem, BillingOverview, Invoice, Payment, Plan, UsageMetrics,
    UsageReport,
};
use crate::services::usage::current_period;
use crate::services::{
    InvoicingEngine, Organizations, PaymentLedger, PlanCatalog, SubscriptionManager, UsageMeter,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::response::{Page, PAGE_SIZE};
use tracing::instrument;
use uuid::Uuid;

/// Invoices and payments as one feed, newest first. Equal dates order by id.
pub fn merge_history(invoices: &[Invoice], payments: &[Payment]) -> Vec<BillingHistoryItem> {
    let mut items: Vec<BillingHistoryItem> = invoices
        .iter()
        .map(BillingHistoryItem::from)
        .chain(payments.iter().map(BillingHistoryItem::from))
        .collect();
    items.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    items
}

/// Price of the next period. Organizations without a recorded cycle bill monthly.
pub fn next_billing_amount(plan: Option<&Plan>, cycle: Option<BillingCycle>) -> Option<Decimal> {
    plan.map(|p| p.price_for(cycle.unwrap_or(BillingCycle::Monthly)))
}

#[derive(Clone)]
pub struct BillingOverviewService {
    organizations: Organizations,
    plans: PlanCatalog,
    subscriptions: SubscriptionManager,
    usage: UsageMeter,
    invoices: InvoicingEngine,
    payments: PaymentLedger,
    settings: BillingSettings,
}

impl BillingOverviewService {
    pub fn new(
        organizations: Organizations,
        plans: PlanCatalog,
        subscriptions: SubscriptionManager,
        usage: UsageMeter,
        invoices: InvoicingEngine,
        payments: PaymentLedger,
        settings: BillingSettings,
    ) -> Self {
        Self {
            organizations,
            plans,
            subscriptions,
            usage,
            invoices,
            payments,
            settings,
        }
    }

    async fn current_plan(&self, plan_id: Option<Uuid>) -> Result<Option<Plan>, AppError> {
        match plan_id {
            Some(id) => self.plans.find_any(id).await,
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn overview(&self, organization_id: Uuid) -> Result<BillingOverview, AppError> {
        let organization = self.organizations.get_organization(organization_id).await?;

        let subscription = self
            .subscriptions
            .get_active_subscription(organization_id)
            .await?;
        let plan = self.current_plan(organization.plan_id).await?;
        let usage = self.usage.get_current_usage(organization_id).await?;
        let unpaid_invoices = self.invoices.list_unpaid(organization_id).await?;
        let recent_payments = self
            .payments
            .list_recent(organization_id, self.settings.recent_payments_limit)
            .await?;

        Ok(BillingOverview {
            next_billing_date: subscription.as_ref().map(|s| s.current_period_end),
            next_billing_amount: next_billing_amount(plan.as_ref(), organization.billing_cycle()),
            current_subscription: subscription,
            plan_limits: plan.as_ref().map(Plan::limits),
            current_plan: plan,
            current_usage: usage.map(|u| u.metrics()).unwrap_or_default(),
            unpaid_invoices,
            recent_payments,
        })
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn usage_report(&self, organization_id: Uuid) -> Result<UsageReport, AppError> {
        let organization = self.organizations.get_organization(organization_id).await?;
        let plan = self.current_plan(organization.plan_id).await?;
        let usage = self.usage.get_current_usage(organization_id).await?;

        Ok(UsageReport {
            organization_id,
            period: current_period()?,
            usage: usage
                .as_ref()
                .map(|u| u.metrics())
                .unwrap_or_else(UsageMetrics::default),
            limits: plan.as_ref().map(Plan::limits),
        })
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, page = page))]
    pub async fn billing_history(
        &self,
        organization_id: Uuid,
        page: i64,
    ) -> Result<Page<BillingHistoryItem>, AppError> {
        let invoices = self
            .invoices
            .list_all_for_organization(organization_id)
            .await?;
        let payments = self
            .payments
            .list_all_for_organization(organization_id)
            .await?;

        Ok(Page::from_vec(
            merge_history(&invoices, &payments),
            page,
            PAGE_SIZE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoryItemKind;
    use chrono::{DateTime, Duration, Utc};
    use std::str::FromStr;

    fn invoice(number: &str, total: &str, created_at: DateTime<Utc>) -> Invoice {
        let total = Decimal::from_str(total).unwrap();
        Invoice {
            id: Uuid::new_v4(),
            organization_id: Uuid::nil(),
            subscription_id: None,
            invoice_number: number.to_string(),
            amount: total,
            tax_amount: Decimal::ZERO,
            total_amount: total,
            currency: "USD".to_string(),
            status: "sent".to_string(),
            billing_period_start: None,
            billing_period_end: None,
            due_date: None,
            paid_at: None,
            invoice_url: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn payment(invoice_id: Option<Uuid>, processed_at: Option<DateTime<Utc>>, created_at: DateTime<Utc>) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            organization_id: Uuid::nil(),
            invoice_id,
            subscription_id: None,
            external_payment_id: None,
            external_payer_id: None,
            amount: Decimal::new(2500, 2),
            currency: "USD".to_string(),
            payment_method: "external_processor".to_string(),
            status: "completed".to_string(),
            failure_reason: None,
            processed_at,
            created_at,
            updated_at: created_at,
        }
    }

    fn plan(monthly: i64, yearly: i64) -> Plan {
        let now = Utc::now();
        Plan {
            id: Uuid::new_v4(),
            name: "Starter".to_string(),
            slug: "starter".to_string(),
            description: None,
            price_monthly: Decimal::new(monthly, 2),
            price_yearly: Decimal::new(yearly, 2),
            max_users: 5,
            max_projects: 10,
            max_environments: 3,
            max_schemas: 20,
            max_test_records_per_schema: 1000,
            features: serde_json::json!([]),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn history_is_newest_first_across_kinds() {
        let t0 = Utc::now() - Duration::days(10);
        let old_invoice = invoice("INV-2025-000001", "25.00", t0);
        let new_invoice = invoice("INV-2025-000002", "40.00", t0 + Duration::days(5));
        let paid = payment(
            Some(old_invoice.id),
            Some(t0 + Duration::days(2)),
            t0 + Duration::days(1),
        );

        let items = merge_history(&[old_invoice.clone(), new_invoice.clone()], &[paid.clone()]);

        let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![new_invoice.id, paid.id, old_invoice.id]);
        assert_eq!(items[1].kind, HistoryItemKind::Payment);
        assert_eq!(items[1].description, "Invoice payment");
        assert_eq!(items[2].description, "Invoice INV-2025-000001");
    }

    #[test]
    fn unprocessed_payment_is_dated_by_creation() {
        let created = Utc::now() - Duration::hours(3);
        let items = merge_history(&[], &[payment(None, None, created)]);
        assert_eq!(items[0].date, created);
        assert_eq!(items[0].description, "Payment");
    }

    #[test]
    fn equal_dates_order_by_id() {
        let at = Utc::now();
        let a = invoice("INV-2025-000010", "1.00", at);
        let b = invoice("INV-2025-000011", "1.00", at);
        let items = merge_history(&[a.clone(), b.clone()], &[]);
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn history_pages_hold_fifty_items() {
        let at = Utc::now();
        let invoices: Vec<Invoice> = (0..60)
            .map(|i| invoice(&format!("INV-2025-{:06}", i), "1.00", at - Duration::minutes(i)))
            .collect();
        let merged = merge_history(&invoices, &[]);

        let first = Page::from_vec(merged.clone(), 0, PAGE_SIZE);
        let second = Page::from_vec(merged, 1, PAGE_SIZE);
        assert_eq!(first.items.len(), 50);
        assert_eq!(second.items.len(), 10);
        assert_eq!(first.meta().total_pages, 2);
    }

    #[test]
    fn next_amount_follows_billing_cycle() {
        let p = plan(2900, 29000);
        assert_eq!(
            next_billing_amount(Some(&p), Some(BillingCycle::Yearly)),
            Some(Decimal::new(29000, 2))
        );
        assert_eq!(
            next_billing_amount(Some(&p), None),
            Some(Decimal::new(2900, 2))
        );
        assert_eq!(next_billing_amount(None, Some(BillingCycle::Monthly)), None);
    }
}
