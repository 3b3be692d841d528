//! Domain models for billing-service.

mod billing_event;
mod invoice;
mod membership;
mod organization;
mod overview;
mod payment;
mod payment_method;
mod plan;
mod subscription;
mod usage;

pub use billing_event::{BillingEvent, BillingEventType};
pub use invoice::{
    format_invoice_number, invoice_year, CreateInvoice, Invoice, InvoiceLineItem, InvoiceStatus,
    InvoiceTotals, InvoiceWithLineItems, NewLineItem,
};
pub use membership::{
    InvitationStatus, InviteMember, MemberRole, OrganizationInvitation, OrganizationMember,
};
pub use organization::{CreateOrganization, Organization};
pub use overview::{BillingHistoryItem, BillingOverview, HistoryItemKind, UsageReport};
pub use payment::{CreatePayment, Payment, PaymentMethodKind, PaymentStatus};
pub use payment_method::{CreatePaymentMethod, PaymentMethod, UpdatePaymentMethod};
pub use plan::{CreatePlan, Plan, PlanLimits};
pub use subscription::{BillingCycle, CreateSubscription, Subscription, SubscriptionStatus};
pub use usage::{OrganizationUsage, UsageField, UsageMetrics, UsagePeriod};
