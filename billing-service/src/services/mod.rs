//! Services module for billing-service.

pub mod database;
pub mod events;
pub mod invoices;
pub mod metrics;
pub mod notifier;
pub mod organizations;
pub mod overview;
pub mod payment_methods;
pub mod payments;
pub mod plans;
pub mod subscriptions;
pub mod usage;

pub use database::Database;
pub use events::BillingEvents;
pub use invoices::{InvoicingEngine, PayInvoice};
pub use metrics::{get_metrics, init_metrics, record_error};
pub use notifier::{LogNotifier, Notifier, WebhookNotifier};
pub use organizations::Organizations;
pub use overview::BillingOverviewService;
pub use payment_methods::PaymentMethods;
pub use payments::PaymentLedger;
pub use plans::PlanCatalog;
pub use subscriptions::{RolloverOutcome, SubscriptionManager};
pub use usage::UsageMeter;
