//! Application startup and lifecycle management.

use crate::config::BillingConfig;
use crate::handlers::{
    billing, health, invoices, organizations, payment_methods, payments, plans, subscriptions,
    usage,
};
use crate::services::{
    init_metrics, notifier, BillingEvents, BillingOverviewService, Database, InvoicingEngine,
    Organizations, PaymentLedger, PaymentMethods, PlanCatalog, SubscriptionManager, UsageMeter,
};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{request_id, request_id_middleware};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state. Every component holds a clone of the same pool.
#[derive(Clone)]
pub struct AppState {
    pub config: BillingConfig,
    pub db: Database,
    pub plans: PlanCatalog,
    pub organizations: Organizations,
    pub subscriptions: SubscriptionManager,
    pub usage: UsageMeter,
    pub invoices: InvoicingEngine,
    pub payments: PaymentLedger,
    pub payment_methods: PaymentMethods,
    pub events: BillingEvents,
    pub overview: BillingOverviewService,
}

impl AppState {
    /// Wire every component onto one database handle.
    pub fn new(config: BillingConfig, db: Database) -> Self {
        let settings = config.billing.clone();
        let notifier = notifier::from_webhook_url(config.notifications.webhook_url.as_deref());

        let plans = PlanCatalog::new(db.clone());
        let organizations = Organizations::new(db.clone(), notifier, settings.clone());
        let subscriptions = SubscriptionManager::new(db.clone(), settings.clone());
        let usage = UsageMeter::new(db.clone());
        let invoices = InvoicingEngine::new(db.clone());
        let payments = PaymentLedger::new(db.clone());
        let overview = BillingOverviewService::new(
            organizations.clone(),
            plans.clone(),
            subscriptions.clone(),
            usage.clone(),
            invoices.clone(),
            payments.clone(),
            settings,
        );

        Self {
            payment_methods: PaymentMethods::new(db.clone()),
            events: BillingEvents::new(db.clone()),
            config,
            db,
            plans,
            organizations,
            subscriptions,
            usage,
            invoices,
            payments,
            overview,
        }
    }
}

/// Build the HTTP router over `state`.
pub fn router(state: AppState) -> Router {
    let organization_routes = Router::new()
        .route(
            "/",
            post(organizations::create_organization).get(organizations::list_my_organizations),
        )
        .route("/:organization_id", get(organizations::get_organization))
        // Membership
        .route("/:organization_id/members", get(organizations::list_members))
        .route(
            "/:organization_id/members/:user_id",
            axum::routing::delete(organizations::remove_member),
        )
        .route(
            "/:organization_id/members/:user_id/role",
            put(organizations::update_member_role),
        )
        .route(
            "/:organization_id/invitations",
            post(organizations::invite_member).get(organizations::list_invitations),
        )
        .route(
            "/:organization_id/invitations/:invitation_id",
            axum::routing::delete(organizations::cancel_invitation),
        )
        // Subscriptions
        .route(
            "/:organization_id/subscription",
            get(subscriptions::get_active_subscription).post(subscriptions::create_subscription),
        )
        .route(
            "/:organization_id/subscription/latest",
            get(subscriptions::get_latest_subscription),
        )
        .route(
            "/:organization_id/subscription/plan",
            put(subscriptions::change_plan),
        )
        .route(
            "/:organization_id/subscription/cancel",
            post(subscriptions::cancel_subscription),
        )
        .route(
            "/:organization_id/subscription/reactivate",
            post(subscriptions::reactivate_subscription),
        )
        .route(
            "/:organization_id/subscription/rollover",
            post(subscriptions::rollover_subscription),
        )
        .route(
            "/:organization_id/subscriptions",
            get(subscriptions::list_subscription_history),
        )
        .route(
            "/:organization_id/subscriptions/:subscription_id",
            get(subscriptions::get_subscription),
        )
        .route(
            "/:organization_id/subscriptions/:subscription_id/activate",
            post(subscriptions::activate_subscription),
        )
        .route(
            "/:organization_id/subscriptions/:subscription_id/payments",
            get(payments::list_subscription_payments),
        )
        // Usage
        .route(
            "/:organization_id/usage",
            get(usage::get_current_usage).put(usage::set_usage),
        )
        .route("/:organization_id/usage/report", get(usage::usage_report))
        .route("/:organization_id/usage/history", get(usage::usage_history))
        .route(
            "/:organization_id/usage/increment",
            post(usage::increment_usage),
        )
        // Invoices
        .route(
            "/:organization_id/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route(
            "/:organization_id/invoices/unpaid",
            get(invoices::list_unpaid_invoices),
        )
        .route(
            "/:organization_id/invoices/number/:invoice_number",
            get(invoices::get_invoice_by_number),
        )
        .route(
            "/:organization_id/invoices/:invoice_id",
            get(invoices::get_invoice).delete(invoices::delete_invoice),
        )
        .route(
            "/:organization_id/invoices/:invoice_id/status",
            put(invoices::update_invoice_status),
        )
        .route(
            "/:organization_id/invoices/:invoice_id/pay",
            post(invoices::pay_invoice),
        )
        .route(
            "/:organization_id/invoices/:invoice_id/download",
            get(invoices::download_invoice),
        )
        .route(
            "/:organization_id/invoices/:invoice_id/payments",
            get(invoices::list_invoice_payments),
        )
        // Payments
        .route(
            "/:organization_id/payments",
            get(payments::list_payments).post(payments::record_payment),
        )
        .route(
            "/:organization_id/payments/:payment_id",
            get(payments::get_payment),
        )
        .route(
            "/:organization_id/payments/:payment_id/status",
            put(payments::update_payment_status),
        )
        .route(
            "/:organization_id/payments/:payment_id/fail",
            post(payments::fail_payment),
        )
        // Payment methods
        .route(
            "/:organization_id/payment-methods",
            get(payment_methods::list_payment_methods)
                .post(payment_methods::create_payment_method),
        )
        .route(
            "/:organization_id/payment-methods/:payment_method_id",
            get(payment_methods::get_payment_method)
                .put(payment_methods::update_payment_method)
                .delete(payment_methods::delete_payment_method),
        )
        .route(
            "/:organization_id/payment-methods/:payment_method_id/default",
            post(payment_methods::set_default_payment_method),
        )
        // Aggregated views
        .route(
            "/:organization_id/billing/overview",
            get(billing::billing_overview),
        )
        .route(
            "/:organization_id/billing/history",
            get(billing::billing_history),
        )
        .route(
            "/:organization_id/billing/events",
            get(billing::billing_events),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route("/plans", get(plans::list_plans))
        .route("/plans/compare", get(plans::compare_plans))
        .route("/plans/slug/:slug", get(plans::get_plan_by_slug))
        .route("/plans/:plan_id", get(plans::get_plan))
        .route("/invitations/accept", post(organizations::accept_invitation))
        .nest("/organizations", organization_routes)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    request_id = %request_id(request),
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;

        Self::with_database(config, db).await
    }

    /// Bind the listener over an already connected database.
    pub async fn with_database(config: BillingConfig, db: Database) -> Result<Self, AppError> {
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Billing service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state: AppState::new(config, db),
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = router(self.state);

        tracing::info!(
            service = "billing-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, app).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
