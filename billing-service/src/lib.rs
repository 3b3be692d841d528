//! Billing service: plan catalog, subscription lifecycle, usage metering,
//! invoicing and payment records for multi-tenant organizations.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{AppState, Application};
