//! Configuration for billing-service.

use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed, is_production};
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub notifications: NotificationConfig,
    pub billing: BillingSettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Invitation notices are POSTed here; logged only when unset.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingSettings {
    pub default_currency: String,
    pub invoice_due_days: i64,
    pub invitation_ttl_days: i64,
    pub recent_payments_limit: i64,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            invoice_due_days: 14,
            invitation_ttl_days: 7,
            recent_payments_limit: 5,
        }
    }
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common = core_config::Config::load()?;
        let is_prod = is_production();
        let defaults = BillingSettings::default();

        Ok(BillingConfig {
            common,
            service_name: get_env("SERVICE_NAME", Some("billing-service"), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: Secret::new(get_env("DATABASE_URL", None, is_prod)?),
                max_connections: get_env_parsed("DATABASE_MAX_CONNECTIONS", 10, false)?,
                min_connections: get_env_parsed("DATABASE_MIN_CONNECTIONS", 1, false)?,
            },
            notifications: NotificationConfig {
                webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                    .ok()
                    .filter(|s| !s.is_empty()),
            },
            billing: BillingSettings {
                default_currency: get_env(
                    "DEFAULT_CURRENCY",
                    Some(&defaults.default_currency),
                    false,
                )?,
                invoice_due_days: get_env_parsed(
                    "INVOICE_DUE_DAYS",
                    defaults.invoice_due_days,
                    false,
                )?,
                invitation_ttl_days: get_env_parsed(
                    "INVITATION_TTL_DAYS",
                    defaults.invitation_ttl_days,
                    false,
                )?,
                recent_payments_limit: get_env_parsed(
                    "RECENT_PAYMENTS_LIMIT",
                    defaults.recent_payments_limit,
                    false,
                )?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    #[serial]
    fn loads_defaults_with_database_url() {
        env::set_var("DATABASE_URL", "postgres://localhost/billing");
        env::remove_var("INVOICE_DUE_DAYS");
        env::remove_var("NOTIFICATION_WEBHOOK_URL");

        let config = BillingConfig::from_env().unwrap();
        assert_eq!(
            config.database.url.expose_secret(),
            "postgres://localhost/billing"
        );
        assert_eq!(config.billing.invoice_due_days, 14);
        assert_eq!(config.billing.invitation_ttl_days, 7);
        assert!(config.notifications.webhook_url.is_none());

        env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn rejects_non_numeric_limits() {
        env::set_var("DATABASE_URL", "postgres://localhost/billing");
        env::set_var("RECENT_PAYMENTS_LIMIT", "five");

        assert!(matches!(
            BillingConfig::from_env(),
            Err(AppError::ConfigError(_))
        ));

        env::remove_var("RECENT_PAYMENTS_LIMIT");
        env::remove_var("DATABASE_URL");
    }
}
