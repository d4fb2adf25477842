//! Configuration for backoffice-service.

use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct BackofficeConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub invoicing: InvoicingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Business defaults applied by the invoice workflow and the stock catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoicingSettings {
    /// Discount percentage used when an invoice request carries none.
    pub default_discount_rate: Decimal,
    /// Low-stock threshold for items created without one.
    pub low_stock_threshold: i64,
}

impl Default for InvoicingSettings {
    fn default() -> Self {
        Self {
            default_discount_rate: Decimal::from(15),
            low_stock_threshold: 10,
        }
    }
}

impl BackofficeConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";
        let defaults = InvoicingSettings::default();

        Ok(BackofficeConfig {
            common: common_config,
            service_name: get_env("SERVICE_NAME", Some("backoffice-service"), false)?,
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DB_MAX_CONNECTIONS", 10)?,
                min_connections: parse_env("DB_MIN_CONNECTIONS", 1)?,
            },
            invoicing: InvoicingSettings {
                default_discount_rate: parse_env(
                    "DEFAULT_DISCOUNT_RATE",
                    defaults.default_discount_rate,
                )?,
                low_stock_threshold: parse_env("LOW_STOCK_THRESHOLD", defaults.low_stock_threshold)?,
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoicing_defaults() {
        let settings = InvoicingSettings::default();
        assert_eq!(settings.default_discount_rate, Decimal::from(15));
        assert_eq!(settings.low_stock_threshold, 10);
    }

    #[test]
    fn get_env_falls_back_outside_production() {
        let value = get_env("BACKOFFICE_TEST_UNSET_KEY", Some("fallback"), false).unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn get_env_requires_value_in_production() {
        let err = get_env("BACKOFFICE_TEST_UNSET_KEY", Some("fallback"), true).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn parse_env_uses_default_when_unset() {
        let value: u32 = parse_env("BACKOFFICE_TEST_UNSET_NUMBER", 7).unwrap();
        assert_eq!(value, 7);
    }
}
