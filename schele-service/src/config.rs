//! Configuration module for schele-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct ScheleConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Settings printed on generated documents.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub currency: String,
    pub supplier: SupplierConfig,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            currency: "RON".to_string(),
            supplier: SupplierConfig::default(),
        }
    }
}

/// Supplier party filled into contracts that do not name their own.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierConfig {
    pub name: String,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub bank_account: Option<String>,
    pub bank_name: Option<String>,
}

impl Default for SupplierConfig {
    fn default() -> Self {
        Self {
            name: "A.D. SCHELE".to_string(),
            tax_id: None,
            address: None,
            phone: None,
            email: None,
            bank_account: None,
            bank_name: None,
        }
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl ScheleConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "schele-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            billing: BillingConfig {
                currency: optional("BILLING_CURRENCY")
                    .unwrap_or_else(|| BillingConfig::default().currency),
                supplier: SupplierConfig {
                    name: optional("SUPPLIER_NAME")
                        .unwrap_or_else(|| SupplierConfig::default().name),
                    tax_id: optional("SUPPLIER_TAX_ID"),
                    address: optional("SUPPLIER_ADDRESS"),
                    phone: optional("SUPPLIER_PHONE"),
                    email: optional("SUPPLIER_EMAIL"),
                    bank_account: optional("SUPPLIER_BANK_ACCOUNT"),
                    bank_name: optional("SUPPLIER_BANK_NAME"),
                },
            },
        })
    }
}
