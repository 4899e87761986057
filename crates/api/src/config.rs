//! Application configuration loaded from environment variables.

use std::str::FromStr;

use checkout::{CheckoutSettings, RefundPolicy};
use common::CommissionRate;
use thiserror::Error;

/// Which card processor the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardProviderKind {
    /// Card payments are recorded as requiring action.
    #[default]
    None,
    /// Process-local provider, for demos and tests.
    InMemory,
}

impl FromStr for CardProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(CardProviderKind::None),
            "in-memory" | "memory" => Ok(CardProviderKind::InMemory),
            other => Err(ConfigError::Invalid {
                key: "CARD_PROVIDER",
                value: other.to_string(),
            }),
        }
    }
}

/// Longest accepted cart inactivity window: ten years.
pub const MAX_CART_TTL_HOURS: i64 = 24 * 365 * 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` bind address (default: `"0.0.0.0"`)
/// - `PORT` listen port (default: `3000`)
/// - `RUST_LOG` tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS` pool size (default: `5`)
/// - `COMMISSION_RATE_BPS` platform commission in basis points (default: `1000`)
/// - `CART_TTL_HOURS` cart inactivity window, `1..=87600` (default: `168`)
/// - `CURRENCY` currency code sent to the card provider (default: `"EGP"`)
/// - `CARD_PROVIDER` `none` or `in-memory` (default: `none`)
/// - `CARD_FALLBACK_TO_PENDING` keep card checkouts alive when the provider fails (default: `true`)
/// - `REFUND_CANCELS_ORDER` `any` or `full` (default: `any`)
/// - `EXPOSE_ERROR_DETAILS` include internal error text in responses (default: `false`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub commission_rate_bps: u32,
    pub cart_ttl_hours: i64,
    pub currency: String,
    pub card_provider: CardProviderKind,
    pub card_fallback_to_pending: bool,
    pub refund_policy: RefundPolicy,
    pub expose_error_details: bool,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn cart_ttl_hours(default: i64) -> Result<i64, ConfigError> {
    let hours = parse_or("CART_TTL_HOURS", default)?;
    check_cart_ttl(hours)
}

fn check_cart_ttl(hours: i64) -> Result<i64, ConfigError> {
    if (1..=MAX_CART_TTL_HOURS).contains(&hours) {
        Ok(hours)
    } else {
        Err(ConfigError::Invalid {
            key: "CART_TTL_HOURS",
            value: hours.to_string(),
        })
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Values that are present but malformed are rejected rather than
    /// silently replaced.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let refund_policy = match var("REFUND_CANCELS_ORDER") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "REFUND_CANCELS_ORDER",
                value,
            })?,
            None => defaults.refund_policy,
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", defaults.port)?,
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_or(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            commission_rate_bps: parse_or("COMMISSION_RATE_BPS", defaults.commission_rate_bps)?,
            cart_ttl_hours: cart_ttl_hours(defaults.cart_ttl_hours)?,
            currency: var("CURRENCY").unwrap_or(defaults.currency),
            card_provider: parse_or("CARD_PROVIDER", defaults.card_provider)?,
            card_fallback_to_pending: parse_or(
                "CARD_FALLBACK_TO_PENDING",
                defaults.card_fallback_to_pending,
            )?,
            refund_policy,
            expose_error_details: parse_or("EXPOSE_ERROR_DETAILS", defaults.expose_error_details)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Business settings for the checkout services.
    ///
    /// The cart window is clamped to `1..=MAX_CART_TTL_HOURS`.
    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            commission_rate: CommissionRate::from_basis_points(self.commission_rate_bps),
            cart_ttl: chrono::Duration::hours(self.cart_ttl_hours.clamp(1, MAX_CART_TTL_HOURS)),
            currency: self.currency.clone(),
            card_fallback_to_pending: self.card_fallback_to_pending,
            refund_policy: self.refund_policy,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 5,
            commission_rate_bps: 1000,
            cart_ttl_hours: 168,
            currency: "EGP".to_string(),
            card_provider: CardProviderKind::None,
            card_fallback_to_pending: true,
            refund_policy: RefundPolicy::CancelOnAnyRefund,
            expose_error_details: false,
        }
    }
}
