//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CHECKOUT_PORT=8080                                                 │
//! │     CHECKOUT_STRIPE_SECRET_KEY=sk_live_...                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/checkout/checkout.toml (Linux)                           │
//! │     ~/Library/Application Support/com.storefront.checkout/ (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     8% tax, 30-day returns, 50-point blocks, providers disabled        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # checkout.toml
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 8080
//!
//! [database]
//! path = "/var/lib/checkout/checkout.db"
//!
//! [pricing]
//! tax_bps = 800
//!
//! [loyalty]
//! earn_unit_cents = 1000
//! points_per_dollar = 50
//! block_size = 50
//!
//! [returns]
//! window_days = 30
//!
//! [providers.stripe]
//! enabled = true
//! secret_key = "sk_test_..."
//! webhook_secret = "whsec_..."
//! timeout_secs = 15
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use checkout_core::loyalty::LoyaltyProgram;
use checkout_core::returns::ReturnPolicy;
use checkout_core::{PaymentProvider, TaxRate, DEFAULT_TAX_BPS};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Server Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Carts untouched this long are dropped.
    #[serde(default = "default_cart_idle_secs")]
    pub cart_idle_secs: u64,

    /// Most carts held in memory at once.
    #[serde(default = "default_max_carts")]
    pub max_carts: usize,
}

fn default_cart_idle_secs() -> u64 {
    2 * 60 * 60
}

fn default_max_carts() -> usize {
    10_000
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
            cart_idle_secs: default_cart_idle_secs(),
            max_carts: default_max_carts(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Relative paths resolve against the working directory.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("checkout.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Money Rules
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Sales tax in basis points (800 = 8%).
    #[serde(default = "default_tax_bps")]
    pub tax_bps: u32,
}

fn default_tax_bps() -> u32 {
    DEFAULT_TAX_BPS
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            tax_bps: default_tax_bps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltySettings {
    /// Paid cents that earn one point.
    #[serde(default = "default_earn_unit")]
    pub earn_unit_cents: i64,

    /// Points redeemed per dollar of discount.
    #[serde(default = "default_points_per_dollar")]
    pub points_per_dollar: i64,

    /// Redemptions must be a multiple of this.
    #[serde(default = "default_block_size")]
    pub block_size: i64,
}

fn default_earn_unit() -> i64 {
    1000
}
fn default_points_per_dollar() -> i64 {
    50
}
fn default_block_size() -> i64 {
    50
}

impl Default for LoyaltySettings {
    fn default() -> Self {
        LoyaltySettings {
            earn_unit_cents: default_earn_unit(),
            points_per_dollar: default_points_per_dollar(),
            block_size: default_block_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnSettings {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

fn default_window_days() -> i64 {
    30
}

impl Default for ReturnSettings {
    fn default() -> Self {
        ReturnSettings {
            window_days: default_window_days(),
        }
    }
}

// =============================================================================
// Provider Settings
// =============================================================================

/// Credentials and limits for one payment rail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub enabled: bool,

    pub base_url: String,

    /// Only the wallet rail authenticates with a separate client id.
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub secret_key: Option<String>,

    /// HMAC key for `POST /webhooks/{provider}`.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Upper bound on any single provider call.
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    15
}

impl ProviderSettings {
    fn disabled(base_url: &str) -> Self {
        ProviderSettings {
            enabled: false,
            base_url: base_url.to_string(),
            client_id: None,
            secret_key: None,
            webhook_secret: None,
            timeout_secs: default_provider_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_stripe")]
    pub stripe: ProviderSettings,

    #[serde(default = "default_paypal")]
    pub paypal: ProviderSettings,
}

fn default_stripe() -> ProviderSettings {
    ProviderSettings::disabled("https://api.stripe.com")
}

fn default_paypal() -> ProviderSettings {
    ProviderSettings::disabled("https://api-m.paypal.com")
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            stripe: default_stripe(),
            paypal: default_paypal(),
        }
    }
}

impl ProvidersConfig {
    /// Settings for an online rail; COD has none.
    pub fn get(&self, provider: PaymentProvider) -> Option<&ProviderSettings> {
        match provider {
            PaymentProvider::Stripe => Some(&self.stripe),
            PaymentProvider::Paypal => Some(&self.paypal),
            PaymentProvider::Cod => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: default_log_level(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub pricing: PricingSettings,

    #[serde(default)]
    pub loyalty: LoyaltySettings,

    #[serde(default)]
    pub returns: ReturnSettings,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (checkout.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading checkout config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Checkout config saved");
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.pricing.tax_bps > 10_000 {
            return Err(EngineError::InvalidConfig(
                "pricing.tax_bps must be at most 10000".into(),
            ));
        }

        if self.loyalty.block_size <= 0 {
            return Err(EngineError::InvalidConfig(
                "loyalty.block_size must be greater than 0".into(),
            ));
        }
        if self.loyalty.points_per_dollar <= 0 {
            return Err(EngineError::InvalidConfig(
                "loyalty.points_per_dollar must be greater than 0".into(),
            ));
        }
        if self.loyalty.earn_unit_cents <= 0 {
            return Err(EngineError::InvalidConfig(
                "loyalty.earn_unit_cents must be greater than 0".into(),
            ));
        }

        if self.returns.window_days < 0 {
            return Err(EngineError::InvalidConfig(
                "returns.window_days cannot be negative".into(),
            ));
        }

        if self.server.cart_idle_secs == 0 || self.server.max_carts == 0 {
            return Err(EngineError::InvalidConfig(
                "server.cart_idle_secs and server.max_carts must be greater than 0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        for (name, settings) in [
            ("stripe", &self.providers.stripe),
            ("paypal", &self.providers.paypal),
        ] {
            if settings.timeout_secs == 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "providers.{}.timeout_secs must be greater than 0",
                    name
                )));
            }
            if settings.enabled && settings.secret_key.as_deref().unwrap_or("").is_empty() {
                return Err(EngineError::InvalidConfig(format!(
                    "providers.{} is enabled but has no secret_key",
                    name
                )));
            }
            if !settings.base_url.starts_with("https://") && !settings.base_url.starts_with("http://") {
                return Err(EngineError::InvalidConfig(format!(
                    "providers.{}.base_url must be an http(s) URL, got: {}",
                    name, settings.base_url
                )));
            }
        }

        Ok(())
    }

    /// Applies `CHECKOUT_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("CHECKOUT_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Some(port) = lookup("CHECKOUT_PORT") {
            match port.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "Overriding port from environment");
                    self.server.port = p;
                }
                Err(_) => warn!(port = %port, "Ignoring invalid CHECKOUT_PORT"),
            }
        }

        if let Some(path) = lookup("CHECKOUT_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }

        if let Some(bps) = lookup("CHECKOUT_TAX_BPS") {
            if let Ok(b) = bps.parse::<u32>() {
                self.pricing.tax_bps = b;
            }
        }

        if let Some(days) = lookup("CHECKOUT_RETURN_WINDOW_DAYS") {
            if let Ok(d) = days.parse::<i64>() {
                self.returns.window_days = d;
            }
        }

        if let Some(level) = lookup("CHECKOUT_LOG_LEVEL") {
            self.logging.level = level;
        }

        // A secret from the environment switches the rail on.
        if let Some(key) = lookup("CHECKOUT_STRIPE_SECRET_KEY") {
            debug!("Enabling stripe from environment");
            self.providers.stripe.secret_key = Some(key);
            self.providers.stripe.enabled = true;
        }
        if let Some(secret) = lookup("CHECKOUT_STRIPE_WEBHOOK_SECRET") {
            self.providers.stripe.webhook_secret = Some(secret);
        }

        if let Some(id) = lookup("CHECKOUT_PAYPAL_CLIENT_ID") {
            self.providers.paypal.client_id = Some(id);
        }
        if let Some(key) = lookup("CHECKOUT_PAYPAL_SECRET") {
            debug!("Enabling paypal from environment");
            self.providers.paypal.secret_key = Some(key);
            self.providers.paypal.enabled = true;
        }
        if let Some(secret) = lookup("CHECKOUT_PAYPAL_WEBHOOK_SECRET") {
            self.providers.paypal.webhook_secret = Some(secret);
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "storefront", "checkout")
            .map(|dirs| dirs.config_dir().join("checkout.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.pricing.tax_bps)
    }

    pub fn loyalty_program(&self) -> LoyaltyProgram {
        LoyaltyProgram {
            earn_unit_cents: self.loyalty.earn_unit_cents,
            points_per_dollar: self.loyalty.points_per_dollar,
            block_size: self.loyalty.block_size,
        }
    }

    pub fn return_policy(&self) -> ReturnPolicy {
        ReturnPolicy {
            window_days: self.returns.window_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tax_rate().bps(), 800);
        assert_eq!(config.loyalty_program(), LoyaltyProgram::default());
        assert_eq!(config.return_policy().window_days, 30);
        assert!(!config.providers.stripe.enabled);
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();

        config.loyalty.block_size = 0;
        assert!(config.validate().is_err());
        config.loyalty.block_size = 50;

        config.loyalty.points_per_dollar = 0;
        assert!(config.validate().is_err());
        config.loyalty.points_per_dollar = 50;

        config.server.max_carts = 0;
        assert!(config.validate().is_err());
        config.server.max_carts = 100;

        config.providers.paypal.timeout_secs = 0;
        assert!(config.validate().is_err());
        config.providers.paypal.timeout_secs = 10;

        config.providers.stripe.enabled = true;
        assert!(config.validate().is_err());
        config.providers.stripe.secret_key = Some("sk_test_1".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [pricing]
            tax_bps = 725

            [providers.stripe]
            enabled = true
            base_url = "https://stripe.test"
            secret_key = "sk_test_1"
            "#,
        )
        .unwrap();

        assert_eq!(config.pricing.tax_bps, 725);
        assert_eq!(config.returns.window_days, 30);
        assert_eq!(config.server.max_carts, 10_000);
        assert_eq!(config.providers.stripe.timeout_secs, 15);
        assert_eq!(config.providers.paypal.base_url, "https://api-m.paypal.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("CHECKOUT_PORT", "9090"),
            ("CHECKOUT_TAX_BPS", "0"),
            ("CHECKOUT_STRIPE_SECRET_KEY", "sk_env"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.pricing.tax_bps, 0);
        assert!(config.providers.stripe.enabled);
        assert_eq!(config.providers.stripe.secret_key.as_deref(), Some("sk_env"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&EngineConfig::default()).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[providers.stripe]"));
    }
}
