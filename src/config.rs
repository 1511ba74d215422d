//! Application configuration loaded from environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::venue::client::base_url;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Execution ===
    /// Quantity (BTC) to price against the unified book.
    #[serde(default = "default_target_quantity")]
    pub target_quantity: Decimal,

    /// Minimum price increment used when presenting average prices.
    #[serde(default = "default_price_increment")]
    pub price_increment: Decimal,

    /// Keep only the best N levels per venue side (unset keeps all).
    #[serde(default)]
    pub book_depth: Option<usize>,

    // === Polling ===
    /// Interval between fetches and between aggregation cycles.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on a single venue fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Age after which a venue's last-known book is no longer merged.
    #[serde(default = "default_max_staleness_ms")]
    pub max_staleness_ms: u64,

    // === Venues ===
    /// Coinbase Exchange REST base URL.
    #[serde(default = "default_coinbase_url")]
    pub coinbase_url: String,

    /// Coinbase product id.
    #[serde(default = "default_coinbase_product")]
    pub coinbase_product: String,

    /// Gemini REST base URL.
    #[serde(default = "default_gemini_url")]
    pub gemini_url: String,

    /// Gemini symbol.
    #[serde(default = "default_gemini_symbol")]
    pub gemini_symbol: String,

    /// Idle connections kept per venue host.
    #[serde(default = "default_http_pool_size")]
    pub http_pool_size: usize,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_target_quantity() -> Decimal {
    Decimal::new(100, 1) // 10.0 BTC
}

fn default_price_increment() -> Decimal {
    Decimal::new(1, 2) // $0.01
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_fetch_timeout_ms() -> u64 {
    1_500
}

fn default_max_staleness_ms() -> u64 {
    30_000
}

fn default_coinbase_url() -> String {
    "https://api.exchange.coinbase.com".to_string()
}

fn default_coinbase_product() -> String {
    "BTC-USD".to_string()
}

fn default_gemini_url() -> String {
    "https://api.gemini.com".to_string()
}

fn default_gemini_symbol() -> String {
    "BTCUSD".to_string()
}

fn default_http_pool_size() -> usize {
    4
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_quantity: default_target_quantity(),
            price_increment: default_price_increment(),
            book_depth: None,
            poll_interval_ms: default_poll_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_staleness_ms: default_max_staleness_ms(),
            coinbase_url: default_coinbase_url(),
            coinbase_product: default_coinbase_product(),
            gemini_url: default_gemini_url(),
            gemini_symbol: default_gemini_symbol(),
            http_pool_size: default_http_pool_size(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_quantity <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveQuantity(self.target_quantity));
        }

        if self.price_increment <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveIncrement(self.price_increment));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        if self.fetch_timeout_ms >= self.max_staleness_ms {
            return Err(ConfigError::TimeoutExceedsStaleness {
                timeout_ms: self.fetch_timeout_ms,
                max_staleness_ms: self.max_staleness_ms,
            });
        }

        if self.book_depth == Some(0) {
            return Err(ConfigError::ZeroDepth);
        }

        base_url("COINBASE_URL", &self.coinbase_url)?;
        base_url("GEMINI_URL", &self.gemini_url)?;

        Ok(())
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Fetch timeout as a [`Duration`].
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Staleness ceiling as a [`Duration`].
    pub fn max_staleness(&self) -> Duration {
        Duration::from_millis(self.max_staleness_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_values_are_sensible() {
        let config = Config::default();
        assert_eq!(config.target_quantity, dec!(10.0));
        assert_eq!(config.price_increment, dec!(0.01));
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert!(config.fetch_timeout() < config.max_staleness());
        assert!(config.book_depth.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_quantity() {
        let config = Config {
            target_quantity: dec!(0),
            ..Config::default()
        };

        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveQuantity(dec!(0)))
        );
    }

    #[test]
    fn validate_rejects_timeout_above_ceiling() {
        let config = Config {
            fetch_timeout_ms: 5_000,
            max_staleness_ms: 5_000,
            ..Config::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::TimeoutExceedsStaleness { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_depth_and_interval() {
        let zero_depth = Config {
            book_depth: Some(0),
            ..Config::default()
        };
        assert_eq!(zero_depth.validate(), Err(ConfigError::ZeroDepth));

        let zero_interval = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        assert_eq!(zero_interval.validate(), Err(ConfigError::ZeroPollInterval));
    }

    #[test]
    fn validate_rejects_bad_url() {
        let config = Config {
            gemini_url: "gemini".to_string(),
            ..Config::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { field: "GEMINI_URL", .. })
        ));
    }

    #[test]
    fn deserializes_from_env_style_pairs() {
        let vars = vec![
            ("TARGET_QUANTITY".to_string(), "2.5".to_string()),
            ("BOOK_DEPTH".to_string(), "25".to_string()),
            ("POLL_INTERVAL_MS".to_string(), "500".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.target_quantity, dec!(2.5));
        assert_eq!(config.book_depth, Some(25));
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.gemini_symbol, "BTCUSD");
    }
}
