//! Configuration management

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Upstream Configuration Constants
// ============================================================================

/// Default versions endpoint (EU patch server, well-known port).
pub const DEFAULT_UPSTREAM_URL: &str = "http://eu.patch.battle.net:1119";

/// Default per-request timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

// ============================================================================
// Polling Configuration Constants
// ============================================================================

/// Default delay between poll cycles in seconds (15 minutes).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 900;

/// Default number of recent versions returned per region.
pub const DEFAULT_TOP_N: usize = 3;

/// Every known WoW distribution channel.
pub const KNOWN_PRODUCTS: &[&str] = &[
    "wow",                 // Retail
    "wowt",                // Retail PTR
    "wowxptr",             // Retail PTR 2
    "wow_beta",            // Retail Beta
    "wow_classic",         // Progression Classic
    "wow_classic_ptr",     // Progression Classic PTR
    "wow_classic_beta",    // Progression Classic Beta
    "wow_classic_era",     // Classic Era / Hardcore / SoD
    "wow_classic_era_ptr", // Classic Era PTR
    "wowdev",              // Internal Dev
    "wowlivetest",         // Internal Live Test
];

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/patchwatch";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Tracker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub upstream: UpstreamConfig,
    pub polling: PollingConfig,
    pub database: DatabaseConfig,
}

/// Where and how versions are fetched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
}

/// What is polled, how often, and how much history queries return
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub enabled: bool,
    pub products: Vec<String>,
    pub interval_secs: u64,
    pub top_n: usize,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

impl TrackerConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from the environment and defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let config = TrackerConfig {
            upstream: UpstreamConfig {
                base_url: std::env::var("PATCHWATCH_UPSTREAM_URL")
                    .unwrap_or_else(|_| DEFAULT_UPSTREAM_URL.to_string()),
                fetch_timeout_secs: env_parse("PATCHWATCH_FETCH_TIMEOUT_SECS")
                    .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
                user_agent: std::env::var("PATCHWATCH_USER_AGENT")
                    .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            },
            polling: PollingConfig {
                enabled: env_parse("PATCHWATCH_POLLING_ENABLED").unwrap_or(true),
                products: std::env::var("PATCHWATCH_PRODUCTS")
                    .map(|list| parse_product_list(&list))
                    .unwrap_or_else(|_| default_products()),
                interval_secs: env_parse("PATCHWATCH_POLL_INTERVAL_SECS")
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
                top_n: env_parse("PATCHWATCH_TOP_N").unwrap_or(DEFAULT_TOP_N),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_parse("DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.upstream.base_url.trim().is_empty() {
            anyhow::bail!("Upstream base URL cannot be empty");
        }

        if self.upstream.fetch_timeout_secs == 0 {
            anyhow::bail!("Fetch timeout must be greater than 0");
        }

        if self.polling.products.is_empty() {
            anyhow::bail!("Product list cannot be empty");
        }

        if let Some(blank) = self.polling.products.iter().position(|p| p.trim().is_empty()) {
            anyhow::bail!("Product list entry {} is blank", blank);
        }

        if self.polling.interval_secs == 0 {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        if self.polling.top_n == 0 {
            anyhow::bail!("Top N must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        Ok(())
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            products: default_products(),
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

pub fn default_products() -> Vec<String> {
    KNOWN_PRODUCTS.iter().map(|p| p.to_string()).collect()
}

/// Split a comma-separated product list, dropping blanks and duplicates
pub fn parse_product_list(list: &str) -> Vec<String> {
    let mut products: Vec<String> = Vec::new();
    for product in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if !products.iter().any(|p| p == product) {
            products.push(product.to_string());
        }
    }
    products
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.polling.products.len(), 11);
        assert_eq!(config.polling.interval(), Duration::from_secs(900));
        assert_eq!(config.upstream.fetch_timeout_secs, 5);
        assert_eq!(config.polling.top_n, 3);
    }

    #[test]
    fn test_parse_product_list() {
        assert_eq!(
            parse_product_list(" wow, wowt ,,wow, wow_beta "),
            vec!["wow".to_string(), "wowt".to_string(), "wow_beta".to_string()]
        );
        assert!(parse_product_list(" , ").is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TrackerConfig::default();
        config.polling.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.polling.products.clear();
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.polling.products.push("  ".to_string());
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.upstream.fetch_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.polling.top_n = 0;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }

    const POLLING_VARS: &[&str] = &[
        "PATCHWATCH_PRODUCTS",
        "PATCHWATCH_POLL_INTERVAL_SECS",
        "PATCHWATCH_TOP_N",
        "PATCHWATCH_POLLING_ENABLED",
    ];

    fn clear_polling_vars() {
        for key in POLLING_VARS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_overrides_polling() {
        clear_polling_vars();
        std::env::set_var("PATCHWATCH_PRODUCTS", "wow_classic, wow");
        std::env::set_var("PATCHWATCH_POLL_INTERVAL_SECS", "60");
        std::env::set_var("PATCHWATCH_TOP_N", "5");
        std::env::set_var("PATCHWATCH_POLLING_ENABLED", "false");

        let config = TrackerConfig::from_env();
        clear_polling_vars();

        let config = config.unwrap();
        assert_eq!(config.polling.products, vec!["wow_classic".to_string(), "wow".to_string()]);
        assert_eq!(config.polling.interval(), Duration::from_secs(60));
        assert_eq!(config.polling.top_n, 5);
        assert!(!config.polling.enabled);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_rejects_empty_product_list() {
        clear_polling_vars();
        std::env::set_var("PATCHWATCH_PRODUCTS", " , ");

        let result = TrackerConfig::from_env();
        clear_polling_vars();

        assert!(result.is_err());
    }
}
