//! Configuration module for the market data feed

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MarketDataError, Result};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// WebSocket endpoint of the exchange feed
    pub ws_endpoint: String,

    /// Instruments to subscribe to (e.g., ["BTC-USD"])
    pub product_ids: Vec<String>,

    /// Channels requested in the subscription handshake
    pub channels: Vec<String>,

    /// Price levels tracked internally per side
    pub max_depth: usize,

    /// Price levels exposed on a snapshot, at most `max_depth`
    pub level_count: usize,

    /// Interval between keepalive pings
    pub heartbeat_interval_ms: u64,

    /// Dump the inside levels at debug level after every message
    pub verbose: bool,

    /// Bind address of the HTTP control surface
    pub http_addr: String,

    /// Print interval of the console binary
    pub console_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            ws_endpoint: env::var("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            product_ids: env::var("PRODUCT_IDS")
                .map(|v| split_list(&v).map(|s| s.to_uppercase()).collect())
                .unwrap_or(defaults.product_ids),
            channels: env::var("CHANNELS")
                .map(|v| split_list(&v).map(str::to_string).collect())
                .unwrap_or(defaults.channels),
            max_depth: env_or("MAX_DEPTH", defaults.max_depth),
            level_count: env_or("LEVEL_COUNT", defaults.level_count),
            heartbeat_interval_ms: env_or("HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval_ms),
            verbose: env_or("VERBOSE", defaults.verbose),
            http_addr: env::var("HTTP_ADDR").unwrap_or(defaults.http_addr),
            console_interval_secs: env_or("CONSOLE_INTERVAL_SECS", defaults.console_interval_secs),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the feed cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(MarketDataError::ConfigError(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.level_count > self.max_depth {
            return Err(MarketDataError::ConfigError(format!(
                "level_count ({}) must not exceed max_depth ({})",
                self.level_count, self.max_depth
            )));
        }
        if self.product_ids.is_empty() {
            return Err(MarketDataError::ConfigError(
                "at least one product id is required".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(MarketDataError::ConfigError(
                "heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Endpoint with any trailing slash removed
    pub fn endpoint(&self) -> &str {
        self.ws_endpoint.trim_end_matches('/')
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Instrument shown in display headers
    pub fn primary_product(&self) -> &str {
        self.product_ids.first().map(String::as_str).unwrap_or("")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: "wss://ws-feed.exchange.coinbase.com".to_string(),
            product_ids: vec!["BTC-USD".to_string()],
            channels: vec!["full".to_string()],
            max_depth: 15,
            level_count: 5,
            heartbeat_interval_ms: 30_000,
            verbose: false,
            http_addr: "0.0.0.0:5000".to_string(),
            console_interval_secs: 5,
        }
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
