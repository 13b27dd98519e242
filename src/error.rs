//! Error types for the market data feed

use thiserror::Error;

/// Market data feed errors
///
/// Only the connection layer produces these; the order book reducer swallows
/// untracked references and capacity rejections as no-ops.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Feed is already running")]
    AlreadyRunning,
}

impl MarketDataError {
    /// True for transport-level failures (connection drop, send/receive error)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MarketDataError::WebSocketConnection(_) | MarketDataError::WebSocketMessage(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for MarketDataError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MarketDataError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        MarketDataError::ParseError(err.to_string())
    }
}

impl From<prometheus::Error> for MarketDataError {
    fn from(err: prometheus::Error) -> Self {
        MarketDataError::MetricsError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketDataError>;
