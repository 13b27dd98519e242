//! WebSocket transport for the exchange feed
//!
//! Handles connection, the subscription handshake, and the split read/write
//! halves used by the receive and heartbeat loops.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{MarketDataError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
const KEEPALIVE_PAYLOAD: &[u8] = b"keepalive";

/// Outbound subscription handshake
#[derive(Debug, Serialize)]
struct Subscribe<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    product_ids: &'a [String],
    channels: &'a [String],
}

/// Connection parameters for one feed session
#[derive(Debug, Clone)]
pub struct FeedConnection {
    endpoint: String,
    product_ids: Vec<String>,
    channels: Vec<String>,
}

impl FeedConnection {
    pub fn new(endpoint: &str, product_ids: Vec<String>, channels: Vec<String>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            product_ids,
            channels,
        }
    }

    /// JSON text of the subscription handshake
    pub fn subscribe_message(&self) -> Result<String> {
        let message = Subscribe {
            kind: "subscribe",
            product_ids: &self.product_ids,
            channels: &self.channels,
        };
        Ok(serde_json::to_string(&message)?)
    }

    /// Open the transport and send the subscription handshake
    pub async fn connect(&self) -> Result<(FeedSink, FeedStream)> {
        info!(url = %self.endpoint, products = ?self.product_ids, "Connecting to exchange feed");

        let (ws_stream, response) = connect_async(self.endpoint.as_str()).await.map_err(|e| {
            MarketDataError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");

        let (sink, stream) = ws_stream.split();
        let sink = FeedSink::new(sink);
        sink.send_text(self.subscribe_message()?).await?;
        info!(channels = ?self.channels, "Subscription sent");

        Ok((sink, FeedStream { stream }))
    }
}

/// Write half, shared by the heartbeat loop and `close`
pub struct FeedSink {
    sink: Mutex<SplitSink<WsStream, Message>>,
    connected: AtomicBool,
}

impl FeedSink {
    fn new(sink: SplitSink<WsStream, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            connected: AtomicBool::new(true),
        }
    }

    pub async fn send_text(&self, text: String) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))
    }

    /// Send a keepalive ping
    pub async fn ping(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(MarketDataError::WebSocketConnection(
                "Not connected".to_string(),
            ));
        }
        self.sink
            .lock()
            .await
            .send(Message::Ping(KEEPALIVE_PAYLOAD.to_vec()))
            .await
            .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))?;
        debug!("Keepalive ping sent");
        Ok(())
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Send a close frame; only the first call does anything
    pub async fn close(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut sink = self.sink.lock().await;
        match timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => debug!("Close frame sent"),
            Ok(Err(e)) => debug!(error = %e, "Transport already closed"),
            Err(_) => warn!("Timed out closing transport"),
        }
    }
}

/// Read half, owned by the receive loop
pub struct FeedStream {
    stream: SplitStream<WsStream>,
}

impl FeedStream {
    /// Receive the next message
    ///
    /// `Ok(None)` for control frames that carry no feed data.
    pub async fn recv(&mut self) -> Result<Option<String>> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(text)),
            Some(Ok(Message::Binary(data))) => String::from_utf8(data).map(Some).map_err(|e| {
                MarketDataError::ParseError(format!("Binary frame is not UTF-8: {}", e))
            }),
            Some(Ok(Message::Ping(_))) => {
                debug!("Received ping");
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(None)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                Err(MarketDataError::WebSocketConnection(
                    "Connection closed".to_string(),
                ))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                Err(MarketDataError::WebSocketMessage(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                Err(MarketDataError::WebSocketConnection(
                    "Stream ended".to_string(),
                ))
            }
        }
    }
}
