//! Market Data Feed - HTTP control surface
//!
//! Starts and stops the exchange feed and serves the inside levels on request.
//! Holds no book logic of its own.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_data_feed::{Config, FeedManager};

/// Application state shared across handlers
struct AppState {
    feed: Mutex<FeedManager>,
    product: String,
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    action: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Market Data Feed service");

    let config = Config::load()?;
    info!(
        products = ?config.product_ids,
        max_depth = config.max_depth,
        level_count = config.level_count,
        "Configuration loaded"
    );

    let addr: SocketAddr = config.http_addr.parse()?;
    let product = config.primary_product().to_string();
    let feed = FeedManager::new(config)?;
    feed.counters().register(prometheus::default_registry())?;

    let state = Arc::new(AppState {
        feed: Mutex::new(feed),
        product,
    });

    let app = Router::new()
        .route("/feed", get(feed_action))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    info!(addr = %addr, "Starting control server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.feed.lock().await.close().await;
    info!("Market Data Feed service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn feed_action(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Json<serde_json::Value> {
    let action = query.action.unwrap_or_default();

    let msg = match action.as_str() {
        "start" => match state.feed.lock().await.start().await {
            Ok(()) => "Market Data Feed Started".to_string(),
            Err(e) => format!("Market Data Feed failed to start: {e}"),
        },
        "stop" => {
            state.feed.lock().await.close().await;
            "Market Data Feed Stopped".to_string()
        }
        "levels" => {
            let feed = state.feed.lock().await;
            match feed.last_error() {
                Some(e) => format!("Market Data Feed stopped on error: {e}"),
                None => format!(
                    "Inside {} Levels as of: \n{}\n\n{}",
                    state.product,
                    chrono::Local::now(),
                    feed.inside_levels().await
                ),
            }
        }
        "stats" => {
            let feed = state.feed.lock().await;
            return Json(serde_json::json!({
                "state": feed.state(),
                "counts": feed.counts(),
                "error": feed.last_error().map(|e| e.to_string()),
            }));
        }
        other => format!("Unknown action parameter: {other}"),
    };

    Json(serde_json::json!({ "msg": msg }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "market-data-feed",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics() -> (StatusCode, String) {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
