//! Market Data Feed - console runner
//!
//! Runs the feed without the HTTP surface and logs the inside levels on a
//! fixed interval until Ctrl-C. Exits non-zero if the feed stopped on error.

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_data_feed::{Config, ConnectionState, FeedManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = Config::load()?;
    let period = Duration::from_secs(config.console_interval_secs.max(1));

    let mut feed = FeedManager::new(config)?;
    feed.start().await?;

    let mut ticker = interval(period);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing feed");
                break;
            }
            _ = ticker.tick() => {
                info!("###\n{}", feed.inside_levels().await);
                let counts = feed.counts();
                info!(
                    total = counts.total_message_count,
                    breakdown = ?counts.by_type,
                    "Message counts"
                );
                if feed.state() == ConnectionState::Errored {
                    break;
                }
            }
        }
    }

    feed.close().await;

    if let Some(e) = feed.last_error() {
        error!(error = %e, "Feed stopped on error");
        std::process::exit(1);
    }
    Ok(())
}
