//! WebSocket module for the exchange feed connection

mod client;
mod manager;

pub use client::{FeedConnection, FeedSink, FeedStream};
pub use manager::{ConnectionState, FeedManager, FeedObserver, LoggingObserver};
