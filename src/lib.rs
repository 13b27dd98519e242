//! Market Data Feed Library
//!
//! Maintains a bounded-depth view of the best bid and ask levels of a limit
//! order book from a full-channel exchange order event stream.

pub mod config;
pub mod error;
pub mod event;
pub mod orderbook;
pub mod parser;
pub mod stats;
pub mod websocket;

pub use config::Config;
pub use error::{MarketDataError, Result};
pub use event::{FeedEvent, OrderId};
pub use orderbook::{format_inside_levels, BookSnapshot, Level, OrderBook, Side};
pub use parser::ParsedMessage;
pub use stats::{MessageCounters, MessageCounts};
pub use websocket::{ConnectionState, FeedManager, FeedObserver};
