//! Order book module
//!
//! Maintains the top `max_depth` price levels per side from order events.

mod book;
mod format;
mod side;

pub use book::OrderBook;
pub use format::format_inside_levels;
pub use side::{BookSide, PriceLevel, RestingOrder};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "buy", alias = "bid")]
    Bid,
    #[serde(rename = "sell", alias = "ask")]
    Ask,
}

impl Side {
    /// True if `price` is more competitive than `than` on this side
    pub fn is_better(self, price: Decimal, than: Decimal) -> bool {
        match self {
            Side::Bid => price > than,
            Side::Ask => price < than,
        }
    }
}

/// A single level in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub quantity: Decimal,
    pub price: Decimal,
}

/// Independent copy of the inside levels
///
/// Asks ascending by price, bids descending; either may be shorter than the
/// requested count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub asks: Vec<Level>,
    pub bids: Vec<Level>,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Best ask minus best bid
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }
}
