//! Core order book implementation
//!
//! Reduces one order event at a time into two bounded `BookSide`s. Must be
//! driven by a single writer; readers take a `snapshot`.

use rust_decimal::Decimal;
use tracing::trace;

use super::{BookSide, BookSnapshot, Side};
use crate::event::FeedEvent;

/// Bounded-depth order book for a single instrument
#[derive(Debug, Clone)]
pub struct OrderBook {
    bids: BookSide,
    asks: BookSide,
    /// Maximum price levels tracked per side
    max_depth: usize,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(max_depth: usize) -> Self {
        Self {
            bids: BookSide::new(Side::Bid, max_depth),
            asks: BookSide::new(Side::Ask, max_depth),
            max_depth,
        }
    }

    /// Apply a single order event
    ///
    /// Never fails: references to untracked orders and opens outside the
    /// tracked depth are dropped silently.
    pub fn apply(&mut self, event: &FeedEvent) {
        match event {
            FeedEvent::Open(order) => {
                self.side_mut(order.side)
                    .open(&order.order_id, order.price, order.quantity);
            }
            FeedEvent::Done(order) => {
                if !self.side_mut(order.side).remove(&order.order_id) {
                    trace!(order_id = %order.order_id, "Done for untracked order");
                }
            }
            FeedEvent::Match(fill) => {
                if !self
                    .side_mut(fill.side)
                    .fill(&fill.maker_order_id, fill.fill_quantity)
                {
                    trace!(order_id = %fill.maker_order_id, "Match for untracked maker");
                }
            }
            FeedEvent::Change | FeedEvent::Activate | FeedEvent::Received => {}
        }
    }

    /// Copy of up to `level_count` best levels per side
    pub fn snapshot(&self, level_count: usize) -> BookSnapshot {
        BookSnapshot {
            asks: self.asks.best_levels(level_count),
            bids: self.bids.best_levels(level_count),
        }
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.best_price()
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.best_price()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        self.bids.check_invariants()?;
        self.asks.check_invariants()
    }
}
