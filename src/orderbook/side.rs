//! One side of the bounded order book
//!
//! Two cross-referencing indices: price -> level and order id -> resting
//! order. Only the `max_depth` best prices are tracked; orders at any other
//! price are never indexed, so later done/match events for them are no-ops.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::trace;

use super::{Level, Side};
use crate::event::OrderId;

/// Aggregate of resting orders at one exact price
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    /// Sum of the remaining quantity of every order in `order_ids`
    pub quantity: Decimal,
    pub order_ids: HashSet<OrderId>,
}

/// Index entry for a tracked order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestingOrder {
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    max_depth: usize,
    /// Keyed by exact decimal value, so "1.0" and "1.00" share a level
    levels: BTreeMap<Decimal, PriceLevel>,
    orders: HashMap<OrderId, RestingOrder>,
}

impl BookSide {
    pub fn new(side: Side, max_depth: usize) -> Self {
        Self {
            side,
            max_depth,
            levels: BTreeMap::new(),
            orders: HashMap::new(),
        }
    }

    /// Admit a newly resting order
    ///
    /// Joins an existing level unconditionally. A new price is admitted while
    /// the side has room, or, when full, only if strictly better than the
    /// worst tracked price, which is then evicted with all of its orders.
    pub fn open(&mut self, order_id: &str, price: Decimal, quantity: Decimal) {
        if self.orders.contains_key(order_id) {
            trace!(side = ?self.side, order_id, "Duplicate open ignored");
            return;
        }

        if let Some(level) = self.levels.get_mut(&price) {
            level.quantity += quantity;
            level.order_ids.insert(order_id.to_string());
            let price = level.price;
            self.orders
                .insert(order_id.to_string(), RestingOrder { price, quantity });
            return;
        }

        if self.levels.len() >= self.max_depth {
            match self.worst_price() {
                Some(worst) if self.side.is_better(price, worst) => self.evict(worst),
                _ => {
                    trace!(side = ?self.side, order_id, %price, "Open outside tracked depth dropped");
                    return;
                }
            }
        }

        self.levels.insert(
            price,
            PriceLevel {
                price,
                quantity,
                order_ids: HashSet::from([order_id.to_string()]),
            },
        );
        self.orders
            .insert(order_id.to_string(), RestingOrder { price, quantity });
    }

    /// Remove a tracked order; false if the id is not tracked
    pub fn remove(&mut self, order_id: &str) -> bool {
        let Some(order) = self.orders.remove(order_id) else {
            return false;
        };

        let emptied = match self.levels.get_mut(&order.price) {
            Some(level) => {
                level.order_ids.remove(order_id);
                level.quantity -= order.quantity;
                level.order_ids.is_empty()
            }
            None => false,
        };
        if emptied {
            self.levels.remove(&order.price);
        }
        true
    }

    /// Apply a fill against a tracked maker order; false if not tracked
    ///
    /// A fill of exactly the remaining quantity removes the order; any other
    /// size is subtracted from the order and its level.
    pub fn fill(&mut self, order_id: &str, fill_quantity: Decimal) -> bool {
        let partial_at = match self.orders.get_mut(order_id) {
            None => return false,
            Some(order) if fill_quantity == order.quantity => None,
            Some(order) => {
                order.quantity -= fill_quantity;
                Some(order.price)
            }
        };

        match partial_at {
            None => self.remove(order_id),
            Some(price) => {
                if let Some(level) = self.levels.get_mut(&price) {
                    level.quantity -= fill_quantity;
                }
                true
            }
        }
    }

    fn evict(&mut self, price: Decimal) {
        if let Some(level) = self.levels.remove(&price) {
            for order_id in &level.order_ids {
                self.orders.remove(order_id);
            }
            trace!(
                side = ?self.side,
                %price,
                orders = level.order_ids.len(),
                "Evicted worst level"
            );
        }
    }

    /// Least competitive tracked price: lowest bid or highest ask
    pub fn worst_price(&self) -> Option<Decimal> {
        match self.side {
            Side::Bid => self.levels.keys().next().copied(),
            Side::Ask => self.levels.keys().next_back().copied(),
        }
    }

    /// Most competitive tracked price
    pub fn best_price(&self) -> Option<Decimal> {
        match self.side {
            Side::Bid => self.levels.keys().next_back().copied(),
            Side::Ask => self.levels.keys().next().copied(),
        }
    }

    /// Up to `count` levels, best first
    pub fn best_levels(&self, count: usize) -> Vec<Level> {
        let to_level = |level: &PriceLevel| Level {
            quantity: level.quantity,
            price: level.price,
        };
        match self.side {
            Side::Bid => self.levels.values().rev().take(count).map(to_level).collect(),
            Side::Ask => self.levels.values().take(count).map(to_level).collect(),
        }
    }

    /// Number of tracked price levels
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn level(&self, price: Decimal) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    pub fn order(&self, order_id: &str) -> Option<&RestingOrder> {
        self.orders.get(order_id)
    }

    /// Levels in ascending price order
    pub fn levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.levels.values()
    }

    /// Verify depth bound, aggregate sums and index cross-references
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.levels.len() > self.max_depth {
            return Err(format!(
                "{:?}: {} levels exceed max depth {}",
                self.side,
                self.levels.len(),
                self.max_depth
            ));
        }

        let mut indexed = 0;
        for (price, level) in &self.levels {
            if level.order_ids.is_empty() {
                return Err(format!("{:?}: empty level at {}", self.side, price));
            }
            let mut sum = Decimal::ZERO;
            for order_id in &level.order_ids {
                match self.orders.get(order_id) {
                    Some(order) if order.price == *price => sum += order.quantity,
                    Some(order) => {
                        return Err(format!(
                            "{:?}: order {} indexed at {} but listed at {}",
                            self.side, order_id, order.price, price
                        ))
                    }
                    None => {
                        return Err(format!(
                            "{:?}: order {} at {} missing from index",
                            self.side, order_id, price
                        ))
                    }
                }
            }
            if sum != level.quantity {
                return Err(format!(
                    "{:?}: level {} aggregate {} != order sum {}",
                    self.side, price, level.quantity, sum
                ));
            }
            indexed += level.order_ids.len();
        }

        if indexed != self.orders.len() {
            return Err(format!(
                "{:?}: {} indexed orders but {} listed in levels",
                self.side,
                self.orders.len(),
                indexed
            ));
        }
        Ok(())
    }
}
