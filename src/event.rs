//! Order events reduced into the book
//!
//! A closed set: adding a variant forces every reducer match to handle it.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

use crate::orderbook::Side;

/// Exchange-assigned order identifier
pub type OrderId = String;

/// A limit order now resting on the book
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub side: Side,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub price: Decimal,
    #[serde(rename = "remaining_size", deserialize_with = "deserialize_decimal")]
    pub quantity: Decimal,
}

/// An order that left the book (filled or canceled)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DoneOrder {
    pub order_id: OrderId,
    pub side: Side,
    /// "filled" or "canceled"
    #[serde(default)]
    pub reason: Option<String>,
}

/// A trade against a resting (maker) order
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MatchOrder {
    pub maker_order_id: OrderId,
    /// Side of the maker order
    pub side: Side,
    #[serde(rename = "size", deserialize_with = "deserialize_decimal")]
    pub fill_quantity: Decimal,
}

/// Inbound order event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Open(OpenOrder),
    Done(DoneOrder),
    Match(MatchOrder),
    /// Size or price change of a resting order; not reduced
    Change,
    /// Stop order activation; not reduced
    Activate,
    /// Order accepted by the matching engine, not yet resting; not reduced
    Received,
}

impl FeedEvent {
    /// Wire name of the event type
    pub fn kind(&self) -> &'static str {
        match self {
            FeedEvent::Open(_) => "open",
            FeedEvent::Done(_) => "done",
            FeedEvent::Match(_) => "match",
            FeedEvent::Change => "change",
            FeedEvent::Activate => "activate",
            FeedEvent::Received => "received",
        }
    }

    pub fn open(order_id: &str, side: Side, price: Decimal, quantity: Decimal) -> Self {
        FeedEvent::Open(OpenOrder {
            order_id: order_id.to_string(),
            side,
            price,
            quantity,
        })
    }

    pub fn done(order_id: &str, side: Side) -> Self {
        FeedEvent::Done(DoneOrder {
            order_id: order_id.to_string(),
            side,
            reason: None,
        })
    }

    pub fn fill(maker_order_id: &str, side: Side, fill_quantity: Decimal) -> Self {
        FeedEvent::Match(MatchOrder {
            maker_order_id: maker_order_id.to_string(),
            side,
            fill_quantity,
        })
    }
}

/// Decimal from its string form; the exchange never sends prices as JSON numbers
pub(crate) fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Decimal::from_str(&s).map_err(serde::de::Error::custom)
}
