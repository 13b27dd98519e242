//! Parser module for full-channel WebSocket messages
//!
//! Decodes raw text frames into typed order events and control messages.

use serde::Deserialize;

use crate::event::{DoneOrder, FeedEvent, MatchOrder, OpenOrder};

/// Only the discriminator, used to validate the payload and name unknown types
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Subscription acknowledgement
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionsAck {
    #[serde(default)]
    pub channels: Vec<serde_json::Value>,
}

/// Error reported by the exchange (bad product, bad channel, ...)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExchangeError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireMessage {
    Received,
    Open(OpenOrder),
    Done(DoneOrder),
    Match(MatchOrder),
    Change,
    Activate,
    Subscriptions(SubscriptionsAck),
    Error(ExchangeError),
    #[serde(other)]
    Unknown,
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    Event(FeedEvent),
    Subscriptions(SubscriptionsAck),
    ExchangeError(ExchangeError),
    /// Unrecognised or missing `type`; carries the type name if present
    Unknown(Option<String>),
}

impl ParsedMessage {
    /// Parse a raw WebSocket message
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        let Some(kind) = envelope.kind else {
            return Ok(ParsedMessage::Unknown(None));
        };

        let parsed = match serde_json::from_str::<WireMessage>(raw)? {
            WireMessage::Received => ParsedMessage::Event(FeedEvent::Received),
            WireMessage::Open(order) => ParsedMessage::Event(FeedEvent::Open(order)),
            WireMessage::Done(order) => ParsedMessage::Event(FeedEvent::Done(order)),
            WireMessage::Match(fill) => ParsedMessage::Event(FeedEvent::Match(fill)),
            WireMessage::Change => ParsedMessage::Event(FeedEvent::Change),
            WireMessage::Activate => ParsedMessage::Event(FeedEvent::Activate),
            WireMessage::Subscriptions(ack) => ParsedMessage::Subscriptions(ack),
            WireMessage::Error(err) => ParsedMessage::ExchangeError(err),
            WireMessage::Unknown => ParsedMessage::Unknown(Some(kind)),
        };
        Ok(parsed)
    }

    /// Counter label for this message
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedMessage::Event(event) => event.kind(),
            ParsedMessage::Subscriptions(_) => "subscriptions",
            ParsedMessage::ExchangeError(_) => "error",
            ParsedMessage::Unknown(_) => "unknown",
        }
    }
}
