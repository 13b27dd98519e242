//! Per-message-type counters
//!
//! Backed by prometheus counters so the HTTP surface can export them as-is.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use serde::Serialize;
use std::collections::BTreeMap;

/// Labels reported even before the first message of that type arrives
pub const MESSAGE_TYPES: [&str; 9] = [
    "subscriptions",
    "received",
    "open",
    "done",
    "match",
    "change",
    "activate",
    "error",
    "unknown",
];

/// Cumulative message counters for one feed
#[derive(Clone)]
pub struct MessageCounters {
    total: IntCounter,
    by_type: IntCounterVec,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageCounts {
    pub total_message_count: u64,
    pub by_type: BTreeMap<String, u64>,
}

impl MessageCounters {
    pub fn new() -> prometheus::Result<Self> {
        let total = IntCounter::new(
            "feed_messages_total",
            "Total messages received from the exchange feed",
        )?;
        let by_type = IntCounterVec::new(
            Opts::new(
                "feed_messages_by_type_total",
                "Messages received from the exchange feed by type",
            ),
            &["type"],
        )?;
        for kind in MESSAGE_TYPES {
            by_type.with_label_values(&[kind]);
        }
        Ok(Self { total, by_type })
    }

    /// Count one decoded message of the given type
    pub fn record(&self, kind: &str) {
        self.total.inc();
        self.by_type.with_label_values(&[kind]).inc();
    }

    pub fn total(&self) -> u64 {
        self.total.get()
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.by_type.with_label_values(&[kind]).get()
    }

    pub fn counts(&self) -> MessageCounts {
        MessageCounts {
            total_message_count: self.total(),
            by_type: MESSAGE_TYPES
                .iter()
                .map(|kind| (kind.to_string(), self.count(kind)))
                .collect(),
        }
    }

    /// Expose the counters through a prometheus registry
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.total.clone()))?;
        registry.register(Box::new(self.by_type.clone()))?;
        Ok(())
    }
}

impl std::fmt::Debug for MessageCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCounters")
            .field("counts", &self.counts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_total_and_type() {
        let counters = MessageCounters::new().unwrap();
        counters.record("open");
        counters.record("open");
        counters.record("done");

        assert_eq!(counters.total(), 3);
        assert_eq!(counters.count("open"), 2);
        assert_eq!(counters.count("match"), 0);

        let counts = counters.counts();
        assert_eq!(counts.total_message_count, 3);
        assert_eq!(counts.by_type["done"], 1);
        assert_eq!(counts.by_type.len(), MESSAGE_TYPES.len());
    }

    #[test]
    fn test_register_exports_families() {
        let counters = MessageCounters::new().unwrap();
        counters.record("match");
        let registry = Registry::new();
        counters.register(&registry).unwrap();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"feed_messages_total".to_string()));
        assert!(names.contains(&"feed_messages_by_type_total".to_string()));

        // A second registration of the same families is rejected
        assert!(counters.register(&registry).is_err());
    }
}
