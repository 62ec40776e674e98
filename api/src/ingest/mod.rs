//! Ingestion of upstream detector counts.
//!
//! The collector fetches per-device readings from the traffic-light API and
//! appends them to the reading store; its scheduler loop drives one
//! collection cycle at a fixed rate on a background task.

mod collector;

pub use collector::{CollectError, Collector, CycleSummary};
