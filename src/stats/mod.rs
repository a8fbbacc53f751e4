//! Observability snapshots

pub mod metrics;

pub use metrics::{BrokerStats, SinkStats, SourceStats};
