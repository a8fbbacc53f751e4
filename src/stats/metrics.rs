//! Statistics for broker, sources and sinks
//!
//! Plain snapshot structs; the live counters sit on the owning entities and
//! are copied out on request.

use crate::broker::SourcePhase;
use crate::error::BrokerError;

/// Sink-level statistics
#[derive(Debug, Clone, Default)]
pub struct SinkStats {
    /// Packets handed to the writer
    pub delivered: u64,
    /// Packets discarded because the queue was full at offer time
    pub dropped: u64,
    /// Whether the sink has terminated and released its writer
    pub dead: bool,
    /// The terminal error, if the sink died on one
    pub last_error: Option<BrokerError>,
}

/// Source-level statistics
#[derive(Debug, Clone, Copy)]
pub struct SourceStats {
    /// Lifecycle state at snapshot time
    pub phase: SourcePhase,
    /// Currently attached sinks
    pub sink_count: usize,
    /// Packets produced by the reader so far
    pub packets_read: u64,
}

/// Broker-wide statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokerStats {
    /// Sources currently in the registry
    pub active_sources: usize,
    /// Sinks attached across all sources
    pub attached_sinks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_stats_default() {
        let stats = SinkStats::default();
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.dropped, 0);
        assert!(!stats.dead);
        assert!(stats.last_error.is_none());
    }

    #[test]
    fn test_broker_stats_default() {
        let stats = BrokerStats::default();
        assert_eq!(stats.active_sources, 0);
        assert_eq!(stats.attached_sinks, 0);
    }
}
