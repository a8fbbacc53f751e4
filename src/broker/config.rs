//! Broker configuration

use std::time::Duration;

/// Broker configuration options
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Capacity of each sink's inbound packet queue. When the queue is
    /// full, offered packets are dropped rather than blocking the reader.
    pub queue_capacity: usize,

    /// Deadline for reader/writer remover callbacks. Removers run detached
    /// from the triggering caller's cancellation so cleanup completes even
    /// when the caller is already gone.
    pub remover_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            remover_timeout: Duration::from_secs(5),
        }
    }
}

impl BrokerConfig {
    /// Set the per-sink queue capacity (minimum 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the remover callback deadline
    pub fn remover_timeout(mut self, timeout: Duration) -> Self {
        self.remover_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();

        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.remover_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_queue_capacity() {
        let config = BrokerConfig::default().queue_capacity(8);

        assert_eq!(config.queue_capacity, 8);
    }

    #[test]
    fn test_builder_queue_capacity_floor() {
        // Zero would make every offer a drop; clamp to 1
        let config = BrokerConfig::default().queue_capacity(0);

        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = BrokerConfig::default()
            .queue_capacity(16)
            .remover_timeout(Duration::from_secs(1));

        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.remover_timeout, Duration::from_secs(1));
    }
}
