//! Replication configuration.

use wire::Limits;

/// Default number of undelivered updates one item may buffer.
pub const DEFAULT_HISTORY_CAPACITY: usize = 128;

/// Tunables shared by the host and client replicators.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReplicationConfig {
    /// Maximum buffered history entries per item before a resync is requested.
    pub history_capacity: usize,

    /// Maximum entity blocks in one outgoing packet. Snapshots for entities
    /// entering a client's set are deferred to later ticks once reached;
    /// deltas and leaves for known entities are never deferred.
    pub max_entities_per_packet: usize,

    /// Wire framing limits applied when decoding packets.
    pub wire_limits: Limits,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_entities_per_packet: 512,
            wire_limits: Limits::default(),
        }
    }
}

impl ReplicationConfig {
    /// Creates a configuration suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            history_capacity: 16,
            max_entities_per_packet: 32,
            wire_limits: Limits::for_testing(),
        }
    }

    /// Creates a configuration with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            history_capacity: usize::MAX,
            max_entities_per_packet: usize::MAX,
            wire_limits: Limits::unlimited(),
        }
    }

    /// History capacity, never less than one entry.
    #[must_use]
    pub fn effective_history_capacity(&self) -> usize {
        self.history_capacity.max(1)
    }
}
