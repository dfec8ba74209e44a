//! Configurable limits for bounded decoding.

/// Wire-level limits for packet decoding.
///
/// These limits are enforced during decoding so a malformed or hostile
/// packet cannot force unbounded allocation. Item body parsing limits
/// belong to the replication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Limits {
    /// Maximum packet size in bytes.
    pub max_packet_bytes: usize,

    /// Maximum number of entity blocks in a packet.
    pub max_blocks: usize,

    /// Maximum number of item sections in one entity block.
    pub max_sections_per_block: usize,

    /// Maximum length of a single section body in bytes.
    pub max_section_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_packet_bytes: 64 * 1024,
            max_blocks: 1024,
            // One section per replicated facet kind
            max_sections_per_block: 32,
            max_section_len: 8 * 1024,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_packet_bytes: 4096,
            max_blocks: 32,
            max_sections_per_block: 8,
            max_section_len: 1024,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_packet_bytes: usize::MAX,
            max_blocks: usize::MAX,
            max_sections_per_block: usize::MAX,
            max_section_len: usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_reasonable() {
        let limits = Limits::default();
        assert!(limits.max_packet_bytes >= 1024);
        assert!(limits.max_sections_per_block >= 8);
    }

    #[test]
    fn testing_limits_smaller() {
        let test = Limits::for_testing();
        let default = Limits::default();
        assert!(test.max_packet_bytes < default.max_packet_bytes);
        assert!(test.max_blocks < default.max_blocks);
    }

    #[test]
    fn unlimited_limits() {
        let limits = Limits::unlimited();
        assert_eq!(limits.max_packet_bytes, usize::MAX);
        assert_eq!(limits.max_section_len, usize::MAX);
    }
}
