//! Packet header types and constants.

/// Magic number identifying facetsync packets.
///
/// This value is fixed and must never change across versions.
pub const MAGIC: u32 = 0x4653_594E; // "FSYN" in ASCII

/// Current wire format version.
pub const VERSION: u16 = 1;

/// Header size in bytes (16 total).
pub const HEADER_SIZE: usize = 4 + 2 + 2 + 4 + 4;

/// Packet flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PacketFlags(u16);

impl PacketFlags {
    /// Every entity block in the packet is a forced full snapshot sent in
    /// answer to a client resync request.
    pub const FULL_RESYNC: u16 = 1 << 0;

    /// Reserved bits mask (must be zero in version 1).
    const RESERVED_MASK: u16 = !0b1;

    /// Creates new flags from a raw value.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Flags for a regular per-tick packet.
    #[must_use]
    pub const fn tick() -> Self {
        Self(0)
    }

    /// Flags for a packet answering a resync request.
    #[must_use]
    pub const fn full_resync() -> Self {
        Self(Self::FULL_RESYNC)
    }

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns `true` if the packet answers a resync request.
    #[must_use]
    pub const fn is_full_resync(self) -> bool {
        self.0 & Self::FULL_RESYNC != 0
    }

    /// Returns `true` if no reserved bits are set.
    #[must_use]
    pub const fn is_valid_v1(self) -> bool {
        self.0 & Self::RESERVED_MASK == 0
    }
}

/// Packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version: u16,
    pub flags: PacketFlags,
    /// Host tick at which every blob in the packet was produced.
    pub tick: u32,
    pub payload_len: u32,
}

impl PacketHeader {
    /// Creates a header for the given tick.
    #[must_use]
    pub const fn new(flags: PacketFlags, tick: u32, payload_len: u32) -> Self {
        Self {
            version: VERSION,
            flags,
            tick,
            payload_len,
        }
    }
}
