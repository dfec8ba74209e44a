//! Wire framing for facetsync replication packets.
//!
//! This crate handles the binary wire format: packet headers, per-entity
//! blocks, and per-item section framing. It does not know about facets or
//! items, only about the structure of packets. Each item's payload gets its
//! own length-delimited section so a receiver can decode (or fail to decode)
//! one item without losing its position in the rest of the packet.
//!
//! # Design Principles
//!
//! - **Stable wire format** - The format is versioned and reserved bits are rejected.
//! - **Bounded decoding** - All counts and lengths are validated against limits before iteration.
//! - **No domain knowledge** - Section tags are opaque bytes here.

mod error;
mod header;
mod limits;
mod packet;

pub use error::{DecodeError, EncodeError, LimitKind, SectionFramingError, WireResult};
pub use header::{PacketFlags, PacketHeader, HEADER_SIZE, MAGIC, VERSION};
pub use limits::Limits;
pub use packet::{
    decode_blocks, decode_packet, encode_header, encode_section, BlockKind, EntityBlock,
    PacketBuilder, WirePacket, WireSection,
};
