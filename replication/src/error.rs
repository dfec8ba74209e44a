//! Error types for replication operations.

use bitstream::BitError;
use facet::EntityId;
use thiserror::Error;

use crate::item::ItemKind;
use crate::types::{ClientId, Tick};

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors raised while encoding, decoding, or buffering replicated state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicationError {
    /// Bitstream error outside an item decode.
    #[error("bitstream error: {0}")]
    Bit(#[from] BitError),

    /// Wire framing could not be decoded.
    #[error("wire decode error: {0}")]
    Wire(#[from] wire::DecodeError),

    /// Wire framing could not be encoded.
    #[error("wire encode error: {0}")]
    Encode(#[from] wire::EncodeError),

    /// An item ran out of input mid-decode.
    ///
    /// Writer and reader disagree on the item's shape; the item's decode is
    /// abandoned and nothing from it is buffered.
    #[error("{item} decode ran out of input: {source}")]
    StreamUnderrun {
        item: ItemKind,
        #[source]
        source: BitError,
    },

    /// An item's history queue is full.
    #[error("{item} history queue full at {capacity} entries")]
    HistoryOverflow { item: ItemKind, capacity: usize },

    /// An update arrived for a tick older than one already buffered.
    #[error("{item} update for tick {new} arrived after tick {last}")]
    OutOfOrderTick { item: ItemKind, last: Tick, new: Tick },

    /// A section tag does not name any item kind.
    #[error("unknown item kind tag {tag}")]
    UnknownItemKind { tag: u8 },

    /// An entity already tracks this item kind.
    #[error("{entity} already has a {item} item")]
    DuplicateItem { entity: EntityId, item: ItemKind },

    /// A bounded enum read a raw value with no variant.
    #[error("invalid {name} value {raw}")]
    InvalidEnum { name: &'static str, raw: u64 },

    /// A status record named a bar slot that does not exist.
    #[error("invalid bar slot {slot}")]
    InvalidBarSlot { slot: u64 },

    /// More status records than the 3-bit count can carry.
    #[error("{count} bar records exceed the maximum of {max}")]
    TooManyBarRecords { count: usize, max: usize },

    /// A bone mask has more names than its count prefix can carry.
    #[error("bone mask of {len} names exceeds maximum of {max}")]
    MaskTooLong { len: usize, max: usize },

    /// A bone name is longer than its length prefix can carry.
    #[error("bone name of {len} bytes exceeds maximum of {max}")]
    StringTooLong { len: usize, max: usize },

    /// The client is not registered with the host.
    #[error("unknown {client}")]
    UnknownClient { client: ClientId },
}

impl ReplicationError {
    /// Attributes a bitstream failure to the item being decoded.
    ///
    /// Underruns become [`ReplicationError::StreamUnderrun`]; everything else
    /// is returned unchanged.
    #[must_use]
    pub fn in_item(self, item: ItemKind) -> Self {
        match self {
            Self::Bit(source) if source.is_underrun() => Self::StreamUnderrun { item, source },
            other => other,
        }
    }

    /// Returns `true` if the error means the sender and receiver disagree on
    /// the stream layout.
    #[must_use]
    pub const fn is_shape_mismatch(&self) -> bool {
        matches!(
            self,
            Self::StreamUnderrun { .. }
                | Self::InvalidEnum { .. }
                | Self::InvalidBarSlot { .. }
                | Self::UnknownItemKind { .. }
        )
    }
}
