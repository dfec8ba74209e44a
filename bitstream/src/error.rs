//! Error types for bitstream operations.

use thiserror::Error;

/// Result type for bitstream operations.
pub type BitResult<T> = Result<T, BitError>;

/// Errors that can occur during bit-level encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitError {
    /// Attempted to read past the end of the buffer.
    #[error("attempted to read {requested} bits but only {available} bits available")]
    UnexpectedEof {
        /// Number of bits requested.
        requested: usize,
        /// Number of bits available.
        available: usize,
    },

    /// Invalid bit count for the operation.
    #[error("invalid bit count {bits}, maximum allowed is {max_bits}")]
    InvalidBitCount {
        /// The invalid bit count provided.
        bits: u8,
        /// Maximum allowed bits for this operation.
        max_bits: u8,
    },

    /// Value exceeds the range representable by the specified number of bits.
    #[error("value {value} cannot be represented in {bits} bits")]
    ValueOutOfRange {
        /// The value that was out of range.
        value: u64,
        /// Number of bits available.
        bits: u8,
    },

    /// A byte-aligned access was attempted at an unaligned position.
    #[error("misaligned access at bit position {bit_position}")]
    MisalignedAccess { bit_position: usize },

    /// A varint ran past its maximum encoded length.
    #[error("invalid varint encoding")]
    InvalidVarint,

    /// A length-prefixed string exceeds the one-byte length prefix.
    #[error("string of {len} bytes exceeds maximum of {max} bytes")]
    StringTooLong { len: usize, max: usize },

    /// A decoded string was not valid UTF-8.
    #[error("decoded string is not valid UTF-8")]
    InvalidUtf8,
}

impl BitError {
    /// Returns `true` if the error means the reader ran out of input.
    #[must_use]
    pub const fn is_underrun(&self) -> bool {
        matches!(self, Self::UnexpectedEof { .. })
    }
}
