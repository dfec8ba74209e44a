//! Bit-level writer for encoding packed binary data.

use crate::error::{BitError, BitResult};
use crate::MAX_STRING_BYTES;

/// A bit-level writer for encoding packed binary data.
///
/// Bits are written most-significant first. Writes are accumulated in an
/// internal buffer; call [`finish`](Self::finish) to get the final bytes.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    /// The accumulated bytes.
    bytes: Vec<u8>,
    /// Current byte being written (not yet pushed to bytes).
    current_byte: u8,
    /// Number of bits written to `current_byte` (0-7).
    bit_count: u8,
}

impl BitWriter {
    /// Creates a new empty `BitWriter`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `BitWriter` with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub fn bits_written(&self) -> usize {
        self.bytes.len() * 8 + self.bit_count as usize
    }

    /// Writes a single bit.
    pub fn write_bool(&mut self, value: bool) {
        self.current_byte = (self.current_byte << 1) | u8::from(value);
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.bytes.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// Writes the low `bits` bits of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 64`.
    /// Returns [`BitError::ValueOutOfRange`] if `value` doesn't fit in `bits`.
    pub fn write_bits(&mut self, value: u64, bits: u8) -> BitResult<()> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits < 64 && value >= (1u64 << bits) {
            return Err(BitError::ValueOutOfRange { value, bits });
        }
        self.push_bits(value, bits);
        Ok(())
    }

    /// Writes a full-width `u8`.
    pub fn write_u8(&mut self, value: u8) {
        self.push_bits(u64::from(value), 8);
    }

    /// Writes a full-width `u16`.
    pub fn write_u16(&mut self, value: u16) {
        self.push_bits(u64::from(value), 16);
    }

    /// Writes a full-width `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.push_bits(u64::from(value), 32);
    }

    /// Writes a full-width `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.push_bits(value, 64);
    }

    /// Writes an `f32` as its IEEE-754 bit pattern.
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Writes a string as a one-byte length prefix followed by its UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::StringTooLong`] if the string exceeds
    /// [`MAX_STRING_BYTES`] bytes.
    pub fn write_str(&mut self, value: &str) -> BitResult<()> {
        let len = value.len();
        let prefix = u8::try_from(len).map_err(|_| BitError::StringTooLong {
            len,
            max: MAX_STRING_BYTES,
        })?;
        self.write_u8(prefix);
        for byte in value.bytes() {
            self.write_u8(byte);
        }
        Ok(())
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        while self.bit_count != 0 {
            self.write_bool(false);
        }
    }

    /// Finishes writing and returns the byte buffer.
    ///
    /// If the last byte is incomplete, it is padded with zeros on the right.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.flush_partial();
        self.bytes
    }

    fn flush_partial(&mut self) {
        if self.bit_count > 0 {
            self.current_byte <<= 8 - self.bit_count;
            self.bytes.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    fn push_bits(&mut self, value: u64, bits: u8) {
        for i in (0..bits).rev() {
            self.write_bool((value >> i) & 1 == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_writer() {
        let writer = BitWriter::new();
        assert_eq!(writer.bits_written(), 0);
        assert!(writer.finish().is_empty());
    }

    #[test]
    fn write_single_bit_true() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        assert_eq!(writer.bits_written(), 1);
        // Single bit 1, padded with 7 zeros
        assert_eq!(writer.finish(), vec![0b1000_0000]);
    }

    #[test]
    fn write_bits_across_byte_boundary() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b1111, 4).unwrap();
        writer.write_bits(0b1010_1010, 8).unwrap();
        assert_eq!(writer.finish(), vec![0b1111_1010, 0b1010_0000]);
    }

    #[test]
    fn write_bits_zero_width_is_noop() {
        let mut writer = BitWriter::new();
        writer.write_bits(0, 0).unwrap();
        assert_eq!(writer.bits_written(), 0);
    }

    #[test]
    fn write_bits_invalid_count() {
        let mut writer = BitWriter::new();
        let result = writer.write_bits(0, 65);
        assert!(matches!(
            result,
            Err(BitError::InvalidBitCount {
                bits: 65,
                max_bits: 64
            })
        ));
    }

    #[test]
    fn write_bits_value_out_of_range() {
        let mut writer = BitWriter::new();
        // A 7-bit slot holds at most 127
        let result = writer.write_bits(128, 7);
        assert!(matches!(
            result,
            Err(BitError::ValueOutOfRange {
                value: 128,
                bits: 7
            })
        ));
    }

    #[test]
    fn write_u64_full_width() {
        let mut writer = BitWriter::new();
        writer.write_u64(u64::MAX);
        assert_eq!(writer.finish(), vec![0xFF; 8]);
    }

    #[test]
    fn write_u16_big_endian_bit_order() {
        let mut writer = BitWriter::new();
        writer.write_u16(0xABCD);
        assert_eq!(writer.finish(), vec![0xAB, 0xCD]);
    }

    #[test]
    fn write_str_prefixes_length() {
        let mut writer = BitWriter::new();
        writer.write_str("hip").unwrap();
        assert_eq!(writer.finish(), vec![3, b'h', b'i', b'p']);
    }

    #[test]
    fn write_str_rejects_long_strings() {
        let mut writer = BitWriter::new();
        let long = "x".repeat(256);
        let err = writer.write_str(&long).unwrap_err();
        assert_eq!(err, BitError::StringTooLong { len: 256, max: 255 });
        assert_eq!(writer.bits_written(), 0);
    }

    #[test]
    fn align_to_byte_pads_with_zeros() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        writer.align_to_byte();
        assert_eq!(writer.bits_written(), 8);
        writer.align_to_byte();
        assert_eq!(writer.bits_written(), 8);
    }
}
