//! Packet decoding, entity blocks, and section framing.
//!
//! Payload layout after the header, repeated until the payload ends:
//!
//! ```text
//! [entity id: u64 LE][block kind: u8]
//!   kind = Update: [section count: u8] then per section [tag: u8][len: varu32][body]
//!   kind = Leave:  nothing
//! ```

use crate::error::{DecodeError, EncodeError, LimitKind, SectionFramingError, WireResult};
use crate::header::{PacketFlags, PacketHeader, HEADER_SIZE, MAGIC, VERSION};
use crate::limits::Limits;

/// What an entity block carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockKind {
    /// Item sections produced at the packet tick.
    Update = 0,
    /// The entity left the receiver's synchronization set at the packet tick.
    Leave = 1,
}

impl BlockKind {
    /// Parses a block kind from a raw byte.
    pub fn parse(kind: u8) -> Result<Self, DecodeError> {
        match kind {
            0 => Ok(Self::Update),
            1 => Ok(Self::Leave),
            _ => Err(DecodeError::UnknownBlockKind { kind }),
        }
    }
}

/// One item's sub-region within an entity block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireSection<'a> {
    /// Item kind tag; interpreted by the replication layer.
    pub tag: u8,
    pub body: &'a [u8],
}

/// All sections addressed to one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityBlock<'a> {
    pub entity: u64,
    pub kind: BlockKind,
    pub sections: Vec<WireSection<'a>>,
}

/// A decoded wire packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePacket<'a> {
    pub header: PacketHeader,
    pub blocks: Vec<EntityBlock<'a>>,
}

/// Decodes a wire packet into header + entity blocks.
pub fn decode_packet<'a>(buf: &'a [u8], limits: &Limits) -> WireResult<WirePacket<'a>> {
    if buf.len() < HEADER_SIZE {
        return Err(DecodeError::PacketTooSmall {
            actual: buf.len(),
            required: HEADER_SIZE,
        });
    }
    if buf.len() > limits.max_packet_bytes {
        return Err(DecodeError::LimitsExceeded {
            kind: LimitKind::PacketBytes,
            limit: limits.max_packet_bytes,
            actual: buf.len(),
        });
    }

    let magic = read_u32_le(buf, 0)?;
    if magic != MAGIC {
        return Err(DecodeError::InvalidMagic { found: magic });
    }

    let version = read_u16_le(buf, 4)?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion { found: version });
    }

    let flags_raw = read_u16_le(buf, 6)?;
    let flags = PacketFlags::from_raw(flags_raw);
    if !flags.is_valid_v1() {
        return Err(DecodeError::InvalidFlags { flags: flags_raw });
    }

    let tick = read_u32_le(buf, 8)?;
    let payload_len = read_u32_le(buf, 12)?;

    let actual_payload_len = buf.len() - HEADER_SIZE;
    if payload_len as usize != actual_payload_len {
        return Err(DecodeError::PayloadLengthMismatch {
            header_len: payload_len,
            actual_len: actual_payload_len,
        });
    }

    let header = PacketHeader {
        version,
        flags,
        tick,
        payload_len,
    };
    let blocks = decode_blocks(&buf[HEADER_SIZE..], limits)?;

    Ok(WirePacket { header, blocks })
}

/// Decodes entity blocks from a payload buffer (no packet header).
pub fn decode_blocks<'a>(payload: &'a [u8], limits: &Limits) -> WireResult<Vec<EntityBlock<'a>>> {
    let mut offset = 0usize;
    let mut blocks = Vec::new();

    while offset < payload.len() {
        if blocks.len() >= limits.max_blocks {
            return Err(DecodeError::LimitsExceeded {
                kind: LimitKind::EntityBlocks,
                limit: limits.max_blocks,
                actual: blocks.len() + 1,
            });
        }

        let entity = read_u64_le(payload, offset)?;
        offset += 8;
        let kind = BlockKind::parse(read_u8(payload, offset)?)?;
        offset += 1;

        let mut sections = Vec::new();
        if kind == BlockKind::Update {
            let count = read_u8(payload, offset)? as usize;
            offset += 1;
            if count > limits.max_sections_per_block {
                return Err(DecodeError::LimitsExceeded {
                    kind: LimitKind::SectionsPerBlock,
                    limit: limits.max_sections_per_block,
                    actual: count,
                });
            }
            sections.reserve(count);
            for _ in 0..count {
                let tag = read_u8(payload, offset)?;
                offset += 1;
                let (len, next) = read_varu32(payload, offset)?;
                offset = next;
                let len = len as usize;
                if len > limits.max_section_len {
                    return Err(DecodeError::LimitsExceeded {
                        kind: LimitKind::SectionLength,
                        limit: limits.max_section_len,
                        actual: len,
                    });
                }
                let end = offset + len;
                let body = payload.get(offset..end).ok_or(SectionFramingError::Truncated {
                    needed: end,
                    available: payload.len(),
                })?;
                sections.push(WireSection { tag, body });
                offset = end;
            }
        }

        blocks.push(EntityBlock {
            entity,
            kind,
            sections,
        });
    }

    Ok(blocks)
}

/// Encodes a packet header into the provided output buffer.
pub fn encode_header(header: &PacketHeader, out: &mut [u8]) -> Result<usize, EncodeError> {
    if out.len() < HEADER_SIZE {
        return Err(EncodeError::BufferTooSmall {
            needed: HEADER_SIZE,
            available: out.len(),
        });
    }

    out[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    out[4..6].copy_from_slice(&header.version.to_le_bytes());
    out[6..8].copy_from_slice(&header.flags.raw().to_le_bytes());
    out[8..12].copy_from_slice(&header.tick.to_le_bytes());
    out[12..16].copy_from_slice(&header.payload_len.to_le_bytes());

    Ok(HEADER_SIZE)
}

/// Appends a single section (tag, varint length, body) to `out`.
pub fn encode_section(tag: u8, body: &[u8], out: &mut Vec<u8>) -> Result<usize, EncodeError> {
    let len_u32 = u32::try_from(body.len())
        .map_err(|_| EncodeError::LengthOverflow { length: body.len() })?;
    let start = out.len();
    out.push(tag);
    write_varu32(len_u32, out);
    out.extend_from_slice(body);
    Ok(out.len() - start)
}

/// Incrementally builds one packet for one receiver and one tick.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    flags: PacketFlags,
    tick: u32,
    payload: Vec<u8>,
    blocks: usize,
}

impl PacketBuilder {
    /// Starts a packet for the given tick.
    #[must_use]
    pub fn new(flags: PacketFlags, tick: u32) -> Self {
        Self {
            flags,
            tick,
            payload: Vec::new(),
            blocks: 0,
        }
    }

    /// Number of entity blocks pushed so far.
    #[must_use]
    pub const fn block_count(&self) -> usize {
        self.blocks
    }

    /// Appends an update block with one section per `(tag, body)` pair.
    pub fn push_update<'b, I>(&mut self, entity: u64, sections: I) -> Result<(), EncodeError>
    where
        I: IntoIterator<Item = (u8, &'b [u8])>,
        I::IntoIter: ExactSizeIterator,
    {
        let sections = sections.into_iter();
        let count = sections.len();
        let count_u8 = u8::try_from(count).map_err(|_| EncodeError::TooManySections { count })?;
        self.payload.extend_from_slice(&entity.to_le_bytes());
        self.payload.push(BlockKind::Update as u8);
        self.payload.push(count_u8);
        for (tag, body) in sections {
            encode_section(tag, body, &mut self.payload)?;
        }
        self.blocks += 1;
        Ok(())
    }

    /// Appends a leave block.
    pub fn push_leave(&mut self, entity: u64) {
        self.payload.extend_from_slice(&entity.to_le_bytes());
        self.payload.push(BlockKind::Leave as u8);
        self.blocks += 1;
    }

    /// Writes the header and returns the finished packet bytes.
    pub fn finish(self) -> Result<Vec<u8>, EncodeError> {
        let payload_len = u32::try_from(self.payload.len()).map_err(|_| {
            EncodeError::LengthOverflow {
                length: self.payload.len(),
            }
        })?;
        let header = PacketHeader::new(self.flags, self.tick, payload_len);
        let mut out = vec![0u8; HEADER_SIZE];
        encode_header(&header, &mut out)?;
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

fn truncated(needed: usize, available: usize) -> DecodeError {
    DecodeError::SectionFraming(SectionFramingError::Truncated { needed, available })
}

fn read_u8(buf: &[u8], offset: usize) -> WireResult<u8> {
    buf.get(offset)
        .copied()
        .ok_or_else(|| truncated(offset + 1, buf.len()))
}

fn read_array<const N: usize>(buf: &[u8], offset: usize) -> WireResult<[u8; N]> {
    let mut out = [0u8; N];
    let slice = buf
        .get(offset..offset + N)
        .ok_or_else(|| truncated(offset + N, buf.len()))?;
    out.copy_from_slice(slice);
    Ok(out)
}

fn read_u16_le(buf: &[u8], offset: usize) -> WireResult<u16> {
    read_array::<2>(buf, offset).map(u16::from_le_bytes)
}

fn read_u32_le(buf: &[u8], offset: usize) -> WireResult<u32> {
    read_array::<4>(buf, offset).map(u32::from_le_bytes)
}

fn read_u64_le(buf: &[u8], offset: usize) -> WireResult<u64> {
    read_array::<8>(buf, offset).map(u64::from_le_bytes)
}

fn read_varu32(buf: &[u8], mut offset: usize) -> WireResult<(u32, usize)> {
    let mut value = 0u32;
    let mut shift = 0u32;
    for _ in 0..5 {
        let byte = read_u8(buf, offset)?;
        offset += 1;
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, offset));
        }
        shift += 7;
    }
    Err(DecodeError::SectionFraming(SectionFramingError::InvalidVarint))
}

fn write_varu32(mut value: u32, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> Vec<u8> {
        let mut builder = PacketBuilder::new(PacketFlags::tick(), 77);
        builder
            .push_update(9, [(1u8, &[0xAB][..]), (4u8, &[0x01, 0x02][..])])
            .unwrap();
        builder.push_leave(12);
        builder.finish().unwrap()
    }

    #[test]
    fn packet_roundtrip() {
        let bytes = sample_packet();
        let packet = decode_packet(&bytes, &Limits::for_testing()).unwrap();
        assert_eq!(packet.header.tick, 77);
        assert!(!packet.header.flags.is_full_resync());
        assert_eq!(packet.blocks.len(), 2);

        let update = &packet.blocks[0];
        assert_eq!(update.entity, 9);
        assert_eq!(update.kind, BlockKind::Update);
        assert_eq!(
            update.sections,
            vec![
                WireSection {
                    tag: 1,
                    body: &[0xAB]
                },
                WireSection {
                    tag: 4,
                    body: &[0x01, 0x02]
                },
            ]
        );

        let leave = &packet.blocks[1];
        assert_eq!(leave.entity, 12);
        assert_eq!(leave.kind, BlockKind::Leave);
        assert!(leave.sections.is_empty());
    }

    #[test]
    fn empty_packet_roundtrip() {
        let bytes = PacketBuilder::new(PacketFlags::full_resync(), 3)
            .finish()
            .unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let packet = decode_packet(&bytes, &Limits::default()).unwrap();
        assert!(packet.blocks.is_empty());
        assert!(packet.header.flags.is_full_resync());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_packet();
        bytes[0] ^= 0xFF;
        let err = decode_packet(&bytes, &Limits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidMagic { .. }));
    }

    #[test]
    fn rejects_payload_length_mismatch() {
        let mut bytes = sample_packet();
        bytes.push(0);
        let err = decode_packet(&bytes, &Limits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::PayloadLengthMismatch { .. }));
    }

    #[test]
    fn rejects_truncated_section() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&5u64.to_le_bytes());
        payload.push(BlockKind::Update as u8);
        payload.push(1);
        payload.push(2);
        payload.push(10); // claims 10 bytes, none follow
        let err = decode_blocks(&payload, &Limits::default()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::SectionFraming(SectionFramingError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_unknown_block_kind() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&5u64.to_le_bytes());
        payload.push(7);
        let err = decode_blocks(&payload, &Limits::default()).unwrap_err();
        assert_eq!(err, DecodeError::UnknownBlockKind { kind: 7 });
    }

    #[test]
    fn enforces_block_limit() {
        let mut builder = PacketBuilder::new(PacketFlags::tick(), 1);
        let limits = Limits {
            max_blocks: 2,
            ..Limits::for_testing()
        };
        for entity in 0..3 {
            builder.push_leave(entity);
        }
        let bytes = builder.finish().unwrap();
        let err = decode_packet(&bytes, &limits).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::LimitsExceeded {
                kind: LimitKind::EntityBlocks,
                ..
            }
        ));
    }

    #[test]
    fn varint_lengths() {
        let mut out = Vec::new();
        write_varu32(300, &mut out);
        assert_eq!(out, vec![0xAC, 0x02]);
        assert_eq!(read_varu32(&out, 0).unwrap(), (300, 2));
    }

    #[test]
    fn varint_too_long() {
        let buf = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert_eq!(
            read_varu32(&buf, 0).unwrap_err(),
            DecodeError::SectionFraming(SectionFramingError::InvalidVarint)
        );
    }
}
