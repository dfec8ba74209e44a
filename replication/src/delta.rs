//! Delta codec primitives.
//!
//! Every replicated field is written as one "changed" bit, followed by the
//! value only when that bit is set:
//!
//! ```text
//! unchanged: [0]
//! changed:   [1][value bits]
//! ```
//!
//! [`DeltaValue`] provides the per-value-kind encoding; the free functions and
//! [`DeltaField`] implement the changed-flag protocol once for all items.

use bitstream::{BitError, BitReader, BitWriter};
use facet::{
    AnimationClip, BlendSync, BoneRetarget, EntityId, LinkKind, Quaternion, Stance, Vec2, Vec3,
};

use crate::error::{ReplicationError, ReplicationResult};

/// A value kind that can be written to and read from a bit stream.
pub trait DeltaValue: Clone {
    /// Writes the value.
    fn write(&self, writer: &mut BitWriter) -> ReplicationResult<()>;

    /// Reads a value written by [`write`](Self::write).
    fn read(reader: &mut BitReader<'_>) -> ReplicationResult<Self>;

    /// Returns `true` if both values encode to the same bits.
    ///
    /// Floats compare by bit pattern so `NaN` never reads as a permanent change
    /// and `-0.0` is replicated faithfully.
    fn same(&self, other: &Self) -> bool;
}

macro_rules! delta_uint {
    ($($ty:ty => $write:ident, $read:ident);* $(;)?) => {
        $(
            impl DeltaValue for $ty {
                fn write(&self, writer: &mut BitWriter) -> ReplicationResult<()> {
                    writer.$write(*self);
                    Ok(())
                }

                fn read(reader: &mut BitReader<'_>) -> ReplicationResult<Self> {
                    Ok(reader.$read()?)
                }

                fn same(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

delta_uint! {
    u8 => write_u8, read_u8;
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    u64 => write_u64, read_u64;
}

impl DeltaValue for bool {
    fn write(&self, writer: &mut BitWriter) -> ReplicationResult<()> {
        writer.write_bool(*self);
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> ReplicationResult<Self> {
        Ok(reader.read_bit()?)
    }

    fn same(&self, other: &Self) -> bool {
        self == other
    }
}

impl DeltaValue for f32 {
    fn write(&self, writer: &mut BitWriter) -> ReplicationResult<()> {
        writer.write_f32(*self);
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> ReplicationResult<Self> {
        Ok(reader.read_f32()?)
    }

    fn same(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl DeltaValue for Vec2<f32> {
    fn write(&self, writer: &mut BitWriter) -> ReplicationResult<()> {
        writer.write_f32(self.x);
        writer.write_f32(self.y);
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> ReplicationResult<Self> {
        Ok(Self::new(reader.read_f32()?, reader.read_f32()?))
    }

    fn same(&self, other: &Self) -> bool {
        self.x.same(&other.x) && self.y.same(&other.y)
    }
}

impl DeltaValue for Vec3<f32> {
    fn write(&self, writer: &mut BitWriter) -> ReplicationResult<()> {
        writer.write_f32(self.x);
        writer.write_f32(self.y);
        writer.write_f32(self.z);
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> ReplicationResult<Self> {
        Ok(Self::new(
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
        ))
    }

    fn same(&self, other: &Self) -> bool {
        self.x.same(&other.x) && self.y.same(&other.y) && self.z.same(&other.z)
    }
}

impl DeltaValue for Quaternion<f32> {
    fn write(&self, writer: &mut BitWriter) -> ReplicationResult<()> {
        writer.write_f32(self.x);
        writer.write_f32(self.y);
        writer.write_f32(self.z);
        writer.write_f32(self.w);
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> ReplicationResult<Self> {
        Ok(Self::from_xyzw(
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
        ))
    }

    fn same(&self, other: &Self) -> bool {
        self.x.same(&other.x)
            && self.y.same(&other.y)
            && self.z.same(&other.z)
            && self.w.same(&other.w)
    }
}

/// Presence bit, then the raw id when present.
impl DeltaValue for Option<EntityId> {
    fn write(&self, writer: &mut BitWriter) -> ReplicationResult<()> {
        writer.write_bool(self.is_some());
        if let Some(id) = self {
            writer.write_u64(id.raw());
        }
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> ReplicationResult<Self> {
        if reader.read_bit()? {
            Ok(Some(EntityId::new(reader.read_u64()?)))
        } else {
            Ok(None)
        }
    }

    fn same(&self, other: &Self) -> bool {
        self == other
    }
}

/// Bone names: count byte, then each name length-prefixed.
impl DeltaValue for Vec<String> {
    fn write(&self, writer: &mut BitWriter) -> ReplicationResult<()> {
        let count = u8::try_from(self.len()).map_err(|_| ReplicationError::MaskTooLong {
            len: self.len(),
            max: MAX_MASK_NAMES,
        })?;
        writer.write_u8(count);
        for name in self {
            writer.write_str(name).map_err(|_| ReplicationError::StringTooLong {
                len: name.len(),
                max: bitstream::MAX_STRING_BYTES,
            })?;
        }
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> ReplicationResult<Self> {
        let count = reader.read_u8()?;
        let mut names = Self::with_capacity(usize::from(count));
        for _ in 0..count {
            names.push(reader.read_string()?);
        }
        Ok(names)
    }

    fn same(&self, other: &Self) -> bool {
        self == other
    }
}

/// Maximum number of names in a bone mask.
pub const MAX_MASK_NAMES: usize = u8::MAX as usize;

/// Implements [`DeltaValue`] for a fieldless enum packed into a fixed number of bits.
macro_rules! bounded_enum {
    ($ty:ident, $name:literal, $bits:literal, [$($variant:ident = $raw:literal),* $(,)?]) => {
        impl $crate::delta::DeltaValue for $ty {
            fn write(
                &self,
                writer: &mut ::bitstream::BitWriter,
            ) -> $crate::error::ReplicationResult<()> {
                let raw: u64 = match self {
                    $($ty::$variant => $raw,)*
                };
                writer.write_bits(raw, $bits)?;
                Ok(())
            }

            fn read(
                reader: &mut ::bitstream::BitReader<'_>,
            ) -> $crate::error::ReplicationResult<Self> {
                match reader.read_bits($bits)? {
                    $($raw => Ok($ty::$variant),)*
                    raw => Err($crate::error::ReplicationError::InvalidEnum { name: $name, raw }),
                }
            }

            fn same(&self, other: &Self) -> bool {
                self == other
            }
        }
    };
}

pub(crate) use bounded_enum;

bounded_enum!(LinkKind, "link kind", 2, [Rigid = 0, PositionOnly = 1, Socket = 2, Tether = 3]);
bounded_enum!(BoneRetarget, "bone retarget", 2, [None = 0, Skeleton = 1, Proportional = 2, AnimationScaled = 3]);
bounded_enum!(BlendSync, "blend sync", 2, [Free = 0, Phase = 1, Length = 2]);
bounded_enum!(Stance, "stance", 2, [Idle = 0, Walk = 1, Run = 2, Crouch = 3]);

/// Asset id, reverse flag, bone retarget mode.
impl DeltaValue for AnimationClip {
    fn write(&self, writer: &mut BitWriter) -> ReplicationResult<()> {
        writer.write_u32(self.asset);
        writer.write_bool(self.reverse);
        self.retarget.write(writer)
    }

    fn read(reader: &mut BitReader<'_>) -> ReplicationResult<Self> {
        Ok(Self {
            asset: reader.read_u32()?,
            reverse: reader.read_bit()?,
            retarget: BoneRetarget::read(reader)?,
        })
    }

    fn same(&self, other: &Self) -> bool {
        self == other
    }
}

/// Compares `new` against `mirror`, storing `new` into the mirror when they
/// differ. Returns whether the value changed.
pub fn check_for_changes<V: DeltaValue>(new: &V, mirror: &mut V) -> bool {
    if new.same(mirror) {
        false
    } else {
        *mirror = new.clone();
        true
    }
}

/// Writes the changed bit, then `value` if `changed`.
pub fn write_changed<V: DeltaValue>(
    changed: bool,
    value: &V,
    writer: &mut BitWriter,
) -> ReplicationResult<()> {
    writer.write_bool(changed);
    if changed {
        value.write(writer)?;
    }
    Ok(())
}

/// Reads the changed bit, then a value if it was set.
pub fn read_changed<V: DeltaValue>(reader: &mut BitReader<'_>) -> ReplicationResult<Option<V>> {
    if reader.read_bit()? {
        V::read(reader).map(Some)
    } else {
        Ok(None)
    }
}

/// Writes the changed bit, then `value` truncated to `bits` if `changed`.
///
/// Values that do not fit are rejected rather than silently masked.
pub fn write_changed_bits(
    changed: bool,
    value: u64,
    bits: u8,
    writer: &mut BitWriter,
) -> ReplicationResult<()> {
    writer.write_bool(changed);
    if changed {
        writer.write_bits(value, bits)?;
    }
    Ok(())
}

/// Reads the changed bit, then a `bits`-wide value if it was set.
pub fn read_changed_bits(bits: u8, reader: &mut BitReader<'_>) -> ReplicationResult<Option<u64>> {
    if reader.read_bit()? {
        Ok(Some(reader.read_bits(bits)?))
    } else {
        Ok(None)
    }
}

/// Reads the changed bit, then a value of at most 8 bits if it was set.
pub fn read_changed_small(bits: u8, reader: &mut BitReader<'_>) -> ReplicationResult<Option<u8>> {
    debug_assert!(bits <= 8);
    match read_changed_bits(bits, reader)? {
        Some(raw) => u8::try_from(raw)
            .map(Some)
            .map_err(|_| BitError::ValueOutOfRange { value: raw, bits }.into()),
        None => Ok(None),
    }
}

/// Host mirror of one field plus its changed flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaField<V> {
    value: V,
    changed: bool,
}

impl<V: DeltaValue> DeltaField<V> {
    #[must_use]
    pub const fn new(value: V) -> Self {
        Self {
            value,
            changed: false,
        }
    }

    /// Last observed value.
    pub const fn get(&self) -> &V {
        &self.value
    }

    pub const fn is_changed(&self) -> bool {
        self.changed
    }

    /// Diffs `new` against the mirror. The changed flag reflects this call only.
    pub fn check(&mut self, new: &V) -> bool {
        self.changed = check_for_changes(new, &mut self.value);
        self.changed
    }

    /// Diffs like [`check`](Self::check) but keeps an already-raised flag.
    pub fn check_or_keep(&mut self, new: &V) -> bool {
        let changed = check_for_changes(new, &mut self.value);
        self.changed |= changed;
        self.changed
    }

    /// Overwrites the mirror without raising the changed flag.
    pub fn set(&mut self, value: V) {
        self.value = value;
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Writes the changed bit and value; `force` treats the field as changed.
    pub fn write(&self, writer: &mut BitWriter, force: bool) -> ReplicationResult<()> {
        write_changed(self.changed || force, &self.value, writer)
    }

    /// Reads a delta, updating the mirror when one is present.
    pub fn read(&mut self, reader: &mut BitReader<'_>) -> ReplicationResult<Option<V>> {
        let value = read_changed::<V>(reader)?;
        if let Some(value) = &value {
            self.value = value.clone();
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<V: DeltaValue + std::fmt::Debug + PartialEq>(value: &V) -> V {
        let mut writer = BitWriter::new();
        value.write(&mut writer).unwrap();
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        V::read(&mut reader).unwrap()
    }

    #[test]
    fn unchanged_costs_one_bit() {
        let mut writer = BitWriter::new();
        write_changed(false, &Vec3::new(1.0f32, 2.0, 3.0), &mut writer).unwrap();
        assert_eq!(writer.bits_written(), 1);
    }

    #[test]
    fn changed_vec3_costs_one_plus_96_bits() {
        let mut writer = BitWriter::new();
        write_changed(true, &Vec3::new(1.0f32, 2.0, 3.0), &mut writer).unwrap();
        assert_eq!(writer.bits_written(), 97);
    }

    #[test]
    fn read_changed_matches_write_changed() {
        let mut writer = BitWriter::new();
        write_changed(true, &Vec2::new(0.5f32, -4.0), &mut writer).unwrap();
        write_changed(false, &7u32, &mut writer).unwrap();
        write_changed_bits(true, 100, 7, &mut writer).unwrap();
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(
            read_changed::<Vec2<f32>>(&mut reader).unwrap(),
            Some(Vec2::new(0.5, -4.0))
        );
        assert_eq!(read_changed::<u32>(&mut reader).unwrap(), None);
        assert_eq!(read_changed_bits(7, &mut reader).unwrap(), Some(100));
    }

    #[test]
    fn bounded_value_out_of_range_is_rejected() {
        let mut writer = BitWriter::new();
        let err = write_changed_bits(true, 128, 7, &mut writer).unwrap_err();
        assert!(matches!(err, ReplicationError::Bit(_)));
    }

    #[test]
    fn check_for_changes_updates_mirror() {
        let mut mirror = 1.5f32;
        assert!(!check_for_changes(&1.5, &mut mirror));
        assert!(check_for_changes(&2.0, &mut mirror));
        assert_eq!(mirror, 2.0);
        assert!(!check_for_changes(&2.0, &mut mirror));
    }

    #[test]
    fn nan_is_stable_and_negative_zero_is_a_change() {
        let mut mirror = f32::NAN;
        assert!(!check_for_changes(&f32::NAN, &mut mirror));
        let mut zero = 0.0f32;
        assert!(check_for_changes(&-0.0, &mut zero));
    }

    #[test]
    fn quaternion_roundtrip() {
        let q = Quaternion::from_xyzw(0.1f32, 0.2, 0.3, 0.9);
        assert_eq!(roundtrip(&q), q);
    }

    #[test]
    fn optional_entity_roundtrip() {
        assert_eq!(roundtrip(&Some(EntityId::new(u64::MAX))), Some(EntityId::new(u64::MAX)));
        assert_eq!(roundtrip::<Option<EntityId>>(&None), None);
    }

    #[test]
    fn clip_roundtrip() {
        let clip = AnimationClip {
            asset: 77,
            reverse: true,
            retarget: BoneRetarget::Proportional,
        };
        assert_eq!(roundtrip(&clip), clip);
    }

    #[test]
    fn enum_uses_two_bits() {
        let mut writer = BitWriter::new();
        Stance::Crouch.write(&mut writer).unwrap();
        assert_eq!(writer.bits_written(), 2);
    }

    #[test]
    fn invalid_enum_raw_is_rejected() {
        // BlendSync has no variant at 3.
        let bytes = [0b1100_0000];
        let mut reader = BitReader::new(&bytes);
        let err = BlendSync::read(&mut reader).unwrap_err();
        assert_eq!(
            err,
            ReplicationError::InvalidEnum {
                name: "blend sync",
                raw: 3
            }
        );
    }

    #[test]
    fn mask_roundtrip_and_limits() {
        let mask = vec!["spine".to_owned(), "neck".to_owned()];
        assert_eq!(roundtrip(&mask), mask);

        let too_many = vec![String::new(); MAX_MASK_NAMES + 1];
        let mut writer = BitWriter::new();
        assert!(matches!(
            too_many.write(&mut writer),
            Err(ReplicationError::MaskTooLong { len: 256, .. })
        ));

        let long_name = vec!["x".repeat(300)];
        let mut writer = BitWriter::new();
        assert!(matches!(
            long_name.write(&mut writer),
            Err(ReplicationError::StringTooLong { len: 300, .. })
        ));
    }

    #[test]
    fn delta_field_flags() {
        let mut field = DeltaField::new(0u8);
        assert!(!field.check(&0));
        assert!(field.check(&3));
        assert!(!field.check(&3));
        assert!(!field.is_changed());

        field.mark_changed();
        assert!(field.check_or_keep(&3));

        let mut writer = BitWriter::new();
        field.write(&mut writer, false).unwrap();
        assert_eq!(writer.bits_written(), 9);
    }

    #[test]
    fn delta_field_force_writes_value() {
        let field = DeltaField::new(5u16);
        let mut writer = BitWriter::new();
        field.write(&mut writer, true).unwrap();
        let bytes = writer.finish();

        let mut mirror = DeltaField::new(0u16);
        let mut reader = BitReader::new(&bytes);
        assert_eq!(mirror.read(&mut reader).unwrap(), Some(5));
        assert_eq!(*mirror.get(), 5);
    }

    #[test]
    fn truncated_read_is_underrun() {
        let mut writer = BitWriter::new();
        write_changed(true, &9u64, &mut writer).unwrap();
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes[..3]);
        let err = read_changed::<u64>(&mut reader).unwrap_err();
        assert!(matches!(err, ReplicationError::Bit(e) if e.is_underrun()));
    }
}
