//! Layered animation commands.
//!
//! The command mode is a 3-bit discriminant that decides which fields follow.
//! Reader and writer branch on the mode alone:
//!
//! | mode          | fields                                        |
//! |---------------|-----------------------------------------------|
//! | stop-all      | none                                          |
//! | play-single   | clip, looping                                 |
//! | play-masked   | clip, looping, mask                           |
//! | blend-single  | from, to, sync, blend time                    |
//! | blend-mask    | from, to, sync, blend time, mask              |
//!
//! A mode change resends every field of the new mode. Blend time travels as
//! tenths of a second in one byte behind an is-zero bit.

use bitstream::{BitReader, BitWriter};
use facet::{AnimationClip, AnimationCommand, BlendSync, LayeredAnimation};

use crate::delta::{bounded_enum, DeltaField};
use crate::error::ReplicationResult;
use crate::existence::{FacetCodec, Tracked};
use crate::item::ItemKind;

pub type AnimationItem = Tracked<AnimationCodec>;

/// Discriminant of an [`AnimationCommand`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AnimationMode {
    #[default]
    StopAll,
    PlaySingle,
    PlayMasked,
    BlendSingle,
    BlendMasked,
}

bounded_enum!(
    AnimationMode,
    "animation mode",
    3,
    [StopAll = 0, PlaySingle = 1, PlayMasked = 2, BlendSingle = 3, BlendMasked = 4]
);

impl AnimationMode {
    #[must_use]
    pub const fn of(command: &AnimationCommand) -> Self {
        match command {
            AnimationCommand::StopAll => Self::StopAll,
            AnimationCommand::PlaySingle { .. } => Self::PlaySingle,
            AnimationCommand::PlayMasked { .. } => Self::PlayMasked,
            AnimationCommand::BlendSingle { .. } => Self::BlendSingle,
            AnimationCommand::BlendMasked { .. } => Self::BlendMasked,
        }
    }

    const fn has_clip(self) -> bool {
        !matches!(self, Self::StopAll)
    }

    const fn has_looping(self) -> bool {
        matches!(self, Self::PlaySingle | Self::PlayMasked)
    }

    const fn is_blend(self) -> bool {
        matches!(self, Self::BlendSingle | Self::BlendMasked)
    }

    const fn is_masked(self) -> bool {
        matches!(self, Self::PlayMasked | Self::BlendMasked)
    }
}

/// Rounds seconds to the nearest tenth, saturating at 25.5 s.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantize_blend_time(seconds: f32) -> u8 {
    (seconds * 10.0).round().clamp(0.0, f32::from(u8::MAX)) as u8
}

#[must_use]
pub fn dequantize_blend_time(tenths: u8) -> f32 {
    f32::from(tenths) / 10.0
}

/// A command flattened into per-field slots; slots unused by the mode hold
/// their defaults.
#[derive(Debug, Clone, Default, PartialEq)]
struct Parts {
    mode: AnimationMode,
    clip: AnimationClip,
    target: AnimationClip,
    looping: bool,
    sync: BlendSync,
    blend_tenths: u8,
    mask: Vec<String>,
}

impl Parts {
    fn of(command: &AnimationCommand) -> Self {
        let mode = AnimationMode::of(command);
        match command {
            AnimationCommand::StopAll => Self::default(),
            AnimationCommand::PlaySingle { clip, looping } => Self {
                mode,
                clip: *clip,
                looping: *looping,
                ..Self::default()
            },
            AnimationCommand::PlayMasked {
                clip,
                looping,
                mask,
            } => Self {
                mode,
                clip: *clip,
                looping: *looping,
                mask: mask.clone(),
                ..Self::default()
            },
            AnimationCommand::BlendSingle {
                from,
                to,
                sync,
                blend_time,
            } => Self {
                mode,
                clip: *from,
                target: *to,
                sync: *sync,
                blend_tenths: quantize_blend_time(*blend_time),
                ..Self::default()
            },
            AnimationCommand::BlendMasked {
                from,
                to,
                sync,
                blend_time,
                mask,
            } => Self {
                mode,
                clip: *from,
                target: *to,
                sync: *sync,
                blend_tenths: quantize_blend_time(*blend_time),
                mask: mask.clone(),
                ..Self::default()
            },
        }
    }

    fn into_command(self) -> AnimationCommand {
        match self.mode {
            AnimationMode::StopAll => AnimationCommand::StopAll,
            AnimationMode::PlaySingle => AnimationCommand::PlaySingle {
                clip: self.clip,
                looping: self.looping,
            },
            AnimationMode::PlayMasked => AnimationCommand::PlayMasked {
                clip: self.clip,
                looping: self.looping,
                mask: self.mask,
            },
            AnimationMode::BlendSingle => AnimationCommand::BlendSingle {
                from: self.clip,
                to: self.target,
                sync: self.sync,
                blend_time: dequantize_blend_time(self.blend_tenths),
            },
            AnimationMode::BlendMasked => AnimationCommand::BlendMasked {
                from: self.clip,
                to: self.target,
                sync: self.sync,
                blend_time: dequantize_blend_time(self.blend_tenths),
                mask: self.mask,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationCodec {
    mode: DeltaField<AnimationMode>,
    clip: DeltaField<AnimationClip>,
    target: DeltaField<AnimationClip>,
    looping: DeltaField<bool>,
    sync: DeltaField<BlendSync>,
    blend_tenths: DeltaField<u8>,
    mask: DeltaField<Vec<String>>,
}

/// Decoded animation changes. `mode` is always the resolved mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationUpdate {
    pub mode: AnimationMode,
    pub mode_changed: bool,
    pub clip: Option<AnimationClip>,
    pub target: Option<AnimationClip>,
    pub looping: Option<bool>,
    pub sync: Option<BlendSync>,
    pub blend_tenths: Option<u8>,
    pub mask: Option<Vec<String>>,
}

impl AnimationCodec {
    pub fn mode(&self) -> AnimationMode {
        *self.mode.get()
    }

    fn write_blend_time(&self, writer: &mut BitWriter, force: bool) {
        let changed = self.blend_tenths.is_changed() || force;
        writer.write_bool(changed);
        if changed {
            let tenths = *self.blend_tenths.get();
            writer.write_bool(tenths == 0);
            if tenths != 0 {
                writer.write_u8(tenths);
            }
        }
    }

    fn read_blend_time(&mut self, reader: &mut BitReader<'_>) -> ReplicationResult<Option<u8>> {
        if !reader.read_bit()? {
            return Ok(None);
        }
        let tenths = if reader.read_bit()? {
            0
        } else {
            reader.read_u8()?
        };
        self.blend_tenths.set(tenths);
        Ok(Some(tenths))
    }
}

impl FacetCodec for AnimationCodec {
    type Facet = LayeredAnimation;
    type Update = AnimationUpdate;

    const KIND: ItemKind = ItemKind::Animation;

    fn diff(&mut self, facet: &LayeredAnimation) -> bool {
        let parts = Parts::of(&facet.command);
        let mode = parts.mode;
        let mode_changed = self.mode.check(&mode);
        let clip = self.clip.check(&parts.clip);
        let target = self.target.check(&parts.target);
        let looping = self.looping.check(&parts.looping);
        let sync = self.sync.check(&parts.sync);
        let blend = self.blend_tenths.check(&parts.blend_tenths);
        let mask = self.mask.check(&parts.mask);

        mode_changed
            || (mode.has_clip() && clip)
            || (mode.has_looping() && looping)
            || (mode.is_blend() && (target || sync || blend))
            || (mode.is_masked() && mask)
    }

    fn mark_all_changed(&mut self) {
        self.mode.mark_changed();
        self.clip.mark_changed();
        self.target.mark_changed();
        self.looping.mark_changed();
        self.sync.mark_changed();
        self.blend_tenths.mark_changed();
        self.mask.mark_changed();
    }

    fn write(&self, writer: &mut BitWriter, force: bool) -> ReplicationResult<()> {
        self.mode.write(writer, force)?;
        let mode = self.mode();
        let all = force || self.mode.is_changed();
        if mode.has_clip() {
            self.clip.write(writer, all)?;
        }
        if mode.has_looping() {
            self.looping.write(writer, all)?;
        }
        if mode.is_blend() {
            self.target.write(writer, all)?;
            self.sync.write(writer, all)?;
            self.write_blend_time(writer, all);
        }
        if mode.is_masked() {
            self.mask.write(writer, all)?;
        }
        Ok(())
    }

    fn read(&mut self, reader: &mut BitReader<'_>) -> ReplicationResult<AnimationUpdate> {
        let mode_changed = self.mode.read(reader)?.is_some();
        let mode = self.mode();
        let mut update = AnimationUpdate {
            mode,
            mode_changed,
            ..AnimationUpdate::default()
        };
        if mode.has_clip() {
            update.clip = self.clip.read(reader)?;
        }
        if mode.has_looping() {
            update.looping = self.looping.read(reader)?;
        }
        if mode.is_blend() {
            update.target = self.target.read(reader)?;
            update.sync = self.sync.read(reader)?;
            update.blend_tenths = self.read_blend_time(reader)?;
        }
        if mode.is_masked() {
            update.mask = self.mask.read(reader)?;
        }
        Ok(update)
    }

    fn apply(update: &AnimationUpdate, facet: &mut LayeredAnimation) {
        let mut parts = Parts::of(&facet.command);
        parts.mode = update.mode;
        if let Some(clip) = update.clip {
            parts.clip = clip;
        }
        if let Some(target) = update.target {
            parts.target = target;
        }
        if let Some(looping) = update.looping {
            parts.looping = looping;
        }
        if let Some(sync) = update.sync {
            parts.sync = sync;
        }
        if let Some(tenths) = update.blend_tenths {
            parts.blend_tenths = tenths;
        }
        if let Some(mask) = &update.mask {
            parts.mask.clone_from(mask);
        }
        facet.command = parts.into_command();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet::BoneRetarget;

    fn clip(asset: u32) -> AnimationClip {
        AnimationClip {
            asset,
            reverse: false,
            retarget: BoneRetarget::Skeleton,
        }
    }

    fn play(asset: u32) -> LayeredAnimation {
        LayeredAnimation {
            command: AnimationCommand::PlaySingle {
                clip: clip(asset),
                looping: true,
            },
        }
    }

    fn bits_for(codec: &AnimationCodec) -> usize {
        let mut writer = BitWriter::new();
        codec.write(&mut writer, false).unwrap();
        writer.bits_written()
    }

    #[test]
    fn quantize_rounds_to_tenths() {
        assert_eq!(quantize_blend_time(0.0), 0);
        assert_eq!(quantize_blend_time(0.24), 2);
        assert_eq!(quantize_blend_time(0.25), 3);
        assert_eq!(quantize_blend_time(1.0), 10);
        assert_eq!(quantize_blend_time(-3.0), 0);
        assert_eq!(quantize_blend_time(1000.0), 255);
        assert_eq!(quantize_blend_time(f32::NAN), 0);
        assert!((dequantize_blend_time(15) - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn stop_all_is_mode_only() {
        let mut codec = AnimationCodec::default();
        codec.diff(&play(1));
        assert!(codec.diff(&LayeredAnimation::default()));
        assert_eq!(bits_for(&codec), 1 + 3);
    }

    #[test]
    fn clip_swap_keeps_mode() {
        let mut codec = AnimationCodec::default();
        codec.diff(&play(1));
        assert!(codec.diff(&play(2)));
        // mode [0], clip [1][35], looping [0]
        assert_eq!(bits_for(&codec), 1 + 36 + 1);
    }

    #[test]
    fn unchanged_play_is_mode_and_field_flags() {
        let mut codec = AnimationCodec::default();
        codec.diff(&play(1));
        assert!(!codec.diff(&play(1)));
        assert_eq!(bits_for(&codec), 1 + 1 + 1);
    }

    #[test]
    fn zero_blend_time_skips_byte() {
        let blend = |time: f32| LayeredAnimation {
            command: AnimationCommand::BlendSingle {
                from: clip(1),
                to: clip(2),
                sync: BlendSync::Free,
                blend_time: time,
            },
        };
        let mut codec = AnimationCodec::default();
        codec.diff(&blend(0.5));
        codec.diff(&blend(0.0));
        // mode [0], from [0], to [0], sync [0], blend [1][1]
        assert_eq!(bits_for(&codec), 4 + 2);

        codec.diff(&blend(0.7));
        assert_eq!(bits_for(&codec), 4 + 2 + 8);
    }

    #[test]
    fn sub_tenth_change_is_not_a_change() {
        let blend = |time: f32| LayeredAnimation {
            command: AnimationCommand::BlendSingle {
                from: clip(1),
                to: clip(2),
                sync: BlendSync::Phase,
                blend_time: time,
            },
        };
        let mut codec = AnimationCodec::default();
        codec.diff(&blend(0.51));
        assert!(!codec.diff(&blend(0.52)));
    }

    #[test]
    fn apply_switches_mode() {
        let update = AnimationUpdate {
            mode: AnimationMode::PlayMasked,
            mode_changed: true,
            clip: Some(clip(9)),
            looping: Some(false),
            mask: Some(vec!["arm_l".to_owned()]),
            ..AnimationUpdate::default()
        };
        let mut facet = play(1);
        AnimationCodec::apply(&update, &mut facet);
        assert_eq!(
            facet.command,
            AnimationCommand::PlayMasked {
                clip: clip(9),
                looping: false,
                mask: vec!["arm_l".to_owned()],
            }
        );
    }
}
