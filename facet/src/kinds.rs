//! Replicated facet data types.
//!
//! These are plain state containers; gameplay code mutates them and the
//! replication layer observes them.

use vek::{Quaternion, Vec2, Vec3};

use crate::EntityId;

/// Highest scheduling priority a [`Priority`] facet can hold.
pub const MAX_PRIORITY: u8 = 15;

/// Number of independent status bars.
pub const BAR_SLOTS: usize = 5;

/// Highest level a status bar can show.
pub const MAX_BAR_LEVEL: u8 = 100;

/// Scheduling priority of the entity's current task.
///
/// The level is always within 0 (idle) through [`MAX_PRIORITY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Priority {
    level: u8,
}

impl Priority {
    /// Creates a priority, clamping `level` to [`MAX_PRIORITY`].
    #[must_use]
    pub const fn new(level: u8) -> Self {
        Self {
            level: if level > MAX_PRIORITY { MAX_PRIORITY } else { level },
        }
    }

    #[must_use]
    pub const fn level(&self) -> u8 {
        self.level
    }

    /// Sets the level, clamped to [`MAX_PRIORITY`].
    pub fn set_level(&mut self, level: u8) {
        self.level = level.min(MAX_PRIORITY);
    }
}

/// How a child follows its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LinkKind {
    #[default]
    Rigid,
    PositionOnly,
    Socket,
    Tether,
}

/// Links the entity's transform to a parent entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment {
    pub parent: Option<EntityId>,
    pub kind: LinkKind,
    /// Offset in the parent's local space.
    pub offset: Vec3<f32>,
    pub rotation: Quaternion<f32>,
}

impl Default for Attachment {
    fn default() -> Self {
        Self {
            parent: None,
            kind: LinkKind::Rigid,
            offset: Vec3::zero(),
            rotation: Quaternion::identity(),
        }
    }
}

/// Which skeleton mapping an animation clip is played through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BoneRetarget {
    #[default]
    None,
    Skeleton,
    Proportional,
    AnimationScaled,
}

/// How two blended clips keep time with each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlendSync {
    #[default]
    Free,
    Phase,
    Length,
}

/// One animation asset reference as played by a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnimationClip {
    pub asset: u32,
    pub reverse: bool,
    pub retarget: BoneRetarget,
}

/// The current animation instruction of an animated entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AnimationCommand {
    #[default]
    StopAll,
    PlaySingle {
        clip: AnimationClip,
        looping: bool,
    },
    PlayMasked {
        clip: AnimationClip,
        looping: bool,
        /// Bone names the clip is restricted to.
        mask: Vec<String>,
    },
    BlendSingle {
        from: AnimationClip,
        to: AnimationClip,
        sync: BlendSync,
        /// Seconds.
        blend_time: f32,
    },
    BlendMasked {
        from: AnimationClip,
        to: AnimationClip,
        sync: BlendSync,
        blend_time: f32,
        mask: Vec<String>,
    },
}

impl AnimationCommand {
    /// Short name of the variant, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StopAll => "stop-all",
            Self::PlaySingle { .. } => "play-single",
            Self::PlayMasked { .. } => "play-masked",
            Self::BlendSingle { .. } => "blend-single",
            Self::BlendMasked { .. } => "blend-mask",
        }
    }
}

/// Animation state driven by a single layered command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayeredAnimation {
    pub command: AnimationCommand,
}

/// Status bars shown over an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BarKind {
    Health = 0,
    Stamina = 1,
    Mana = 2,
    Progress = 3,
    Shield = 4,
}

impl BarKind {
    pub const ALL: [Self; BAR_SLOTS] = [
        Self::Health,
        Self::Stamina,
        Self::Mana,
        Self::Progress,
        Self::Shield,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Health),
            1 => Some(Self::Stamina),
            2 => Some(Self::Mana),
            3 => Some(Self::Progress),
            4 => Some(Self::Shield),
            _ => None,
        }
    }
}

/// Icon flags and status bar levels displayed over an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusDisplay {
    /// One bit per status icon.
    pub icons: u64,
    /// Visible bars and their level in `0..=MAX_BAR_LEVEL`.
    pub bars: [Option<u8>; BAR_SLOTS],
}

impl StatusDisplay {
    /// Shows `kind` at `level`, clamped to [`MAX_BAR_LEVEL`].
    pub fn set_bar(&mut self, kind: BarKind, level: u8) {
        self.bars[kind.index()] = Some(level.min(MAX_BAR_LEVEL));
    }

    /// Hides `kind`.
    pub fn clear_bar(&mut self, kind: BarKind) {
        self.bars[kind.index()] = None;
    }

    #[must_use]
    pub const fn bar(&self, kind: BarKind) -> Option<u8> {
        self.bars[kind.index()]
    }

    pub fn set_icon(&mut self, icon: u8, on: bool) {
        let bit = 1u64 << (icon % 64);
        if on {
            self.icons |= bit;
        } else {
            self.icons &= !bit;
        }
    }
}

/// World placement of the entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            rotation: Quaternion::identity(),
            scale: 1.0,
        }
    }
}

/// Body posture while moving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Stance {
    #[default]
    Idle,
    Walk,
    Run,
    Crouch,
}

/// Ground movement intent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Locomotion {
    /// Planar facing direction.
    pub heading: Vec2<f32>,
    /// Meters per second.
    pub speed: f32,
    pub stance: Stance,
}
