//! The replication item contract and the registry of item kinds.

use std::fmt;

use bitstream::{BitReader, BitWriter};
use facet::Entity;

use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, ReplicationResult};
use crate::items::{
    AnimationItem, AttachmentItem, LocomotionItem, PriorityItem, StatusItem, TransformItem,
};
use crate::types::Tick;

/// One diff-and-codec unit for a single (entity, facet kind) pair.
///
/// Host: [`prepare_for_update`](Self::prepare_for_update) once per tick, then
/// [`update_data`](Self::update_data) if it reported a change (or to build a
/// forced snapshot). Client: [`set_data`](Self::set_data) when a section
/// arrives, then [`interpolate`](Self::interpolate) every tick.
pub trait ReplicationItem: fmt::Debug + Send {
    fn kind(&self) -> ItemKind;

    /// Diffs the entity's facet against the mirror and updates the mirror.
    ///
    /// Returns whether existence or any field changed since the last call.
    fn prepare_for_update(&mut self, entity: &Entity, clock: Tick) -> bool;

    /// Writes the existence bits and, if the facet exists, every field delta.
    ///
    /// `force` writes every field as changed, for a receiver with no prior state.
    fn update_data(&self, writer: &mut BitWriter, force: bool) -> ReplicationResult<()>;

    /// Decodes one update and buffers it for `host_tick`.
    ///
    /// On error nothing is buffered and the decode mirror is left untouched.
    fn set_data(&mut self, reader: &mut BitReader<'_>, host_tick: Tick) -> ReplicationResult<()>;

    /// Applies every buffered update whose tick the clock has reached, in
    /// order. Returns how many updates were applied.
    fn interpolate(&mut self, entity: &mut Entity, clock: Tick) -> usize;

    /// Tick of the oldest buffered update.
    fn next_tick(&self) -> Option<Tick>;

    /// Number of buffered updates.
    fn pending(&self) -> usize;

    /// Whether this item lost updates and needs a full resend.
    fn resync_required(&self) -> bool;

    fn clear_resync(&mut self);
}

/// Replicated facet kinds and their stable wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ItemKind {
    Priority = 1,
    Attachment = 2,
    Animation = 3,
    Status = 4,
    Transform = 5,
    Locomotion = 6,
}

impl ItemKind {
    /// Every kind in tag order.
    pub const ALL: [Self; 6] = [
        Self::Priority,
        Self::Attachment,
        Self::Animation,
        Self::Status,
        Self::Transform,
        Self::Locomotion,
    ];

    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Parses a wire tag.
    pub fn parse(tag: u8) -> ReplicationResult<Self> {
        match tag {
            1 => Ok(Self::Priority),
            2 => Ok(Self::Attachment),
            3 => Ok(Self::Animation),
            4 => Ok(Self::Status),
            5 => Ok(Self::Transform),
            6 => Ok(Self::Locomotion),
            _ => Err(ReplicationError::UnknownItemKind { tag }),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::Attachment => "attachment",
            Self::Animation => "animation",
            Self::Status => "status",
            Self::Transform => "transform",
            Self::Locomotion => "locomotion",
        }
    }

    /// Builds an empty item of this kind.
    #[must_use]
    pub fn create_item(self, config: &ReplicationConfig) -> Box<dyn ReplicationItem> {
        let capacity = config.effective_history_capacity();
        match self {
            Self::Priority => Box::new(PriorityItem::new(capacity)),
            Self::Attachment => Box::new(AttachmentItem::new(capacity)),
            Self::Animation => Box::new(AnimationItem::new(capacity)),
            Self::Status => Box::new(StatusItem::new(capacity)),
            Self::Transform => Box::new(TransformItem::new(capacity)),
            Self::Locomotion => Box::new(LocomotionItem::new(capacity)),
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
