//! Parent link with a local offset.
//!
//! A new parent invalidates the offset on the receiver, so a parent change
//! always resends offset and rotation even if they are numerically equal.

use bitstream::{BitReader, BitWriter};
use facet::{Attachment, EntityId, LinkKind, Quaternion, Vec3};

use crate::delta::DeltaField;
use crate::error::ReplicationResult;
use crate::existence::{FacetCodec, Tracked};
use crate::item::ItemKind;

pub type AttachmentItem = Tracked<AttachmentCodec>;

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentCodec {
    parent: DeltaField<Option<EntityId>>,
    kind: DeltaField<LinkKind>,
    offset: DeltaField<Vec3<f32>>,
    rotation: DeltaField<Quaternion<f32>>,
}

impl Default for AttachmentCodec {
    fn default() -> Self {
        let defaults = Attachment::default();
        Self {
            parent: DeltaField::new(defaults.parent),
            kind: DeltaField::new(defaults.kind),
            offset: DeltaField::new(defaults.offset),
            rotation: DeltaField::new(defaults.rotation),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttachmentUpdate {
    pub parent: Option<Option<EntityId>>,
    pub kind: Option<LinkKind>,
    pub offset: Option<Vec3<f32>>,
    pub rotation: Option<Quaternion<f32>>,
}

impl AttachmentCodec {
    pub fn parent(&self) -> Option<EntityId> {
        *self.parent.get()
    }

    /// Whether the last diff will resend the offset.
    pub fn offset_changed(&self) -> bool {
        self.offset.is_changed()
    }
}

impl FacetCodec for AttachmentCodec {
    type Facet = Attachment;
    type Update = AttachmentUpdate;

    const KIND: ItemKind = ItemKind::Attachment;

    fn diff(&mut self, facet: &Attachment) -> bool {
        let parent = self.parent.check(&facet.parent);
        let kind = self.kind.check(&facet.kind);
        let offset = self.offset.check(&facet.offset);
        let rotation = self.rotation.check(&facet.rotation);
        if parent {
            self.offset.mark_changed();
            self.rotation.mark_changed();
        }
        parent || kind || offset || rotation
    }

    fn mark_all_changed(&mut self) {
        self.parent.mark_changed();
        self.kind.mark_changed();
        self.offset.mark_changed();
        self.rotation.mark_changed();
    }

    fn write(&self, writer: &mut BitWriter, force: bool) -> ReplicationResult<()> {
        self.parent.write(writer, force)?;
        self.kind.write(writer, force)?;
        self.offset.write(writer, force)?;
        self.rotation.write(writer, force)
    }

    fn read(&mut self, reader: &mut BitReader<'_>) -> ReplicationResult<AttachmentUpdate> {
        Ok(AttachmentUpdate {
            parent: self.parent.read(reader)?,
            kind: self.kind.read(reader)?,
            offset: self.offset.read(reader)?,
            rotation: self.rotation.read(reader)?,
        })
    }

    fn apply(update: &AttachmentUpdate, facet: &mut Attachment) {
        if let Some(parent) = update.parent {
            facet.parent = parent;
        }
        if let Some(kind) = update.kind {
            facet.kind = kind;
        }
        if let Some(offset) = update.offset {
            facet.offset = offset;
        }
        if let Some(rotation) = update.rotation {
            facet.rotation = rotation;
        }
    }
}
