//! World placement: position, rotation, uniform scale.

use bitstream::{BitReader, BitWriter};
use facet::{Quaternion, Transform, Vec3};

use crate::delta::DeltaField;
use crate::error::ReplicationResult;
use crate::existence::{FacetCodec, Tracked};
use crate::item::ItemKind;

pub type TransformItem = Tracked<TransformCodec>;

#[derive(Debug, Clone, PartialEq)]
pub struct TransformCodec {
    position: DeltaField<Vec3<f32>>,
    rotation: DeltaField<Quaternion<f32>>,
    scale: DeltaField<f32>,
}

impl Default for TransformCodec {
    fn default() -> Self {
        let defaults = Transform::default();
        Self {
            position: DeltaField::new(defaults.position),
            rotation: DeltaField::new(defaults.rotation),
            scale: DeltaField::new(defaults.scale),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransformUpdate {
    pub position: Option<Vec3<f32>>,
    pub rotation: Option<Quaternion<f32>>,
    pub scale: Option<f32>,
}

impl FacetCodec for TransformCodec {
    type Facet = Transform;
    type Update = TransformUpdate;

    const KIND: ItemKind = ItemKind::Transform;

    fn diff(&mut self, facet: &Transform) -> bool {
        let position = self.position.check(&facet.position);
        let rotation = self.rotation.check(&facet.rotation);
        let scale = self.scale.check(&facet.scale);
        position || rotation || scale
    }

    fn mark_all_changed(&mut self) {
        self.position.mark_changed();
        self.rotation.mark_changed();
        self.scale.mark_changed();
    }

    fn write(&self, writer: &mut BitWriter, force: bool) -> ReplicationResult<()> {
        self.position.write(writer, force)?;
        self.rotation.write(writer, force)?;
        self.scale.write(writer, force)
    }

    fn read(&mut self, reader: &mut BitReader<'_>) -> ReplicationResult<TransformUpdate> {
        Ok(TransformUpdate {
            position: self.position.read(reader)?,
            rotation: self.rotation.read(reader)?,
            scale: self.scale.read(reader)?,
        })
    }

    fn apply(update: &TransformUpdate, facet: &mut Transform) {
        if let Some(position) = update.position {
            facet.position = position;
        }
        if let Some(rotation) = update.rotation {
            facet.rotation = rotation;
        }
        if let Some(scale) = update.scale {
            facet.scale = scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mirror_matches_default_facet() {
        let mut codec = TransformCodec::default();
        assert!(!codec.diff(&Transform::default()));
    }

    #[test]
    fn position_only_delta() {
        let mut codec = TransformCodec::default();
        let mut transform = Transform::default();
        transform.position.x = 3.0;
        assert!(codec.diff(&transform));

        let mut writer = BitWriter::new();
        codec.write(&mut writer, false).unwrap();
        assert_eq!(writer.bits_written(), 97 + 1 + 1);
    }
}
