//! Ground movement intent.

use bitstream::{BitReader, BitWriter};
use facet::{Locomotion, Stance, Vec2};

use crate::delta::DeltaField;
use crate::error::ReplicationResult;
use crate::existence::{FacetCodec, Tracked};
use crate::item::ItemKind;

pub type LocomotionItem = Tracked<LocomotionCodec>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocomotionCodec {
    heading: DeltaField<Vec2<f32>>,
    speed: DeltaField<f32>,
    stance: DeltaField<Stance>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocomotionUpdate {
    pub heading: Option<Vec2<f32>>,
    pub speed: Option<f32>,
    pub stance: Option<Stance>,
}

impl FacetCodec for LocomotionCodec {
    type Facet = Locomotion;
    type Update = LocomotionUpdate;

    const KIND: ItemKind = ItemKind::Locomotion;

    fn diff(&mut self, facet: &Locomotion) -> bool {
        let heading = self.heading.check(&facet.heading);
        let speed = self.speed.check(&facet.speed);
        let stance = self.stance.check(&facet.stance);
        heading || speed || stance
    }

    fn mark_all_changed(&mut self) {
        self.heading.mark_changed();
        self.speed.mark_changed();
        self.stance.mark_changed();
    }

    fn write(&self, writer: &mut BitWriter, force: bool) -> ReplicationResult<()> {
        self.heading.write(writer, force)?;
        self.speed.write(writer, force)?;
        self.stance.write(writer, force)
    }

    fn read(&mut self, reader: &mut BitReader<'_>) -> ReplicationResult<LocomotionUpdate> {
        Ok(LocomotionUpdate {
            heading: self.heading.read(reader)?,
            speed: self.speed.read(reader)?,
            stance: self.stance.read(reader)?,
        })
    }

    fn apply(update: &LocomotionUpdate, facet: &mut Locomotion) {
        if let Some(heading) = update.heading {
            facet.heading = heading;
        }
        if let Some(speed) = update.speed {
            facet.speed = speed;
        }
        if let Some(stance) = update.stance {
            facet.stance = stance;
        }
    }
}
