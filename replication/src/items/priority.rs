//! Scheduling priority: the minimal single-field item.

use bitstream::{BitReader, BitWriter};
use facet::Priority;

use crate::delta::{read_changed_small, write_changed_bits, DeltaField};
use crate::error::ReplicationResult;
use crate::existence::{FacetCodec, Tracked};
use crate::item::ItemKind;

/// Width of the priority level on the wire.
pub const PRIORITY_BITS: u8 = 4;

pub type PriorityItem = Tracked<PriorityCodec>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorityCodec {
    level: DeltaField<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityUpdate {
    pub level: Option<u8>,
}

impl PriorityCodec {
    pub fn level(&self) -> u8 {
        *self.level.get()
    }
}

impl FacetCodec for PriorityCodec {
    type Facet = Priority;
    type Update = PriorityUpdate;

    const KIND: ItemKind = ItemKind::Priority;

    fn diff(&mut self, facet: &Priority) -> bool {
        self.level.check(&facet.level())
    }

    fn mark_all_changed(&mut self) {
        self.level.mark_changed();
    }

    fn write(&self, writer: &mut BitWriter, force: bool) -> ReplicationResult<()> {
        write_changed_bits(
            self.level.is_changed() || force,
            u64::from(self.level()),
            PRIORITY_BITS,
            writer,
        )
    }

    fn read(&mut self, reader: &mut BitReader<'_>) -> ReplicationResult<PriorityUpdate> {
        let level = read_changed_small(PRIORITY_BITS, reader)?;
        if let Some(level) = level {
            self.level.set(level);
        }
        Ok(PriorityUpdate { level })
    }

    fn apply(update: &PriorityUpdate, facet: &mut Priority) {
        if let Some(level) = update.level {
            facet.set_level(level);
        }
    }
}
