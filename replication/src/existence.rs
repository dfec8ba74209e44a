//! Existence tracking shared by every concrete item.
//!
//! [`Tracked`] wraps a [`FacetCodec`] and adds uniform facet add/remove
//! detection, the existence bits of the item layout, and the client history
//! queue. Codecs only deal with field deltas of a facet that exists.
//!
//! Item layout:
//!
//! ```text
//! [existence changed: 1][exists: 1 if changed] { if exists: codec fields }
//! ```

use std::fmt;

use bitstream::{BitReader, BitWriter};
use facet::{Entity, Facet};
use tracing::{trace, warn};

use crate::error::{ReplicationError, ReplicationResult};
use crate::history::{HistoryEntry, HistoryError, HistoryQueue};
use crate::item::{ItemKind, ReplicationItem};
use crate::types::Tick;

/// Field-level codec for one facet kind.
///
/// The codec value doubles as the mirror: on the host it holds the last
/// values sent, on the client the last values decoded. `Default` gives the
/// documented baseline that both sides reset to on an existence change.
pub trait FacetCodec: Default + Clone + fmt::Debug + Send + 'static {
    type Facet: Facet;
    /// Decoded field changes.
    type Update: Clone + fmt::Debug + PartialEq + Send + 'static;

    const KIND: ItemKind;

    /// Diffs the facet against the mirror, updating the mirror and the
    /// per-field changed flags. Returns whether any field changed.
    fn diff(&mut self, facet: &Self::Facet) -> bool;

    /// Marks every field changed.
    fn mark_all_changed(&mut self);

    /// Writes the field deltas.
    fn write(&self, writer: &mut BitWriter, force: bool) -> ReplicationResult<()>;

    /// Reads field deltas written by [`write`](Self::write), advancing the
    /// mirror to the decoded values.
    fn read(&mut self, reader: &mut BitReader<'_>) -> ReplicationResult<Self::Update>;

    /// Applies decoded changes to the client's facet.
    fn apply(update: &Self::Update, facet: &mut Self::Facet);
}

/// A replication item for facet kind `C::Facet`.
#[derive(Debug, Clone)]
pub struct Tracked<C: FacetCodec> {
    mirror: C,
    exists: bool,
    existence_changed: bool,
    /// Facet change counter seen at the last prepare.
    seen_facet_changes: Option<u32>,
    history: HistoryQueue<C::Update>,
    resync_required: bool,
}

impl<C: FacetCodec> Tracked<C> {
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        Self {
            mirror: C::default(),
            exists: false,
            existence_changed: false,
            seen_facet_changes: None,
            history: HistoryQueue::new(history_capacity),
            resync_required: false,
        }
    }

    /// The mirror: last values sent (host) or decoded (client).
    pub const fn mirror(&self) -> &C {
        &self.mirror
    }

    /// Whether the facet existed at the last prepare or decode.
    pub const fn exists(&self) -> bool {
        self.exists
    }

    /// Whether the last prepare saw the facet appear or disappear.
    pub const fn existence_changed(&self) -> bool {
        self.existence_changed
    }

    /// The tracked facet on `entity`, if present.
    pub fn current_facet<'e>(&self, entity: &'e Entity) -> Option<&'e C::Facet> {
        entity.facet::<C::Facet>()
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry<C::Update>> {
        self.history.iter()
    }

    fn detect_existence_change(&mut self, entity: &Entity) -> bool {
        let counter = entity.facet_change_counter();
        if self.seen_facet_changes == Some(counter) {
            return false;
        }
        self.seen_facet_changes = Some(counter);
        let now = entity.has_facet::<C::Facet>();
        let flipped = now != self.exists;
        self.exists = now;
        flipped
    }

    fn decode(&self, reader: &mut BitReader<'_>) -> ReplicationResult<Decoded<C>> {
        let announced = reader.read_bit()?;
        let exists = if announced {
            reader.read_bit()?
        } else {
            self.exists
        };
        // An announcement rebases the mirror on the defaults, as the writer did.
        let mut mirror = if announced {
            C::default()
        } else {
            self.mirror.clone()
        };
        let update = if exists {
            Some(mirror.read(reader)?)
        } else {
            None
        };
        Ok(Decoded {
            announced,
            exists,
            update,
            mirror,
        })
    }
}

/// One decoded update, not yet committed to the item.
struct Decoded<C: FacetCodec> {
    announced: bool,
    exists: bool,
    update: Option<C::Update>,
    mirror: C,
}

impl<C: FacetCodec> ReplicationItem for Tracked<C> {
    fn kind(&self) -> ItemKind {
        C::KIND
    }

    fn prepare_for_update(&mut self, entity: &Entity, clock: Tick) -> bool {
        self.existence_changed = self.detect_existence_change(entity);
        if self.existence_changed {
            trace!(
                entity = %entity.id(),
                item = %C::KIND,
                tick = %clock,
                exists = self.exists,
                "facet existence changed"
            );
            self.mirror = C::default();
        }

        let Some(facet) = entity.facet::<C::Facet>() else {
            return self.existence_changed;
        };
        let fields_changed = self.mirror.diff(facet);
        if self.existence_changed {
            self.mirror.mark_all_changed();
        }
        fields_changed || self.existence_changed
    }

    fn update_data(&self, writer: &mut BitWriter, force: bool) -> ReplicationResult<()> {
        let announce = self.existence_changed || force;
        writer.write_bool(announce);
        if announce {
            writer.write_bool(self.exists);
        }
        if self.exists {
            self.mirror.write(writer, force)?;
        }
        Ok(())
    }

    fn set_data(&mut self, reader: &mut BitReader<'_>, host_tick: Tick) -> ReplicationResult<()> {
        let Decoded {
            announced,
            exists,
            update,
            mirror,
        } = match self.decode(reader) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.resync_required = true;
                return Err(err.in_item(C::KIND));
            }
        };

        let entry = HistoryEntry {
            tick: host_tick,
            existence: announced.then_some(exists),
            update,
        };
        match self.history.push(entry) {
            Ok(()) => {}
            Err(HistoryError::OutOfOrder { last_tick, new_tick }) => {
                // The host mirror has moved past this update.
                warn!(
                    item = %C::KIND,
                    last = %last_tick,
                    tick = %new_tick,
                    "out-of-order update dropped"
                );
                self.resync_required = true;
                return Err(ReplicationError::OutOfOrderTick {
                    item: C::KIND,
                    last: last_tick,
                    new: new_tick,
                });
            }
            Err(HistoryError::Full { capacity }) => {
                warn!(
                    item = %C::KIND,
                    tick = %host_tick,
                    capacity,
                    "history queue overflow, dropping buffered updates"
                );
                self.history.clear();
                self.resync_required = true;
                return Err(ReplicationError::HistoryOverflow {
                    item: C::KIND,
                    capacity,
                });
            }
        }

        self.mirror = mirror;
        self.exists = exists;
        Ok(())
    }

    fn interpolate(&mut self, entity: &mut Entity, clock: Tick) -> usize {
        let mut applied = 0;
        while let Some(entry) = self.history.pop_due(clock) {
            if entry.tick < clock {
                warn!(
                    entity = %entity.id(),
                    item = %C::KIND,
                    tick = %entry.tick,
                    clock = %clock,
                    "applying late update"
                );
            }
            match entry.existence {
                Some(false) => {
                    entity.destroy_facet::<C::Facet>();
                }
                Some(true) => {
                    entity.insert_facet(C::Facet::default());
                }
                None => {}
            }
            if let Some(update) = &entry.update {
                C::apply(update, entity.get_or_create_facet::<C::Facet>());
            }
            applied += 1;
        }
        applied
    }

    fn next_tick(&self) -> Option<Tick> {
        self.history.front_tick()
    }

    fn pending(&self) -> usize {
        self.history.len()
    }

    fn resync_required(&self) -> bool {
        self.resync_required
    }

    fn clear_resync(&mut self) {
        self.resync_required = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::PriorityCodec;
    use facet::{EntityId, Priority};

    type Item = Tracked<PriorityCodec>;

    fn encode(item: &Item, force: bool) -> (Vec<u8>, usize) {
        let mut writer = BitWriter::new();
        item.update_data(&mut writer, force).unwrap();
        let bits = writer.bits_written();
        (writer.finish(), bits)
    }

    #[test]
    fn absent_facet_reports_nothing() {
        let entity = Entity::new(EntityId::new(1));
        let mut item = Item::new(8);
        assert!(!item.prepare_for_update(&entity, Tick::new(1)));
        let (_, bits) = encode(&item, false);
        assert_eq!(bits, 1);
    }

    #[test]
    fn forced_absent_facet_announces_absence() {
        let entity = Entity::new(EntityId::new(1));
        let mut item = Item::new(8);
        item.prepare_for_update(&entity, Tick::new(1));
        let (bytes, bits) = encode(&item, true);
        assert_eq!(bits, 2);
        assert_eq!(bytes, vec![0b1000_0000]);
    }

    #[test]
    fn counter_short_circuits_existence_check() {
        let mut entity = Entity::new(EntityId::new(1));
        entity.insert_facet(Priority::new(2));
        let mut item = Item::new(8);
        assert!(item.prepare_for_update(&entity, Tick::new(1)));
        assert!(item.existence_changed());
        assert!(!item.prepare_for_update(&entity, Tick::new(2)));
        assert!(!item.existence_changed());
    }

    #[test]
    fn removal_resets_mirror() {
        let mut entity = Entity::new(EntityId::new(1));
        entity.insert_facet(Priority::new(9));
        let mut item = Item::new(8);
        item.prepare_for_update(&entity, Tick::new(1));
        assert_eq!(item.mirror().level(), 9);

        entity.destroy_facet::<Priority>();
        assert!(item.prepare_for_update(&entity, Tick::new(2)));
        assert!(!item.exists());
        assert_eq!(item.mirror().level(), 0);

        let (bytes, bits) = encode(&item, false);
        assert_eq!(bits, 2);
        assert_eq!(bytes, vec![0b1000_0000]);
    }

    #[test]
    fn decode_failure_buffers_nothing() {
        let mut item = Item::new(8);
        let bytes: [u8; 0] = [];
        let err = item.set_data(&mut BitReader::new(&bytes), Tick::new(1)).unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::StreamUnderrun {
                item: ItemKind::Priority,
                ..
            }
        ));
        assert_eq!(item.pending(), 0);
        assert!(item.resync_required());
        assert!(!item.exists());
    }

    #[test]
    fn overflow_clears_queue_and_requests_resync() {
        let mut host_entity = Entity::new(EntityId::new(1));
        host_entity.insert_facet(Priority::new(1));
        let mut host = Item::new(8);
        host.prepare_for_update(&host_entity, Tick::new(1));
        let (bytes, _) = encode(&host, true);

        let mut client = Item::new(2);
        client.set_data(&mut BitReader::new(&bytes), Tick::new(1)).unwrap();
        client.set_data(&mut BitReader::new(&bytes), Tick::new(2)).unwrap();
        let err = client
            .set_data(&mut BitReader::new(&bytes), Tick::new(3))
            .unwrap_err();
        assert_eq!(
            err,
            ReplicationError::HistoryOverflow {
                item: ItemKind::Priority,
                capacity: 2
            }
        );
        assert_eq!(client.pending(), 0);
        assert!(client.resync_required());
        client.clear_resync();
        assert!(!client.resync_required());
    }

    #[test]
    fn out_of_order_tick_is_rejected() {
        let mut host_entity = Entity::new(EntityId::new(1));
        host_entity.insert_facet(Priority::new(1));
        let mut host = Item::new(8);
        host.prepare_for_update(&host_entity, Tick::new(1));
        let (bytes, _) = encode(&host, true);

        let mut client = Item::new(8);
        client.set_data(&mut BitReader::new(&bytes), Tick::new(5)).unwrap();
        let err = client
            .set_data(&mut BitReader::new(&bytes), Tick::new(4))
            .unwrap_err();
        assert!(matches!(err, ReplicationError::OutOfOrderTick { .. }));
        assert_eq!(client.pending(), 1);
    }

    #[test]
    fn current_facet_accessor() {
        let mut entity = Entity::new(EntityId::new(1));
        let item = Item::new(8);
        assert!(item.current_facet(&entity).is_none());
        entity.insert_facet(Priority::new(4));
        assert_eq!(item.current_facet(&entity).map(|p| p.level()), Some(4));
    }
}
