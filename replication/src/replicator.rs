//! Per-entity driver owning one item per replicated facet kind.

use bitstream::{BitReader, BitWriter};
use facet::{Entity, EntityId};
use tracing::{debug, error, trace, warn};
use wire::WireSection;

use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, ReplicationResult};
use crate::item::{ItemKind, ReplicationItem};
use crate::types::Tick;

/// One item's encoded section body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedItem {
    pub kind: ItemKind,
    pub body: Vec<u8>,
}

/// An item that failed to decode; the rest of the entity still decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub entity: EntityId,
    /// Raw section tag, which may not name a known kind.
    pub tag: u8,
    pub error: ReplicationError,
}

#[derive(Debug)]
struct Slot {
    item: Box<dyn ReplicationItem>,
    changed: bool,
}

/// Drives every item of one entity.
///
/// Items are kept in tag order so encoded sections come out in a stable order.
#[derive(Debug)]
pub struct EntityReplicator {
    entity: EntityId,
    slots: Vec<Slot>,
    leave_at: Option<Tick>,
    /// Set when a section could not be routed to any item.
    resync: bool,
}

impl EntityReplicator {
    /// Creates a driver with no items; the client adds them as sections arrive.
    #[must_use]
    pub const fn new(entity: EntityId) -> Self {
        Self {
            entity,
            slots: Vec::new(),
            leave_at: None,
            resync: false,
        }
    }

    /// Creates a driver tracking every item kind, as the host does.
    #[must_use]
    pub fn with_all_kinds(entity: EntityId, config: &ReplicationConfig) -> Self {
        let slots = ItemKind::ALL
            .iter()
            .map(|kind| Slot {
                item: kind.create_item(config),
                changed: false,
            })
            .collect();
        Self {
            entity,
            slots,
            leave_at: None,
            resync: false,
        }
    }

    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Adds an item; each kind may be tracked once.
    pub fn add_item(&mut self, item: Box<dyn ReplicationItem>) -> ReplicationResult<()> {
        let kind = item.kind();
        match self.slots.binary_search_by_key(&kind, |slot| slot.item.kind()) {
            Ok(_) => Err(ReplicationError::DuplicateItem {
                entity: self.entity,
                item: kind,
            }),
            Err(index) => {
                self.slots.insert(
                    index,
                    Slot {
                        item,
                        changed: false,
                    },
                );
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn item(&self, kind: ItemKind) -> Option<&dyn ReplicationItem> {
        self.slots
            .iter()
            .find(|slot| slot.item.kind() == kind)
            .map(|slot| slot.item.as_ref())
    }

    pub fn kinds(&self) -> impl Iterator<Item = ItemKind> + '_ {
        self.slots.iter().map(|slot| slot.item.kind())
    }

    fn slot_mut(&mut self, kind: ItemKind, config: &ReplicationConfig) -> &mut Slot {
        let index = match self.slots.binary_search_by_key(&kind, |slot| slot.item.kind()) {
            Ok(index) => index,
            Err(index) => {
                self.slots.insert(
                    index,
                    Slot {
                        item: kind.create_item(config),
                        changed: false,
                    },
                );
                index
            }
        };
        &mut self.slots[index]
    }

    /// Host: diffs every item against the entity. Returns whether any changed.
    pub fn prepare(&mut self, entity: &Entity, clock: Tick) -> bool {
        let mut any = false;
        for slot in &mut self.slots {
            slot.changed = slot.item.prepare_for_update(entity, clock);
            any |= slot.changed;
        }
        any
    }

    /// Host: encodes changed items, or every item when `force` is set.
    pub fn encode(&self, force: bool) -> ReplicationResult<Vec<EncodedItem>> {
        let mut encoded = Vec::new();
        for slot in self.slots.iter().filter(|slot| force || slot.changed) {
            let mut writer = BitWriter::new();
            slot.item.update_data(&mut writer, force)?;
            encoded.push(EncodedItem {
                kind: slot.item.kind(),
                body: writer.finish(),
            });
        }
        Ok(encoded)
    }

    /// Client: decodes each section into its item's history.
    ///
    /// A failing section is logged and reported; the remaining sections
    /// still decode because each item owns its own sub-region.
    pub fn decode<'a, I>(
        &mut self,
        sections: I,
        host_tick: Tick,
        config: &ReplicationConfig,
    ) -> Vec<ItemFailure>
    where
        I: IntoIterator<Item = WireSection<'a>>,
    {
        let entity = self.entity;
        let mut failures = Vec::new();
        for section in sections {
            let result = match ItemKind::parse(section.tag) {
                Ok(kind) => {
                    let slot = self.slot_mut(kind, config);
                    slot.item
                        .set_data(&mut BitReader::new(section.body), host_tick)
                }
                Err(err) => {
                    self.resync = true;
                    Err(err)
                }
            };
            match result {
                Ok(()) => trace!(
                    entity = %entity,
                    tag = section.tag,
                    tick = %host_tick,
                    "buffered item update"
                ),
                Err(err) => {
                    if err.is_shape_mismatch() {
                        error!(
                            entity = %entity,
                            tag = section.tag,
                            tick = %host_tick,
                            ?err,
                            "item decode failed"
                        );
                    } else {
                        warn!(
                            entity = %entity,
                            tag = section.tag,
                            tick = %host_tick,
                            ?err,
                            "item update dropped"
                        );
                    }
                    failures.push(ItemFailure {
                        entity,
                        tag: section.tag,
                        error: err,
                    });
                }
            }
        }
        failures
    }

    /// Client: despawn this entity once the clock reaches `tick`.
    pub fn schedule_leave(&mut self, tick: Tick) {
        debug!(entity = %self.entity, tick = %tick, "leave scheduled");
        self.leave_at = Some(tick);
    }

    #[must_use]
    pub const fn leave_tick(&self) -> Option<Tick> {
        self.leave_at
    }

    pub fn clear_leave(&mut self) {
        self.leave_at = None;
    }

    /// Whether a scheduled leave is due.
    #[must_use]
    pub fn leave_due(&self, clock: Tick) -> bool {
        self.leave_at.is_some_and(|tick| tick <= clock)
    }

    /// Whether any item has an update the clock has reached.
    #[must_use]
    pub fn has_due(&self, clock: Tick) -> bool {
        self.slots
            .iter()
            .filter_map(|slot| slot.item.next_tick())
            .any(|tick| tick <= clock)
    }

    /// Client: applies every due update to `entity`. Returns how many applied.
    pub fn interpolate(&mut self, entity: &mut Entity, clock: Tick) -> usize {
        self.slots
            .iter_mut()
            .map(|slot| slot.item.interpolate(entity, clock))
            .sum()
    }

    /// Buffered updates across all items.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slots.iter().map(|slot| slot.item.pending()).sum()
    }

    #[must_use]
    pub fn resync_required(&self) -> bool {
        self.resync || self.slots.iter().any(|slot| slot.item.resync_required())
    }

    pub fn clear_resync(&mut self) {
        self.resync = false;
        for slot in &mut self.slots {
            slot.item.clear_resync();
        }
    }
}
