//! Client-side packet intake and tick-aligned playback.

use std::collections::{BTreeMap, BTreeSet};

use facet::{EntityId, World};
use tracing::{debug, warn};
use wire::{decode_packet, BlockKind};

use crate::config::ReplicationConfig;
use crate::error::ReplicationResult;
use crate::replicator::{EntityReplicator, ItemFailure};
use crate::types::Tick;

/// Outcome of one [`ClientReplicator::receive`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    pub tick: Tick,
    pub full_resync: bool,
    /// Entities with an update block.
    pub updated: usize,
    /// Entities with a leave block.
    pub leaves: usize,
    pub failures: Vec<ItemFailure>,
}

/// Totals from one [`ClientReplicator::interpolate`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterpolateReport {
    /// History entries applied.
    pub applied: usize,
    pub spawned: usize,
    pub despawned: usize,
}

/// Mirrors host state into a client [`World`].
///
/// [`receive`](Self::receive) only appends to item histories;
/// [`interpolate`](Self::interpolate) is the only place the world changes.
#[derive(Debug)]
pub struct ClientReplicator {
    config: ReplicationConfig,
    entities: BTreeMap<EntityId, EntityReplicator>,
    last_tick: Option<Tick>,
}

impl ClientReplicator {
    #[must_use]
    pub fn new(config: ReplicationConfig) -> Self {
        Self {
            config,
            entities: BTreeMap::new(),
            last_tick: None,
        }
    }

    /// Tick of the newest packet received.
    #[must_use]
    pub const fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }

    /// Entities with replication state, including those not yet spawned.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Buffered updates across every entity.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.entities.values().map(EntityReplicator::pending).sum()
    }

    /// Whether any item lost updates and the host should resend everything.
    #[must_use]
    pub fn resync_requested(&self) -> bool {
        self.entities
            .values()
            .any(EntityReplicator::resync_required)
    }

    /// Decodes one packet into item histories.
    ///
    /// Framing errors reject the whole packet. Item failures are reported and
    /// do not stop the rest of the packet.
    pub fn receive(&mut self, bytes: &[u8]) -> ReplicationResult<ReceiveReport> {
        let packet = decode_packet(bytes, &self.config.wire_limits)?;
        let tick = Tick::new(packet.header.tick);
        let full_resync = packet.header.flags.is_full_resync();
        if full_resync {
            debug!(tick = %tick, "full resync received");
            for replicator in self.entities.values_mut() {
                replicator.clear_resync();
            }
        }

        let mut report = ReceiveReport {
            tick,
            full_resync,
            ..ReceiveReport::default()
        };
        let mut present = BTreeSet::new();
        for block in packet.blocks {
            let id = EntityId::new(block.entity);
            match block.kind {
                BlockKind::Update => {
                    present.insert(id);
                    let replicator = self
                        .entities
                        .entry(id)
                        .or_insert_with(|| EntityReplicator::new(id));
                    report
                        .failures
                        .extend(replicator.decode(block.sections, tick, &self.config));
                    report.updated += 1;
                }
                BlockKind::Leave => {
                    if let Some(replicator) = self.entities.get_mut(&id) {
                        replicator.schedule_leave(tick);
                    }
                    report.leaves += 1;
                }
            }
        }
        if full_resync {
            // A resync carries every entity the host still sends; anything
            // else missed its leave.
            for (id, replicator) in &mut self.entities {
                if !present.contains(id) && replicator.leave_tick().is_none() {
                    replicator.schedule_leave(tick);
                }
            }
        }

        if !report.failures.is_empty() {
            warn!(
                tick = %tick,
                failures = report.failures.len(),
                "packet had item failures, resync needed"
            );
        }
        self.last_tick = Some(self.last_tick.map_or(tick, |last| last.max(tick)));
        Ok(report)
    }

    /// Applies every update the clock has reached to `world`.
    ///
    /// Entities spawn when their first update applies and despawn when a
    /// scheduled leave is reached, after updates up to the leave tick.
    pub fn interpolate(&mut self, world: &mut World, clock: Tick) -> InterpolateReport {
        let mut report = InterpolateReport::default();
        self.entities.retain(|&id, replicator| {
            let leave = replicator.leave_tick();
            let limit = leave.map_or(clock, |tick| tick.min(clock));
            report.applied += apply_due(world, id, replicator, limit, &mut report.spawned);

            if replicator.leave_due(clock) {
                if world.despawn(id).is_some() {
                    report.despawned += 1;
                }
                replicator.clear_leave();
                // Updates past the leave belong to a re-entry.
                report.applied += apply_due(world, id, replicator, clock, &mut report.spawned);
            }
            replicator.leave_tick().is_some() || world.contains(id) || replicator.pending() > 0
        });
        report
    }
}

fn apply_due(
    world: &mut World,
    id: EntityId,
    replicator: &mut EntityReplicator,
    clock: Tick,
    spawned: &mut usize,
) -> usize {
    if !replicator.has_due(clock) {
        return 0;
    }
    if !world.contains(id) {
        debug!(entity = %id, tick = %clock, "entity spawned");
        *spawned += 1;
    }
    replicator.interpolate(world.spawn(id), clock)
}
