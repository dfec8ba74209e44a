//! Host-side orchestration across clients.
//!
//! Each tick every tracked entity is prepared once. Its delta is encoded once
//! and shared by all clients that already know the entity; clients seeing the
//! entity for the first time (or resyncing) get a forced snapshot instead.

use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};

use facet::{EntityId, World};
use tracing::{debug, error, trace, warn};
use wire::{PacketBuilder, PacketFlags};

use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, ReplicationResult};
use crate::replicator::{EncodedItem, EntityReplicator};
use crate::types::{ClientId, Tick};

/// One packet addressed to one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPacket {
    pub client: ClientId,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct ClientState {
    /// Desired synchronization set.
    relevant: BTreeSet<EntityId>,
    /// Entities the client has received a snapshot of.
    known: BTreeSet<EntityId>,
    /// Entities that must be announced as leaving.
    leaving: BTreeSet<EntityId>,
    /// Known entities whose delta was lost; they get a snapshot instead.
    resend: BTreeSet<EntityId>,
    resync: bool,
}

/// Replicates a host [`World`] to any number of clients.
#[derive(Debug)]
pub struct HostReplicator {
    config: ReplicationConfig,
    entities: BTreeMap<EntityId, EntityReplicator>,
    clients: BTreeMap<ClientId, ClientState>,
}

/// Per-entity encodings for one tick, computed on first use.
#[derive(Default)]
struct TickEncodings {
    deltas: BTreeMap<EntityId, Vec<EncodedItem>>,
    snapshots: BTreeMap<EntityId, Vec<EncodedItem>>,
    /// Entities that could not be encoded this tick.
    failed: BTreeSet<EntityId>,
}

impl TickEncodings {
    /// Forced snapshot of `id`, encoded once per tick.
    fn snapshot(
        &mut self,
        id: EntityId,
        replicator: &EntityReplicator,
        clock: Tick,
    ) -> Option<&[EncodedItem]> {
        if self.failed.contains(&id) {
            return None;
        }
        match self.snapshots.entry(id) {
            Entry::Occupied(entry) => Some(entry.into_mut().as_slice()),
            Entry::Vacant(entry) => match replicator.encode(true) {
                Ok(encoded) => Some(entry.insert(encoded).as_slice()),
                Err(err) => {
                    error!(entity = %id, tick = %clock, ?err, "snapshot encode failed");
                    self.failed.insert(id);
                    None
                }
            },
        }
    }
}

impl HostReplicator {
    #[must_use]
    pub fn new(config: ReplicationConfig) -> Self {
        Self {
            config,
            entities: BTreeMap::new(),
            clients: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn add_client(&mut self, client: ClientId) {
        debug!(%client, "client added");
        self.clients.entry(client).or_default();
    }

    pub fn remove_client(&mut self, client: ClientId) -> bool {
        debug!(%client, "client removed");
        self.clients.remove(&client).is_some()
    }

    pub fn clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.keys().copied()
    }

    /// Entities currently tracked for at least one client.
    #[must_use]
    pub fn tracked_entities(&self) -> usize {
        self.entities.len()
    }

    /// Entities the client has been sent a snapshot of.
    pub fn known_entities(
        &self,
        client: ClientId,
    ) -> ReplicationResult<impl Iterator<Item = EntityId> + '_> {
        let state = self
            .clients
            .get(&client)
            .ok_or(ReplicationError::UnknownClient { client })?;
        Ok(state.known.iter().copied())
    }

    /// Replaces the client's synchronization set.
    ///
    /// Entities that left are announced on the next tick; entities that
    /// entered receive a forced snapshot.
    pub fn set_relevant<I>(&mut self, client: ClientId, entities: I) -> ReplicationResult<()>
    where
        I: IntoIterator<Item = EntityId>,
    {
        let state = self
            .clients
            .get_mut(&client)
            .ok_or(ReplicationError::UnknownClient { client })?;
        state.relevant = entities.into_iter().collect();
        let left: Vec<EntityId> = state
            .known
            .iter()
            .filter(|id| !state.relevant.contains(*id))
            .copied()
            .collect();
        for id in left {
            state.known.remove(&id);
            state.leaving.insert(id);
        }
        // A re-entered entity gets a snapshot instead of a leave.
        let relevant = &state.relevant;
        state.leaving.retain(|id| !relevant.contains(id));
        let known = &state.known;
        state.resend.retain(|id| known.contains(id));
        Ok(())
    }

    /// Resends every relevant entity to the client on the next tick.
    pub fn request_resync(&mut self, client: ClientId) -> ReplicationResult<()> {
        let state = self
            .clients
            .get_mut(&client)
            .ok_or(ReplicationError::UnknownClient { client })?;
        warn!(%client, "full resync requested");
        state.resync = true;
        Ok(())
    }

    /// Diffs the world and builds one packet per client for `clock`.
    ///
    /// Every client receives a packet, even an empty one, so its tick stream
    /// keeps advancing. An entity whose delta fails to encode is skipped and
    /// resent to its clients as a snapshot once it encodes again; the other
    /// entities of the tick are unaffected.
    pub fn build_tick(
        &mut self,
        world: &World,
        clock: Tick,
    ) -> ReplicationResult<Vec<OutgoingPacket>> {
        self.drop_despawned(world);
        self.sync_tracked(world);

        let mut encodings = TickEncodings::default();
        for (id, replicator) in &mut self.entities {
            let Some(entity) = world.get(*id) else {
                continue;
            };
            if !replicator.prepare(entity, clock) {
                continue;
            }
            match replicator.encode(false) {
                Ok(delta) => {
                    encodings.deltas.insert(*id, delta);
                }
                Err(err) => {
                    // The mirror already moved past this delta.
                    error!(entity = %id, tick = %clock, ?err, "delta encode failed");
                    encodings.failed.insert(*id);
                }
            }
        }
        for state in self.clients.values_mut() {
            let ClientState { known, resend, .. } = state;
            resend.extend(encodings.failed.iter().filter(|id| known.contains(*id)));
        }

        let mut packets = Vec::with_capacity(self.clients.len());
        for (&client, state) in &mut self.clients {
            let bytes = build_client_packet(
                client,
                state,
                &self.entities,
                &mut encodings,
                &self.config,
                clock,
            )?;
            packets.push(OutgoingPacket { client, bytes });
        }
        Ok(packets)
    }

    /// Turns despawned entities into leaves for every client that knew them.
    ///
    /// The ids stay in the synchronization set, so an entity that spawns
    /// (again) later is sent without another `set_relevant`.
    fn drop_despawned(&mut self, world: &World) {
        for state in self.clients.values_mut() {
            let gone: Vec<EntityId> = state
                .known
                .iter()
                .filter(|id| !world.contains(**id))
                .copied()
                .collect();
            for id in gone {
                state.known.remove(&id);
                state.resend.remove(&id);
                state.leaving.insert(id);
            }
        }
    }

    /// Keeps exactly one replicator per entity relevant to some client.
    fn sync_tracked(&mut self, world: &World) {
        let wanted: BTreeSet<EntityId> = self
            .clients
            .values()
            .flat_map(|state| state.relevant.iter().copied())
            .filter(|id| world.contains(*id))
            .collect();
        self.entities.retain(|id, _| {
            let keep = wanted.contains(id);
            if !keep {
                debug!(entity = %id, "entity untracked");
            }
            keep
        });
        for id in wanted {
            let config = &self.config;
            self.entities.entry(id).or_insert_with(|| {
                debug!(entity = %id, "entity tracked");
                EntityReplicator::with_all_kinds(id, config)
            });
        }
    }
}

fn build_client_packet(
    client: ClientId,
    state: &mut ClientState,
    entities: &BTreeMap<EntityId, EntityReplicator>,
    encodings: &mut TickEncodings,
    config: &ReplicationConfig,
    clock: Tick,
) -> ReplicationResult<Vec<u8>> {
    let flags = if state.resync {
        state.known.clear();
        state.resend.clear();
        state.resync = false;
        PacketFlags::full_resync()
    } else {
        PacketFlags::tick()
    };
    let mut builder = PacketBuilder::new(flags, clock.raw());

    for id in std::mem::take(&mut state.leaving) {
        builder.push_leave(id.raw());
    }

    let mut deferred = 0usize;
    for &id in &state.relevant {
        let Some(replicator) = entities.get(&id) else {
            continue;
        };
        if state.known.contains(&id) {
            if state.resend.contains(&id) {
                if let Some(snapshot) = encodings.snapshot(id, replicator, clock) {
                    builder.push_update(id.raw(), sections(snapshot))?;
                    state.resend.remove(&id);
                }
            } else if let Some(delta) = encodings.deltas.get(&id) {
                builder.push_update(id.raw(), sections(delta))?;
            }
            continue;
        }
        if builder.block_count() >= config.max_entities_per_packet {
            deferred += 1;
            continue;
        }
        if let Some(snapshot) = encodings.snapshot(id, replicator, clock) {
            builder.push_update(id.raw(), sections(snapshot))?;
            state.known.insert(id);
        }
    }

    trace!(
        %client,
        tick = %clock,
        blocks = builder.block_count(),
        deferred,
        resend = state.resend.len(),
        full_resync = flags.is_full_resync(),
        "built packet"
    );
    Ok(builder.finish()?)
}

fn sections(items: &[EncodedItem]) -> impl ExactSizeIterator<Item = (u8, &[u8])> {
    items.iter().map(|item| (item.kind.tag(), item.body.as_slice()))
}
