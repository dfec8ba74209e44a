//! Replication graph: decide which entities each client synchronizes.
//!
//! This crate provides interest management only. Its output is a per-client
//! synchronization set that feeds directly into
//! `replication::HostReplicator::set_relevant`; how those entities are
//! encoded is the replication crate's business.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use facet::{EntityId, Priority, Transform, World};
use replication::ClientId;
use tracing::{debug, trace};
use vek::Vec3;

/// Per-tick caps for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientBudget {
    /// Entities that may enter the client's set in one build.
    pub max_enters: usize,
}

impl ClientBudget {
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_enters: usize::MAX,
        }
    }
}

impl Default for ClientBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Client view configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientView {
    pub position: Vec3<f32>,
    pub radius: f32,
    pub budget: ClientBudget,
}

impl ClientView {
    #[must_use]
    pub const fn new(position: Vec3<f32>, radius: f32) -> Self {
        Self {
            position,
            radius,
            budget: ClientBudget::unlimited(),
        }
    }

    #[must_use]
    pub const fn with_budget(mut self, budget: ClientBudget) -> Self {
        self.budget = budget;
        self
    }

    fn sees(&self, position: Vec3<f32>) -> bool {
        position.distance_squared(self.position) <= self.radius * self.radius
    }
}

/// Replication graph configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    /// Maximum entities tracked globally (hard safety cap).
    pub max_entities: usize,
}

impl GraphConfig {
    #[must_use]
    pub const fn default_limits() -> Self {
        Self {
            max_entities: 1_000_000,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::default_limits()
    }
}

/// Per-client relevance output for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientRelevance {
    /// Newly synchronized, highest priority first.
    pub entered: Vec<EntityId>,
    /// No longer synchronized, in id order.
    pub left: Vec<EntityId>,
    /// The full synchronization set after this build.
    pub relevant: BTreeSet<EntityId>,
}

impl ClientRelevance {
    /// Whether the set is unchanged.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct EntityEntry {
    position: Vec3<f32>,
    priority: u8,
}

#[derive(Debug, Clone)]
struct ClientState {
    view: ClientView,
    known_entities: BTreeSet<EntityId>,
}

/// Replication graph with basic spatial relevance and priority ordering.
#[derive(Debug, Clone)]
pub struct ReplicationGraph {
    config: GraphConfig,
    entities: BTreeMap<EntityId, EntityEntry>,
    removed_entities: BTreeSet<EntityId>,
    clients: HashMap<ClientId, ClientState>,
}

impl ReplicationGraph {
    #[must_use]
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            entities: BTreeMap::new(),
            removed_entities: BTreeSet::new(),
            clients: HashMap::new(),
        }
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Add or move a tracked entity. Ignored once the entity cap is reached.
    pub fn update_entity(&mut self, entity: EntityId, position: Vec3<f32>) {
        if self.entities.len() >= self.config.max_entities && !self.entities.contains_key(&entity)
        {
            trace!(entity = %entity, "entity cap reached, not tracked");
            return;
        }
        self.removed_entities.remove(&entity);
        self.entities
            .entry(entity)
            .and_modify(|entry| entry.position = position)
            .or_insert(EntityEntry {
                position,
                priority: 0,
            });
    }

    /// Set entity priority (higher is more important).
    pub fn set_entity_priority(&mut self, entity: EntityId, priority: u8) {
        if let Some(entry) = self.entities.get_mut(&entity) {
            entry.priority = priority;
        }
    }

    /// Remove an entity and report it as left to every client that knew it.
    pub fn remove_entity(&mut self, entity: EntityId) {
        if self.entities.remove(&entity).is_some() {
            self.removed_entities.insert(entity);
        }
    }

    /// Mirrors a world into the graph.
    ///
    /// Positions come from the transform facet and priorities from the
    /// priority facet; entities without a transform sit at the origin.
    /// Entities gone from the world are removed.
    pub fn sync_world(&mut self, world: &World) {
        let gone: Vec<EntityId> = self
            .entities
            .keys()
            .filter(|id| !world.contains(**id))
            .copied()
            .collect();
        for id in gone {
            self.remove_entity(id);
        }
        for entity in world.iter() {
            let position = entity
                .facet::<Transform>()
                .map_or_else(Vec3::zero, |transform| transform.position);
            self.update_entity(entity.id(), position);
            let priority = entity.facet::<Priority>().map_or(0, |priority| priority.level());
            self.set_entity_priority(entity.id(), priority);
        }
    }

    /// Update or insert client view configuration.
    pub fn upsert_client(&mut self, client: ClientId, view: ClientView) {
        self.clients
            .entry(client)
            .and_modify(|state| state.view = view)
            .or_insert(ClientState {
                view,
                known_entities: BTreeSet::new(),
            });
    }

    /// Remove a client and its known-entity state.
    pub fn remove_client(&mut self, client: ClientId) {
        self.clients.remove(&client);
    }

    /// Build the client's synchronization set from current graph state.
    ///
    /// Entities in view that the client does not know yet enter in priority
    /// order, up to the client's enter budget; the rest wait for a later
    /// build. Unknown clients get an empty result.
    pub fn build_client_relevance(&mut self, client: ClientId) -> ClientRelevance {
        let Some(state) = self.clients.get_mut(&client) else {
            debug!(%client, "relevance requested for unknown client");
            return ClientRelevance::default();
        };

        let in_view: BTreeSet<EntityId> = self
            .entities
            .iter()
            .filter(|(_, entry)| state.view.sees(entry.position))
            .map(|(id, _)| *id)
            .collect();

        let mut candidates: Vec<(u8, EntityId)> = in_view
            .difference(&state.known_entities)
            .filter_map(|id| self.entities.get(id).map(|entry| (entry.priority, *id)))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let deferred = candidates.len().saturating_sub(state.view.budget.max_enters);
        candidates.truncate(state.view.budget.max_enters);
        let entered: Vec<EntityId> = candidates.into_iter().map(|(_, id)| id).collect();

        let mut left: Vec<EntityId> = state
            .known_entities
            .difference(&in_view)
            .copied()
            .collect();
        for removed in &self.removed_entities {
            if state.known_entities.contains(removed) && !left.contains(removed) {
                left.push(*removed);
            }
        }
        left.sort_unstable();

        for id in &left {
            state.known_entities.remove(id);
        }
        state.known_entities.extend(entered.iter().copied());

        trace!(
            %client,
            entered = entered.len(),
            left = left.len(),
            deferred,
            relevant = state.known_entities.len(),
            "built relevance"
        );
        ClientRelevance {
            entered,
            left,
            relevant: state.known_entities.clone(),
        }
    }

    /// Clear pending removals after all clients have been processed.
    pub fn clear_removed(&mut self) {
        self.removed_entities.clear();
    }
}
