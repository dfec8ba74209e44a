//! Entities and their typed facet table.

use std::fmt;

use crate::kinds::{Attachment, LayeredAnimation, Locomotion, Priority, StatusDisplay, Transform};

/// A stable entity identifier.
///
/// Entity IDs are assigned by the simulation layer and must remain stable
/// for the lifetime of an entity, on the host and on every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw entity ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A facet kind that can be attached to an [`Entity`].
///
/// Each kind owns exactly one slot in [`Facets`]; lookup is resolved at
/// compile time through [`slot`](Self::slot)/[`slot_mut`](Self::slot_mut).
pub trait Facet: Default + Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Short human-readable name used in logs.
    const NAME: &'static str;

    fn slot(facets: &Facets) -> &Option<Self>;

    fn slot_mut(facets: &mut Facets) -> &mut Option<Self>;
}

macro_rules! facet_slots {
    ($($field:ident: $ty:ty => $name:literal),* $(,)?) => {
        /// One optional slot per facet kind.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct Facets {
            $($field: Option<$ty>,)*
        }

        impl Facets {
            /// Number of facets currently present.
            #[must_use]
            pub fn len(&self) -> usize {
                0 $(+ usize::from(self.$field.is_some()))*
            }

            /// Returns `true` if no facet is present.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }
        }

        $(
            impl Facet for $ty {
                const NAME: &'static str = $name;

                fn slot(facets: &Facets) -> &Option<Self> {
                    &facets.$field
                }

                fn slot_mut(facets: &mut Facets) -> &mut Option<Self> {
                    &mut facets.$field
                }
            }
        )*
    };
}

facet_slots! {
    priority: Priority => "priority",
    attachment: Attachment => "attachment",
    animation: LayeredAnimation => "animation",
    status: StatusDisplay => "status",
    transform: Transform => "transform",
    locomotion: Locomotion => "locomotion",
}

/// A simulated object owning a dynamic set of facets.
///
/// Every facet add or remove bumps the facet change counter, which lets
/// per-facet observers skip presence checks on ticks where nothing was
/// added or removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: EntityId,
    facets: Facets,
    facet_changes: u32,
}

impl Entity {
    /// Creates an entity with no facets.
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            facets: Facets::default(),
            facet_changes: 0,
        }
    }

    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Counter incremented (wrapping) on every facet add or remove.
    #[must_use]
    pub const fn facet_change_counter(&self) -> u32 {
        self.facet_changes
    }

    #[must_use]
    pub const fn facets(&self) -> &Facets {
        &self.facets
    }

    #[must_use]
    pub fn facet<F: Facet>(&self) -> Option<&F> {
        F::slot(&self.facets).as_ref()
    }

    /// Mutable access to an existing facet; does not count as an add/remove.
    pub fn facet_mut<F: Facet>(&mut self) -> Option<&mut F> {
        F::slot_mut(&mut self.facets).as_mut()
    }

    #[must_use]
    pub fn has_facet<F: Facet>(&self) -> bool {
        F::slot(&self.facets).is_some()
    }

    /// Returns the facet, creating a default instance if it is absent.
    pub fn get_or_create_facet<F: Facet>(&mut self) -> &mut F {
        let slot = F::slot_mut(&mut self.facets);
        if slot.is_none() {
            self.facet_changes = self.facet_changes.wrapping_add(1);
        }
        slot.get_or_insert_with(F::default)
    }

    /// Stores `value`, returning the facet it replaced.
    ///
    /// Replacing an existing facet is not a presence change.
    pub fn insert_facet<F: Facet>(&mut self, value: F) -> Option<F> {
        let previous = F::slot_mut(&mut self.facets).replace(value);
        if previous.is_none() {
            self.facet_changes = self.facet_changes.wrapping_add(1);
        }
        previous
    }

    /// Removes the facet, returning it if it was present.
    pub fn destroy_facet<F: Facet>(&mut self) -> Option<F> {
        let removed = F::slot_mut(&mut self.facets).take();
        if removed.is_some() {
            self.facet_changes = self.facet_changes.wrapping_add(1);
        }
        removed
    }
}
