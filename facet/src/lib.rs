//! Entity and facet model for facetsync.
//!
//! An [`Entity`] owns a dynamic set of typed facets. Facet presence may
//! change at runtime; every add/remove bumps the entity's facet change
//! counter.
//!
//! # Design Principles
//!
//! - **Explicit kinds** - Every facet kind has a dedicated slot in [`Facets`]; no
//!   reflection and no downcasting.
//! - **Static dispatch** - `entity.facet::<Transform>()` resolves its slot at compile time.
//! - **Plain data** - Facets carry state only; observing and replicating them is the
//!   replication layer's job.

mod entity;
mod kinds;
mod world;

pub use entity::{Entity, EntityId, Facet, Facets};
pub use kinds::{
    AnimationClip, AnimationCommand, Attachment, BarKind, BlendSync, BoneRetarget,
    LayeredAnimation, LinkKind, Locomotion, Priority, Stance, StatusDisplay, Transform,
    BAR_SLOTS, MAX_BAR_LEVEL, MAX_PRIORITY,
};
pub use world::World;

/// Re-exported math types used by facet fields.
pub use vek::{Quaternion, Vec2, Vec3};
