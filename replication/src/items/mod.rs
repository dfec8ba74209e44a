//! Concrete replication items, one per replicated facet kind.
//!
//! Each module defines a [`FacetCodec`](crate::FacetCodec) and aliases the
//! wrapped item type.

mod animation;
mod attachment;
mod locomotion;
mod priority;
mod status;
mod transform;

pub use animation::{
    dequantize_blend_time, quantize_blend_time, AnimationCodec, AnimationItem, AnimationMode,
    AnimationUpdate,
};
pub use attachment::{AttachmentCodec, AttachmentItem, AttachmentUpdate};
pub use locomotion::{LocomotionCodec, LocomotionItem, LocomotionUpdate};
pub use priority::{PriorityCodec, PriorityItem, PriorityUpdate, PRIORITY_BITS};
pub use status::{
    StatusCodec, StatusItem, StatusUpdate, BAR_COUNT_BITS, BAR_RECORD_BITS, MAX_BAR_RECORDS,
};
pub use transform::{TransformCodec, TransformItem, TransformUpdate};
