//! Per-facet delta replication with tick-aligned client playback.
//!
//! Ties together bitstream, wire, and facet. On the host, every replicated
//! facet of an entity is owned by a replication item that diffs it against
//! what was last sent and writes only changed fields. On the client, the same
//! item decodes those fields into a history queue stamped with the host tick,
//! and applies them to the local entity once the playback clock reaches that
//! tick.
//!
//! # Features
//!
//! - Per-field delta encoding with one change bit per field
//! - Existence tracking, so adding or removing a facet replicates
//! - Bounded per-item history with out-of-order and overflow detection
//! - Host fan-out with shared deltas and forced snapshots for new clients
//! - Client playback with tick-aligned spawn, update, and leave
//!
//! # Design Principles
//!
//! - **Correctness first** - Decode errors never half-apply an update.
//! - **Isolated items** - Each item owns a length-delimited section, so one bad
//!   item does not desynchronize the rest of the packet.
//! - **Deterministic** - Same world and clock produce the same bytes.

mod client;
mod config;
mod delta;
mod error;
mod existence;
mod history;
mod host;
mod item;
pub mod items;
mod replicator;
mod types;

pub use client::{ClientReplicator, InterpolateReport, ReceiveReport};
pub use config::{ReplicationConfig, DEFAULT_HISTORY_CAPACITY};
pub use delta::{
    check_for_changes, read_changed, read_changed_bits, read_changed_small, write_changed,
    write_changed_bits, DeltaField, DeltaValue, MAX_MASK_NAMES,
};
pub use error::{ReplicationError, ReplicationResult};
pub use existence::{FacetCodec, Tracked};
pub use history::{HistoryEntry, HistoryError, HistoryQueue};
pub use host::{HostReplicator, OutgoingPacket};
pub use item::{ItemKind, ReplicationItem};
pub use replicator::{EncodedItem, EntityReplicator, ItemFailure};
pub use types::{ClientId, Tick};
pub use wire::Limits as WireLimits;
