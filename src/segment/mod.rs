//! Segment management for a vector-search query node.
//!
//! A segment is the unit of data a query node holds in memory to answer
//! search and retrieve requests for one shard/partition slice. Segments come
//! in three kinds behind one contract: growing (mutable, append-only),
//! sealed (immutable, index-backed), and tombstone (delete-only, no row
//! data). The [`Segment`] trait is the capability interface every kind
//! implements; semantics differ per kind as documented on each operation.

pub mod base;
pub mod delete_filter;
pub mod growing;
pub mod query;
pub mod sealed;
pub mod tombstone;
pub mod types;

use std::any::Any;
use std::fmt;

use parking_lot::RwLockReadGuard;
use serde::{Deserialize, Serialize};

use crate::context::OpContext;
use crate::error::Result;
use crate::segment::query::{RetrieveRequest, RetrieveResult, SearchRequest, SearchResult};
use crate::segment::types::{
    CollectionId, DeleteBatch, FieldId, IngestionCheckpoint, InsertBatch, PartitionId, PrimaryKey,
    SegmentId, Timestamp,
};

pub use base::BaseSegment;
pub use delete_filter::DeleteLookup;
pub use growing::GrowingSegment;
pub use sealed::SealedSegment;
pub use tombstone::TombstoneSegment;

/// The kind of a segment, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    /// Mutable, append-only segment receiving live inserts.
    Growing,
    /// Immutable segment backed by a built index.
    Sealed,
    /// Delete-only segment carrying no row data.
    Tombstone,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentKind::Growing => write!(f, "growing"),
            SegmentKind::Sealed => write!(f, "sealed"),
            SegmentKind::Tombstone => write!(f, "tombstone"),
        }
    }
}

/// Persistence/compaction tier of a segment, fixed at construction.
///
/// Tombstone segments live at L0; data-bearing segments at L1 and above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentLevel {
    /// Delta-only tier.
    L0,
    /// First data tier.
    L1,
    /// Compacted data tier.
    L2,
}

impl fmt::Display for SegmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentLevel::L0 => write!(f, "L0"),
            SegmentLevel::L1 => write!(f, "L1"),
            SegmentLevel::L2 => write!(f, "L2"),
        }
    }
}

/// Immutable identity a segment is constructed with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    /// Segment ID.
    pub segment_id: SegmentId,
    /// Owning collection.
    pub collection_id: CollectionId,
    /// Owning partition.
    pub partition_id: PartitionId,
    /// Shard (channel) name.
    pub shard: String,
    /// Monotonically-assigned load version.
    pub version: i64,
    /// Initial ingestion checkpoint.
    pub checkpoint: IngestionCheckpoint,
}

/// Metadata about one indexed field of a sealed segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFieldInfo {
    /// Field the index covers.
    pub field_id: FieldId,
    /// Index kind identifier, e.g. `"flat"`.
    pub index_kind: String,
}

/// Scoped read guard pinning a segment against a concurrent release.
///
/// Data-bearing kinds hold a shared lock for the guard's lifetime so
/// `release()` waits until all guards are dropped. The tombstone kind has
/// no pinned native resource and hands out an unpinned guard that always
/// succeeds; this asymmetry is deliberate, not an oversight.
#[derive(Debug)]
pub struct SegmentReadGuard<'a> {
    _pin: Option<RwLockReadGuard<'a, ()>>,
}

impl<'a> SegmentReadGuard<'a> {
    /// Guard backed by a held shared lock.
    pub(crate) fn pinned(guard: RwLockReadGuard<'a, ()>) -> Self {
        Self { _pin: Some(guard) }
    }

    /// Guard with nothing to pin.
    pub(crate) fn noop() -> Self {
        Self { _pin: None }
    }
}

/// The capability contract every segment kind implements.
///
/// Lifecycle: a segment is constructed with its immutable identity, has its
/// mutable state populated by one or more ingestion calls, and is destroyed
/// by an explicit [`release`](Segment::release). Query operations against a
/// released segment fail with `SegmentUnavailable` rather than silently
/// returning partial results.
pub trait Segment: Send + Sync + fmt::Debug {
    /// Segment ID.
    fn id(&self) -> SegmentId;

    /// Owning collection.
    fn collection_id(&self) -> CollectionId;

    /// Owning partition.
    fn partition_id(&self) -> PartitionId;

    /// Shard (channel) name.
    fn shard(&self) -> &str;

    /// Kind of this segment.
    fn kind(&self) -> SegmentKind;

    /// Persistence tier of this segment.
    fn level(&self) -> SegmentLevel;

    /// Load version assigned at construction.
    fn version(&self) -> i64;

    /// Last acknowledged ingestion positions.
    fn checkpoint(&self) -> IngestionCheckpoint;

    /// Acquire a scoped read guard.
    ///
    /// Fails with `Busy` when the segment is being released concurrently and
    /// with `SegmentUnavailable` when it already has been. Callers receiving
    /// `Busy` should retry after a short backoff.
    fn read_guard(&self) -> Result<SegmentReadGuard<'_>>;

    /// Number of data rows held. Always 0 for tombstone segments.
    fn row_count(&self) -> u64;

    /// Best-effort memory footprint in bytes, used by the node's memory
    /// budget.
    fn estimated_memory(&self) -> u64;

    /// Timestamp of the most recently appended delete record, or `0` when
    /// none have been recorded. Callers use this to judge whether the
    /// segment's delete view is fresh enough for a query's consistency
    /// timestamp.
    fn last_delta_timestamp(&self) -> Timestamp;

    /// Whether an index has been built over the field.
    fn has_index(&self, field_id: FieldId) -> bool;

    /// Index metadata for the field, if one exists.
    fn index_info(&self, field_id: FieldId) -> Option<IndexedFieldInfo>;

    /// Whether raw row data is available for the field.
    fn has_raw_data(&self, field_id: FieldId) -> bool;

    /// Metadata for every indexed field.
    fn indexes(&self) -> Vec<IndexedFieldInfo>;

    /// Execute a vector search. The tombstone kind holds no rows and
    /// returns an empty result rather than failing.
    fn search(&self, ctx: &OpContext, req: &SearchRequest) -> Result<SearchResult>;

    /// Fetch rows by primary key. The tombstone kind holds no rows and
    /// returns an empty result rather than failing.
    fn retrieve(&self, ctx: &OpContext, req: &RetrieveRequest) -> Result<RetrieveResult>;

    /// Append rows. Only meaningful for the growing kind; sealed and
    /// tombstone segments fail with `Unsupported`. A batch carrying a
    /// channel position advances the data checkpoint on success.
    fn insert(&self, ctx: &OpContext, batch: &InsertBatch) -> Result<()>;

    /// Synchronous single-batch delete against this segment's own rows.
    ///
    /// Fails with `Unsupported` for the tombstone kind, which receives
    /// deletions exclusively through [`load_delta_data`]
    /// (position-tracked delta streams), never through this ad hoc path.
    ///
    /// [`load_delta_data`]: Segment::load_delta_data
    fn delete(
        &self,
        ctx: &OpContext,
        primary_keys: &[PrimaryKey],
        timestamps: &[Timestamp],
    ) -> Result<()>;

    /// Bulk delete ingestion. For the tombstone kind, appends the batch's
    /// keys and timestamps in the order given, without deduplication;
    /// duplicate and out-of-order delivery are tolerated. An empty
    /// batch is a no-op; mismatched parallel sequences are rejected without
    /// mutating the store. A batch carrying a channel position advances the
    /// delta checkpoint on success.
    fn load_delta_data(&self, ctx: &OpContext, batch: &DeleteBatch) -> Result<()>;

    /// Clear all mutable state and make the segment unusable for further
    /// queries. All-or-nothing; safe to call more than once.
    fn release(&self);

    /// Downcast support for kind-specific routing, e.g. reaching a
    /// tombstone segment's snapshot from behind `dyn Segment`.
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(SegmentKind::Growing.to_string(), "growing");
        assert_eq!(SegmentKind::Sealed.to_string(), "sealed");
        assert_eq!(SegmentKind::Tombstone.to_string(), "tombstone");
    }

    #[test]
    fn test_level_display() {
        assert_eq!(SegmentLevel::L0.to_string(), "L0");
        assert_eq!(SegmentLevel::L2.to_string(), "L2");
    }
}
