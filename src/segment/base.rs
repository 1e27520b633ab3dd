//! Shared identity and position bookkeeping for all segment kinds.

use parking_lot::RwLock;

use crate::segment::types::{
    CollectionId, IngestionCheckpoint, MessagePosition, PartitionId, SegmentId,
};
use crate::segment::{SegmentDescriptor, SegmentKind, SegmentLevel};

/// State composed into every concrete segment kind.
///
/// Identity, kind, level, and version are immutable after construction. The
/// ingestion checkpoint is interior-mutable and advanced only by the owning
/// segment as it acknowledges stream positions.
#[derive(Debug)]
pub struct BaseSegment {
    segment_id: SegmentId,
    collection_id: CollectionId,
    partition_id: PartitionId,
    shard: String,
    kind: SegmentKind,
    level: SegmentLevel,
    version: i64,
    checkpoint: RwLock<IngestionCheckpoint>,
}

impl BaseSegment {
    /// Create the shared state from a descriptor.
    pub fn new(descriptor: SegmentDescriptor, kind: SegmentKind, level: SegmentLevel) -> Self {
        Self {
            segment_id: descriptor.segment_id,
            collection_id: descriptor.collection_id,
            partition_id: descriptor.partition_id,
            shard: descriptor.shard,
            kind,
            level,
            version: descriptor.version,
            checkpoint: RwLock::new(descriptor.checkpoint),
        }
    }

    /// Segment ID.
    pub fn id(&self) -> SegmentId {
        self.segment_id
    }

    /// Owning collection.
    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    /// Owning partition.
    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Shard (channel) name.
    pub fn shard(&self) -> &str {
        &self.shard
    }

    /// Kind of this segment.
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Persistence tier of this segment.
    pub fn level(&self) -> SegmentLevel {
        self.level
    }

    /// Load version assigned at construction.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Current ingestion checkpoint.
    pub fn checkpoint(&self) -> IngestionCheckpoint {
        self.checkpoint.read().clone()
    }

    /// Acknowledge a position in the insert stream.
    pub fn advance_data_position(&self, position: MessagePosition) {
        self.checkpoint.write().data = position;
    }

    /// Acknowledge a position in the delta stream.
    pub fn advance_delta_position(&self, position: MessagePosition) {
        self.checkpoint.write().delta = position;
    }
}
