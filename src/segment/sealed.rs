//! Immutable, index-backed segment.
//!
//! A sealed segment is built once - from a growing segment handed over by
//! the node, or from rows hydrated out of storage - and never accepts
//! inserts again. Deletes that arrive after sealing land in a delete buffer
//! and are reconciled at query time, together with the shard's tombstone
//! view, without ever rewriting the immutable rows.
//!
//! The index here is a flat (exhaustive scan) index standing in for the
//! native engine, which is out of scope.

use std::any::Any;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::context::OpContext;
use crate::error::{QuiverError, Result};
use crate::segment::delete_filter::DeleteLookup;
use crate::segment::growing::{GrowingSegment, collect_rows, scan_rows};
use crate::segment::query::{RetrieveRequest, RetrieveResult, SearchRequest, SearchResult};
use crate::segment::types::{
    CollectionId, DeleteBatch, DeleteRecords, FieldId, IngestionCheckpoint, InsertBatch,
    PartitionId, PrimaryKey, Row, SegmentId, Timestamp,
};
use crate::segment::{
    BaseSegment, IndexedFieldInfo, Segment, SegmentDescriptor, SegmentKind, SegmentLevel,
    SegmentReadGuard,
};

/// Identifier of the flat index kind.
pub const FLAT_INDEX_KIND: &str = "flat";

#[derive(Debug, Default)]
struct SealedState {
    rows: Vec<Row>,
    deletes: DeleteRecords,
    rows_mem: u64,
    released: bool,
}

/// The immutable, index-backed segment kind.
#[derive(Debug)]
pub struct SealedSegment {
    base: BaseSegment,
    vector_field: FieldId,
    dimension: usize,
    pin: RwLock<()>,
    state: RwLock<SealedState>,
}

impl SealedSegment {
    /// Build a sealed segment from materialized rows.
    pub fn from_rows(
        descriptor: SegmentDescriptor,
        vector_field: FieldId,
        dimension: usize,
        rows: Vec<Row>,
    ) -> Result<Self> {
        for row in &rows {
            if row.vector.len() != dimension {
                return Err(QuiverError::invalid_argument(format!(
                    "row {} has dimension {}, segment expects {}",
                    row.row_id,
                    row.vector.len(),
                    dimension
                )));
            }
        }

        info!(
            collection_id = descriptor.collection_id,
            partition_id = descriptor.partition_id,
            segment_id = descriptor.segment_id,
            rows = rows.len(),
            "create sealed segment"
        );

        let rows_mem = rows
            .iter()
            .map(|row| {
                (row.vector.len() as u64) * 4 + row.primary_key.encoded_size() + 8 + 8
            })
            .sum();

        Ok(Self {
            base: BaseSegment::new(descriptor, SegmentKind::Sealed, SegmentLevel::L1),
            vector_field,
            dimension,
            pin: RwLock::new(()),
            state: RwLock::new(SealedState {
                rows,
                deletes: DeleteRecords::new(),
                rows_mem,
                released: false,
            }),
        })
    }

    /// Seal a growing segment into an immutable one under a new load
    /// version. The growing segment is left untouched; the caller releases
    /// it once the handover is complete.
    pub fn from_growing(growing: &GrowingSegment, version: i64) -> Result<Self> {
        let descriptor = SegmentDescriptor {
            segment_id: growing.id(),
            collection_id: growing.collection_id(),
            partition_id: growing.partition_id(),
            shard: growing.shard().to_string(),
            version,
            checkpoint: growing.checkpoint(),
        };
        Self::from_rows(
            descriptor,
            growing.vector_field(),
            growing.dimension(),
            growing.rows_for_seal()?,
        )
    }

    /// Vector dimension this segment holds.
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Segment for SealedSegment {
    fn id(&self) -> SegmentId {
        self.base.id()
    }

    fn collection_id(&self) -> CollectionId {
        self.base.collection_id()
    }

    fn partition_id(&self) -> PartitionId {
        self.base.partition_id()
    }

    fn shard(&self) -> &str {
        self.base.shard()
    }

    fn kind(&self) -> SegmentKind {
        self.base.kind()
    }

    fn level(&self) -> SegmentLevel {
        self.base.level()
    }

    fn version(&self) -> i64 {
        self.base.version()
    }

    fn checkpoint(&self) -> IngestionCheckpoint {
        self.base.checkpoint()
    }

    fn read_guard(&self) -> Result<SegmentReadGuard<'_>> {
        let pin = self.pin.try_read().ok_or_else(|| {
            QuiverError::busy(format!("sealed segment {} is releasing", self.id()))
        })?;
        if self.state.read().released {
            return Err(QuiverError::unavailable(format!(
                "sealed segment {} released",
                self.id()
            )));
        }
        Ok(SegmentReadGuard::pinned(pin))
    }

    fn row_count(&self) -> u64 {
        self.state.read().rows.len() as u64
    }

    fn estimated_memory(&self) -> u64 {
        let state = self.state.read();
        state.rows_mem + state.deletes.mem_size()
    }

    fn last_delta_timestamp(&self) -> Timestamp {
        self.state.read().deletes.last_timestamp()
    }

    fn has_index(&self, field_id: FieldId) -> bool {
        field_id == self.vector_field && !self.state.read().released
    }

    fn index_info(&self, field_id: FieldId) -> Option<IndexedFieldInfo> {
        self.has_index(field_id).then(|| IndexedFieldInfo {
            field_id: self.vector_field,
            index_kind: FLAT_INDEX_KIND.to_string(),
        })
    }

    fn has_raw_data(&self, field_id: FieldId) -> bool {
        // The flat index keeps raw vectors alongside the index structure.
        field_id == self.vector_field && !self.state.read().released
    }

    fn indexes(&self) -> Vec<IndexedFieldInfo> {
        self.index_info(self.vector_field).into_iter().collect()
    }

    fn search(&self, ctx: &OpContext, req: &SearchRequest) -> Result<SearchResult> {
        ctx.check()?;
        if req.field != self.vector_field {
            return Err(QuiverError::invalid_argument(format!(
                "segment {} serves field {}, not field {}",
                self.id(),
                self.vector_field,
                req.field
            )));
        }
        if req.query.len() != self.dimension {
            return Err(QuiverError::invalid_argument(format!(
                "query dimension {} does not match segment dimension {}",
                req.query.len(),
                self.dimension
            )));
        }

        let state = self.state.read();
        if state.released {
            return Err(QuiverError::unavailable(format!(
                "sealed segment {} released",
                self.id()
            )));
        }

        let own_deletes = DeleteLookup::from_snapshot(&state.deletes.snapshot());
        scan_rows(&state.rows, &own_deletes, req)
    }

    fn retrieve(&self, ctx: &OpContext, req: &RetrieveRequest) -> Result<RetrieveResult> {
        ctx.check()?;

        let state = self.state.read();
        if state.released {
            return Err(QuiverError::unavailable(format!(
                "sealed segment {} released",
                self.id()
            )));
        }

        let own_deletes = DeleteLookup::from_snapshot(&state.deletes.snapshot());
        Ok(collect_rows(&state.rows, &own_deletes, req))
    }

    fn insert(&self, ctx: &OpContext, _batch: &InsertBatch) -> Result<()> {
        ctx.check()?;
        Err(QuiverError::unsupported(format!(
            "insert not supported for sealed segment {}",
            self.id()
        )))
    }

    fn delete(
        &self,
        ctx: &OpContext,
        primary_keys: &[PrimaryKey],
        timestamps: &[Timestamp],
    ) -> Result<()> {
        ctx.check()?;
        let batch = DeleteBatch::from_parts(primary_keys.to_vec(), timestamps.to_vec());
        self.load_delta_data(ctx, &batch)
    }

    fn load_delta_data(&self, ctx: &OpContext, batch: &DeleteBatch) -> Result<()> {
        ctx.check()?;
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write();
        if state.released {
            return Err(QuiverError::unavailable(format!(
                "sealed segment {} released",
                self.id()
            )));
        }
        state.deletes.append(batch)?;
        if let Some(position) = &batch.end_position {
            self.base.advance_delta_position(position.clone());
        }

        debug!(
            segment_id = self.id(),
            records = batch.len(),
            "buffered deletes"
        );
        Ok(())
    }

    fn release(&self) {
        let _pin = self.pin.write();
        let mut state = self.state.write();
        if state.released {
            return;
        }
        state.rows.clear();
        state.deletes.clear();
        state.rows_mem = 0;
        state.released = true;

        info!(segment_id = self.id(), "released sealed segment");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
