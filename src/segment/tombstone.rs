//! Delete-only (tombstone) segment.
//!
//! A tombstone segment holds no row data. It accumulates delete records
//! shipped as position-tracked delta streams and answers "has this key been
//! deleted, and as of when" implicitly: query paths of the data-bearing
//! segment kinds in the same shard take a [snapshot] of its store, build a
//! [`DeleteLookup`], and filter their own results. The tombstone segment
//! itself never filters anyone's rows and never mutates anyone's data.
//!
//! [snapshot]: TombstoneSegment::delete_records_snapshot
//! [`DeleteLookup`]: crate::segment::delete_filter::DeleteLookup

use std::any::Any;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::context::OpContext;
use crate::error::{QuiverError, Result};
use crate::segment::query::{RetrieveRequest, RetrieveResult, SearchRequest, SearchResult};
use crate::segment::types::{
    CollectionId, DeleteBatch, DeleteRecordSnapshot, DeleteRecords, FieldId, IngestionCheckpoint,
    InsertBatch, PartitionId, PrimaryKey, SegmentId, Timestamp,
};
use crate::segment::{
    BaseSegment, IndexedFieldInfo, Segment, SegmentDescriptor, SegmentKind, SegmentLevel,
    SegmentReadGuard,
};

#[derive(Debug, Default)]
struct TombstoneState {
    records: DeleteRecords,
    released: bool,
}

/// The delete-only segment kind, one per watched shard/partition pair.
///
/// A single read-write lock guards the delete-record store: ingestion and
/// release take it exclusively, snapshots and accounting take it shared.
/// An append is atomic with respect to snapshot reads, so a reader never
/// observes a partial key sequence without its matching timestamps.
#[derive(Debug)]
pub struct TombstoneSegment {
    base: BaseSegment,
    data_guard: RwLock<TombstoneState>,
}

impl TombstoneSegment {
    /// Create an empty tombstone segment.
    pub fn new(descriptor: SegmentDescriptor) -> Self {
        info!(
            collection_id = descriptor.collection_id,
            partition_id = descriptor.partition_id,
            segment_id = descriptor.segment_id,
            shard = %descriptor.shard,
            "create tombstone segment"
        );

        Self {
            base: BaseSegment::new(descriptor, SegmentKind::Tombstone, SegmentLevel::L0),
            data_guard: RwLock::new(TombstoneState::default()),
        }
    }

    /// Take a self-consistent, point-in-time copy of the delete records.
    ///
    /// The returned sequences have equal length and reflect a single
    /// instant; mutations after this call returns are not reflected. A
    /// released segment yields an empty snapshot.
    pub fn delete_records_snapshot(&self) -> DeleteRecordSnapshot {
        self.data_guard.read().records.snapshot()
    }

    /// Number of delete records currently held.
    pub fn delete_record_count(&self) -> usize {
        self.data_guard.read().records.len()
    }
}

impl Segment for TombstoneSegment {
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

    /// Always succeeds. There is no pinned native resource whose lifetime
    /// needs protecting against a concurrent release, so nothing is locked;
    /// `release()` still takes the internal exclusive lock.
    fn read_guard(&self) -> Result<SegmentReadGuard<'_>> {
        Ok(SegmentReadGuard::noop())
    }

    fn row_count(&self) -> u64 {
        0
    }

    fn estimated_memory(&self) -> u64 {
        self.data_guard.read().records.mem_size()
    }

    fn last_delta_timestamp(&self) -> Timestamp {
        self.data_guard.read().records.last_timestamp()
    }

    fn has_index(&self, _field_id: FieldId) -> bool {
        false
    }

    fn index_info(&self, _field_id: FieldId) -> Option<IndexedFieldInfo> {
        None
    }

    fn has_raw_data(&self, _field_id: FieldId) -> bool {
        false
    }

    fn indexes(&self) -> Vec<IndexedFieldInfo> {
        Vec::new()
    }

    fn search(&self, ctx: &OpContext, _req: &SearchRequest) -> Result<SearchResult> {
        ctx.check()?;
        if self.data_guard.read().released {
            return Err(QuiverError::unavailable(format!(
                "tombstone segment {} released",
                self.id()
            )));
        }
        Ok(SearchResult::empty())
    }

    fn retrieve(&self, ctx: &OpContext, _req: &RetrieveRequest) -> Result<RetrieveResult> {
        ctx.check()?;
        if self.data_guard.read().released {
            return Err(QuiverError::unavailable(format!(
                "tombstone segment {} released",
                self.id()
            )));
        }
        Ok(RetrieveResult::empty())
    }

    fn insert(&self, ctx: &OpContext, _batch: &InsertBatch) -> Result<()> {
        ctx.check()?;
        Err(QuiverError::unsupported(format!(
            "insert not supported for tombstone segment {}",
            self.id()
        )))
    }

    fn delete(
        &self,
        ctx: &OpContext,
        _primary_keys: &[PrimaryKey],
        _timestamps: &[Timestamp],
    ) -> Result<()> {
        ctx.check()?;
        Err(QuiverError::unsupported(format!(
            "delete not supported for tombstone segment {}",
            self.id()
        )))
    }

    fn load_delta_data(&self, ctx: &OpContext, batch: &DeleteBatch) -> Result<()> {
        ctx.check()?;
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut state = self.data_guard.write();
        if state.released {
            return Err(QuiverError::unavailable(format!(
                "tombstone segment {} released",
                self.id()
            )));
        }
        state.records.append(batch)?;
        if let Some(position) = &batch.end_position {
            self.base.advance_delta_position(position.clone());
        }

        debug!(
            segment_id = self.id(),
            records = batch.len(),
            total = state.records.len(),
            "loaded delta data"
        );
        Ok(())
    }

    fn release(&self) {
        let mut state = self.data_guard.write();
        if state.released {
            return;
        }
        state.records.clear();
        state.released = true;

        info!(segment_id = self.id(), "released tombstone segment");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn tombstone() -> TombstoneSegment {
        TombstoneSegment::new(SegmentDescriptor {
            segment_id: 7,
            collection_id: 1,
            partition_id: 2,
            shard: "shard-0".to_string(),
            version: 1,
            checkpoint: IngestionCheckpoint::default(),
        })
    }

    fn batch(records: &[(i64, Timestamp)]) -> DeleteBatch {
        DeleteBatch::from_parts(
            records.iter().map(|(pk, _)| PrimaryKey::Int(*pk)).collect(),
            records.iter().map(|(_, ts)| *ts).collect(),
        )
    }

    #[test]
    fn test_fresh_segment_is_empty() {
        let segment = tombstone();

        assert_eq!(segment.kind(), SegmentKind::Tombstone);
        assert_eq!(segment.level(), SegmentLevel::L0);
        assert_eq!(segment.row_count(), 0);
        assert_eq!(segment.estimated_memory(), 0);
        // Zero is the "no deletes recorded" sentinel, not "deleted at zero".
        assert_eq!(segment.last_delta_timestamp(), 0);
        assert!(segment.delete_records_snapshot().is_empty());
    }

    #[test]
    fn test_load_delta_appends_in_arrival_order() {
        let segment = tombstone();
        let ctx = OpContext::new();

        segment.load_delta_data(&ctx, &batch(&[(1, 5), (2, 9)])).unwrap();
        segment.load_delta_data(&ctx, &batch(&[(3, 3)])).unwrap();

        let snapshot = segment.delete_records_snapshot();
        assert_eq!(
            snapshot.primary_keys,
            vec![PrimaryKey::Int(1), PrimaryKey::Int(2), PrimaryKey::Int(3)]
        );
        assert_eq!(snapshot.timestamps, vec![5, 9, 3]);
        assert_eq!(snapshot.primary_keys.len(), snapshot.timestamps.len());

        // Last in arrival order, not the maximum in time.
        assert_eq!(segment.last_delta_timestamp(), 3);
    }

    #[test]
    fn test_memory_accounting() {
        let segment = tombstone();
        let ctx = OpContext::new();

        let delta = DeleteBatch::from_parts(
            vec![PrimaryKey::Int(1), PrimaryKey::from("user-22")],
            vec![100, 200],
        );
        segment.load_delta_data(&ctx, &delta).unwrap();

        // 8 + 8 for the int key, 7 + 8 for the string key.
        assert_eq!(segment.estimated_memory(), 31);

        segment.release();
        assert_eq!(segment.estimated_memory(), 0);
    }

    #[test]
    fn test_duplicate_delivery_is_additive() {
        let segment = tombstone();
        let ctx = OpContext::new();
        let delta = batch(&[(1, 100)]);

        segment.load_delta_data(&ctx, &delta).unwrap();
        segment.load_delta_data(&ctx, &delta).unwrap();

        let snapshot = segment.delete_records_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.primary_keys[0], snapshot.primary_keys[1]);
    }

    #[test]
    fn test_tracked_batch_advances_delta_checkpoint() {
        let segment = tombstone();
        let ctx = OpContext::new();

        let delta = batch(&[(1, 100)])
            .with_position(crate::segment::types::MessagePosition::new("shard-0", 42, 100));
        segment.load_delta_data(&ctx, &delta).unwrap();

        let checkpoint = segment.checkpoint();
        assert_eq!(checkpoint.delta.offset, 42);
        assert_eq!(checkpoint.delta.timestamp, 100);

        // Ad hoc batches leave the checkpoint where it was.
        segment.load_delta_data(&ctx, &batch(&[(2, 200)])).unwrap();
        assert_eq!(segment.checkpoint().delta.offset, 42);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let segment = tombstone();
        let ctx = OpContext::new();

        segment.load_delta_data(&ctx, &DeleteBatch::new()).unwrap();
        assert!(segment.delete_records_snapshot().is_empty());
    }

    #[test]
    fn test_mismatched_batch_rejected_without_mutation() {
        let segment = tombstone();
        let ctx = OpContext::new();
        let bad = DeleteBatch::from_parts(vec![PrimaryKey::Int(1), PrimaryKey::Int(2)], vec![5]);

        match segment.load_delta_data(&ctx, &bad) {
            Err(QuiverError::InvalidArgument(_)) => {}
            other => panic!("expected invalid argument, got {other:?}"),
        }
        assert!(segment.delete_records_snapshot().is_empty());
        assert_eq!(segment.estimated_memory(), 0);
    }

    #[test]
    fn test_insert_and_delete_unsupported_without_mutation() {
        let segment = tombstone();
        let ctx = OpContext::new();
        segment.load_delta_data(&ctx, &batch(&[(1, 10)])).unwrap();

        let before_mem = segment.estimated_memory();
        let before_len = segment.delete_record_count();

        let insert = InsertBatch {
            row_ids: vec![1],
            timestamps: vec![10],
            primary_keys: vec![PrimaryKey::Int(1)],
            vectors: vec![vec![0.0]],
            end_position: None,
        };
        match segment.insert(&ctx, &insert) {
            Err(QuiverError::Unsupported(_)) => {}
            other => panic!("expected unsupported, got {other:?}"),
        }

        match segment.delete(&ctx, &[PrimaryKey::Int(2)], &[20]) {
            Err(QuiverError::Unsupported(_)) => {}
            other => panic!("expected unsupported, got {other:?}"),
        }

        assert_eq!(segment.row_count(), 0);
        assert_eq!(segment.estimated_memory(), before_mem);
        assert_eq!(segment.delete_record_count(), before_len);
    }

    #[test]
    fn test_search_and_retrieve_are_empty_noops() {
        let segment = tombstone();
        let ctx = OpContext::new();
        segment.load_delta_data(&ctx, &batch(&[(1, 10)])).unwrap();

        let search = SearchRequest {
            field: 0,
            query: vec![1.0],
            top_k: 10,
            metric: Default::default(),
            consistency_ts: u64::MAX,
            deletes: None,
        };
        assert!(segment.search(&ctx, &search).unwrap().hits.is_empty());

        let retrieve = RetrieveRequest {
            primary_keys: vec![PrimaryKey::Int(1)],
            consistency_ts: u64::MAX,
            with_vectors: false,
            deletes: None,
        };
        assert!(segment.retrieve(&ctx, &retrieve).unwrap().is_empty());
    }

    #[test]
    fn test_read_guard_is_noop() {
        let segment = tombstone();
        let _guard = segment.read_guard().unwrap();
        // Holding the guard does not block ingestion.
        let ctx = OpContext::new();
        segment.load_delta_data(&ctx, &batch(&[(1, 10)])).unwrap();
    }

    #[test]
    fn test_release_twice_is_safe() {
        let segment = tombstone();
        let ctx = OpContext::new();
        segment.load_delta_data(&ctx, &batch(&[(1, 10), (2, 20)])).unwrap();

        segment.release();
        segment.release();

        assert_eq!(segment.row_count(), 0);
        assert_eq!(segment.estimated_memory(), 0);
        assert!(segment.delete_records_snapshot().is_empty());
    }

    #[test]
    fn test_load_after_release_fails() {
        let segment = tombstone();
        let ctx = OpContext::new();
        segment.release();

        match segment.load_delta_data(&ctx, &batch(&[(1, 10)])) {
            Err(QuiverError::SegmentUnavailable(_)) => {}
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_query_after_release_fails() {
        let segment = tombstone();
        let ctx = OpContext::new();
        segment.release();

        let search = SearchRequest {
            field: 0,
            query: vec![1.0],
            top_k: 10,
            metric: Default::default(),
            consistency_ts: u64::MAX,
            deletes: None,
        };
        match segment.search(&ctx, &search) {
            Err(QuiverError::SegmentUnavailable(_)) => {}
            other => panic!("expected unavailable, got {other:?}"),
        }

        let retrieve = RetrieveRequest {
            primary_keys: vec![PrimaryKey::Int(1)],
            consistency_ts: u64::MAX,
            with_vectors: false,
            deletes: None,
        };
        match segment.retrieve(&ctx, &retrieve) {
            Err(QuiverError::SegmentUnavailable(_)) => {}
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_context_fails_fast() {
        let segment = tombstone();
        let ctx = OpContext::new();
        ctx.cancel();

        match segment.load_delta_data(&ctx, &batch(&[(1, 10)])) {
            Err(QuiverError::OperationCancelled(_)) => {}
            other => panic!("expected cancelled, got {other:?}"),
        }
        assert!(segment.delete_records_snapshot().is_empty());
    }

    #[test]
    fn test_snapshots_never_observe_torn_appends() {
        let segment = Arc::new(tombstone());
        let writer = {
            let segment = Arc::clone(&segment);
            thread::spawn(move || {
                let ctx = OpContext::new();
                for i in 0..200 {
                    segment
                        .load_delta_data(&ctx, &batch(&[(i, i as u64 + 1), (i + 1000, i as u64 + 1)]))
                        .unwrap();
                }
            })
        };

        for _ in 0..500 {
            let snapshot = segment.delete_records_snapshot();
            assert_eq!(snapshot.primary_keys.len(), snapshot.timestamps.len());
            // Appends are atomic: batches land whole, two records at a time.
            assert_eq!(snapshot.len() % 2, 0);
        }

        writer.join().unwrap();
        assert_eq!(segment.delete_record_count(), 400);
    }
}
