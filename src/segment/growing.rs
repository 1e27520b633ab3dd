//! Mutable, append-only segment receiving live inserts.
//!
//! A growing segment holds raw rows in memory and answers searches with a
//! brute-force scan; no index is built until the segment is sealed. Deletes
//! against its own rows arrive either through the synchronous [`delete`]
//! path or as bulk delta batches, and are reconciled at query time together
//! with the shard's tombstone view carried in the request.
//!
//! [`delete`]: crate::segment::Segment::delete

use std::any::Any;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::context::OpContext;
use crate::error::{QuiverError, Result};
use crate::segment::delete_filter::DeleteLookup;
use crate::segment::query::{
    RetrieveRequest, RetrieveResult, SearchHit, SearchRequest, SearchResult,
};
use crate::segment::types::{
    CollectionId, DeleteBatch, DeleteRecords, FieldId, IngestionCheckpoint, InsertBatch,
    PartitionId, PrimaryKey, Row, SegmentId, Timestamp,
};
use crate::segment::{
    BaseSegment, IndexedFieldInfo, Segment, SegmentDescriptor, SegmentKind, SegmentLevel,
    SegmentReadGuard,
};

#[derive(Debug, Default)]
struct GrowingState {
    rows: Vec<Row>,
    deletes: DeleteRecords,
    rows_mem: u64,
    released: bool,
}

fn row_mem_size(row: &Row) -> u64 {
    // vector payload + primary key + timestamp + row id
    (row.vector.len() as u64) * 4 + row.primary_key.encoded_size() + 8 + 8
}

/// The mutable, row-bearing segment kind.
#[derive(Debug)]
pub struct GrowingSegment {
    base: BaseSegment,
    vector_field: FieldId,
    dimension: usize,
    pin: RwLock<()>,
    state: RwLock<GrowingState>,
}

impl GrowingSegment {
    /// Create an empty growing segment serving one vector field.
    pub fn new(descriptor: SegmentDescriptor, vector_field: FieldId, dimension: usize) -> Self {
        info!(
            collection_id = descriptor.collection_id,
            partition_id = descriptor.partition_id,
            segment_id = descriptor.segment_id,
            shard = %descriptor.shard,
            "create growing segment"
        );

        Self {
            base: BaseSegment::new(descriptor, SegmentKind::Growing, SegmentLevel::L1),
            vector_field,
            dimension,
            pin: RwLock::new(()),
            state: RwLock::new(GrowingState::default()),
        }
    }

    /// Vector dimension this segment accepts.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Field this segment serves.
    pub fn vector_field(&self) -> FieldId {
        self.vector_field
    }

    /// Copy out all rows, e.g. to build a sealed segment. Fails after
    /// release.
    pub(crate) fn rows_for_seal(&self) -> Result<Vec<Row>> {
        let state = self.state.read();
        if state.released {
            return Err(QuiverError::unavailable(format!(
                "growing segment {} released",
                self.id()
            )));
        }
        Ok(state.rows.clone())
    }

    fn check_field(&self, field: FieldId) -> Result<()> {
        if field != self.vector_field {
            return Err(QuiverError::invalid_argument(format!(
                "segment {} serves field {}, not field {}",
                self.id(),
                self.vector_field,
                field
            )));
        }
        Ok(())
    }
}

/// Brute-force scan shared by the growing and sealed query paths.
///
/// Visibility: a row is in view when its timestamp is at or below the
/// query's consistency timestamp and no delete record - from the segment's
/// own store or from the shard's tombstone view - masks it.
pub(crate) fn scan_rows(
    rows: &[Row],
    own_deletes: &DeleteLookup,
    req: &SearchRequest,
) -> Result<SearchResult> {
    let mut hits = Vec::new();
    for row in rows {
        if row.timestamp > req.consistency_ts {
            continue;
        }
        if own_deletes.masks(&row.primary_key, row.timestamp, req.consistency_ts) {
            continue;
        }
        if let Some(deletes) = &req.deletes
            && deletes.masks(&row.primary_key, row.timestamp, req.consistency_ts)
        {
            continue;
        }

        let distance = req.metric.distance(&req.query, &row.vector)?;
        hits.push(SearchHit {
            row_id: row.row_id,
            primary_key: row.primary_key.clone(),
            distance,
        });
    }

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.row_id.cmp(&b.row_id))
    });
    hits.truncate(req.top_k);

    Ok(SearchResult { hits })
}

/// Point-lookup shared by the growing and sealed query paths.
pub(crate) fn collect_rows(
    rows: &[Row],
    own_deletes: &DeleteLookup,
    req: &RetrieveRequest,
) -> RetrieveResult {
    let mut result = RetrieveResult {
        vectors: req.with_vectors.then(Vec::new),
        ..RetrieveResult::default()
    };

    for row in rows {
        if row.timestamp > req.consistency_ts {
            continue;
        }
        if !req.primary_keys.contains(&row.primary_key) {
            continue;
        }
        if own_deletes.masks(&row.primary_key, row.timestamp, req.consistency_ts) {
            continue;
        }
        if let Some(deletes) = &req.deletes
            && deletes.masks(&row.primary_key, row.timestamp, req.consistency_ts)
        {
            continue;
        }

        result.row_ids.push(row.row_id);
        result.primary_keys.push(row.primary_key.clone());
        result.timestamps.push(row.timestamp);
        if let Some(vectors) = &mut result.vectors {
            vectors.push(row.vector.clone());
        }
    }

    result
}

impl Segment for GrowingSegment {
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
            QuiverError::busy(format!("growing segment {} is releasing", self.id()))
        })?;
        if self.state.read().released {
            return Err(QuiverError::unavailable(format!(
                "growing segment {} released",
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

    fn has_index(&self, _field_id: FieldId) -> bool {
        false
    }

    fn index_info(&self, _field_id: FieldId) -> Option<IndexedFieldInfo> {
        None
    }

    fn has_raw_data(&self, field_id: FieldId) -> bool {
        field_id == self.vector_field
    }

    fn indexes(&self) -> Vec<IndexedFieldInfo> {
        Vec::new()
    }

    fn search(&self, ctx: &OpContext, req: &SearchRequest) -> Result<SearchResult> {
        ctx.check()?;
        self.check_field(req.field)?;
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
                "growing segment {} released",
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
                "growing segment {} released",
                self.id()
            )));
        }

        let own_deletes = DeleteLookup::from_snapshot(&state.deletes.snapshot());
        Ok(collect_rows(&state.rows, &own_deletes, req))
    }

    fn insert(&self, ctx: &OpContext, batch: &InsertBatch) -> Result<()> {
        ctx.check()?;
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }
        for vector in &batch.vectors {
            if vector.len() != self.dimension {
                return Err(QuiverError::invalid_argument(format!(
                    "vector dimension {} does not match segment dimension {}",
                    vector.len(),
                    self.dimension
                )));
            }
        }

        let mut state = self.state.write();
        if state.released {
            return Err(QuiverError::unavailable(format!(
                "growing segment {} released",
                self.id()
            )));
        }

        for i in 0..batch.len() {
            let row = Row {
                row_id: batch.row_ids[i],
                primary_key: batch.primary_keys[i].clone(),
                timestamp: batch.timestamps[i],
                vector: batch.vectors[i].clone(),
            };
            state.rows_mem += row_mem_size(&row);
            state.rows.push(row);
        }
        if let Some(position) = &batch.end_position {
            self.base.advance_data_position(position.clone());
        }

        debug!(
            segment_id = self.id(),
            rows = batch.len(),
            total = state.rows.len(),
            "inserted rows"
        );
        Ok(())
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
                "growing segment {} released",
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
            "recorded deletes"
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

        info!(segment_id = self.id(), "released growing segment");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELD: FieldId = 101;

    fn growing() -> GrowingSegment {
        GrowingSegment::new(
            SegmentDescriptor {
                segment_id: 11,
                collection_id: 1,
                partition_id: 2,
                shard: "shard-0".to_string(),
                version: 1,
                checkpoint: IngestionCheckpoint::default(),
            },
            FIELD,
            2,
        )
    }

    fn insert_batch(rows: &[(i64, i64, Timestamp, [f32; 2])]) -> InsertBatch {
        InsertBatch {
            row_ids: rows.iter().map(|(id, _, _, _)| *id).collect(),
            timestamps: rows.iter().map(|(_, _, ts, _)| *ts).collect(),
            primary_keys: rows.iter().map(|(_, pk, _, _)| PrimaryKey::Int(*pk)).collect(),
            vectors: rows.iter().map(|(_, _, _, v)| v.to_vec()).collect(),
            end_position: None,
        }
    }

    fn search_req(query: [f32; 2], consistency_ts: Timestamp) -> SearchRequest {
        SearchRequest {
            field: FIELD,
            query: query.to_vec(),
            top_k: 10,
            metric: crate::segment::query::DistanceMetric::Euclidean,
            consistency_ts,
            deletes: None,
        }
    }

    #[test]
    fn test_insert_and_search() {
        let segment = growing();
        let ctx = OpContext::new();

        segment
            .insert(
                &ctx,
                &insert_batch(&[
                    (1, 1, 100, [0.0, 0.0]),
                    (2, 2, 100, [3.0, 4.0]),
                    (3, 3, 100, [10.0, 10.0]),
                ]),
            )
            .unwrap();

        assert_eq!(segment.row_count(), 3);

        let result = segment.search(&ctx, &search_req([0.0, 0.0], 200)).unwrap();
        assert_eq!(result.hits.len(), 3);
        assert_eq!(result.hits[0].row_id, 1);
        assert_eq!(result.hits[1].row_id, 2);
        assert!((result.hits[1].distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_consistency_timestamp_hides_future_rows() {
        let segment = growing();
        let ctx = OpContext::new();
        segment
            .insert(
                &ctx,
                &insert_batch(&[(1, 1, 100, [0.0, 0.0]), (2, 2, 300, [1.0, 1.0])]),
            )
            .unwrap();

        let result = segment.search(&ctx, &search_req([0.0, 0.0], 200)).unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].row_id, 1);
    }

    #[test]
    fn test_own_delete_masks_row() {
        let segment = growing();
        let ctx = OpContext::new();
        segment
            .insert(
                &ctx,
                &insert_batch(&[(1, 1, 100, [0.0, 0.0]), (2, 2, 100, [1.0, 1.0])]),
            )
            .unwrap();

        segment.delete(&ctx, &[PrimaryKey::Int(1)], &[150]).unwrap();

        // Before the delete takes effect, both rows are visible.
        let early = segment.search(&ctx, &search_req([0.0, 0.0], 120)).unwrap();
        assert_eq!(early.hits.len(), 2);

        // After, the deleted key is masked.
        let late = segment.search(&ctx, &search_req([0.0, 0.0], 200)).unwrap();
        assert_eq!(late.hits.len(), 1);
        assert_eq!(late.hits[0].primary_key, PrimaryKey::Int(2));

        assert_eq!(segment.last_delta_timestamp(), 150);
    }

    #[test]
    fn test_delete_length_mismatch_rejected() {
        let segment = growing();
        let ctx = OpContext::new();

        match segment.delete(&ctx, &[PrimaryKey::Int(1), PrimaryKey::Int(2)], &[10]) {
            Err(QuiverError::InvalidArgument(_)) => {}
            other => panic!("expected invalid argument, got {other:?}"),
        }
        assert_eq!(segment.last_delta_timestamp(), 0);
    }

    #[test]
    fn test_retrieve_by_primary_key() {
        let segment = growing();
        let ctx = OpContext::new();
        segment
            .insert(
                &ctx,
                &insert_batch(&[(1, 1, 100, [0.0, 0.0]), (2, 2, 100, [1.0, 1.0])]),
            )
            .unwrap();

        let req = RetrieveRequest {
            primary_keys: vec![PrimaryKey::Int(2)],
            consistency_ts: 200,
            with_vectors: true,
            deletes: None,
        };
        let result = segment.retrieve(&ctx, &req).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.row_ids, vec![2]);
        assert_eq!(result.vectors.as_ref().unwrap()[0], vec![1.0, 1.0]);
    }

    #[test]
    fn test_wrong_field_and_dimension_rejected() {
        let segment = growing();
        let ctx = OpContext::new();

        let mut req = search_req([0.0, 0.0], 100);
        req.field = 999;
        assert!(segment.search(&ctx, &req).is_err());

        let mut req = search_req([0.0, 0.0], 100);
        req.query = vec![0.0; 3];
        assert!(segment.search(&ctx, &req).is_err());
    }

    #[test]
    fn test_search_after_release_fails() {
        let segment = growing();
        let ctx = OpContext::new();
        segment
            .insert(&ctx, &insert_batch(&[(1, 1, 100, [0.0, 0.0])]))
            .unwrap();

        segment.release();
        segment.release();

        match segment.search(&ctx, &search_req([0.0, 0.0], 200)) {
            Err(QuiverError::SegmentUnavailable(_)) => {}
            other => panic!("expected unavailable, got {other:?}"),
        }
        match segment.read_guard() {
            Err(QuiverError::SegmentUnavailable(_)) => {}
            other => panic!("expected unavailable, got {other:?}"),
        }
        assert_eq!(segment.row_count(), 0);
        assert_eq!(segment.estimated_memory(), 0);
    }

    #[test]
    fn test_read_guard_pins_against_release() {
        let segment = growing();
        let guard = segment.read_guard().unwrap();
        // A second reader coexists with the first.
        let second = segment.read_guard().unwrap();
        drop(second);
        drop(guard);
        segment.release();
    }

    #[test]
    fn test_tracked_batches_advance_checkpoint() {
        let segment = growing();
        let ctx = OpContext::new();

        let mut insert = insert_batch(&[(1, 1, 100, [0.0, 0.0])]);
        insert.end_position = Some(crate::segment::types::MessagePosition::new(
            "shard-0", 7, 100,
        ));
        segment.insert(&ctx, &insert).unwrap();
        assert_eq!(segment.checkpoint().data.offset, 7);

        let delta = DeleteBatch::from_parts(vec![PrimaryKey::Int(1)], vec![150])
            .with_position(crate::segment::types::MessagePosition::new("shard-0", 8, 150));
        segment.load_delta_data(&ctx, &delta).unwrap();
        assert_eq!(segment.checkpoint().delta.offset, 8);
        assert_eq!(segment.checkpoint().data.offset, 7);
    }

    #[test]
    fn test_memory_accounting_tracks_rows_and_deletes() {
        let segment = growing();
        let ctx = OpContext::new();
        assert_eq!(segment.estimated_memory(), 0);

        segment
            .insert(&ctx, &insert_batch(&[(1, 1, 100, [0.0, 0.0])]))
            .unwrap();
        // 2 floats * 4 bytes + 8 (int pk) + 8 (ts) + 8 (row id)
        assert_eq!(segment.estimated_memory(), 32);

        segment.delete(&ctx, &[PrimaryKey::Int(1)], &[150]).unwrap();
        assert_eq!(segment.estimated_memory(), 32 + 16);
    }
}
