//! Core value types shared by all segment kinds.
//!
//! Primary keys and timestamps are the atomic unit of a delete record: the
//! i-th key of a batch was deleted at the i-th timestamp. Everything here has
//! plain value semantics; the stateful containers live in the segment
//! implementations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};

/// Logical timestamp assigned by the upstream log. `0` is the "none"
/// sentinel: callers must treat it as "no deletes recorded", never as
/// "deleted at time zero".
pub type Timestamp = u64;

/// Segment identifier, assigned by the coordinator.
pub type SegmentId = i64;

/// Collection identifier.
pub type CollectionId = i64;

/// Partition identifier.
pub type PartitionId = i64;

/// Field identifier inside a collection schema.
pub type FieldId = i64;

/// Primary key of a row.
///
/// Collections key rows either by a signed 64-bit integer or by a string;
/// the variant in use is fixed per collection schema.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrimaryKey {
    /// Integer primary key.
    Int(i64),
    /// String primary key.
    Str(String),
}

impl PrimaryKey {
    /// Encoded size in bytes, used for memory accounting.
    pub fn encoded_size(&self) -> u64 {
        match self {
            PrimaryKey::Int(_) => 8,
            PrimaryKey::Str(s) => s.len() as u64,
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(v) => write!(f, "{v}"),
            PrimaryKey::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        PrimaryKey::Int(v)
    }
}

impl From<&str> for PrimaryKey {
    fn from(s: &str) -> Self {
        PrimaryKey::Str(s.to_string())
    }
}

/// Position in an upstream message channel.
///
/// Segments record the last acknowledged position for the streams they
/// ingest so a reload can resume from the right place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePosition {
    /// Channel (virtual channel / shard) name.
    pub channel: String,
    /// Offset inside the channel.
    pub offset: u64,
    /// Timestamp of the message at this position.
    pub timestamp: Timestamp,
}

impl MessagePosition {
    /// Create a new position.
    pub fn new(channel: impl Into<String>, offset: u64, timestamp: Timestamp) -> Self {
        Self {
            channel: channel.into(),
            offset,
            timestamp,
        }
    }
}

/// Last acknowledged positions for both streams a segment ingests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionCheckpoint {
    /// Position in the insert (row data) stream.
    pub data: MessagePosition,
    /// Position in the delta (delete) stream.
    pub delta: MessagePosition,
}

/// A batch of delete records delivered for ingestion.
///
/// Two parallel sequences: the i-th primary key was deleted at the i-th
/// timestamp. [`DeleteBatch::validate`] rejects a length mismatch, which
/// indicates a caller bug that must not silently corrupt a segment's store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteBatch {
    /// Deleted primary keys, in arrival order.
    pub primary_keys: Vec<PrimaryKey>,
    /// Timestamp at which the matching key was deleted.
    pub timestamps: Vec<Timestamp>,
    /// Position of the last delta message folded into this batch, when the
    /// batch came off a tracked channel. Ad hoc batches carry none.
    #[serde(default)]
    pub end_position: Option<MessagePosition>,
}

impl DeleteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a batch from parallel sequences.
    pub fn from_parts(primary_keys: Vec<PrimaryKey>, timestamps: Vec<Timestamp>) -> Self {
        Self {
            primary_keys,
            timestamps,
            end_position: None,
        }
    }

    /// Attach the channel position the batch was read up to.
    pub fn with_position(mut self, position: MessagePosition) -> Self {
        self.end_position = Some(position);
        self
    }

    /// Append one delete record.
    pub fn push(&mut self, pk: PrimaryKey, ts: Timestamp) {
        self.primary_keys.push(pk);
        self.timestamps.push(ts);
    }

    /// Number of delete records in the batch.
    pub fn len(&self) -> usize {
        self.primary_keys.len()
    }

    /// Whether the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.primary_keys.is_empty()
    }

    /// Check the parallel-sequence invariant.
    pub fn validate(&self) -> Result<()> {
        if self.primary_keys.len() != self.timestamps.len() {
            return Err(QuiverError::invalid_argument(format!(
                "delete batch length mismatch: {} primary keys, {} timestamps",
                self.primary_keys.len(),
                self.timestamps.len()
            )));
        }
        Ok(())
    }

    /// Memory footprint of the records in this batch: encoded key size plus
    /// 8 bytes per timestamp.
    pub fn mem_size(&self) -> u64 {
        self.primary_keys
            .iter()
            .map(|pk| pk.encoded_size() + 8)
            .sum()
    }
}

/// A batch of rows delivered to a growing segment.
///
/// Parallel sequences: row IDs, timestamps, primary keys, and one vector per
/// row. Validation rejects any length mismatch before mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertBatch {
    /// Node-assigned row IDs.
    pub row_ids: Vec<i64>,
    /// Timestamp at which each row became visible.
    pub timestamps: Vec<Timestamp>,
    /// Primary key of each row.
    pub primary_keys: Vec<PrimaryKey>,
    /// Vector payload of each row.
    pub vectors: Vec<Vec<f32>>,
    /// Position of the last insert message folded into this batch, when the
    /// batch came off a tracked channel.
    #[serde(default)]
    pub end_position: Option<MessagePosition>,
}

impl InsertBatch {
    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    /// Whether the batch holds no rows.
    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }

    /// Check the parallel-sequence invariant.
    pub fn validate(&self) -> Result<()> {
        let n = self.row_ids.len();
        if self.timestamps.len() != n || self.primary_keys.len() != n || self.vectors.len() != n {
            return Err(QuiverError::invalid_argument(format!(
                "insert batch length mismatch: {} row ids, {} timestamps, {} primary keys, {} vectors",
                n,
                self.timestamps.len(),
                self.primary_keys.len(),
                self.vectors.len()
            )));
        }
        Ok(())
    }
}

/// One materialized row inside a data-bearing segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Node-assigned row ID.
    pub row_id: i64,
    /// Primary key.
    pub primary_key: PrimaryKey,
    /// Timestamp at which the row became visible.
    pub timestamp: Timestamp,
    /// Vector payload.
    pub vector: Vec<f32>,
}

/// Append-only store of delete records.
///
/// Holding both parallel vectors in one struct keeps the equal-length
/// invariant enforced at every mutation point: [`DeleteRecords::append`] is
/// the only way to grow the store and it validates the batch first.
#[derive(Debug, Default)]
pub struct DeleteRecords {
    primary_keys: Vec<PrimaryKey>,
    timestamps: Vec<Timestamp>,
    mem_size: u64,
}

impl DeleteRecords {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch in its given order, without deduplication.
    ///
    /// Redelivery of the same record is harmless: consumers filter by "any
    /// record with this key and timestamp at or below the query time", not
    /// by record count, so reprocessing yields the same outcome.
    pub fn append(&mut self, batch: &DeleteBatch) -> Result<()> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }
        self.primary_keys.extend(batch.primary_keys.iter().cloned());
        self.timestamps.extend_from_slice(&batch.timestamps);
        self.mem_size += batch.mem_size();
        Ok(())
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.primary_keys.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.primary_keys.is_empty()
    }

    /// Timestamp of the most recently appended record (arrival order, not
    /// the maximum), or `0` when none have been recorded.
    pub fn last_timestamp(&self) -> Timestamp {
        self.timestamps.last().copied().unwrap_or(0)
    }

    /// Memory footprint: sum over all records of encoded key size plus 8.
    pub fn mem_size(&self) -> u64 {
        self.mem_size
    }

    /// Clear all records and reset accounting.
    pub fn clear(&mut self) {
        self.primary_keys.clear();
        self.timestamps.clear();
        self.mem_size = 0;
    }

    /// Take a self-consistent, owned copy of both sequences.
    pub fn snapshot(&self) -> DeleteRecordSnapshot {
        DeleteRecordSnapshot {
            primary_keys: self.primary_keys.clone(),
            timestamps: self.timestamps.clone(),
        }
    }
}

/// Point-in-time read view of a delete-record store.
///
/// The two sequences are guaranteed to have equal length and to reflect a
/// single consistent instant; the snapshot is owned, so it is safe to
/// consume without holding any segment lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteRecordSnapshot {
    /// Deleted primary keys, in arrival order.
    pub primary_keys: Vec<PrimaryKey>,
    /// Timestamp at which the matching key was deleted.
    pub timestamps: Vec<Timestamp>,
}

impl DeleteRecordSnapshot {
    /// Number of records in the snapshot.
    pub fn len(&self) -> usize {
        self.primary_keys.len()
    }

    /// Whether the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.primary_keys.is_empty()
    }
}
