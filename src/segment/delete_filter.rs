//! Query-time reconciliation of delete records.
//!
//! The tombstone segment only stores and snapshots delete records; it never
//! filters anyone's results. The query path builds a [`DeleteLookup`] from a
//! snapshot and asks it, per candidate row, whether a recorded delete masks
//! that row at the query's consistency timestamp. Keeping the policy here
//! lets it evolve independently of the store.

use ahash::AHashMap;

use crate::segment::types::{DeleteRecordSnapshot, PrimaryKey, Timestamp};

/// Lookup structure over a delete-record snapshot, keyed by primary key.
///
/// Duplicate records collapse into one timestamp list per key; the list is
/// kept sorted so range checks can stop early. Arrival order carries no
/// meaning here.
#[derive(Debug, Default)]
pub struct DeleteLookup {
    entries: AHashMap<PrimaryKey, Vec<Timestamp>>,
}

impl DeleteLookup {
    /// Build a lookup from a snapshot.
    pub fn from_snapshot(snapshot: &DeleteRecordSnapshot) -> Self {
        let mut entries: AHashMap<PrimaryKey, Vec<Timestamp>> = AHashMap::new();
        for (pk, ts) in snapshot
            .primary_keys
            .iter()
            .zip(snapshot.timestamps.iter())
        {
            entries.entry(pk.clone()).or_default().push(*ts);
        }
        for timestamps in entries.values_mut() {
            timestamps.sort_unstable();
        }
        Self { entries }
    }

    /// Number of distinct deleted keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no deletes are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any delete is recorded for this key, at any timestamp.
    pub fn contains(&self, pk: &PrimaryKey) -> bool {
        self.entries.contains_key(pk)
    }

    /// Whether a recorded delete masks a row with visibility timestamp
    /// `row_ts` from a query evaluated as of `query_ts`.
    ///
    /// A delete applies when its timestamp falls in `[row_ts, query_ts]`:
    /// deletes older than the row belong to an earlier incarnation of the
    /// key (the row was re-inserted later), and deletes past the query time
    /// are not yet in view.
    pub fn masks(&self, pk: &PrimaryKey, row_ts: Timestamp, query_ts: Timestamp) -> bool {
        match self.entries.get(pk) {
            Some(timestamps) => {
                let from = timestamps.partition_point(|&ts| ts < row_ts);
                timestamps[from..].first().is_some_and(|&ts| ts <= query_ts)
            }
            None => false,
        }
    }

    /// Whether any delete for this key was recorded at or before `query_ts`.
    /// Equivalent to [`masks`](Self::masks) with a zero row timestamp.
    pub fn deleted_before(&self, pk: &PrimaryKey, query_ts: Timestamp) -> bool {
        self.masks(pk, 0, query_ts)
    }
}
