//! Search and retrieve request/response types.
//!
//! These are the payloads the query-serving layer hands to a segment. The
//! delete view is carried inside the request: the query layer snapshots the
//! shard's tombstone segment, builds a [`DeleteLookup`], and attaches it, so
//! filtering policy stays in the query path and out of the tombstone store.
//!
//! [`DeleteLookup`]: crate::segment::delete_filter::DeleteLookup

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};
use crate::segment::delete_filter::DeleteLookup;
use crate::segment::types::{FieldId, PrimaryKey, Timestamp};

/// Distance metrics for vector similarity.
///
/// All metrics are expressed as distances (lower is closer); dot product is
/// negated to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistanceMetric {
    /// Cosine distance (1 - cosine similarity)
    #[default]
    Cosine,
    /// Euclidean (L2) distance
    Euclidean,
    /// Negated dot product
    DotProduct,
}

impl DistanceMetric {
    /// Calculate the distance between two vectors using this metric.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(QuiverError::invalid_argument(format!(
                "vector dimension mismatch: {} vs {}",
                a.len(),
                b.len()
            )));
        }

        let result = match self {
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0 // maximum distance for zero vectors
                } else {
                    1.0 - (dot / (norm_a * norm_b))
                }
            }
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::DotProduct => -a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>(),
        };

        Ok(result)
    }

    /// Get the name of this distance metric.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::DotProduct => "dot_product",
        }
    }
}

/// A vector search against one segment.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Field to search.
    pub field: FieldId,
    /// Query vector.
    pub query: Vec<f32>,
    /// Maximum number of hits to return.
    pub top_k: usize,
    /// Distance metric to rank by.
    pub metric: DistanceMetric,
    /// Logical time the query is evaluated as of. Rows that became visible
    /// later, and deletes recorded later, are both out of view.
    pub consistency_ts: Timestamp,
    /// Delete view from the shard's tombstone segment, if one exists.
    pub deletes: Option<Arc<DeleteLookup>>,
}

/// One hit of a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Node-assigned row ID.
    pub row_id: i64,
    /// Primary key of the matching row.
    pub primary_key: PrimaryKey,
    /// Distance to the query vector (lower is closer).
    pub distance: f32,
}

/// Hits of a search against one segment, ordered by ascending distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    /// Matching rows.
    pub hits: Vec<SearchHit>,
}

impl SearchResult {
    /// An empty result.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A point-lookup of rows by primary key against one segment.
#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    /// Primary keys to fetch.
    pub primary_keys: Vec<PrimaryKey>,
    /// Logical time the query is evaluated as of.
    pub consistency_ts: Timestamp,
    /// Whether to copy vector payloads into the result.
    pub with_vectors: bool,
    /// Delete view from the shard's tombstone segment, if one exists.
    pub deletes: Option<Arc<DeleteLookup>>,
}

/// Rows returned by a retrieve. Parallel sequences, one entry per visible
/// row, in segment order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrieveResult {
    /// Node-assigned row IDs.
    pub row_ids: Vec<i64>,
    /// Primary keys.
    pub primary_keys: Vec<PrimaryKey>,
    /// Visibility timestamps.
    pub timestamps: Vec<Timestamp>,
    /// Vector payloads, present when requested.
    pub vectors: Option<Vec<Vec<f32>>>,
}

impl RetrieveResult {
    /// An empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows returned.
    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    /// Whether no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }
}
