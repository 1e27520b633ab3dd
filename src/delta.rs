//! Delta blob encoding and tombstone hydration.
//!
//! A delta batch travels through object storage as a framed blob: magic
//! bytes, a format version, a CRC32 of the payload, the payload length, and
//! a bincode-encoded [`DeleteBatch`]. Decoding rejects anything malformed
//! before a single record reaches a segment.

use std::io::Cursor;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::context::OpContext;
use crate::error::{QuiverError, Result};
use crate::segment::Segment;
use crate::segment::tombstone::TombstoneSegment;
use crate::segment::types::DeleteBatch;
use crate::storage::ObjectStore;

/// Magic bytes identifying a delta blob.
pub const DELTA_MAGIC: &[u8; 4] = b"QVDT";

/// Current delta blob format version.
pub const DELTA_FORMAT_VERSION: u8 = 1;

/// Encode a delete batch into a framed blob.
pub fn encode_delta_blob(batch: &DeleteBatch) -> Result<Vec<u8>> {
    batch.validate()?;

    let payload = bincode::serialize(batch)
        .map_err(|e| QuiverError::serialization(format!("failed to encode delta batch: {e}")))?;

    let mut blob = Vec::with_capacity(payload.len() + 17);
    blob.extend_from_slice(DELTA_MAGIC);
    blob.write_u8(DELTA_FORMAT_VERSION)?;
    blob.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    blob.write_u64::<LittleEndian>(payload.len() as u64)?;
    blob.extend_from_slice(&payload);
    Ok(blob)
}

/// Decode a framed blob back into a delete batch.
pub fn decode_delta_blob(blob: &[u8]) -> Result<DeleteBatch> {
    let mut cursor = Cursor::new(blob);

    let mut magic = [0u8; 4];
    std::io::Read::read_exact(&mut cursor, &mut magic)
        .map_err(|_| QuiverError::serialization("delta blob truncated before magic"))?;
    if &magic != DELTA_MAGIC {
        return Err(QuiverError::serialization(format!(
            "bad delta blob magic: {magic:02x?}"
        )));
    }

    let version = cursor
        .read_u8()
        .map_err(|_| QuiverError::serialization("delta blob truncated before version"))?;
    if version != DELTA_FORMAT_VERSION {
        return Err(QuiverError::serialization(format!(
            "unknown delta blob format version: {version}"
        )));
    }

    let checksum = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| QuiverError::serialization("delta blob truncated before checksum"))?;
    let payload_len = cursor
        .read_u64::<LittleEndian>()
        .map_err(|_| QuiverError::serialization("delta blob truncated before payload length"))?;

    let offset = cursor.position() as usize;
    let payload = offset
        .checked_add(payload_len as usize)
        .and_then(|end| blob.get(offset..end))
        .ok_or_else(|| QuiverError::serialization("delta blob payload truncated"))?;

    if crc32fast::hash(payload) != checksum {
        return Err(QuiverError::serialization("delta blob checksum mismatch"));
    }

    let batch: DeleteBatch = bincode::deserialize(payload)
        .map_err(|e| QuiverError::serialization(format!("failed to decode delta batch: {e}")))?;
    batch.validate()?;
    Ok(batch)
}

/// Persist a delete batch as a blob under the given key.
pub fn write_delta_blob(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    batch: &DeleteBatch,
) -> Result<()> {
    let blob = encode_delta_blob(batch)?;
    store.put(bucket, key, &blob)
}

/// Fetch and decode one delta blob.
pub fn read_delta_blob(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<DeleteBatch> {
    decode_delta_blob(&store.get(bucket, key)?)
}

/// Hydrate a tombstone segment from every delta blob under a prefix.
///
/// Blobs are fetched in key order, so redelivered prefixes replay the same
/// way every time; the segment's store is additive, which makes the whole
/// pass safe to repeat. Fetch and decode happen before the segment lock is
/// touched. Returns the number of delete records loaded.
pub fn hydrate_tombstone(
    ctx: &OpContext,
    store: &Arc<dyn ObjectStore>,
    bucket: &str,
    prefix: &str,
    segment: &TombstoneSegment,
) -> Result<usize> {
    ctx.check()?;

    let keys = store.list(bucket, prefix, true)?;
    let mut loaded = 0;
    for key in &keys {
        ctx.check()?;
        let batch = read_delta_blob(store.as_ref(), bucket, key)?;
        segment.load_delta_data(ctx, &batch)?;
        loaded += batch.len();
    }

    debug!(
        segment_id = segment.id(),
        blobs = keys.len(),
        records = loaded,
        "hydrated tombstone segment"
    );
    Ok(loaded)
}
