//! The compaction checkpoint.

use serde::{Deserialize, Serialize};

/// A compaction checkpoint for one frame.
///
/// The blob encodes the full dense grid as of `created_at_us` (see
/// [`crate::codec`] for the byte format). Snapshots are immutable and
/// append-only: the cleanup routine deletes old ones, nothing ever mutates
/// them. Decoding the blob must reproduce exactly the live pixel set that
/// existed in the log at or before `created_at_us`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub frame_id: i64,
    /// Encoded grid; opaque outside the codec.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub blob: Vec<u8>,
    /// Count of non-transparent cells the blob encodes.
    pub live_pixels: u32,
    pub created_at_us: i64,
}

/// A snapshot about to be persisted, before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
    pub frame_id: i64,
    pub blob: Vec<u8>,
    pub live_pixels: u32,
    pub created_at_us: i64,
}

impl NewSnapshot {
    /// Attach a store-assigned id, producing the persisted record.
    #[must_use]
    pub fn with_id(self, id: i64) -> Snapshot {
        Snapshot {
            id,
            frame_id: self.frame_id,
            blob: self.blob,
            live_pixels: self.live_pixels,
            created_at_us: self.created_at_us,
        }
    }
}
