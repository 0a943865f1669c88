//! Snapshot compaction and frame-state reconstruction.
//!
//! The placement log is append-only; replaying all of it on every read does
//! not scale. The compactor condenses the log into snapshots (encoded dense
//! grids, see [`crate::codec`]) and answers "what does this frame look like
//! right now" as *latest snapshot + placements since it*.
//!
//! # Snapshot semantics
//!
//! Snapshot creation is **not** transactional with the log. Placements that
//! land while a snapshot is being built stay in the log and are returned as
//! `recent_pixels` by every reconstruction until the next snapshot subsumes
//! them. Two processes racing to snapshot the same frame both produce valid
//! records (whichever is latest by creation time wins), so snapshot creation
//! is at-least-once by design and needs no coordination.
//!
//! # Failure semantics
//!
//! Every store or codec failure propagates typed to the caller. The
//! compactor performs no retries; retry policy lives in the job scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec::{self, CodecError};
use crate::error::ErrorCode;
use crate::model::pixel::is_transparent;
use crate::model::{Frame, NewSnapshot, Pixel, Snapshot};
use crate::store::{FrameStore, PixelStore, SnapshotStore, StoreError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced by compaction and reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompactorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl CompactorError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Store(e) => e.code(),
            Self::Codec(e) => e.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Compaction policy
// ---------------------------------------------------------------------------

/// Tunables deciding when a frame deserves a new snapshot.
///
/// Thresholds are fixed constants rather than functions of frame area; see
/// DESIGN.md for the open-question decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionPolicy {
    /// Minimum total placements before the first snapshot pays for itself.
    /// A snapshot is warranted at exactly this count. Default: 100.
    pub min_pixels_for_first_snapshot: u64,

    /// Placements after the latest snapshot that warrant a fresh one. This
    /// bounds the `recent_pixels` overlay any reader must perform.
    /// Default: 1000.
    pub pixels_since_snapshot: u64,

    /// How many past snapshots the cleanup job retains. Keeping more than
    /// one allows recovery if the newest snapshot is later found corrupt,
    /// and supports point-in-time debugging. Default: 3.
    pub keep_snapshots: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            min_pixels_for_first_snapshot: 100,
            pixels_since_snapshot: 1000,
            keep_snapshots: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconstructed frame state
// ---------------------------------------------------------------------------

/// Everything a reader needs to reconstruct a frame's current pixels.
///
/// The overlay itself is the caller's contract: apply `base_pixels`, then
/// `recent_pixels` in order, last write per coordinate wins. Keeping the
/// merge outside [`Compactor::load_frame_state`] lets a caller with an
/// already-rendered view apply only the delta. [`FrameState::live_grid`] is
/// the reference implementation of that overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameState {
    pub frame: Frame,
    /// The snapshot `base_pixels` came from, or `None` if the frame has
    /// never been compacted.
    pub snapshot: Option<Snapshot>,
    /// Decoded snapshot content; empty when `snapshot` is `None`.
    pub base_pixels: Vec<Pixel>,
    /// Placements strictly after the snapshot, or the whole log without one.
    pub recent_pixels: Vec<Pixel>,
}

impl FrameState {
    /// Overlay `recent_pixels` onto `base_pixels`, last write per coordinate
    /// wins, dropping cells whose final color is transparent.
    #[must_use]
    pub fn live_grid(&self) -> HashMap<(u16, u16), u32> {
        let mut grid = HashMap::with_capacity(self.base_pixels.len());
        for pixel in &self.base_pixels {
            grid.insert((pixel.x, pixel.y), pixel.color);
        }
        for pixel in &self.recent_pixels {
            if self.frame.contains(pixel.x, pixel.y) {
                grid.insert((pixel.x, pixel.y), pixel.color);
            }
        }
        grid.retain(|_, color| !is_transparent(*color));
        grid
    }

    /// Number of live pixels after the overlay.
    #[must_use]
    pub fn live_pixel_count(&self) -> usize {
        self.live_grid().len()
    }
}

// ---------------------------------------------------------------------------
// Compactor
// ---------------------------------------------------------------------------

/// Bridges the durable placement log and the grid codec.
///
/// Wall-clock time is always passed in as `now_us` rather than sampled
/// internally, so tests control snapshot timestamps exactly.
#[derive(Debug)]
pub struct Compactor<S> {
    store: Arc<S>,
    policy: CompactionPolicy,
}

impl<S> Clone for Compactor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy.clone(),
        }
    }
}

impl<S: FrameStore + PixelStore + SnapshotStore> Compactor<S> {
    pub fn new(store: Arc<S>, policy: CompactionPolicy) -> Self {
        Self { store, policy }
    }

    /// The policy this compactor decides with.
    #[must_use]
    pub const fn policy(&self) -> &CompactionPolicy {
        &self.policy
    }

    /// Encode the frame's entire placement log into a new snapshot stamped
    /// `now_us`.
    ///
    /// The log is fetched ordered oldest-to-newest, so the codec's
    /// last-write-wins rasterization resolves repeated coordinates to the
    /// most recent placement.
    ///
    /// # Errors
    ///
    /// [`StoreError::FrameNotFound`] if the frame does not exist; store
    /// fetch/persist and codec errors otherwise.
    pub fn create_snapshot(&self, frame_id: i64, now_us: i64) -> Result<Snapshot, CompactorError> {
        let frame = self.store.get_frame(frame_id)?;
        let pixels = self.store.all_pixels(frame_id)?;

        let blob = codec::encode(&pixels, frame.width, frame.height)?;
        let live_pixels = codec::live_pixel_count(&pixels, frame.width, frame.height);
        let ratio = codec::compression_ratio(blob.len(), frame.width, frame.height);

        let snapshot = self.store.insert_snapshot(NewSnapshot {
            frame_id,
            blob,
            live_pixels,
            created_at_us: now_us,
        })?;

        info!(
            frame_id,
            snapshot_id = snapshot.id,
            live_pixels,
            blob_bytes = snapshot.blob.len(),
            compression_ratio = format!("{ratio:.3}"),
            "snapshot created"
        );
        Ok(snapshot)
    }

    /// Reconstruct the inputs for a frame's current state.
    ///
    /// With a snapshot: `base_pixels` is the decoded blob (re-stamped with
    /// the frame id) and `recent_pixels` are the placements strictly after
    /// its creation time. Without one: empty base, full log as recent.
    ///
    /// # Errors
    ///
    /// [`StoreError::FrameNotFound`] if the frame does not exist; store and
    /// codec errors otherwise (including [`CodecError::DimensionMismatch`]
    /// if a stored blob disagrees with the frame's dimensions).
    pub fn load_frame_state(&self, frame_id: i64) -> Result<FrameState, CompactorError> {
        let frame = self.store.get_frame(frame_id)?;
        let snapshot = self.store.latest_snapshot(frame_id)?;

        let (base_pixels, recent_pixels) = match &snapshot {
            Some(snap) => {
                let mut base = codec::decode(&snap.blob, frame.width, frame.height)?;
                for pixel in &mut base {
                    pixel.frame_id = frame_id;
                }
                let recent = self.store.pixels_since(frame_id, snap.created_at_us)?;
                (base, recent)
            }
            None => (Vec::new(), self.store.all_pixels(frame_id)?),
        };

        Ok(FrameState {
            frame,
            snapshot,
            base_pixels,
            recent_pixels,
        })
    }

    /// Policy check: does this frame warrant a new snapshot right now?
    ///
    /// Without a snapshot, true once the total placement count reaches
    /// `min_pixels_for_first_snapshot`; with one, true once the count of
    /// placements strictly after it reaches `pixels_since_snapshot`.
    ///
    /// # Errors
    ///
    /// Store fetch errors.
    pub fn should_create_snapshot(&self, frame_id: i64) -> Result<bool, CompactorError> {
        match self.store.latest_snapshot(frame_id)? {
            None => {
                let total = self.store.count_pixels(frame_id)?;
                Ok(total >= self.policy.min_pixels_for_first_snapshot)
            }
            Some(snapshot) => {
                let recent = self
                    .store
                    .count_pixels_since(frame_id, snapshot.created_at_us)?;
                Ok(recent >= self.policy.pixels_since_snapshot)
            }
        }
    }

    /// Delete all but the newest `keep_count` snapshots for a frame,
    /// returning how many were removed.
    ///
    /// # Errors
    ///
    /// Store fetch/persist errors.
    pub fn cleanup_old_snapshots(
        &self,
        frame_id: i64,
        keep_count: usize,
    ) -> Result<usize, CompactorError> {
        let snapshots = self.store.list_snapshots(frame_id)?;
        if snapshots.len() <= keep_count {
            return Ok(0);
        }

        let doomed: Vec<i64> = snapshots[keep_count..].iter().map(|s| s.id).collect();
        let deleted = self.store.delete_snapshots(&doomed)?;
        info!(frame_id, deleted, kept = keep_count, "old snapshots removed");
        Ok(deleted)
    }

    /// Check the latest snapshot against an independent replay of the log.
    ///
    /// Decodes the blob and compares its live grid with one rebuilt from
    /// every placement at or before the snapshot's timestamp. Returns
    /// `None` when the frame has no snapshot to verify.
    ///
    /// # Errors
    ///
    /// Store and codec errors — a blob that fails to decode is how
    /// corruption surfaces here.
    pub fn verify_latest_snapshot(&self, frame_id: i64) -> Result<Option<bool>, CompactorError> {
        let frame = self.store.get_frame(frame_id)?;
        let Some(snapshot) = self.store.latest_snapshot(frame_id)? else {
            return Ok(None);
        };

        let decoded = codec::decode(&snapshot.blob, frame.width, frame.height)?;
        let actual: HashMap<(u16, u16), u32> =
            decoded.iter().map(|p| ((p.x, p.y), p.color)).collect();

        let mut expected: HashMap<(u16, u16), u32> = HashMap::new();
        for pixel in self.store.all_pixels(frame_id)? {
            if pixel.placed_at_us <= snapshot.created_at_us && frame.contains(pixel.x, pixel.y) {
                expected.insert((pixel.x, pixel.y), pixel.color);
            }
        }
        expected.retain(|_, color| !is_transparent(*color));

        Ok(Some(expected == actual))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::pixel::{COLOR_TRANSPARENT, argb};
    use crate::store::MemoryStore;

    fn compactor(policy: CompactionPolicy) -> (Arc<MemoryStore>, Compactor<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let compactor = Compactor::new(Arc::clone(&store), policy);
        (store, compactor)
    }

    fn opaque(n: u8) -> u32 {
        argb(0xFF, n, n, n)
    }

    // === create_snapshot ===================================================

    #[test]
    fn create_snapshot_missing_frame_is_not_found() {
        let (_store, compactor) = compactor(CompactionPolicy::default());
        assert_eq!(
            compactor.create_snapshot(42, 1_000),
            Err(CompactorError::Store(StoreError::FrameNotFound(42)))
        );
    }

    #[test]
    fn create_snapshot_encodes_live_set() {
        let (store, compactor) = compactor(CompactionPolicy::default());
        let frame = store.create_frame("f", 8, 8, 0);

        store.place_pixel(frame.id, 1, 1, opaque(1), "alice", 1_000).unwrap();
        store.place_pixel(frame.id, 2, 2, opaque(2), "bob", 2_000).unwrap();
        store.place_pixel(frame.id, 1, 1, opaque(3), "carol", 3_000).unwrap(); // overwrite

        let snapshot = compactor.create_snapshot(frame.id, 10_000).unwrap();
        assert_eq!(snapshot.frame_id, frame.id);
        assert_eq!(snapshot.live_pixels, 2);
        assert_eq!(snapshot.created_at_us, 10_000);

        let decoded = crate::codec::decode(&snapshot.blob, 8, 8).unwrap();
        let colors: HashMap<(u16, u16), u32> =
            decoded.iter().map(|p| ((p.x, p.y), p.color)).collect();
        assert_eq!(colors[&(1, 1)], opaque(3));
        assert_eq!(colors[&(2, 2)], opaque(2));
        assert_eq!(colors.len(), 2);
    }

    // === load_frame_state ==================================================

    #[test]
    fn load_without_snapshot_returns_full_log() {
        let (store, compactor) = compactor(CompactionPolicy::default());
        let frame = store.create_frame("f", 8, 8, 0);
        store.place_pixel(frame.id, 0, 0, opaque(1), "alice", 1_000).unwrap();
        store.place_pixel(frame.id, 1, 0, opaque(2), "bob", 2_000).unwrap();

        let state = compactor.load_frame_state(frame.id).unwrap();
        assert!(state.snapshot.is_none());
        assert!(state.base_pixels.is_empty());
        assert_eq!(state.recent_pixels.len(), 2);
        assert_eq!(state.live_pixel_count(), 2);
    }

    #[test]
    fn load_with_snapshot_splits_base_and_recent() {
        let (store, compactor) = compactor(CompactionPolicy::default());
        let frame = store.create_frame("f", 8, 8, 0);
        store.place_pixel(frame.id, 0, 0, opaque(1), "alice", 1_000).unwrap();
        compactor.create_snapshot(frame.id, 5_000).unwrap();
        store.place_pixel(frame.id, 1, 1, opaque(2), "bob", 6_000).unwrap();

        let state = compactor.load_frame_state(frame.id).unwrap();
        assert!(state.snapshot.is_some());
        assert_eq!(state.base_pixels.len(), 1);
        assert_eq!(state.base_pixels[0].frame_id, frame.id);
        assert_eq!(state.recent_pixels.len(), 1);
        assert_eq!(state.recent_pixels[0].color, opaque(2));
    }

    #[test]
    fn reconstruction_matches_full_replay() {
        let (store, compactor) = compactor(CompactionPolicy::default());
        let frame = store.create_frame("f", 16, 16, 0);

        // Placements at repeating coordinates, a snapshot mid-history, then
        // more placements including an overwrite and an erasure.
        let mut ts = 0;
        for i in 0..40u16 {
            ts += 1_000;
            store
                .place_pixel(frame.id, i % 7, i % 5, opaque(i as u8), "alice", ts)
                .unwrap();
        }
        compactor.create_snapshot(frame.id, ts).unwrap();
        for i in 40..60u16 {
            ts += 1_000;
            store
                .place_pixel(frame.id, i % 7, i % 5, opaque(i as u8), "bob", ts)
                .unwrap();
        }
        ts += 1_000;
        store.place_pixel(frame.id, 3, 3, COLOR_TRANSPARENT, "bob", ts).unwrap();

        // Reference: replay the entire log with last-write-wins.
        let mut replay: HashMap<(u16, u16), u32> = HashMap::new();
        for pixel in store.all_pixels(frame.id).unwrap() {
            replay.insert((pixel.x, pixel.y), pixel.color);
        }
        replay.retain(|_, color| !is_transparent(*color));

        let state = compactor.load_frame_state(frame.id).unwrap();
        assert!(state.snapshot.is_some());
        assert_eq!(state.live_grid(), replay);
    }

    #[test]
    fn load_surfaces_dimension_mismatch_from_stale_blob() {
        let (store, compactor) = compactor(CompactionPolicy::default());
        let frame = store.create_frame("f", 8, 8, 0);

        // A blob encoded for the wrong dimensions, as if the frame had been
        // resized out-of-band.
        let blob = crate::codec::encode(&[], 4, 4).unwrap();
        store
            .insert_snapshot(NewSnapshot {
                frame_id: frame.id,
                blob,
                live_pixels: 0,
                created_at_us: 1_000,
            })
            .unwrap();

        assert!(matches!(
            compactor.load_frame_state(frame.id),
            Err(CompactorError::Codec(CodecError::DimensionMismatch { .. }))
        ));
    }

    // === should_create_snapshot ============================================

    #[test]
    fn first_snapshot_threshold_boundary() {
        let policy = CompactionPolicy {
            min_pixels_for_first_snapshot: 5,
            ..CompactionPolicy::default()
        };
        let (store, compactor) = compactor(policy);
        let frame = store.create_frame("f", 8, 8, 0);

        for i in 0..4u16 {
            store
                .place_pixel(frame.id, i, 0, opaque(1), "alice", i64::from(i) * 1_000)
                .unwrap();
        }
        // threshold - 1 placements: not yet.
        assert!(!compactor.should_create_snapshot(frame.id).unwrap());

        store.place_pixel(frame.id, 4, 0, opaque(1), "alice", 9_000).unwrap();
        // exactly threshold placements: yes.
        assert!(compactor.should_create_snapshot(frame.id).unwrap());
    }

    #[test]
    fn recent_pixel_threshold_boundary() {
        let policy = CompactionPolicy {
            min_pixels_for_first_snapshot: 1,
            pixels_since_snapshot: 3,
            ..CompactionPolicy::default()
        };
        let (store, compactor) = compactor(policy);
        let frame = store.create_frame("f", 8, 8, 0);

        store.place_pixel(frame.id, 0, 0, opaque(1), "alice", 1_000).unwrap();
        compactor.create_snapshot(frame.id, 2_000).unwrap();

        store.place_pixel(frame.id, 1, 0, opaque(1), "alice", 3_000).unwrap();
        store.place_pixel(frame.id, 2, 0, opaque(1), "alice", 4_000).unwrap();
        assert!(!compactor.should_create_snapshot(frame.id).unwrap());

        store.place_pixel(frame.id, 3, 0, opaque(1), "alice", 5_000).unwrap();
        assert!(compactor.should_create_snapshot(frame.id).unwrap());
    }

    #[test]
    fn default_policy_constants() {
        let policy = CompactionPolicy::default();
        assert_eq!(policy.min_pixels_for_first_snapshot, 100);
        assert_eq!(policy.pixels_since_snapshot, 1000);
        assert_eq!(policy.keep_snapshots, 3);
    }

    // === cleanup_old_snapshots =============================================

    #[test]
    fn cleanup_deletes_oldest_beyond_keep_count() {
        let (store, compactor) = compactor(CompactionPolicy::default());
        let frame = store.create_frame("f", 8, 8, 0);

        for ts in [1_000, 2_000, 3_000, 4_000, 5_000] {
            compactor.create_snapshot(frame.id, ts).unwrap();
        }

        let deleted = compactor.cleanup_old_snapshots(frame.id, 3).unwrap();
        assert_eq!(deleted, 2);

        let remaining = store.list_snapshots(frame.id).unwrap();
        let times: Vec<i64> = remaining.iter().map(|s| s.created_at_us).collect();
        assert_eq!(times, vec![5_000, 4_000, 3_000]);
    }

    #[test]
    fn cleanup_with_enough_room_deletes_nothing() {
        let (store, compactor) = compactor(CompactionPolicy::default());
        let frame = store.create_frame("f", 8, 8, 0);
        compactor.create_snapshot(frame.id, 1_000).unwrap();

        assert_eq!(compactor.cleanup_old_snapshots(frame.id, 3).unwrap(), 0);
        assert_eq!(store.list_snapshots(frame.id).unwrap().len(), 1);
    }

    // === verify_latest_snapshot ============================================

    #[test]
    fn verify_passes_on_intact_snapshot() {
        let (store, compactor) = compactor(CompactionPolicy::default());
        let frame = store.create_frame("f", 8, 8, 0);
        store.place_pixel(frame.id, 1, 2, opaque(9), "alice", 1_000).unwrap();
        compactor.create_snapshot(frame.id, 2_000).unwrap();

        assert_eq!(compactor.verify_latest_snapshot(frame.id).unwrap(), Some(true));
    }

    #[test]
    fn verify_without_snapshot_is_none() {
        let (store, compactor) = compactor(CompactionPolicy::default());
        let frame = store.create_frame("f", 8, 8, 0);
        assert_eq!(compactor.verify_latest_snapshot(frame.id).unwrap(), None);
    }

    #[test]
    fn verify_surfaces_corrupt_blob() {
        let (store, compactor) = compactor(CompactionPolicy::default());
        let frame = store.create_frame("f", 8, 8, 0);
        store
            .insert_snapshot(NewSnapshot {
                frame_id: frame.id,
                blob: vec![0xDE, 0xAD, 0xBE, 0xEF],
                live_pixels: 0,
                created_at_us: 1_000,
            })
            .unwrap();

        assert!(matches!(
            compactor.verify_latest_snapshot(frame.id),
            Err(CompactorError::Codec(_))
        ));
    }
}
