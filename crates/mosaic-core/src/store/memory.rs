//! In-memory store for tests, simulation, and examples.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::model::{Frame, NewSnapshot, Pixel, Snapshot};

use super::{FrameStore, PixelStore, SnapshotStore, StoreError};

/// Mutex-guarded in-memory implementation of all three store traits.
///
/// Pixel and snapshot ids are assigned from per-table counters. The pixel
/// log is kept in insertion order, which doubles as placement-time order as
/// long as callers pass non-decreasing timestamps (the write helpers do not
/// reorder).
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    frames: BTreeMap<i64, Frame>,
    pixels: Vec<Pixel>,
    snapshots: Vec<Snapshot>,
    next_frame_id: i64,
    next_pixel_id: i64,
    next_snapshot_id: i64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a frame and return its record.
    pub fn create_frame(&self, name: &str, width: u16, height: u16, now_us: i64) -> Frame {
        let mut inner = self.lock();
        inner.next_frame_id += 1;
        let frame = Frame {
            id: inner.next_frame_id,
            name: name.to_string(),
            width,
            height,
            frozen: false,
            created_at_us: now_us,
        };
        inner.frames.insert(frame.id, frame.clone());
        frame
    }

    /// Append a placement to the log.
    ///
    /// # Errors
    ///
    /// [`StoreError::FrameNotFound`] if the frame does not exist;
    /// [`StoreError::Persist`] if the coordinates fall outside the frame.
    pub fn place_pixel(
        &self,
        frame_id: i64,
        x: u16,
        y: u16,
        color: u32,
        placed_by: &str,
        now_us: i64,
    ) -> Result<Pixel, StoreError> {
        let mut inner = self.lock();
        let frame = inner
            .frames
            .get(&frame_id)
            .ok_or(StoreError::FrameNotFound(frame_id))?;
        if !frame.contains(x, y) {
            return Err(StoreError::Persist(format!(
                "pixel ({x}, {y}) outside {}x{} frame {frame_id}",
                frame.width, frame.height
            )));
        }
        inner.next_pixel_id += 1;
        let pixel = Pixel {
            id: inner.next_pixel_id,
            frame_id,
            x,
            y,
            color,
            placed_by: placed_by.to_string(),
            placed_at_us: now_us,
        };
        inner.pixels.push(pixel.clone());
        Ok(pixel)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }
}

impl FrameStore for MemoryStore {
    fn get_frame(&self, frame_id: i64) -> Result<Frame, StoreError> {
        self.lock()
            .frames
            .get(&frame_id)
            .cloned()
            .ok_or(StoreError::FrameNotFound(frame_id))
    }
}

impl PixelStore for MemoryStore {
    fn all_pixels(&self, frame_id: i64) -> Result<Vec<Pixel>, StoreError> {
        Ok(self
            .lock()
            .pixels
            .iter()
            .filter(|p| p.frame_id == frame_id)
            .cloned()
            .collect())
    }

    fn pixels_since(&self, frame_id: i64, since_us: i64) -> Result<Vec<Pixel>, StoreError> {
        Ok(self
            .lock()
            .pixels
            .iter()
            .filter(|p| p.frame_id == frame_id && p.placed_at_us > since_us)
            .cloned()
            .collect())
    }

    fn count_pixels(&self, frame_id: i64) -> Result<u64, StoreError> {
        let count = self
            .lock()
            .pixels
            .iter()
            .filter(|p| p.frame_id == frame_id)
            .count();
        Ok(count as u64)
    }

    fn count_pixels_since(&self, frame_id: i64, since_us: i64) -> Result<u64, StoreError> {
        let count = self
            .lock()
            .pixels
            .iter()
            .filter(|p| p.frame_id == frame_id && p.placed_at_us > since_us)
            .count();
        Ok(count as u64)
    }
}

impl SnapshotStore for MemoryStore {
    fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Snapshot, StoreError> {
        let mut inner = self.lock();
        inner.next_snapshot_id += 1;
        let record = snapshot.with_id(inner.next_snapshot_id);
        inner.snapshots.push(record.clone());
        Ok(record)
    }

    fn latest_snapshot(&self, frame_id: i64) -> Result<Option<Snapshot>, StoreError> {
        Ok(self
            .lock()
            .snapshots
            .iter()
            .filter(|s| s.frame_id == frame_id)
            .max_by_key(|s| (s.created_at_us, s.id))
            .cloned())
    }

    fn list_snapshots(&self, frame_id: i64) -> Result<Vec<Snapshot>, StoreError> {
        let mut snapshots: Vec<Snapshot> = self
            .lock()
            .snapshots
            .iter()
            .filter(|s| s.frame_id == frame_id)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| std::cmp::Reverse((s.created_at_us, s.id)));
        Ok(snapshots)
    }

    fn delete_snapshots(&self, ids: &[i64]) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        let before = inner.snapshots.len();
        inner.snapshots.retain(|s| !ids.contains(&s.id));
        Ok(before - inner.snapshots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_frame_missing_is_not_found() {
        let store = MemoryStore::new();
        assert_eq!(store.get_frame(42), Err(StoreError::FrameNotFound(42)));
    }

    #[test]
    fn place_pixel_enforces_frame_bounds() {
        let store = MemoryStore::new();
        let frame = store.create_frame("small", 4, 4, 1_000);

        assert!(store.place_pixel(frame.id, 3, 3, 0xFF00_0000, "alice", 2_000).is_ok());
        assert!(matches!(
            store.place_pixel(frame.id, 4, 0, 0xFF00_0000, "alice", 3_000),
            Err(StoreError::Persist(_))
        ));
        assert_eq!(
            store.place_pixel(99, 0, 0, 0xFF00_0000, "alice", 4_000),
            Err(StoreError::FrameNotFound(99))
        );
    }

    #[test]
    fn pixel_queries_filter_by_frame_and_time() {
        let store = MemoryStore::new();
        let a = store.create_frame("a", 8, 8, 0);
        let b = store.create_frame("b", 8, 8, 0);

        store.place_pixel(a.id, 0, 0, 0xFF00_0001, "alice", 1_000).unwrap();
        store.place_pixel(a.id, 1, 0, 0xFF00_0002, "bob", 2_000).unwrap();
        store.place_pixel(b.id, 2, 0, 0xFF00_0003, "carol", 3_000).unwrap();

        assert_eq!(store.count_pixels(a.id).unwrap(), 2);
        assert_eq!(store.count_pixels(b.id).unwrap(), 1);

        // Strictly-greater cut: the pixel at exactly 1_000 is excluded.
        let since = store.pixels_since(a.id, 1_000).unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].color, 0xFF00_0002);
        assert_eq!(store.count_pixels_since(a.id, 1_000).unwrap(), 1);
    }

    #[test]
    fn snapshots_list_newest_first_and_latest_picks_max() {
        let store = MemoryStore::new();
        let frame = store.create_frame("f", 8, 8, 0);

        for ts in [1_000, 3_000, 2_000] {
            store
                .insert_snapshot(NewSnapshot {
                    frame_id: frame.id,
                    blob: vec![],
                    live_pixels: 0,
                    created_at_us: ts,
                })
                .unwrap();
        }

        let latest = store.latest_snapshot(frame.id).unwrap().unwrap();
        assert_eq!(latest.created_at_us, 3_000);

        let listed = store.list_snapshots(frame.id).unwrap();
        let times: Vec<i64> = listed.iter().map(|s| s.created_at_us).collect();
        assert_eq!(times, vec![3_000, 2_000, 1_000]);
    }

    #[test]
    fn delete_snapshots_returns_removed_count() {
        let store = MemoryStore::new();
        let frame = store.create_frame("f", 8, 8, 0);
        let ids: Vec<i64> = (0..3)
            .map(|i| {
                store
                    .insert_snapshot(NewSnapshot {
                        frame_id: frame.id,
                        blob: vec![],
                        live_pixels: 0,
                        created_at_us: i * 1_000,
                    })
                    .unwrap()
                    .id
            })
            .collect();

        assert_eq!(store.delete_snapshots(&ids[..2]).unwrap(), 2);
        assert_eq!(store.list_snapshots(frame.id).unwrap().len(), 1);
        // Deleting already-deleted ids removes nothing.
        assert_eq!(store.delete_snapshots(&ids[..2]).unwrap(), 0);
    }
}
