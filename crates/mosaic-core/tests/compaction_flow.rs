//! End-to-end compaction flow: placements run through the trigger and
//! scheduler into snapshots, and reconstruction matches a full log replay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mosaic_core::clock;
use mosaic_core::codec;
use mosaic_core::compactor::{CompactionPolicy, Compactor};
use mosaic_core::model::pixel::{argb, is_transparent};
use mosaic_core::scheduler::{JobScheduler, SchedulerConfig};
use mosaic_core::store::{MemoryStore, PixelStore, SnapshotStore, SqliteStore};
use mosaic_core::trigger::{CompactionExecutor, PlacementTrigger};

fn fast_scheduler() -> SchedulerConfig {
    SchedulerConfig {
        tick_interval: Duration::from_millis(10),
        max_attempts: 3,
    }
}

/// Last-write-wins replay of a full pixel log, the reference every
/// reconstruction must match.
fn replay_grid(pixels: &[mosaic_core::model::Pixel]) -> HashMap<(u16, u16), u32> {
    let mut grid = HashMap::new();
    for pixel in pixels {
        grid.insert((pixel.x, pixel.y), pixel.color);
    }
    grid.retain(|_, color| !is_transparent(*color));
    grid
}

#[test]
fn placements_trigger_snapshot_and_reconstruction_matches_replay() {
    let store = Arc::new(MemoryStore::new());
    let policy = CompactionPolicy {
        min_pixels_for_first_snapshot: 50,
        pixels_since_snapshot: 1000,
        keep_snapshots: 3,
    };
    let compactor = Compactor::new(Arc::clone(&store), policy);
    let scheduler = Arc::new(JobScheduler::new(
        Arc::new(CompactionExecutor::new(compactor.clone())),
        fast_scheduler(),
    ));
    let trigger = PlacementTrigger::new(compactor.clone(), Arc::clone(&scheduler));

    let frame = store.create_frame("plaza", 32, 32, clock::now_us());

    // Enough placements (with coordinate collisions) to cross the policy
    // threshold; the trigger enqueues compaction along the way.
    for i in 0..75u16 {
        store
            .place_pixel(
                frame.id,
                i % 10,
                i / 10 % 10,
                argb(0xFF, (i % 251) as u8, 0x40, 0x80),
                "alice",
                clock::now_us(),
            )
            .expect("place pixel");
        trigger.pixel_placed(frame.id);
    }
    scheduler.drain();

    let snapshot = store
        .latest_snapshot(frame.id)
        .expect("fetch latest")
        .expect("threshold crossed, snapshot must exist");
    assert!(snapshot.live_pixels > 0);

    // More placements after the snapshot, including overwrites.
    for i in 0..20u16 {
        store
            .place_pixel(
                frame.id,
                i % 10,
                0,
                argb(0xFF, 0x00, (i % 251) as u8, 0xFF),
                "bob",
                clock::now_us(),
            )
            .expect("place pixel");
    }

    let state = compactor.load_frame_state(frame.id).expect("load state");
    assert!(state.snapshot.is_some());
    assert!(!state.recent_pixels.is_empty());

    let full_log = store.all_pixels(frame.id).expect("full log");
    assert_eq!(state.live_grid(), replay_grid(&full_log));
}

#[test]
fn four_corner_frame_compresses_and_reconstructs_exactly() {
    let store = Arc::new(MemoryStore::new());
    let compactor = Compactor::new(Arc::clone(&store), CompactionPolicy::default());

    let frame = store.create_frame("corners", 64, 64, 1_000);
    let corners = [
        (0u16, 0u16, argb(0xFF, 0xFF, 0x00, 0x00)),
        (63, 0, argb(0xFF, 0x00, 0xFF, 0x00)),
        (0, 63, argb(0xFF, 0x00, 0x00, 0xFF)),
        (63, 63, argb(0xFF, 0xFF, 0xFF, 0x00)),
    ];
    for (i, &(x, y, color)) in corners.iter().enumerate() {
        store
            .place_pixel(frame.id, x, y, color, "alice", (i as i64 + 1) * 1_000)
            .expect("place pixel");
    }

    let snapshot = compactor
        .create_snapshot(frame.id, 10_000)
        .expect("create snapshot");
    assert_eq!(snapshot.live_pixels, 4);

    // Better than 50% saved relative to the 64x64x4-byte raw grid.
    let ratio = codec::compression_ratio(snapshot.blob.len(), 64, 64);
    assert!(ratio > 0.5, "expected >50% saved, got {ratio}");

    let state = compactor.load_frame_state(frame.id).expect("load state");
    let grid = state.live_grid();
    assert_eq!(grid.len(), 4);
    for &(x, y, color) in &corners {
        assert_eq!(grid.get(&(x, y)), Some(&color), "corner ({x}, {y})");
    }
}

#[test]
fn sqlite_store_carries_the_full_flow() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store =
        Arc::new(SqliteStore::open(&dir.path().join("mosaic.sqlite3")).expect("open store"));
    let policy = CompactionPolicy {
        min_pixels_for_first_snapshot: 20,
        pixels_since_snapshot: 1000,
        keep_snapshots: 2,
    };
    let compactor = Compactor::new(Arc::clone(&store), policy);
    let scheduler = Arc::new(JobScheduler::new(
        Arc::new(CompactionExecutor::new(compactor.clone())),
        fast_scheduler(),
    ));
    let trigger = PlacementTrigger::new(compactor.clone(), Arc::clone(&scheduler));

    let frame = store.create_frame("persisted", 16, 16, clock::now_us()).expect("create frame");
    for i in 0..25u16 {
        store
            .place_pixel(
                frame.id,
                i % 16,
                i / 16,
                argb(0xFF, 0x10, 0x20, (i % 251) as u8),
                "carol",
                clock::now_us(),
            )
            .expect("place pixel");
        trigger.pixel_placed(frame.id);
    }
    scheduler.drain();

    let snapshot = store
        .latest_snapshot(frame.id)
        .expect("fetch latest")
        .expect("snapshot must exist");
    assert!(snapshot.live_pixels > 0);

    assert_eq!(
        compactor
            .verify_latest_snapshot(frame.id)
            .expect("verify snapshot"),
        Some(true)
    );

    let state = compactor.load_frame_state(frame.id).expect("load state");
    let full_log = store.all_pixels(frame.id).expect("full log");
    assert_eq!(state.live_grid(), replay_grid(&full_log));
}
