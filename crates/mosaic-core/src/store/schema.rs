//! Canonical SQLite schema for the mosaic stores.
//!
//! The schema is normalized around the append-only placement log:
//! - `frames` holds canvas metadata (dimensions fixed for life)
//! - `pixels` is the append-only placement log; rows are never updated
//! - `snapshots` holds immutable compaction checkpoints

/// Migration v1: frames, pixel log, and snapshot tables.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS frames (
    frame_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    width INTEGER NOT NULL CHECK (width BETWEEN 0 AND 65535),
    height INTEGER NOT NULL CHECK (height BETWEEN 0 AND 65535),
    frozen INTEGER NOT NULL DEFAULT 0 CHECK (frozen IN (0, 1)),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS pixels (
    pixel_id INTEGER PRIMARY KEY AUTOINCREMENT,
    frame_id INTEGER NOT NULL REFERENCES frames(frame_id) ON DELETE CASCADE,
    x INTEGER NOT NULL CHECK (x >= 0),
    y INTEGER NOT NULL CHECK (y >= 0),
    color INTEGER NOT NULL CHECK (color BETWEEN 0 AND 4294967295),
    placed_by TEXT NOT NULL,
    placed_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id INTEGER PRIMARY KEY AUTOINCREMENT,
    frame_id INTEGER NOT NULL REFERENCES frames(frame_id) ON DELETE CASCADE,
    blob BLOB NOT NULL,
    live_pixels INTEGER NOT NULL CHECK (live_pixels >= 0),
    created_at_us INTEGER NOT NULL
);
";

/// Migration v2: read-path indexes for reconstruction queries.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_pixels_frame_placed
    ON pixels(frame_id, placed_at_us, pixel_id);

CREATE INDEX IF NOT EXISTS idx_snapshots_frame_created
    ON snapshots(frame_id, created_at_us DESC);
";
