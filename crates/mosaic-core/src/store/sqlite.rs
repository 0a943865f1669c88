//! SQLite-backed store.
//!
//! Runtime defaults are intentionally conservative:
//! - `journal_mode = WAL` to allow concurrent readers while writers append
//! - `busy_timeout = 5s` to reduce transient lock failures under contention
//! - `foreign_keys = ON` to protect relational integrity

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::model::{Frame, NewSnapshot, Pixel, Snapshot};

use super::{FrameStore, PixelStore, SnapshotStore, StoreError, migrations};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite implementation of the frame, pixel, and snapshot stores.
///
/// The connection is Mutex-guarded so the store can sit behind an `Arc`
/// shared between the placement path and the scheduler's worker thread.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store database at `path`, apply runtime pragmas,
    /// and migrate the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if opening/configuring/migrating the database fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("open store database {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Open a fresh in-memory store, mostly useful in tests.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration or migration fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory store database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        configure_connection(&conn).context("configure sqlite pragmas")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a frame and return its record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Persist`] on write failure.
    pub fn create_frame(
        &self,
        name: &str,
        width: u16,
        height: u16,
        now_us: i64,
    ) -> Result<Frame, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO frames (name, width, height, frozen, created_at_us)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![name, width, height, now_us],
        )
        .map_err(persist_err)?;
        Ok(Frame {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            width,
            height,
            frozen: false,
            created_at_us: now_us,
        })
    }

    /// Append a placement to the log.
    ///
    /// # Errors
    ///
    /// [`StoreError::FrameNotFound`] if the frame does not exist;
    /// [`StoreError::Persist`] if the coordinates fall outside the frame or
    /// the write fails.
    pub fn place_pixel(
        &self,
        frame_id: i64,
        x: u16,
        y: u16,
        color: u32,
        placed_by: &str,
        now_us: i64,
    ) -> Result<Pixel, StoreError> {
        let frame = self.get_frame(frame_id)?;
        if !frame.contains(x, y) {
            return Err(StoreError::Persist(format!(
                "pixel ({x}, {y}) outside {}x{} frame {frame_id}",
                frame.width, frame.height
            )));
        }

        let conn = self.lock();
        conn.execute(
            "INSERT INTO pixels (frame_id, x, y, color, placed_by, placed_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![frame_id, x, y, color, placed_by, now_us],
        )
        .map_err(persist_err)?;
        Ok(Pixel {
            id: conn.last_insert_rowid(),
            frame_id,
            x,
            y,
            color,
            placed_by: placed_by.to_string(),
            placed_at_us: now_us,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite store mutex poisoned")
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn fetch_err(error: rusqlite::Error) -> StoreError {
    StoreError::Fetch(error.to_string())
}

fn persist_err(error: rusqlite::Error) -> StoreError {
    StoreError::Persist(error.to_string())
}

fn pixel_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pixel> {
    Ok(Pixel {
        id: row.get(0)?,
        frame_id: row.get(1)?,
        x: row.get(2)?,
        y: row.get(3)?,
        color: row.get(4)?,
        placed_by: row.get(5)?,
        placed_at_us: row.get(6)?,
    })
}

fn snapshot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        frame_id: row.get(1)?,
        blob: row.get(2)?,
        live_pixels: row.get(3)?,
        created_at_us: row.get(4)?,
    })
}

const PIXEL_COLUMNS: &str = "pixel_id, frame_id, x, y, color, placed_by, placed_at_us";
const SNAPSHOT_COLUMNS: &str = "snapshot_id, frame_id, blob, live_pixels, created_at_us";

impl FrameStore for SqliteStore {
    fn get_frame(&self, frame_id: i64) -> Result<Frame, StoreError> {
        self.lock()
            .query_row(
                "SELECT frame_id, name, width, height, frozen, created_at_us
                 FROM frames WHERE frame_id = ?1",
                [frame_id],
                |row| {
                    Ok(Frame {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        width: row.get(2)?,
                        height: row.get(3)?,
                        frozen: row.get::<_, i64>(4)? != 0,
                        created_at_us: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(fetch_err)?
            .ok_or(StoreError::FrameNotFound(frame_id))
    }
}

impl PixelStore for SqliteStore {
    fn all_pixels(&self, frame_id: i64) -> Result<Vec<Pixel>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PIXEL_COLUMNS} FROM pixels
                 WHERE frame_id = ?1 ORDER BY placed_at_us ASC, pixel_id ASC"
            ))
            .map_err(fetch_err)?;
        let rows = stmt
            .query_map([frame_id], pixel_from_row)
            .map_err(fetch_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(fetch_err)
    }

    fn pixels_since(&self, frame_id: i64, since_us: i64) -> Result<Vec<Pixel>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PIXEL_COLUMNS} FROM pixels
                 WHERE frame_id = ?1 AND placed_at_us > ?2
                 ORDER BY placed_at_us ASC, pixel_id ASC"
            ))
            .map_err(fetch_err)?;
        let rows = stmt
            .query_map(params![frame_id, since_us], pixel_from_row)
            .map_err(fetch_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(fetch_err)
    }

    fn count_pixels(&self, frame_id: i64) -> Result<u64, StoreError> {
        self.lock()
            .query_row(
                "SELECT COUNT(*) FROM pixels WHERE frame_id = ?1",
                [frame_id],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| u64::try_from(count).unwrap_or(0))
            .map_err(fetch_err)
    }

    fn count_pixels_since(&self, frame_id: i64, since_us: i64) -> Result<u64, StoreError> {
        self.lock()
            .query_row(
                "SELECT COUNT(*) FROM pixels WHERE frame_id = ?1 AND placed_at_us > ?2",
                params![frame_id, since_us],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| u64::try_from(count).unwrap_or(0))
            .map_err(fetch_err)
    }
}

impl SnapshotStore for SqliteStore {
    fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Snapshot, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO snapshots (frame_id, blob, live_pixels, created_at_us)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot.frame_id,
                snapshot.blob,
                snapshot.live_pixels,
                snapshot.created_at_us
            ],
        )
        .map_err(persist_err)?;
        let id = conn.last_insert_rowid();
        Ok(snapshot.with_id(id))
    }

    fn latest_snapshot(&self, frame_id: i64) -> Result<Option<Snapshot>, StoreError> {
        self.lock()
            .query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                     WHERE frame_id = ?1
                     ORDER BY created_at_us DESC, snapshot_id DESC LIMIT 1"
                ),
                [frame_id],
                snapshot_from_row,
            )
            .optional()
            .map_err(fetch_err)
    }

    fn list_snapshots(&self, frame_id: i64) -> Result<Vec<Snapshot>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                 WHERE frame_id = ?1
                 ORDER BY created_at_us DESC, snapshot_id DESC"
            ))
            .map_err(fetch_err)?;
        let rows = stmt
            .query_map([frame_id], snapshot_from_row)
            .map_err(fetch_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(fetch_err)
    }

    fn delete_snapshots(&self, ids: &[i64]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM snapshots WHERE snapshot_id IN ({placeholders})");
        self.lock()
            .execute(&sql, params_from_iter(ids.iter()))
            .map_err(persist_err)
    }
}
