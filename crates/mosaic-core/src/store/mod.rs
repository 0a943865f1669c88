//! Durable-store boundary.
//!
//! The compaction core consumes the persistent pixel log, frame metadata,
//! and snapshot records through the traits below; the stores themselves are
//! external collaborators. Two implementations ship with the crate:
//!
//! - [`MemoryStore`] — Mutex-guarded, for tests, simulation, and examples.
//! - [`SqliteStore`] — rusqlite-backed (WAL, busy timeout, migrations),
//!   used by the CLI and integration tests.
//!
//! All trait methods take `&self` so a store can be shared behind an `Arc`
//! between the placement path and the scheduler's worker thread.

pub mod memory;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::ErrorCode;
use crate::model::{Frame, NewSnapshot, Pixel, Snapshot};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced by durable-store operations.
///
/// The core performs no retries on these; retry policy lives in the job
/// scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The frame does not exist.
    #[error("frame {0} not found")]
    FrameNotFound(i64),

    /// A read from the durable store failed.
    #[error("store read failed: {0}")]
    Fetch(String),

    /// A write to the durable store failed.
    #[error("store write failed: {0}")]
    Persist(String),
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::FrameNotFound(_) => ErrorCode::FrameNotFound,
            Self::Fetch(_) => ErrorCode::StoreFetchFailed,
            Self::Persist(_) => ErrorCode::StorePersistFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// Store traits
// ---------------------------------------------------------------------------

/// Frame metadata reads.
pub trait FrameStore: Send + Sync {
    /// Fetch a frame's metadata.
    ///
    /// # Errors
    ///
    /// [`StoreError::FrameNotFound`] if the frame does not exist,
    /// [`StoreError::Fetch`] on I/O failure.
    fn get_frame(&self, frame_id: i64) -> Result<Frame, StoreError>;
}

/// Append-only pixel log reads.
///
/// All list results are ordered by placement time ascending (ties broken by
/// insertion id), which is the precedence order the codec relies on.
pub trait PixelStore: Send + Sync {
    /// The entire placement log for a frame.
    ///
    /// # Errors
    ///
    /// [`StoreError::Fetch`] on I/O failure.
    fn all_pixels(&self, frame_id: i64) -> Result<Vec<Pixel>, StoreError>;

    /// Placements with timestamp strictly greater than `since_us`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Fetch`] on I/O failure.
    fn pixels_since(&self, frame_id: i64, since_us: i64) -> Result<Vec<Pixel>, StoreError>;

    /// Total placement count for a frame.
    ///
    /// # Errors
    ///
    /// [`StoreError::Fetch`] on I/O failure.
    fn count_pixels(&self, frame_id: i64) -> Result<u64, StoreError>;

    /// Count of placements with timestamp strictly greater than `since_us`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Fetch`] on I/O failure.
    fn count_pixels_since(&self, frame_id: i64, since_us: i64) -> Result<u64, StoreError>;
}

/// Snapshot record reads and writes.
pub trait SnapshotStore: Send + Sync {
    /// Persist a new snapshot, returning the record with its assigned id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Persist`] on I/O failure.
    fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Snapshot, StoreError>;

    /// The most recent snapshot for a frame, or `None` if none exists.
    ///
    /// # Errors
    ///
    /// [`StoreError::Fetch`] on I/O failure.
    fn latest_snapshot(&self, frame_id: i64) -> Result<Option<Snapshot>, StoreError>;

    /// All snapshots for a frame, newest first.
    ///
    /// # Errors
    ///
    /// [`StoreError::Fetch`] on I/O failure.
    fn list_snapshots(&self, frame_id: i64) -> Result<Vec<Snapshot>, StoreError>;

    /// Delete snapshots by id, returning how many rows were removed.
    ///
    /// # Errors
    ///
    /// [`StoreError::Persist`] on I/O failure.
    fn delete_snapshots(&self, ids: &[i64]) -> Result<usize, StoreError>;
}
