use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;

use mosaic_core::clock;
use mosaic_core::codec;
use mosaic_core::compactor::Compactor;
use mosaic_core::store::{FrameStore, SqliteStore};

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct CompactArgs {
    /// Frame identifier.
    pub frame_id: i64,
}

#[derive(Serialize)]
struct CompactResult {
    snapshot_id: i64,
    frame_id: i64,
    live_pixels: u32,
    blob_bytes: usize,
    compression_ratio: f64,
}

/// Execute `mosaic compact`: build a snapshot from the full log now,
/// bypassing the policy check.
///
/// # Errors
///
/// Returns an error if the frame is missing or a store/codec call fails.
pub fn run_compact(
    store: &SqliteStore,
    compactor: &Compactor<SqliteStore>,
    args: &CompactArgs,
    mode: OutputMode,
) -> Result<()> {
    let frame = store.get_frame(args.frame_id)?;
    let snapshot = compactor.create_snapshot(args.frame_id, clock::now_us())?;
    let ratio = codec::compression_ratio(snapshot.blob.len(), frame.width, frame.height);

    render(
        mode,
        &CompactResult {
            snapshot_id: snapshot.id,
            frame_id: snapshot.frame_id,
            live_pixels: snapshot.live_pixels,
            blob_bytes: snapshot.blob.len(),
            compression_ratio: ratio,
        },
        |r| {
            format!(
                "snapshot {} for frame {}: {} live pixels, {} bytes ({:.1}% saved)",
                r.snapshot_id,
                r.frame_id,
                r.live_pixels,
                r.blob_bytes,
                r.compression_ratio * 100.0
            )
        },
    )
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Frame identifier.
    pub frame_id: i64,

    /// How many recent snapshots to retain.
    #[arg(long, default_value_t = 3)]
    pub keep: usize,
}

#[derive(Serialize)]
struct CleanupResult {
    frame_id: i64,
    deleted: usize,
    kept: usize,
}

/// Execute `mosaic cleanup`.
///
/// # Errors
///
/// Returns an error if a store call fails.
pub fn run_cleanup(
    compactor: &Compactor<SqliteStore>,
    args: &CleanupArgs,
    mode: OutputMode,
) -> Result<()> {
    let deleted = compactor.cleanup_old_snapshots(args.frame_id, args.keep)?;
    render(
        mode,
        &CleanupResult {
            frame_id: args.frame_id,
            deleted,
            kept: args.keep,
        },
        |r| format!("deleted {} old snapshots for frame {} (keeping {})", r.deleted, r.frame_id, r.kept),
    )
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Frame identifier.
    pub frame_id: i64,
}

#[derive(Serialize)]
struct VerifyResult {
    frame_id: i64,
    verdict: &'static str,
}

/// Execute `mosaic verify`: decode the latest snapshot and compare it with
/// an independent replay of the log up to the snapshot's timestamp.
///
/// # Errors
///
/// Returns an error if the snapshot diverges from the replay, fails to
/// decode, or a store call fails.
pub fn run_verify(
    compactor: &Compactor<SqliteStore>,
    args: &VerifyArgs,
    mode: OutputMode,
) -> Result<()> {
    let verdict = match compactor.verify_latest_snapshot(args.frame_id)? {
        None => "no-snapshot",
        Some(true) => "ok",
        Some(false) => {
            bail!(
                "snapshot for frame {} diverges from log replay; delete it and recompact",
                args.frame_id
            );
        }
    };

    render(
        mode,
        &VerifyResult {
            frame_id: args.frame_id,
            verdict,
        },
        |r| match r.verdict {
            "no-snapshot" => format!("frame {} has no snapshot to verify", r.frame_id),
            _ => format!("snapshot for frame {} matches log replay", r.frame_id),
        },
    )
}
