use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;

use mosaic_core::clock;
use mosaic_core::compactor::Compactor;
use mosaic_core::model::pixel::ALPHA_OPAQUE;
use mosaic_core::scheduler::{JobScheduler, SchedulerConfig};
use mosaic_core::store::SqliteStore;
use mosaic_core::trigger::{CompactionExecutor, PlacementTrigger};

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct PlaceArgs {
    /// Frame identifier.
    pub frame_id: i64,

    /// Column within the frame.
    pub x: u16,

    /// Row within the frame.
    pub y: u16,

    /// Color as `#RRGGBB` (opaque) or `#AARRGGBB`.
    pub color: String,

    /// Contributor handle recorded with the placement.
    #[arg(long, default_value = "anonymous")]
    pub user: String,
}

#[derive(Serialize)]
struct PlacedPixel {
    pixel_id: i64,
    frame_id: i64,
    x: u16,
    y: u16,
    color: u32,
    queued_jobs: usize,
}

/// Execute `mosaic place`: append a placement, run the compaction trigger,
/// and drain any deferred work before this one-shot process exits.
///
/// The placement itself succeeds or fails on the log write alone; trigger
/// errors are swallowed inside [`PlacementTrigger::pixel_placed`].
///
/// # Errors
///
/// Returns an error if the color string is malformed or the log write fails.
pub fn run_place(
    store: &Arc<SqliteStore>,
    compactor: &Compactor<SqliteStore>,
    scheduler_config: &SchedulerConfig,
    args: &PlaceArgs,
    mode: OutputMode,
) -> Result<()> {
    let color = parse_color(&args.color)?;
    let pixel = store.place_pixel(
        args.frame_id,
        args.x,
        args.y,
        color,
        &args.user,
        clock::now_us(),
    )?;

    let scheduler = Arc::new(JobScheduler::new(
        Arc::new(CompactionExecutor::new(compactor.clone())),
        scheduler_config.clone(),
    ));
    let trigger = PlacementTrigger::new(compactor.clone(), Arc::clone(&scheduler));
    trigger.pixel_placed(args.frame_id);

    let queued_jobs = scheduler.status().queued;
    scheduler.drain();

    render(
        mode,
        &PlacedPixel {
            pixel_id: pixel.id,
            frame_id: pixel.frame_id,
            x: pixel.x,
            y: pixel.y,
            color,
            queued_jobs,
        },
        |p| {
            format!(
                "placed pixel {} at ({}, {}) in frame {}{}",
                p.pixel_id,
                p.x,
                p.y,
                p.frame_id,
                if p.queued_jobs > 0 {
                    " (snapshot compaction ran)"
                } else {
                    ""
                }
            )
        },
    )
}

/// Parse `#RRGGBB` / `#AARRGGBB` (leading `#` optional) into packed ARGB.
fn parse_color(raw: &str) -> Result<u32> {
    let hex = raw.strip_prefix('#').unwrap_or(raw);
    let value = u32::from_str_radix(hex, 16)
        .map_err(|_| anyhow::anyhow!("invalid color '{raw}': expected hex digits"))?;
    match hex.len() {
        6 => Ok((u32::from(ALPHA_OPAQUE) << 24) | value),
        8 => Ok(value),
        _ => bail!("invalid color '{raw}': expected #RRGGBB or #AARRGGBB"),
    }
}
