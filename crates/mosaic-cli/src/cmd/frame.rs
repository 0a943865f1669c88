use anyhow::Result;
use clap::Args;
use serde::Serialize;

use mosaic_core::clock;
use mosaic_core::codec;
use mosaic_core::compactor::Compactor;
use mosaic_core::model::pixel::argb_channels;
use mosaic_core::store::SqliteStore;

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct CreateFrameArgs {
    /// Human-readable frame name.
    pub name: String,

    /// Frame width in cells (fixed for the frame's lifetime).
    #[arg(long)]
    pub width: u16,

    /// Frame height in cells (fixed for the frame's lifetime).
    #[arg(long)]
    pub height: u16,
}

#[derive(Serialize)]
struct CreatedFrame {
    frame_id: i64,
    name: String,
    width: u16,
    height: u16,
}

/// Execute `mosaic create-frame`.
///
/// # Errors
///
/// Returns an error if the store write fails.
pub fn run_create_frame(
    store: &SqliteStore,
    args: &CreateFrameArgs,
    mode: OutputMode,
) -> Result<()> {
    let frame = store.create_frame(&args.name, args.width, args.height, clock::now_us())?;
    render(
        mode,
        &CreatedFrame {
            frame_id: frame.id,
            name: frame.name.clone(),
            width: frame.width,
            height: frame.height,
        },
        |f| format!("created frame {} '{}' ({}x{})", f.frame_id, f.name, f.width, f.height),
    )
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Frame identifier.
    pub frame_id: i64,

    /// Print every live pixel instead of a summary.
    #[arg(long)]
    pub pixels: bool,
}

#[derive(Serialize)]
struct FrameSummary {
    frame_id: i64,
    name: String,
    width: u16,
    height: u16,
    snapshot_id: Option<i64>,
    snapshot_created_at_us: Option<i64>,
    base_pixels: usize,
    recent_pixels: usize,
    live_pixels: usize,
    compression_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pixels: Option<Vec<LivePixel>>,
}

#[derive(Serialize)]
struct LivePixel {
    x: u16,
    y: u16,
    color: String,
}

/// Execute `mosaic show`: reconstruct the frame and report its state.
///
/// # Errors
///
/// Returns an error if the frame is missing or a store/codec call fails.
pub fn run_show(
    compactor: &Compactor<SqliteStore>,
    args: &ShowArgs,
    mode: OutputMode,
) -> Result<()> {
    let state = compactor.load_frame_state(args.frame_id)?;
    let grid = state.live_grid();

    let pixels = args.pixels.then(|| {
        let mut live: Vec<((u16, u16), u32)> = grid.iter().map(|(k, v)| (*k, *v)).collect();
        live.sort_by_key(|((x, y), _)| (*y, *x));
        live.into_iter()
            .map(|((x, y), color)| LivePixel {
                x,
                y,
                color: format_color(color),
            })
            .collect()
    });

    let summary = FrameSummary {
        frame_id: state.frame.id,
        name: state.frame.name.clone(),
        width: state.frame.width,
        height: state.frame.height,
        snapshot_id: state.snapshot.as_ref().map(|s| s.id),
        snapshot_created_at_us: state.snapshot.as_ref().map(|s| s.created_at_us),
        base_pixels: state.base_pixels.len(),
        recent_pixels: state.recent_pixels.len(),
        live_pixels: grid.len(),
        compression_ratio: state.snapshot.as_ref().map(|s| {
            codec::compression_ratio(s.blob.len(), state.frame.width, state.frame.height)
        }),
        pixels,
    };

    render(mode, &summary, |s| {
        let mut out = format!(
            "frame {} '{}' ({}x{})\n  live pixels:   {}\n  base pixels:   {}\n  recent pixels: {}",
            s.frame_id, s.name, s.width, s.height, s.live_pixels, s.base_pixels, s.recent_pixels
        );
        match s.snapshot_id {
            Some(id) => {
                out.push_str(&format!("\n  snapshot:      {id}"));
                if let Some(ratio) = s.compression_ratio {
                    out.push_str(&format!(" ({:.1}% saved)", ratio * 100.0));
                }
            }
            None => out.push_str("\n  snapshot:      none"),
        }
        if let Some(pixels) = &s.pixels {
            for p in pixels {
                out.push_str(&format!("\n  ({}, {}) {}", p.x, p.y, p.color));
            }
        }
        out
    })
}

fn format_color(color: u32) -> String {
    let (a, r, g, b) = argb_channels(color);
    format!("#{a:02X}{r:02X}{g:02X}{b:02X}")
}

#[cfg(test)]
mod tests {
    use super::format_color;

    #[test]
    fn colors_render_as_argb_hex() {
        assert_eq!(format_color(0xFF12_34AB), "#FF1234AB");
        assert_eq!(format_color(0x0000_0000), "#00000000");
    }
}
