//! Data model for the mosaic canvas.
//!
//! - [`Pixel`] — one immutable placement fact from the append-only log.
//! - [`Frame`] — canvas metadata; the core only reads its dimensions.
//! - [`Snapshot`] — a compaction checkpoint wrapping an encoded grid blob.

pub mod frame;
pub mod pixel;
pub mod snapshot;

pub use frame::Frame;
pub use pixel::{ALPHA_OPAQUE, COLOR_TRANSPARENT, Pixel, argb, argb_channels, is_transparent};
pub use snapshot::{NewSnapshot, Snapshot};
