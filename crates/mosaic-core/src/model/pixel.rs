//! The placement fact: one colored cell placed into a frame.

use serde::{Deserialize, Serialize};

/// Fully transparent black — the empty-cell value in every dense grid.
pub const COLOR_TRANSPARENT: u32 = 0x0000_0000;

/// Fully opaque alpha channel value.
pub const ALPHA_OPAQUE: u8 = 0xFF;

/// Pack ARGB channels into a single 32-bit color (alpha in the MSB).
#[must_use]
pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

/// Unpack a 32-bit ARGB color into `(alpha, red, green, blue)`.
#[must_use]
pub const fn argb_channels(color: u32) -> (u8, u8, u8, u8) {
    (
        (color >> 24) as u8,
        (color >> 16) as u8,
        (color >> 8) as u8,
        color as u8,
    )
}

/// Returns true when the color's alpha channel is zero.
///
/// A transparent placement erases the cell; transparent cells are omitted
/// from decoded pixel lists and from live-pixel counts.
#[must_use]
pub const fn is_transparent(color: u32) -> bool {
    color >> 24 == 0
}

/// A single pixel placement in a frame.
///
/// Placements are immutable, append-only facts. Multiple placements may
/// exist at the same coordinate; only the most recent non-transparent one is
/// "live". Coordinate invariant for stored pixels: `x < frame.width` and
/// `y < frame.height`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixel {
    /// Store-assigned identifier. 0 for synthetic pixels produced by the
    /// codec's decoder.
    pub id: i64,

    /// The frame this placement belongs to.
    pub frame_id: i64,

    /// Column, `0 <= x < frame.width`.
    pub x: u16,

    /// Row, `0 <= y < frame.height`.
    pub y: u16,

    /// 32-bit ARGB color, most-significant byte = alpha.
    pub color: u32,

    /// Contributor handle. Empty for synthetic decoder output.
    pub placed_by: String,

    /// Placement wall-clock timestamp in microseconds since the Unix epoch.
    pub placed_at_us: i64,
}

impl Pixel {
    /// A synthetic pixel carrying only coordinates and color.
    ///
    /// Used by the codec's decoder, which cannot recover provenance from a
    /// blob; the caller re-attaches `frame_id` where it matters.
    #[must_use]
    pub const fn synthetic(x: u16, y: u16, color: u32) -> Self {
        Self {
            id: 0,
            frame_id: 0,
            x,
            y,
            color,
            placed_by: String::new(),
            placed_at_us: 0,
        }
    }

    /// Returns true when this placement's color is fully transparent.
    #[must_use]
    pub const fn is_transparent(&self) -> bool {
        is_transparent(self.color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argb_packs_alpha_in_msb() {
        let color = argb(0xFF, 0x12, 0x34, 0x56);
        assert_eq!(color, 0xFF12_3456);
    }

    #[test]
    fn argb_channels_roundtrip() {
        for color in [0x0000_0000, 0xFF00_00FF, 0x80AB_CDEF, u32::MAX] {
            let (a, r, g, b) = argb_channels(color);
            assert_eq!(argb(a, r, g, b), color);
        }
    }

    #[test]
    fn transparency_depends_only_on_alpha() {
        assert!(is_transparent(COLOR_TRANSPARENT));
        assert!(is_transparent(0x00FF_FFFF)); // colored but alpha 0
        assert!(!is_transparent(0x0100_0000)); // barely visible black
        assert!(!is_transparent(argb(ALPHA_OPAQUE, 0, 0, 0)));
    }

    #[test]
    fn synthetic_pixel_has_no_provenance() {
        let p = Pixel::synthetic(3, 7, 0xFFAA_BBCC);
        assert_eq!(p.id, 0);
        assert_eq!(p.frame_id, 0);
        assert!(p.placed_by.is_empty());
        assert_eq!(p.placed_at_us, 0);
        assert_eq!((p.x, p.y, p.color), (3, 7, 0xFFAA_BBCC));
    }
}
