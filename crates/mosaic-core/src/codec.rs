//! Run-length grid codec behind the snapshot blob.
//!
//! Encoding is a lossless, order-independent transform from "sparse list of
//! colored cells in a W×H grid" to a single byte blob and back. The input
//! list is rasterized onto a dense grid (later writes win, so callers pass
//! placements oldest-to-newest), run-length encoded in row-major order, and
//! passed through zlib as a second, pluggable compression stage.
//!
//! # Blob layout
//!
//! ```text
//! [magic: "MSPX"]         4 bytes
//! [version: u8]           currently 1
//! [compression: u8]       0 = stored, 1 = zlib
//! [reserved: u16 BE]      must be zero
//! -- payload (compressed per the compression byte) --
//! [width: u16 BE] [height: u16 BE]
//! [a: u8] [r: u8] [g: u8] [b: u8] [count: u16 BE]   ... one per run
//! ```
//!
//! Runs are capped at 65535 cells; longer stretches of one color split into
//! multiple runs. The encoder always writes zlib; the decoder accepts both
//! compression ids so the second stage stays symmetric and replaceable.
//!
//! Decoding emits one pixel per non-transparent cell. Fully transparent
//! cells are omitted, which is why encode→decode is idempotent on the
//! *visible* pixel set rather than on the literal input list. Decoded pixels
//! carry synthetic provenance ([`Pixel::synthetic`]); only coordinates and
//! color are authoritative.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::ErrorCode;
use crate::model::pixel::{COLOR_TRANSPARENT, Pixel, is_transparent};

// ---------------------------------------------------------------------------
// Format constants
// ---------------------------------------------------------------------------

/// The four magic bytes at the start of every snapshot blob.
pub const BLOB_MAGIC: [u8; 4] = *b"MSPX";

/// The current blob format version written by the encoder.
pub const BLOB_VERSION: u8 = 1;

/// Fixed outer header size in bytes (magic + version + compression + reserved).
pub const BLOB_HEADER_SIZE: usize = 8;

/// Bytes per run in the payload: 4 color channels + u16 count.
const RUN_SIZE: usize = 6;

/// Maximum cells per run before splitting.
const MAX_RUN: u16 = u16::MAX;

const COMPRESSION_STORED: u8 = 0;
const COMPRESSION_ZLIB: u8 = 1;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors returned by blob encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The blob does not start with `MSPX`.
    #[error("invalid magic bytes: expected MSPX, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// The format version is newer than this library supports.
    #[error("unsupported blob version {0}: maximum supported is {BLOB_VERSION}")]
    UnsupportedVersion(u8),

    /// The compression id byte is not one this library knows.
    #[error("unknown compression id {0}")]
    UnknownCompression(u8),

    /// The decoded header disagrees with the caller-supplied dimensions.
    ///
    /// This is a hard integrity check: a snapshot for a W×H frame must never
    /// be silently coerced onto different dimensions.
    #[error(
        "dimension mismatch: expected {expected_width}x{expected_height}, \
         blob encodes {actual_width}x{actual_height}"
    )]
    DimensionMismatch {
        expected_width: u16,
        expected_height: u16,
        actual_width: u16,
        actual_height: u16,
    },

    /// Unexpected end of data while reading the header or run list.
    #[error("unexpected end of blob data")]
    UnexpectedEof,

    /// The blob is structurally invalid (bad inflate, bad run coverage).
    #[error("blob data is corrupted: {0}")]
    DataCorrupted(String),
}

impl CodecError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            Self::UnsupportedVersion(_) => ErrorCode::UnsupportedBlobVersion,
            Self::InvalidMagic(_)
            | Self::UnknownCompression(_)
            | Self::UnexpectedEof
            | Self::DataCorrupted(_) => ErrorCode::BlobCorrupted,
        }
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode a sparse pixel list into a snapshot blob for a `width`×`height`
/// frame.
///
/// Input order defines precedence: a later pixel at the same coordinate
/// overwrites an earlier one, so callers pass placements oldest-to-newest
/// and the newest wins. Out-of-bounds pixels are silently dropped —
/// truncation on frame resize is a frame-management policy, not a codec
/// concern.
///
/// # Errors
///
/// Returns [`CodecError::DataCorrupted`] if the zlib stage fails (it writes
/// to memory, so this is not expected in practice).
pub fn encode(pixels: &[Pixel], width: u16, height: u16) -> Result<Vec<u8>, CodecError> {
    let w = width as usize;
    let mut grid = vec![COLOR_TRANSPARENT; w * height as usize];
    for pixel in pixels {
        if pixel.x < width && pixel.y < height {
            grid[pixel.y as usize * w + pixel.x as usize] = pixel.color;
        }
    }

    let mut payload = Vec::with_capacity(4 + RUN_SIZE * 16);
    payload.extend_from_slice(&width.to_be_bytes());
    payload.extend_from_slice(&height.to_be_bytes());
    for (color, count) in rle_runs(&grid) {
        payload.extend_from_slice(&color.to_be_bytes());
        payload.extend_from_slice(&count.to_be_bytes());
    }

    let mut out = Vec::with_capacity(BLOB_HEADER_SIZE + payload.len() / 2);
    out.extend_from_slice(&BLOB_MAGIC);
    out.push(BLOB_VERSION);
    out.push(COMPRESSION_ZLIB);
    out.extend_from_slice(&0u16.to_be_bytes()); // reserved

    let mut encoder = ZlibEncoder::new(out, flate2::Compression::default());
    encoder
        .write_all(&payload)
        .map_err(|e| CodecError::DataCorrupted(format!("deflate failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| CodecError::DataCorrupted(format!("deflate failed: {e}")))
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode a snapshot blob back into the non-transparent pixels it encodes.
///
/// `width`/`height` are the caller's expected frame dimensions; a blob whose
/// header disagrees fails with [`CodecError::DimensionMismatch`]. Output
/// order is row-major. Decoding the same blob twice yields the same list.
///
/// # Errors
///
/// Returns [`CodecError`] if the header is invalid, the payload fails to
/// inflate, or the run list does not cover exactly `width × height` cells.
pub fn decode(data: &[u8], width: u16, height: u16) -> Result<Vec<Pixel>, CodecError> {
    if data.len() < BLOB_HEADER_SIZE {
        return Err(CodecError::UnexpectedEof);
    }

    let magic: [u8; 4] = data[0..4].try_into().expect("slice is 4 bytes");
    if magic != BLOB_MAGIC {
        return Err(CodecError::InvalidMagic(magic));
    }

    let version = data[4];
    if version > BLOB_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let payload = match data[5] {
        COMPRESSION_STORED => data[BLOB_HEADER_SIZE..].to_vec(),
        COMPRESSION_ZLIB => {
            let mut inflated = Vec::new();
            ZlibDecoder::new(&data[BLOB_HEADER_SIZE..])
                .read_to_end(&mut inflated)
                .map_err(|e| CodecError::DataCorrupted(format!("inflate failed: {e}")))?;
            inflated
        }
        other => return Err(CodecError::UnknownCompression(other)),
    };

    if payload.len() < 4 {
        return Err(CodecError::UnexpectedEof);
    }
    let actual_width = u16::from_be_bytes(payload[0..2].try_into().expect("slice is 2 bytes"));
    let actual_height = u16::from_be_bytes(payload[2..4].try_into().expect("slice is 2 bytes"));
    if actual_width != width || actual_height != height {
        return Err(CodecError::DimensionMismatch {
            expected_width: width,
            expected_height: height,
            actual_width,
            actual_height,
        });
    }

    let runs = &payload[4..];
    if !runs.len().is_multiple_of(RUN_SIZE) {
        return Err(CodecError::UnexpectedEof);
    }

    let w = width as usize;
    let cells = w * height as usize;
    let mut pixels = Vec::new();
    let mut cell = 0usize;

    for run in runs.chunks_exact(RUN_SIZE) {
        let color = u32::from_be_bytes(run[0..4].try_into().expect("slice is 4 bytes"));
        let count = u16::from_be_bytes(run[4..6].try_into().expect("slice is 2 bytes")) as usize;
        if count == 0 {
            return Err(CodecError::DataCorrupted("zero-length run".into()));
        }
        if cell + count > cells {
            return Err(CodecError::DataCorrupted(format!(
                "runs overflow the {width}x{height} grid"
            )));
        }
        if !is_transparent(color) {
            for index in cell..cell + count {
                let x = u16::try_from(index % w).expect("column fits u16");
                let y = u16::try_from(index / w).expect("row fits u16");
                pixels.push(Pixel::synthetic(x, y, color));
            }
        }
        cell += count;
    }

    if cell != cells {
        return Err(CodecError::DataCorrupted(format!(
            "runs cover {cell} of {cells} cells"
        )));
    }

    Ok(pixels)
}

// ---------------------------------------------------------------------------
// Grid statistics
// ---------------------------------------------------------------------------

/// Count the live (non-transparent, last-write-wins) pixels a placement list
/// resolves to on a `width`×`height` grid.
///
/// Same precedence and bounds rules as [`encode`], without building the
/// blob. This is what a snapshot records as its `live_pixels`.
#[must_use]
pub fn live_pixel_count(pixels: &[Pixel], width: u16, height: u16) -> u32 {
    let mut grid = std::collections::HashMap::new();
    for pixel in pixels {
        if pixel.x < width && pixel.y < height {
            grid.insert((pixel.x, pixel.y), pixel.color);
        }
    }
    let live = grid.values().filter(|color| !is_transparent(**color)).count();
    u32::try_from(live).expect("u16 x u16 grid fits u32")
}

/// Fraction of raw size saved by a blob, relative to the `width × height × 4`
/// byte uncompressed grid. 0.98 means the blob is 2% of raw.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compression_ratio(blob_len: usize, width: u16, height: u16) -> f64 {
    let raw = f64::from(width) * f64::from(height) * 4.0;
    if raw == 0.0 {
        return 0.0;
    }
    1.0 - blob_len as f64 / raw
}

// ---------------------------------------------------------------------------
// RLE helper
// ---------------------------------------------------------------------------

/// Run-length encode a grid into `(color, count)` pairs, splitting runs at
/// the `u16` cap.
fn rle_runs(grid: &[u32]) -> Vec<(u32, u16)> {
    let mut runs: Vec<(u32, u16)> = Vec::new();
    if grid.is_empty() {
        return runs;
    }
    let mut current = grid[0];
    let mut count: u16 = 1;
    for &color in &grid[1..] {
        if color == current && count < MAX_RUN {
            count += 1;
        } else {
            runs.push((current, count));
            current = color;
            count = 1;
        }
    }
    runs.push((current, count));
    runs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
