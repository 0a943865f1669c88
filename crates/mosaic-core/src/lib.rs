//! mosaic-core: frame-state compaction for a collaborative pixel canvas.
//!
//! Placements ("pixels") are append-only facts in a durable log. Replaying
//! tens of thousands of them on every read does not scale, so this crate
//! periodically condenses the log into compact snapshots and reconstructs
//! current frame state as *latest snapshot + placements since it*.
//!
//! # Module layout
//!
//! - [`model`] — pixel, frame, and snapshot data types.
//! - [`codec`] — run-length + zlib grid codec behind the snapshot blob.
//! - [`store`] — durable-store traits plus memory and SQLite backends.
//! - [`compactor`] — snapshot creation, state reconstruction, cleanup.
//! - [`scheduler`] — in-process priority job queue with bounded retries.
//! - [`trigger`] — post-placement policy glue that enqueues compaction.
//! - [`config`] — `mosaic.toml` tunables.
//! - [`error`] — stable `E####` machine codes for every failure class.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per subsystem; `anyhow::Result` at
//!   orchestration boundaries (job bodies, CLI commands).
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).
//! - **Time**: wall-clock microseconds since the Unix epoch as `i64`,
//!   sampled via [`clock::now_us`] and passed down as plain values.

#![forbid(unsafe_code)]

pub mod clock;
pub mod codec;
pub mod compactor;
pub mod config;
pub mod error;
pub mod model;
pub mod scheduler;
pub mod store;
pub mod trigger;
