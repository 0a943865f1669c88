#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use mosaic_core::codec::CodecError;
use mosaic_core::compactor::{Compactor, CompactorError};
use mosaic_core::config;
use mosaic_core::error::ErrorCode;
use mosaic_core::store::{SqliteStore, StoreError};
use output::OutputMode;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "mosaic: frame-state compaction for a collaborative pixel canvas",
    long_about = None
)]
struct Cli {
    /// Path to the SQLite store database.
    #[arg(long, global = true, default_value = "mosaic.sqlite3")]
    db: PathBuf,

    /// Path to the config file.
    #[arg(long, global = true, default_value = "mosaic.toml")]
    config: PathBuf,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags.
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Create a new frame",
        after_help = "EXAMPLES:\n    mosaic create-frame plaza --width 128 --height 128"
    )]
    CreateFrame(cmd::frame::CreateFrameArgs),

    #[command(
        about = "Show a frame's reconstructed state",
        after_help = "EXAMPLES:\n    mosaic show 1\n    mosaic show 1 --pixels"
    )]
    Show(cmd::frame::ShowArgs),

    #[command(
        about = "Place a pixel (runs the compaction trigger)",
        after_help = "EXAMPLES:\n    mosaic place 1 10 12 '#FF0044'\n    mosaic place 1 10 12 '#80FF0044' --user alice"
    )]
    Place(cmd::place::PlaceArgs),

    #[command(
        about = "Compact a frame's log into a snapshot now",
        after_help = "EXAMPLES:\n    mosaic compact 1"
    )]
    Compact(cmd::compact::CompactArgs),

    #[command(
        about = "Delete old snapshots beyond a retain count",
        after_help = "EXAMPLES:\n    mosaic cleanup 1 --keep 3"
    )]
    Cleanup(cmd::compact::CleanupArgs),

    #[command(
        about = "Verify the latest snapshot against a log replay",
        after_help = "EXAMPLES:\n    mosaic verify 1"
    )]
    Verify(cmd::compact::VerifyArgs),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(&cli) {
        let code = error_code(&err);
        eprintln!("{code}: {err:#}");
        if let Some(hint) = code.hint() {
            eprintln!("hint: {hint}");
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = config::load_config(&cli.config)?;
    let store = Arc::new(SqliteStore::open(&cli.db)?);
    tracing::debug!(db = %cli.db.display(), "store opened");
    let compactor = Compactor::new(Arc::clone(&store), config.compaction.clone().into());
    let mode = cli.output_mode();

    match &cli.command {
        Commands::CreateFrame(args) => cmd::frame::run_create_frame(&store, args, mode),
        Commands::Show(args) => cmd::frame::run_show(&compactor, args, mode),
        Commands::Place(args) => {
            cmd::place::run_place(&store, &compactor, &config.scheduler.clone().into(), args, mode)
        }
        Commands::Compact(args) => cmd::compact::run_compact(&store, &compactor, args, mode),
        Commands::Cleanup(args) => cmd::compact::run_cleanup(&compactor, args, mode),
        Commands::Verify(args) => cmd::compact::run_verify(&compactor, args, mode),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Map an error chain to its stable machine code.
fn error_code(err: &anyhow::Error) -> ErrorCode {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<CompactorError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<StoreError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<CodecError>() {
            return e.code();
        }
        if cause.downcast_ref::<toml::de::Error>().is_some() {
            return ErrorCode::ConfigParseError;
        }
    }
    ErrorCode::InternalUnexpected
}
