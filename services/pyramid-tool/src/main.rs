//! Tile pyramid command-line tool.
//!
//! Prints pyramid layouts and builds in-memory pyramids from raw rasters,
//! reading a region back to check the result.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use commands::{BuildArgs, LayoutArgs};
use config::ToolConfig;

#[derive(Parser, Debug)]
#[command(name = "pyramid-tool")]
#[command(about = "Build and inspect multi-resolution tile pyramids")]
struct Args {
    /// YAML configuration file (environment variables are used when absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the mosaic geometries of a pyramid over an extent
    Layout(LayoutArgs),
    /// Build an in-memory pyramid from a raster and read a region back
    Build(BuildArgs),
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so command output on stdout stays parseable
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.json)?;

    let config = ToolConfig::load(args.config.as_deref())?;
    info!(
        read_mode = ?config.engine.read_mode,
        tile_size = config.layout.tile_size,
        "Loaded configuration"
    );

    match &args.command {
        Command::Layout(layout) => commands::run_layout(&config, layout),
        Command::Build(build) => commands::run_build(&config, build).await,
    }
}
