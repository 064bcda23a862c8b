//! livefx CLI - live-recompiled per-sample audio processing.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "livefx")]
#[command(author, version, about = "Live-coded audio effects", long_about = None)]
struct Cli {
    /// Engine settings (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a file or a test tone through user code
    Play(commands::play::PlayArgs),

    /// Render a WAV file through user code, offline
    Render(commands::render::RenderArgs),

    /// Compile user code without playing anything
    Check(commands::check::CheckArgs),

    /// List audio output devices
    Devices(commands::devices::DevicesArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::common::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Play(args) => commands::play::run(args, config).await,
        Commands::Render(args) => commands::render::run(args, config).await,
        Commands::Check(args) => commands::check::run(args, config).await,
        Commands::Devices(args) => commands::devices::run(args),
    }
}
