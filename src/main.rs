use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    config::LyricsyncConfig,
    engine::offset::{MAX_OFFSET_MS, MIN_OFFSET_MS},
    lyrics::provider::ProviderCascade,
    playback::SpotifyPlayback,
    session::Session,
    ui::{DisplayHandler, TerminalUiBackend},
};

mod config;
mod engine;
mod error;
mod event;
mod lyrics;
mod oauth;
mod playback;
mod session;
mod ui;

/// Show lyrics for whatever Spotify is playing, in step with playback.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file (default: ~/.config/lyricsync/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial timing offset in milliseconds
    #[arg(long, allow_negative_numbers = true)]
    offset: Option<i64>,

    /// Spotify client id, overriding the config
    #[arg(long)]
    client_id: Option<String>,

    /// Log file (default: ~/.config/lyricsync/lyricsync.log)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = LyricsyncConfig::load(args.config.as_deref()).await?;
    if let Some(offset) = args.offset {
        config.timing.initial_offset_ms = offset.clamp(MIN_OFFSET_MS, MAX_OFFSET_MS);
    }
    if let Some(client_id) = args.client_id {
        config.api.spotify_client_id = client_id;
    }

    init_tracing(args.log_file)?;
    info!("starting lyricsync {}", env!("CARGO_PKG_VERSION"));

    let spotify = oauth::authorize(
        &config.api.spotify_client_id,
        config.api.redirect_port,
        config::config_dir()?.join("token.json"),
    )
    .await?;
    let cascade = ProviderCascade::from_config(&config.lyrics)?;
    let config = Arc::new(config);

    let (status_tx, status_rx) = flume::unbounded();
    let (input_tx, input_rx) = flume::unbounded();

    let session = Session::new(cascade, config.clone(), status_tx, input_rx)?;
    let display = DisplayHandler::new(TerminalUiBackend);

    let session_task = tokio::task::spawn(session.run(SpotifyPlayback::new(spotify)));
    display.run(status_rx, input_tx, config).await?;
    session_task.await??;
    Ok(())
}

/// Logs go to a file, the terminal belongs to the TUI.
fn init_tracing(log_file: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match log_file {
        Some(path) => path,
        None => config::config_dir()?.join("lyricsync.log"),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lyricsync=info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
