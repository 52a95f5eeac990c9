//! ytpld-rs — batch playlist audio downloader.
//!
//! Enumerates a playlist via yt-dlp, extracts each entry's audio as lossless
//! WAV with a fallback to MP3 320 kbps when the lossless path fails, and
//! records failures and per-format attempts in a run ledger. Items already
//! materialized on disk are skipped, so interrupted runs resume where they
//! left off.

#![warn(clippy::all)]

mod cli;
mod config;
mod download;
mod engine;
mod ledger;
mod types;

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::download::{DownloadConfig, PlaylistRequest};
use crate::engine::ytdlp::YtDlpEngine;
use crate::types::LogLevel;

/// Playlist used when the URL prompt is answered with an empty line.
const DEFAULT_URL: &str =
    "https://www.youtube.com/watch?v=mP8Igecq1dA&list=PLhri3WAC3dSDoHb7D_GvnuMaMqlKatSam&index=1";

/// Initialize tracing with a console layer and a per-run log file under
/// `<root>/logs/`. Returns the log file path for the final banner.
fn init_tracing(level: LogLevel, output_root: &Path) -> anyhow::Result<PathBuf> {
    let log_dir = output_root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_path = log_dir.join(format!("download_log_{stamp}.log"));
    let file = std::fs::File::create(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();

    Ok(log_path)
}

/// Extract the playlist ID from a YouTube URL, if any. A URL without a
/// `list` parameter is treated as a single video.
fn extract_playlist_id(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if !host.contains("youtube.com") && !host.contains("youtu.be") {
        return None;
    }
    parsed
        .query_pairs()
        .find(|(key, _)| key == "list")
        .map(|(_, value)| value.to_string())
}

/// Interpretation of one interactive ordinal answer.
#[derive(Debug, PartialEq, Eq)]
enum OrdinalAnswer {
    /// Empty input: take the default.
    Default,
    Value(usize),
    /// Non-numeric (or zero) input: the whole run falls back to the full
    /// range instead of aborting.
    Invalid,
}

fn parse_ordinal_answer(input: &str) -> OrdinalAnswer {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return OrdinalAnswer::Default;
    }
    match trimmed.parse::<usize>() {
        Ok(n) if n >= 1 => OrdinalAnswer::Value(n),
        _ => OrdinalAnswer::Invalid,
    }
}

fn prompt_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    std::io::stdout().flush().ok()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input).ok()?;
    Some(input)
}

/// Resolve the download URL: CLI argument, else interactive prompt, else the
/// built-in default.
fn resolve_url(config: &Config) -> String {
    if let Some(url) = &config.url {
        return url.clone();
    }
    if config.non_interactive || !std::io::stdin().is_terminal() {
        return DEFAULT_URL.to_string();
    }
    match prompt_line("Playlist or video URL (Enter for default): ") {
        Some(input) if !input.trim().is_empty() => input.trim().to_string(),
        _ => DEFAULT_URL.to_string(),
    }
}

/// Resolve the playlist window, prompting for whichever of start/end was not
/// given on the command line. A non-numeric answer selects the full range.
fn resolve_window(config: &Config) -> (usize, Option<usize>) {
    if config.non_interactive || !std::io::stdin().is_terminal() {
        return (config.start.unwrap_or(1), config.end);
    }

    let start = match config.start {
        Some(s) => s,
        None => match prompt_line("First entry to download (Enter for 1): ")
            .map_or(OrdinalAnswer::Default, |i| parse_ordinal_answer(&i))
        {
            OrdinalAnswer::Default => 1,
            OrdinalAnswer::Value(v) => v,
            OrdinalAnswer::Invalid => {
                tracing::warn!("invalid start index, downloading the full range");
                return (1, None);
            }
        },
    };

    let end = match config.end {
        Some(e) => Some(e),
        None => match prompt_line("Last entry to download (Enter for all): ")
            .map_or(OrdinalAnswer::Default, |i| parse_ordinal_answer(&i))
        {
            OrdinalAnswer::Default => None,
            OrdinalAnswer::Value(v) => Some(v),
            OrdinalAnswer::Invalid => {
                tracing::warn!("invalid end index, downloading the full range");
                return (1, None);
            }
        },
    };

    if let Some(e) = end {
        if e < start {
            tracing::warn!(
                "end index {e} is smaller than start index {start}, downloading the full range"
            );
            return (1, None);
        }
    }

    (start, end)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = Config::from_cli(cli)?;

    std::fs::create_dir_all(&config.output_root)?;
    let log_path = init_tracing(config.log_level, &config.output_root)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ytpld-rs starting");

    let url = resolve_url(&config);
    let engine = YtDlpEngine::new(config.ytdlp_path.clone());
    let download_config = DownloadConfig {
        output_root: config.output_root.clone(),
        no_progress_bar: config.no_progress_bar,
    };

    let result = if let Some(playlist_id) = extract_playlist_id(&url) {
        tracing::info!(%playlist_id, "detected playlist");
        let (start, end) = resolve_window(&config);
        let request = PlaylistRequest { url, start, end };
        download::run_playlist(&engine, &download_config, &request).await
    } else {
        tracing::info!("detected single video");
        download::run_single(&engine, &download_config, &url).await
    };

    match result {
        Ok(report) => {
            println!();
            if report.failures.is_empty() {
                println!("Download task complete.");
            } else {
                println!(
                    "Download task complete with {} failure(s); see the ledger files for details.",
                    report.failures.len()
                );
            }
            println!("  files: {}", config.output_root.display());
            println!("  log:   {}", log_path.display());
            Ok(())
        }
        Err(e) => {
            tracing::error!("{e}");
            println!();
            println!("Download task failed: {e}");
            std::process::exit(1);
        }
    }
}
