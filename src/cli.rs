use clap::Parser;

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "ytpld-rs",
    about = "Download playlist audio as lossless WAV with MP3 fallback"
)]
pub struct Cli {
    /// Playlist or video URL (prompted interactively when omitted)
    pub url: Option<String>,

    /// Output directory for audio files (default: the system music folder)
    #[arg(short = 'd', long)]
    pub directory: Option<String>,

    /// First playlist entry to download, 1-based (prompted when omitted)
    #[arg(long)]
    pub start: Option<usize>,

    /// Last playlist entry to download, inclusive (default: all remaining)
    #[arg(long)]
    pub end: Option<usize>,

    /// Path to the yt-dlp executable
    #[arg(long, default_value = "yt-dlp", env = "YTPLD_YTDLP")]
    pub ytdlp_path: String,

    /// Log level for console and run-log output
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Disable the transfer progress bar
    #[arg(long)]
    pub no_progress_bar: bool,

    /// Never prompt; unanswered options fall back to their defaults
    #[arg(long)]
    pub non_interactive: bool,
}
