use std::path::PathBuf;

use crate::cli::Cli;
use crate::types::LogLevel;

/// Application configuration, validated and path-expanded.
#[derive(Debug)]
pub struct Config {
    pub url: Option<String>,
    pub output_root: PathBuf,
    pub ytdlp_path: PathBuf,
    /// Absolute 1-based playlist position of the first entry to download.
    pub start: Option<usize>,
    /// Absolute 1-based playlist position of the last entry, inclusive.
    pub end: Option<usize>,
    pub log_level: LogLevel,
    pub no_progress_bar: bool,
    pub non_interactive: bool,
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn default_output_root() -> PathBuf {
    dirs::audio_dir().unwrap_or_else(|| PathBuf::from("downloads"))
}

impl Config {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        if cli.start == Some(0) {
            anyhow::bail!("--start is 1-based and must be at least 1");
        }
        if let (Some(start), Some(end)) = (cli.start, cli.end) {
            if end < start {
                anyhow::bail!("--end ({end}) must not be smaller than --start ({start})");
            }
        }

        let output_root = cli
            .directory
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(default_output_root);

        Ok(Self {
            url: cli.url,
            output_root,
            ytdlp_path: expand_tilde(&cli.ytdlp_path),
            start: cli.start,
            end: cli.end,
            log_level: cli.log_level,
            no_progress_bar: cli.no_progress_bar,
            non_interactive: cli.non_interactive,
        })
    }
}
