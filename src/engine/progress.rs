//! Progress event plumbing.
//!
//! The transfer engine emits a one-way stream of [`ProgressEvent`]s parsed
//! from yt-dlp's line output. Observers render them (progress bar, logs);
//! nothing in the download control flow depends on what an observer does.

use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};

/// Progress template passed to yt-dlp. Four `|`-separated fields; absent
/// values print as `NA`.
pub const PROGRESS_TEMPLATE: &str = "download:%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.speed)s|%(progress.eta)s";

/// One observed transfer event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading {
        downloaded_bytes: Option<u64>,
        total_bytes: Option<u64>,
        speed_bytes_per_sec: Option<f64>,
        eta_secs: Option<u64>,
    },
    /// Transfer finished; conversion may still be running in the engine.
    Finished { filename: String },
    Errored { message: String },
}

/// One-way sink for transfer progress.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Observer that discards everything. Used in tests and quiet paths.
#[allow(dead_code)] // Constructed from test code across modules
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Parse one progress line emitted under [`PROGRESS_TEMPLATE`].
///
/// Returns `None` for anything that is not a progress line.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix("download:")?;
    let mut fields = rest.split('|');
    let downloaded_bytes = parse_u64_field(fields.next()?);
    let total_bytes = parse_u64_field(fields.next()?);
    let speed_bytes_per_sec = parse_f64_field(fields.next()?);
    let eta_secs = parse_u64_field(fields.next()?);
    Some(ProgressEvent::Downloading {
        downloaded_bytes,
        total_bytes,
        speed_bytes_per_sec,
        eta_secs,
    })
}

/// Extract the destination path from yt-dlp's informational lines, covering
/// both the raw download and the audio-extraction post-processor.
pub fn parse_destination_line(line: &str) -> Option<String> {
    let line = line.trim();
    for prefix in ["[download] Destination:", "[ExtractAudio] Destination:"] {
        if let Some(rest) = line.strip_prefix(prefix) {
            let path = rest.trim();
            if !path.is_empty() {
                return Some(path.to_string());
            }
        }
    }
    None
}

fn parse_u64_field(field: &str) -> Option<u64> {
    let field = field.trim();
    if field.is_empty() || field == "NA" {
        return None;
    }
    // yt-dlp prints byte counts as floats for some extractors
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().map(|f| f as u64))
}

fn parse_f64_field(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() || field == "NA" {
        return None;
    }
    field.parse::<f64>().ok()
}

/// Create the per-item transfer bar. Hidden when the user asked for no bar
/// or stdout is not a TTY (piped output, cron), matching the summary lines
/// that replace it.
pub fn create_transfer_bar(no_progress_bar: bool) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb
}

/// Observer rendering events onto an `indicatif` bar.
pub struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl ProgressObserver for BarObserver {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
                ..
            } => {
                if let Some(total) = total_bytes {
                    self.bar.set_length(*total);
                }
                if let Some(done) = downloaded_bytes {
                    self.bar.set_position(*done);
                }
            }
            ProgressEvent::Finished { filename } => {
                self.bar.set_message(format!("converting {filename}"));
            }
            ProgressEvent::Errored { message } => {
                let message = message.clone();
                self.bar.suspend(|| tracing::error!("{message}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_full_fields() {
        let event = parse_progress_line("download:1048576|4194304|524288.0|6").unwrap();
        assert_eq!(
            event,
            ProgressEvent::Downloading {
                downloaded_bytes: Some(1_048_576),
                total_bytes: Some(4_194_304),
                speed_bytes_per_sec: Some(524_288.0),
                eta_secs: Some(6),
            }
        );
    }

    #[test]
    fn test_parse_progress_na_fields() {
        let event = parse_progress_line("download:2048|NA|NA|NA").unwrap();
        assert_eq!(
            event,
            ProgressEvent::Downloading {
                downloaded_bytes: Some(2048),
                total_bytes: None,
                speed_bytes_per_sec: None,
                eta_secs: None,
            }
        );
    }

    #[test]
    fn test_parse_progress_float_byte_counts() {
        let event = parse_progress_line("download:1024.0|2048.5|NA|NA").unwrap();
        assert_eq!(
            event,
            ProgressEvent::Downloading {
                downloaded_bytes: Some(1024),
                total_bytes: Some(2048),
                speed_bytes_per_sec: None,
                eta_secs: None,
            }
        );
    }

    #[test]
    fn test_parse_progress_non_progress_line() {
        assert_eq!(parse_progress_line("[info] Writing metadata"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn test_parse_destination_download() {
        assert_eq!(
            parse_destination_line("[download] Destination: /music/01 - Song.webm"),
            Some("/music/01 - Song.webm".to_string())
        );
    }

    #[test]
    fn test_parse_destination_extract_audio() {
        assert_eq!(
            parse_destination_line("[ExtractAudio] Destination: /music/01 - Song.wav"),
            Some("/music/01 - Song.wav".to_string())
        );
    }

    #[test]
    fn test_parse_destination_empty_path() {
        assert_eq!(parse_destination_line("[download] Destination:"), None);
    }

    #[test]
    fn test_parse_destination_unrelated_line() {
        assert_eq!(parse_destination_line("[download] 42.0% of 10MiB"), None);
    }

    #[test]
    fn test_hidden_bar_when_disabled() {
        let pb = create_transfer_bar(true);
        assert!(pb.is_hidden());
    }

    #[test]
    fn test_bar_observer_updates_position() {
        let bar = ProgressBar::hidden();
        let observer = BarObserver::new(bar.clone());
        observer.on_event(&ProgressEvent::Downloading {
            downloaded_bytes: Some(10),
            total_bytes: Some(100),
            speed_bytes_per_sec: None,
            eta_secs: None,
        });
        assert_eq!(bar.position(), 10);
        assert_eq!(bar.length(), Some(100));
    }

    #[test]
    fn test_null_observer_accepts_everything() {
        let observer = NullObserver;
        observer.on_event(&ProgressEvent::Finished {
            filename: "x.wav".to_string(),
        });
        observer.on_event(&ProgressEvent::Errored {
            message: "boom".to_string(),
        });
    }
}
