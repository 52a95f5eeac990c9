//! Download orchestration.
//!
//! Entries are processed strictly sequentially in ordinal order: consult the
//! existence resolver, skip items already on disk, drive the format-fallback
//! downloader for the rest, and accumulate attempt/failure records. One
//! entry exhausting both codec paths never aborts the run; only a failed
//! playlist enumeration does. The ledger is flushed once after the loop and
//! the reconciled summary is printed.

pub mod error;
pub mod exists;
pub mod fallback;
pub mod paths;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::engine::progress::{create_transfer_bar, BarObserver};
use crate::engine::{MediaEngine, ProbedEntry};
use crate::ledger::{FailureRecord, RunLedger};
use crate::types::AudioFormat;

pub use error::DownloadError;

/// Placeholder for entries the enumeration engine returned without a title.
const UNKNOWN_TITLE: &str = "unknown title";

/// Subset of application config consumed by the orchestrator. Decoupled from
/// CLI parsing so runs can be driven from tests.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub output_root: PathBuf,
    pub no_progress_bar: bool,
}

/// One playlist run request. `start`/`end` are absolute 1-based playlist
/// positions selecting the window; `end = None` means "all remaining".
/// Invariant (`end >= start`) is enforced at config construction.
#[derive(Debug, Clone)]
pub struct PlaylistRequest {
    pub url: String,
    pub start: usize,
    pub end: Option<usize>,
}

/// Terminal outcome of one processed entry.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Success { format: AudioFormat },
    Skipped { path: PathBuf, format_label: String },
    Failed { message: String },
}

/// Reconciled result of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Expected entry count for the requested window.
    pub requested: usize,
    /// Entries materialized on disk (fresh downloads plus existing skips).
    pub succeeded: usize,
    pub skipped_existing: usize,
    pub primary_successes: usize,
    pub secondary_successes: usize,
    pub failures: Vec<FailureRecord>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Success percentage; an empty window counts as 0%.
    pub fn success_rate(&self) -> f64 {
        if self.requested == 0 {
            0.0
        } else {
            self.succeeded as f64 * 100.0 / self.requested as f64
        }
    }
}

/// Mutable per-run state threaded through the entry loop. Owned exclusively
/// by the orchestrator; single writer.
struct RunContext {
    requested: usize,
    succeeded: usize,
    skipped_existing: usize,
    primary_successes: usize,
    secondary_successes: usize,
    ledger: RunLedger,
    started: Instant,
}

impl RunContext {
    fn new(requested: usize) -> Self {
        Self {
            requested,
            succeeded: 0,
            skipped_existing: 0,
            primary_successes: 0,
            secondary_successes: 0,
            ledger: RunLedger::new(),
            started: Instant::now(),
        }
    }

    fn count(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Success { format } => {
                self.succeeded += 1;
                match format {
                    AudioFormat::Wav => self.primary_successes += 1,
                    AudioFormat::Mp3 => self.secondary_successes += 1,
                }
            }
            DownloadOutcome::Skipped { .. } => {
                self.succeeded += 1;
                self.skipped_existing += 1;
            }
            DownloadOutcome::Failed { .. } => {}
        }
    }

    /// Flush the ledger (best-effort) and fold the counters into the final
    /// report. A flush failure is surfaced as a warning; the in-memory
    /// summary is preserved.
    fn finish(self, output_root: &Path) -> RunReport {
        if let Err(e) = self.ledger.flush(output_root) {
            tracing::warn!("failed to persist run ledger: {e}");
        }
        RunReport {
            requested: self.requested,
            succeeded: self.succeeded,
            skipped_existing: self.skipped_existing,
            primary_successes: self.primary_successes,
            secondary_successes: self.secondary_successes,
            failures: self.ledger.failures().to_vec(),
            elapsed: self.started.elapsed(),
        }
    }
}

/// Run one playlist request end to end.
///
/// Returns `Err` only when the playlist cannot be enumerated or the
/// destination directory cannot be created; in that case no ledger files are
/// produced. Every per-entry condition is folded into the report.
pub async fn run_playlist(
    engine: &dyn MediaEngine,
    config: &DownloadConfig,
    request: &PlaylistRequest,
) -> Result<RunReport, DownloadError> {
    tracing::info!(url = %request.url, "analyzing playlist");
    let probe = engine
        .probe(&request.url)
        .await
        .map_err(DownloadError::Enumeration)?;
    if probe.entries.is_empty() {
        return Err(DownloadError::EmptyPlaylist);
    }

    tracing::info!(
        playlist = %probe.title,
        uploader = %probe.uploader,
        entries = probe.entries.len(),
        "playlist analyzed"
    );

    // Window slicing: absolute start/end clamped to the playlist length;
    // ordinals below are 1-based positions within the window.
    let total = probe.entries.len();
    let start = request.start.max(1);
    let end = request.end.map_or(total, |e| e.min(total));
    let window: &[ProbedEntry] = if start <= end {
        &probe.entries[start - 1..end]
    } else {
        &[]
    };

    let playlist_dir = config.output_root.join(paths::sanitize_title(&probe.title));
    std::fs::create_dir_all(&playlist_dir).map_err(|source| DownloadError::Destination {
        path: playlist_dir.clone(),
        source,
    })?;
    tracing::info!(
        destination = %playlist_dir.display(),
        requested = window.len(),
        "starting downloads"
    );

    let mut ctx = RunContext::new(window.len());

    for (offset, entry) in window.iter().enumerate() {
        let ordinal = offset + 1;

        // Removed/unresolvable entries: nothing to name, nothing to fetch.
        if entry.title.is_none() && entry.webpage_url.is_none() {
            tracing::debug!(ordinal, "skipping unresolvable entry");
            continue;
        }

        let title = entry.title.clone().unwrap_or_else(|| UNKNOWN_TITLE.to_string());
        tracing::info!("[{}/{}] {}", ordinal, ctx.requested, title);

        let outcome = process_entry(
            engine,
            config,
            &playlist_dir,
            ordinal,
            &title,
            entry.webpage_url.as_deref(),
            &mut ctx.ledger,
        )
        .await;

        match &outcome {
            DownloadOutcome::Success { format } => {
                tracing::info!(
                    "[{}/{}] done ({}): {}",
                    ordinal,
                    ctx.requested,
                    format.label(),
                    title
                );
            }
            DownloadOutcome::Skipped { path, format_label } => {
                tracing::info!(
                    "[{}/{}] already exists ({}): {}",
                    ordinal,
                    ctx.requested,
                    format_label,
                    path.display()
                );
            }
            DownloadOutcome::Failed { message } => {
                tracing::error!("[{}/{}] failed: {} - {}", ordinal, ctx.requested, title, message);
            }
        }
        ctx.count(&outcome);
    }

    let report = ctx.finish(&config.output_root);
    print_summary(&report);
    Ok(report)
}

/// Single-video mode: the same fallback machine and ledger, one item, no
/// ordinal prefix in the filename.
pub async fn run_single(
    engine: &dyn MediaEngine,
    config: &DownloadConfig,
    url: &str,
) -> Result<RunReport, DownloadError> {
    std::fs::create_dir_all(&config.output_root).map_err(|source| DownloadError::Destination {
        path: config.output_root.clone(),
        source,
    })?;
    tracing::info!(url, "downloading single video");

    let mut ctx = RunContext::new(1);
    let template = paths::single_output_template(&config.output_root);

    let bar = create_transfer_bar(config.no_progress_bar);
    let observer = BarObserver::new(bar.clone());
    let outcome = fallback::download_with_fallback(
        engine,
        url,
        &template,
        UNKNOWN_TITLE,
        1,
        &mut ctx.ledger,
        &observer,
    )
    .await;
    bar.finish_and_clear();

    let outcome = match outcome {
        fallback::FallbackOutcome::Completed { format } => DownloadOutcome::Success { format },
        fallback::FallbackOutcome::Exhausted {
            primary_error,
            secondary_error,
        } => {
            let message = fallback::combined_error(&primary_error, &secondary_error);
            ctx.ledger
                .record_failure(FailureRecord::new(1, UNKNOWN_TITLE, url, &message));
            DownloadOutcome::Failed { message }
        }
    };
    ctx.count(&outcome);

    let report = ctx.finish(&config.output_root);
    print_summary(&report);
    Ok(report)
}

/// Decide and perform the work for one entry: skip when already on disk,
/// fail without an engine call when no source URL is resolvable, otherwise
/// run the format fallback.
async fn process_entry(
    engine: &dyn MediaEngine,
    config: &DownloadConfig,
    playlist_dir: &Path,
    ordinal: usize,
    title: &str,
    url: Option<&str>,
    ledger: &mut RunLedger,
) -> DownloadOutcome {
    if let Some(existing) = exists::resolve_existing(playlist_dir, ordinal, title) {
        return DownloadOutcome::Skipped {
            path: existing.path,
            format_label: existing.format_label,
        };
    }

    let Some(url) = url else {
        let message = "no resolvable source URL for this entry".to_string();
        ledger.record_failure(FailureRecord::new(ordinal, title, "", &message));
        return DownloadOutcome::Failed { message };
    };

    let template = paths::entry_output_template(playlist_dir, ordinal);
    let bar = create_transfer_bar(config.no_progress_bar);
    let observer = BarObserver::new(bar.clone());
    let outcome =
        fallback::download_with_fallback(engine, url, &template, title, ordinal, ledger, &observer)
            .await;
    bar.finish_and_clear();

    match outcome {
        fallback::FallbackOutcome::Completed { format } => DownloadOutcome::Success { format },
        fallback::FallbackOutcome::Exhausted {
            primary_error,
            secondary_error,
        } => {
            let message = fallback::combined_error(&primary_error, &secondary_error);
            ledger.record_failure(FailureRecord::new(ordinal, title, url, &message));
            DownloadOutcome::Failed { message }
        }
    }
}

/// Print the reconciled run summary.
fn print_summary(report: &RunReport) {
    println!();
    println!("── Summary ──");
    println!("  requested: {}", report.requested);
    println!(
        "  succeeded: {} ({} already existed)",
        report.succeeded, report.skipped_existing
    );
    if report.primary_successes > 0 || report.secondary_successes > 0 {
        println!(
            "  formats:   {} WAV, {} MP3 (fallback)",
            report.primary_successes, report.secondary_successes
        );
    }
    if report.failures.is_empty() {
        println!("  failed:    0");
    } else {
        println!("  failed:    {}", report.failures.len());
        for failure in &report.failures {
            println!("    {:02}. {}", failure.index, failure.title);
            println!("        {}", failure.error);
        }
        println!("  failure details saved under the logs directory");
    }
    println!("  success rate: {:.1}%", report.success_rate());
    println!("  elapsed: {}", format_duration(report.elapsed));

    tracing::info!(
        requested = report.requested,
        succeeded = report.succeeded,
        failed = report.failures.len(),
        success_rate = report.success_rate(),
        "run complete"
    );
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
