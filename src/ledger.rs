//! Run ledger — append-only records of failed entries and per-format codec
//! attempts, flushed once at run end to timestamped JSON files under
//! `<root>/logs/`. Nothing is written for an empty category.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::AudioFormat;

/// One failed codec attempt for one entry. An entry produces zero, one, or
/// two of these per run (primary and/or secondary attempt).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based position of the entry within the requested window.
    pub index: usize,
    pub title: String,
    pub format: AudioFormat,
    pub error: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl AttemptRecord {
    pub fn failed(index: usize, title: &str, format: AudioFormat, error: &str) -> Self {
        Self {
            index,
            title: title.to_string(),
            format,
            error: Some(error.to_string()),
            timestamp: Local::now(),
        }
    }
}

/// One entry that exhausted both codec attempts (or could not be attempted
/// at all, e.g. no resolvable source URL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// 1-based position of the entry within the requested window.
    pub index: usize,
    pub title: String,
    pub url: String,
    pub error: String,
    pub timestamp: DateTime<Local>,
}

impl FailureRecord {
    pub fn new(index: usize, title: &str, url: &str, error: &str) -> Self {
        Self {
            index,
            title: title.to_string(),
            url: url.to_string(),
            error: error.to_string(),
            timestamp: Local::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Accumulated records for one invocation. Single writer — owned by the
/// orchestrator and mutated only on its thread of execution. Flushed exactly
/// once, after which the in-memory state is no longer touched.
#[derive(Debug, Default)]
pub struct RunLedger {
    attempts: Vec<AttemptRecord>,
    failures: Vec<FailureRecord>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&mut self, record: AttemptRecord) {
        self.attempts.push(record);
    }

    pub fn record_failure(&mut self, record: FailureRecord) {
        self.failures.push(record);
    }

    #[allow(dead_code)] // Symmetric with failures; used in tests
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Write the non-empty record categories to timestamped JSON files under
    /// `<output_root>/logs/`. Returns the paths written.
    ///
    /// JSON is pretty-printed UTF-8; serde_json leaves non-ASCII titles
    /// unescaped, so CJK and similar titles stay human-readable.
    pub fn flush(&self, output_root: &Path) -> Result<Vec<PathBuf>, LedgerError> {
        let mut written = Vec::new();
        if self.attempts.is_empty() && self.failures.is_empty() {
            return Ok(written);
        }

        let log_dir = output_root.join("logs");
        std::fs::create_dir_all(&log_dir).map_err(|source| LedgerError::CreateDir {
            path: log_dir.clone(),
            source,
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

        if !self.failures.is_empty() {
            let path = log_dir.join(format!("failed_downloads_{stamp}.json"));
            let body = serde_json::to_string_pretty(&self.failures)?;
            std::fs::write(&path, body).map_err(|source| LedgerError::Write {
                path: path.clone(),
                source,
            })?;
            tracing::info!("Failure records saved to {}", path.display());
            written.push(path);
        }

        if !self.attempts.is_empty() {
            let path = log_dir.join(format!("format_attempts_{stamp}.json"));
            let body = serde_json::to_string_pretty(&self.attempts)?;
            std::fs::write(&path, body).map_err(|source| LedgerError::Write {
                path: path.clone(),
                source,
            })?;
            tracing::info!("Format attempt records saved to {}", path.display());
            written.push(path);
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn test_tmp_dir(subdir: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("ytpld-ledger-tests").join(subdir);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_empty_ledger_writes_nothing() {
        let root = test_tmp_dir("empty");
        let ledger = RunLedger::new();
        let written = ledger.flush(&root).unwrap();
        assert!(written.is_empty());
        assert!(!root.join("logs").exists());
    }

    #[test]
    fn test_flush_writes_failures_only() {
        let root = test_tmp_dir("failures_only");
        let mut ledger = RunLedger::new();
        ledger.record_failure(FailureRecord::new(
            1,
            "Song",
            "https://example.com/v",
            "WAV: boom; MP3: boom",
        ));

        let written = ledger.flush(&root).unwrap();
        assert_eq!(written.len(), 1);
        let name = written[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("failed_downloads_"));
        assert!(name.ends_with(".json"));

        let body = fs::read_to_string(&written[0]).unwrap();
        let parsed: Vec<FailureRecord> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].index, 1);
        assert_eq!(parsed[0].title, "Song");
    }

    #[test]
    fn test_flush_writes_attempts_only() {
        let root = test_tmp_dir("attempts_only");
        let mut ledger = RunLedger::new();
        ledger.record_attempt(AttemptRecord::failed(2, "Song", AudioFormat::Wav, "boom"));

        let written = ledger.flush(&root).unwrap();
        assert_eq!(written.len(), 1);
        let name = written[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("format_attempts_"));
    }

    #[test]
    fn test_flush_writes_both_categories() {
        let root = test_tmp_dir("both");
        let mut ledger = RunLedger::new();
        ledger.record_attempt(AttemptRecord::failed(1, "A", AudioFormat::Wav, "e1"));
        ledger.record_attempt(AttemptRecord::failed(1, "A", AudioFormat::Mp3, "e2"));
        ledger.record_failure(FailureRecord::new(1, "A", "u", "WAV: e1; MP3: e2"));

        let written = ledger.flush(&root).unwrap();
        assert_eq!(written.len(), 2);
    }

    #[test]
    fn test_flush_preserves_non_ascii_titles() {
        let root = test_tmp_dir("non_ascii");
        let mut ledger = RunLedger::new();
        ledger.record_failure(FailureRecord::new(3, "日本語タイトル", "u", "err"));

        let written = ledger.flush(&root).unwrap();
        let body = fs::read_to_string(&written[0]).unwrap();
        assert!(body.contains("日本語タイトル"));
    }

    #[test]
    fn test_attempt_record_carries_error() {
        let record = AttemptRecord::failed(5, "T", AudioFormat::Mp3, "conversion failed");
        assert_eq!(record.index, 5);
        assert_eq!(record.format, AudioFormat::Mp3);
        assert_eq!(record.error.as_deref(), Some("conversion failed"));
    }
}
