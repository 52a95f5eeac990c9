//! Format-fallback state machine.
//!
//! Two states, linear, no retry loop: PRIMARY attempts lossless extraction;
//! on failure an attempt record is written and SECONDARY tries the
//! compressed profile. Both attempts target the same output template, so at
//! most one file is materialized per entry. Collaborator failures never
//! escape this function — they are folded into the returned outcome.

use std::path::Path;

use crate::engine::progress::ProgressObserver;
use crate::engine::{CodecProfile, MediaEngine};
use crate::ledger::{AttemptRecord, RunLedger};
use crate::types::AudioFormat;

/// Terminal state of one entry's download.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackOutcome {
    Completed {
        format: AudioFormat,
    },
    Exhausted {
        primary_error: String,
        secondary_error: String,
    },
}

/// Combine both attempt errors into the single message recorded for an
/// exhausted entry, each sub-message prefixed with its format tag.
pub fn combined_error(primary_error: &str, secondary_error: &str) -> String {
    format!(
        "{}: {}; {}: {}",
        AudioFormat::Wav.label(),
        primary_error,
        AudioFormat::Mp3.label(),
        secondary_error
    )
}

/// Attempt lossless extraction, falling back to compressed on failure.
///
/// Appends one [`AttemptRecord`] per failed codec attempt (zero, one, or two
/// per entry).
pub async fn download_with_fallback(
    engine: &dyn MediaEngine,
    url: &str,
    output_template: &Path,
    title: &str,
    ordinal: usize,
    ledger: &mut RunLedger,
    observer: &dyn ProgressObserver,
) -> FallbackOutcome {
    let primary_error = match engine
        .fetch_audio(url, output_template, CodecProfile::LOSSLESS, observer)
        .await
    {
        Ok(()) => {
            tracing::info!(title, "lossless extraction succeeded");
            return FallbackOutcome::Completed {
                format: AudioFormat::Wav,
            };
        }
        Err(e) => e.to_string(),
    };

    tracing::warn!(title, error = %primary_error, "lossless extraction failed, trying MP3");
    ledger.record_attempt(AttemptRecord::failed(
        ordinal,
        title,
        AudioFormat::Wav,
        &primary_error,
    ));

    let secondary_error = match engine
        .fetch_audio(url, output_template, CodecProfile::COMPRESSED_320K, observer)
        .await
    {
        Ok(()) => {
            tracing::info!(title, "compressed extraction succeeded");
            return FallbackOutcome::Completed {
                format: AudioFormat::Mp3,
            };
        }
        Err(e) => e.to_string(),
    };

    tracing::error!(title, error = %secondary_error, "compressed extraction also failed");
    ledger.record_attempt(AttemptRecord::failed(
        ordinal,
        title,
        AudioFormat::Mp3,
        &secondary_error,
    ));

    FallbackOutcome::Exhausted {
        primary_error,
        secondary_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::NullObserver;
    use crate::engine::{EngineError, PlaylistProbe};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Stub engine whose fetch result depends on the requested format.
    struct StubEngine {
        fail_wav: bool,
        fail_mp3: bool,
        fetches: Mutex<Vec<AudioFormat>>,
    }

    impl StubEngine {
        fn new(fail_wav: bool, fail_mp3: bool) -> Self {
            Self {
                fail_wav,
                fail_mp3,
                fetches: Mutex::new(Vec::new()),
            }
        }

        fn fetched(&self) -> Vec<AudioFormat> {
            self.fetches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaEngine for StubEngine {
        async fn probe(&self, _url: &str) -> Result<PlaylistProbe, EngineError> {
            Err(EngineError::Metadata("probe not stubbed".to_string()))
        }

        async fn fetch_audio(
            &self,
            _url: &str,
            _output_template: &Path,
            profile: CodecProfile,
            _observer: &dyn ProgressObserver,
        ) -> Result<(), EngineError> {
            self.fetches.lock().unwrap().push(profile.format);
            let fail = match profile.format {
                AudioFormat::Wav => self.fail_wav,
                AudioFormat::Mp3 => self.fail_mp3,
            };
            if fail {
                Err(EngineError::Transfer(format!(
                    "{} conversion failed",
                    profile.format.label()
                )))
            } else {
                Ok(())
            }
        }
    }

    fn template() -> PathBuf {
        PathBuf::from("/tmp/01 - %(title)s.%(ext)s")
    }

    #[tokio::test]
    async fn test_primary_success_records_nothing() {
        let engine = StubEngine::new(false, false);
        let mut ledger = RunLedger::new();
        let outcome = download_with_fallback(
            &engine,
            "u",
            &template(),
            "Song",
            1,
            &mut ledger,
            &NullObserver,
        )
        .await;
        assert_eq!(
            outcome,
            FallbackOutcome::Completed {
                format: AudioFormat::Wav
            }
        );
        assert!(ledger.attempts().is_empty());
        assert_eq!(engine.fetched(), vec![AudioFormat::Wav]);
    }

    #[tokio::test]
    async fn test_fallback_to_secondary_records_one_attempt() {
        let engine = StubEngine::new(true, false);
        let mut ledger = RunLedger::new();
        let outcome = download_with_fallback(
            &engine,
            "u",
            &template(),
            "Song",
            1,
            &mut ledger,
            &NullObserver,
        )
        .await;
        assert_eq!(
            outcome,
            FallbackOutcome::Completed {
                format: AudioFormat::Mp3
            }
        );
        assert_eq!(ledger.attempts().len(), 1);
        assert_eq!(ledger.attempts()[0].format, AudioFormat::Wav);
        assert_eq!(engine.fetched(), vec![AudioFormat::Wav, AudioFormat::Mp3]);
    }

    #[tokio::test]
    async fn test_exhaustion_records_two_attempts() {
        let engine = StubEngine::new(true, true);
        let mut ledger = RunLedger::new();
        let outcome = download_with_fallback(
            &engine,
            "u",
            &template(),
            "Song",
            4,
            &mut ledger,
            &NullObserver,
        )
        .await;
        match outcome {
            FallbackOutcome::Exhausted {
                primary_error,
                secondary_error,
            } => {
                assert!(primary_error.contains("WAV"));
                assert!(secondary_error.contains("MP3"));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(ledger.attempts().len(), 2);
        assert_eq!(ledger.attempts()[0].format, AudioFormat::Wav);
        assert_eq!(ledger.attempts()[1].format, AudioFormat::Mp3);
        assert!(ledger.attempts().iter().all(|a| a.index == 4));
    }

    #[test]
    fn test_combined_error_tags_both_formats() {
        let message = combined_error("container mismatch", "encoder missing");
        assert_eq!(message, "WAV: container mismatch; MP3: encoder missing");
    }
}
