//! Media enumeration & transfer engine boundary.
//!
//! The orchestrator talks to the hosting service only through the
//! [`MediaEngine`] trait: `probe` enumerates a playlist without downloading,
//! `fetch_audio` performs the transfer plus audio extraction for one item.
//! The production implementation shells out to yt-dlp ([`ytdlp::YtDlpEngine`]);
//! tests substitute stub engines.

pub mod progress;
pub mod ytdlp;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::engine::progress::ProgressObserver;
use crate::types::AudioFormat;

/// Playlist metadata returned by a probe. Read-only; no media is transferred.
#[derive(Debug, Clone)]
pub struct PlaylistProbe {
    pub title: String,
    pub uploader: String,
    pub entries: Vec<ProbedEntry>,
}

/// One enumerated playlist item. Removed or private videos surface with
/// missing title and/or URL; the orchestrator decides how to treat them.
#[derive(Debug, Clone)]
pub struct ProbedEntry {
    pub title: Option<String>,
    pub webpage_url: Option<String>,
}

/// Codec selection for one transfer: which audio format to extract and at
/// what quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecProfile {
    pub format: AudioFormat,
}

impl CodecProfile {
    /// Lossless maximum-quality profile — the primary attempt.
    pub const LOSSLESS: Self = Self {
        format: AudioFormat::Wav,
    };

    /// Compressed 320 kbps fast-preset profile — the fallback attempt.
    pub const COMPRESSED_320K: Self = Self {
        format: AudioFormat::Mp3,
    };

    /// yt-dlp `--audio-quality` argument: `0` means best for lossless
    /// extraction, `320K` pins the compressed bitrate.
    pub fn audio_quality(&self) -> &'static str {
        match self.format {
            AudioFormat::Wav => "0",
            AudioFormat::Mp3 => "320K",
        }
    }

    /// Extra arguments for the transcoding backend. Both profiles use all
    /// CPU threads; the compressed profile adds the fast encoder preset.
    pub fn postprocessor_args(&self) -> &'static str {
        match self.format {
            AudioFormat::Wav => "ffmpeg:-threads 0",
            AudioFormat::Mp3 => "ffmpeg:-threads 0 -preset fast",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Transfer(String),

    #[error("invalid engine metadata: {0}")]
    Metadata(String),

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstraction over the external enumeration & transfer service.
///
/// Object-safe so the orchestrator can hold `&dyn MediaEngine` and tests can
/// inject stubs.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Enumerate playlist metadata without downloading anything.
    async fn probe(&self, url: &str) -> Result<PlaylistProbe, EngineError>;

    /// Transfer one item and extract audio per `profile`, materializing the
    /// result at `output_template` (with `%(title)s`/`%(ext)s` placeholders
    /// expanded by the engine). Progress events go to `observer`; the
    /// observer never influences control flow.
    async fn fetch_audio(
        &self,
        url: &str,
        output_template: &Path,
        profile: CodecProfile,
        observer: &dyn ProgressObserver,
    ) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lossless_profile() {
        assert_eq!(CodecProfile::LOSSLESS.format, AudioFormat::Wav);
        assert_eq!(CodecProfile::LOSSLESS.audio_quality(), "0");
        assert_eq!(CodecProfile::LOSSLESS.postprocessor_args(), "ffmpeg:-threads 0");
    }

    #[test]
    fn test_compressed_profile() {
        assert_eq!(CodecProfile::COMPRESSED_320K.format, AudioFormat::Mp3);
        assert_eq!(CodecProfile::COMPRESSED_320K.audio_quality(), "320K");
        assert!(CodecProfile::COMPRESSED_320K
            .postprocessor_args()
            .contains("-preset fast"));
    }
}
