//! yt-dlp subprocess engine — the production [`MediaEngine`].
//!
//! Enumeration uses `--flat-playlist --dump-json` (one JSON object per
//! line, no media transfer); fetching uses `-x` audio extraction with the
//! codec selected by the caller's [`CodecProfile`]. Timeouts and transient
//! retries are delegated to yt-dlp itself via `--socket-timeout` and
//! `--retries`; this layer adds no retry loop of its own.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::engine::progress::{
    parse_destination_line, parse_progress_line, ProgressEvent, ProgressObserver,
    PROGRESS_TEMPLATE,
};
use crate::engine::{CodecProfile, EngineError, MediaEngine, PlaylistProbe, ProbedEntry};

/// Prefer containers that carry clean audio streams; fall back to whatever
/// the extractor offers.
const AUDIO_FORMAT_SELECTOR: &str = "bestaudio[ext=m4a]/bestaudio[ext=webm]/bestaudio/best";

/// Marker titles yt-dlp substitutes for entries it cannot resolve.
const UNRESOLVABLE_TITLES: &[&str] = &["[Deleted video]", "[Private video]", "[Unavailable video]"];

pub struct YtDlpEngine {
    program: PathBuf,
    socket_timeout_secs: u32,
    transfer_retries: u32,
}

impl YtDlpEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            socket_timeout_secs: 30,
            transfer_retries: 3,
        }
    }

    fn probe_args(&self, url: &str) -> Vec<String> {
        vec![
            "--flat-playlist".to_string(),
            "--dump-json".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            self.transfer_retries.to_string(),
            url.to_string(),
        ]
    }

    fn fetch_args(&self, url: &str, output_template: &Path, profile: CodecProfile) -> Vec<String> {
        vec![
            "-f".to_string(),
            AUDIO_FORMAT_SELECTOR.to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            profile.format.as_str().to_string(),
            "--audio-quality".to_string(),
            profile.audio_quality().to_string(),
            "--postprocessor-args".to_string(),
            profile.postprocessor_args().to_string(),
            "--embed-metadata".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            self.transfer_retries.to_string(),
            "-o".to_string(),
            output_template.to_string_lossy().to_string(),
            url.to_string(),
        ]
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    async fn probe(&self, url: &str) -> Result<PlaylistProbe, EngineError> {
        tracing::debug!(url, "probing playlist");
        let output = Command::new(&self.program)
            .args(self.probe_args(url))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                program: self.program.to_string_lossy().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Transfer(translate_ytdlp_error(&stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&stdout)
    }

    async fn fetch_audio(
        &self,
        url: &str,
        output_template: &Path,
        profile: CodecProfile,
        observer: &dyn ProgressObserver,
    ) -> Result<(), EngineError> {
        tracing::debug!(url, format = profile.format.as_str(), "starting transfer");

        let mut child = Command::new(&self.program)
            .args(self.fetch_args(url, output_template, profile))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.program.to_string_lossy().to_string(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Io(std::io::Error::other("stdout pipe unavailable")))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Io(std::io::Error::other("stderr pipe unavailable")))?;

        // Drain stderr concurrently so a chatty process can't deadlock on a
        // full pipe while we read stdout.
        let stderr_reader = tokio::spawn(async move {
            let mut buf = String::new();
            let mut lines = BufReader::new(stderr_pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(event) = parse_progress_line(&line) {
                observer.on_event(&event);
            } else if let Some(destination) = parse_destination_line(&line) {
                // The audio-extraction destination marks the end of the
                // network transfer and the start of conversion.
                if line.trim_start().starts_with("[ExtractAudio]") {
                    observer.on_event(&ProgressEvent::Finished {
                        filename: destination,
                    });
                }
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_reader.await.unwrap_or_default();

        if status.success() {
            tracing::debug!(url, "transfer complete");
            Ok(())
        } else {
            let message = translate_ytdlp_error(&stderr);
            observer.on_event(&ProgressEvent::Errored {
                message: message.clone(),
            });
            Err(EngineError::Transfer(message))
        }
    }
}

/// Parse the NDJSON produced by a flat-playlist probe.
///
/// Playlist title and uploader come from the first entry that carries them;
/// entries with yt-dlp's deleted/private marker titles surface as fully
/// unresolvable (no title, no URL).
fn parse_probe_output(stdout: &str) -> Result<PlaylistProbe, EngineError> {
    let mut title: Option<String> = None;
    let mut uploader: Option<String> = None;
    let mut entries = Vec::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let json: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("skipping unparseable probe line: {e}");
                continue;
            }
        };

        if title.is_none() {
            title = json
                .get("playlist_title")
                .or_else(|| json.get("playlist"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
        }
        if uploader.is_none() {
            uploader = json
                .get("playlist_uploader")
                .or_else(|| json.get("uploader"))
                .or_else(|| json.get("channel"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
        }

        entries.push(parse_probe_entry(&json));
    }

    if entries.is_empty() {
        return Err(EngineError::Metadata(
            "no playlist entries in engine output".to_string(),
        ));
    }

    Ok(PlaylistProbe {
        title: title.unwrap_or_else(|| "unknown playlist".to_string()),
        uploader: uploader.unwrap_or_else(|| "unknown uploader".to_string()),
        entries,
    })
}

fn parse_probe_entry(json: &serde_json::Value) -> ProbedEntry {
    let raw_title = json
        .get("title")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    if raw_title
        .as_deref()
        .is_some_and(|t| UNRESOLVABLE_TITLES.contains(&t))
    {
        return ProbedEntry {
            title: None,
            webpage_url: None,
        };
    }

    let webpage_url = json
        .get("url")
        .or_else(|| json.get("webpage_url"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| {
            json.get("id")
                .and_then(|v| v.as_str())
                .filter(|id| !id.is_empty())
                .map(|id| format!("https://www.youtube.com/watch?v={id}"))
        });

    ProbedEntry {
        title: raw_title,
        webpage_url,
    }
}

/// Condense yt-dlp stderr into one user-facing message.
fn translate_ytdlp_error(stderr: &str) -> String {
    let lower = stderr.to_lowercase();

    if lower.contains("http error 429") {
        return "server rate limit (429); try again later".to_string();
    }
    if lower.contains("http error 403") || lower.contains("forbidden") {
        return "access denied (403); the video may be private or region-restricted".to_string();
    }
    if lower.contains("sign in") || lower.contains("login required") {
        return "video requires login".to_string();
    }
    if lower.contains("private video") {
        return "this video is private".to_string();
    }
    if lower.contains("video unavailable") {
        return "video unavailable or removed".to_string();
    }
    if lower.contains("copyright") {
        return "video blocked due to copyright".to_string();
    }
    if lower.contains("geo") && lower.contains("block") {
        return "video restricted in your region".to_string();
    }
    if lower.contains("ffmpeg") && (lower.contains("not found") || lower.contains("no such file"))
    {
        return "ffmpeg not found; install ffmpeg for audio conversion".to_string();
    }
    if lower.contains("postprocessing") {
        if let Some(line) = last_error_line(stderr) {
            return line;
        }
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return "connection timed out".to_string();
    }
    if lower.contains("unsupported url") {
        return "unsupported URL".to_string();
    }

    if let Some(line) = last_error_line(stderr) {
        return line;
    }

    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        "unknown engine error".to_string()
    } else {
        trimmed.chars().take(300).collect()
    }
}

fn last_error_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.to_lowercase().starts_with("error"))
        .map(|l| {
            l.strip_prefix("ERROR: ")
                .or_else(|| l.strip_prefix("ERROR:"))
                .or_else(|| l.strip_prefix("error: "))
                .unwrap_or(l)
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::NullObserver;
    use crate::types::AudioFormat;

    #[test]
    fn test_fetch_args_lossless_profile() {
        let engine = YtDlpEngine::default();
        let args = engine.fetch_args(
            "https://example.com/v",
            Path::new("/out/01 - %(title)s.%(ext)s"),
            CodecProfile::LOSSLESS,
        );
        let joined = args.join(" ");
        assert!(joined.contains("--audio-format wav"));
        assert!(joined.contains("--audio-quality 0"));
        assert!(joined.contains("-x"));
        assert!(joined.contains("--no-playlist"));
        assert!(args.last().unwrap() == "https://example.com/v");
    }

    #[test]
    fn test_fetch_args_compressed_profile() {
        let engine = YtDlpEngine::default();
        let args = engine.fetch_args(
            "https://example.com/v",
            Path::new("/out/01 - %(title)s.%(ext)s"),
            CodecProfile::COMPRESSED_320K,
        );
        let joined = args.join(" ");
        assert!(joined.contains("--audio-format mp3"));
        assert!(joined.contains("--audio-quality 320K"));
        assert!(joined.contains("-preset fast"));
    }

    #[test]
    fn test_probe_args_are_read_only() {
        let engine = YtDlpEngine::default();
        let args = engine.probe_args("https://example.com/pl");
        assert!(args.contains(&"--flat-playlist".to_string()));
        assert!(args.contains(&"--dump-json".to_string()));
        assert!(!args.contains(&"-x".to_string()));
    }

    #[test]
    fn test_parse_probe_output_basic() {
        let stdout = concat!(
            "{\"id\":\"abc\",\"title\":\"First Song\",\"url\":\"https://www.youtube.com/watch?v=abc\",\"playlist_title\":\"My Mix\",\"playlist_uploader\":\"Someone\"}\n",
            "{\"id\":\"def\",\"title\":\"Second Song\",\"url\":\"https://www.youtube.com/watch?v=def\"}\n",
        );
        let probe = parse_probe_output(stdout).unwrap();
        assert_eq!(probe.title, "My Mix");
        assert_eq!(probe.uploader, "Someone");
        assert_eq!(probe.entries.len(), 2);
        assert_eq!(probe.entries[1].title.as_deref(), Some("Second Song"));
    }

    #[test]
    fn test_parse_probe_output_url_from_id() {
        let stdout = "{\"id\":\"xyz\",\"title\":\"T\"}\n";
        let probe = parse_probe_output(stdout).unwrap();
        assert_eq!(
            probe.entries[0].webpage_url.as_deref(),
            Some("https://www.youtube.com/watch?v=xyz")
        );
    }

    #[test]
    fn test_parse_probe_output_deleted_entry_unresolvable() {
        let stdout = "{\"id\":\"abc\",\"title\":\"[Deleted video]\",\"url\":\"https://www.youtube.com/watch?v=abc\"}\n";
        let probe = parse_probe_output(stdout).unwrap();
        assert!(probe.entries[0].title.is_none());
        assert!(probe.entries[0].webpage_url.is_none());
    }

    #[test]
    fn test_parse_probe_output_defaults() {
        let stdout = "{\"id\":\"abc\",\"title\":\"T\"}\n";
        let probe = parse_probe_output(stdout).unwrap();
        assert_eq!(probe.title, "unknown playlist");
        assert_eq!(probe.uploader, "unknown uploader");
    }

    #[test]
    fn test_parse_probe_output_empty_is_error() {
        assert!(matches!(
            parse_probe_output(""),
            Err(EngineError::Metadata(_))
        ));
    }

    #[test]
    fn test_parse_probe_output_skips_garbage_lines() {
        let stdout = "not json\n{\"id\":\"abc\",\"title\":\"T\"}\n";
        let probe = parse_probe_output(stdout).unwrap();
        assert_eq!(probe.entries.len(), 1);
    }

    #[test]
    fn test_translate_rate_limit() {
        assert!(translate_ytdlp_error("HTTP Error 429: Too Many Requests").contains("429"));
    }

    #[test]
    fn test_translate_unavailable() {
        assert!(translate_ytdlp_error("ERROR: Video unavailable").contains("unavailable"));
    }

    #[test]
    fn test_translate_ffmpeg_missing() {
        let msg = translate_ytdlp_error("ERROR: ffmpeg not found. Please install");
        assert!(msg.contains("ffmpeg"));
    }

    #[test]
    fn test_translate_postprocessing_keeps_detail() {
        let msg = translate_ytdlp_error(
            "ERROR: Postprocessing: audio conversion failed: Invalid sample format",
        );
        assert!(msg.contains("Postprocessing"));
    }

    #[test]
    fn test_translate_falls_back_to_last_error_line() {
        let msg = translate_ytdlp_error("WARNING: x\nERROR: something odd happened\n");
        assert_eq!(msg, "something odd happened");
    }

    #[test]
    fn test_translate_empty_stderr() {
        assert_eq!(translate_ytdlp_error(""), "unknown engine error");
    }

    #[tokio::test]
    async fn test_probe_spawn_failure_maps_to_spawn_error() {
        let engine = YtDlpEngine::new("/nonexistent/ytpld-test-binary");
        let err = engine.probe("https://example.com/pl").await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_fetch_spawn_failure_maps_to_spawn_error() {
        let engine = YtDlpEngine::new("/nonexistent/ytpld-test-binary");
        let err = engine
            .fetch_audio(
                "https://example.com/v",
                Path::new("/tmp/%(title)s.%(ext)s"),
                CodecProfile::LOSSLESS,
                &NullObserver,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[test]
    fn test_selector_prefers_clean_audio_containers() {
        assert!(AUDIO_FORMAT_SELECTOR.starts_with("bestaudio[ext=m4a]"));
        assert_eq!(CodecProfile::LOSSLESS.format, AudioFormat::Wav);
    }
}
