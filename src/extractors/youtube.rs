use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::AudioExtractor;
use crate::config::ToolsConfig;
use crate::utils::truncate_chars;
use crate::{ErrorKind, TranscriptError};

/// Basename of the file yt-dlp is told to write; the extension comes from `--audio-format`
const OUTPUT_STEM: &str = "audio";

/// Diagnostic excerpt kept from yt-dlp stderr
const STDERR_EXCERPT_CHARS: usize = 200;

/// Known yt-dlp stderr signatures, checked in order against the lowercased text.
/// yt-dlp exits with 1 for all of these.
const STDERR_SIGNATURES: &[(&str, ErrorKind)] = &[
    ("requested format is not available", ErrorKind::NoDownloadableAudio),
    ("sign in to confirm", ErrorKind::BotDetectionBlocked),
    ("confirm you're not a bot", ErrorKind::BotDetectionBlocked),
    ("confirm you\u{2019}re not a bot", ErrorKind::BotDetectionBlocked),
    ("http error 403", ErrorKind::BotDetectionBlocked),
];

/// YouTube audio extractor using yt-dlp
pub struct YtDlpExtractor {
    yt_dlp_path: String,
    cookies_path: Option<PathBuf>,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            yt_dlp_path: tools.downloader.clone(),
            cookies_path: tools.cookies_path.clone(),
            timeout: Duration::from_secs(tools.download_timeout_secs),
        }
    }

    /// Build the yt-dlp argument list for one download
    fn build_args(&self, url: &str, work_dir: &Path) -> Vec<String> {
        let template = work_dir.join(format!("{}.%(ext)s", OUTPUT_STEM));

        let mut args: Vec<String> = vec![
            "--format".into(),
            "bestaudio/best".into(),
            "--extract-audio".into(),
            "--audio-format".into(),
            "mp3".into(),
            "--no-playlist".into(),
            "--no-progress".into(),
            "--output".into(),
            template.to_string_lossy().into_owned(),
        ];

        match &self.cookies_path {
            Some(cookies) if cookies.exists() => {
                tracing::info!("Using cookies file at {}", cookies.display());
                args.push("--cookies".into());
                args.push(cookies.to_string_lossy().into_owned());
            }
            Some(cookies) => {
                tracing::warn!(
                    "Cookies file not found at {}; YouTube may block the download",
                    cookies.display()
                );
            }
            None => {}
        }

        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl AudioExtractor for YtDlpExtractor {
    async fn extract_audio(&self, url: &str, work_dir: &Path) -> Result<PathBuf, TranscriptError> {
        let args = self.build_args(url, work_dir);
        tracing::debug!("Running {} {}", self.yt_dlp_path, args.join(" "));

        let child = Command::new(&self.yt_dlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        // Dropping the output future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result.map_err(|e| {
                TranscriptError::AudioExtractionFailed(format!("failed to run {}: {}", self.yt_dlp_path, e))
            })?,
            Err(_) => {
                tracing::error!("yt-dlp timed out after {:?}", self.timeout);
                return Err(TranscriptError::AudioExtractionTimeout(self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = ?output.status.code(), "yt-dlp failed: {}", stderr.trim());
            return Err(classify_download_failure(&stderr));
        }

        let audio_path = expected_audio_path(work_dir);
        if !tokio::fs::try_exists(&audio_path).await.unwrap_or(false) {
            return Err(TranscriptError::AudioExtractionFailed(format!(
                "yt-dlp exited cleanly but {} was not created",
                audio_path.display()
            )));
        }

        Ok(audio_path)
    }

    fn tool_name(&self) -> &str {
        &self.yt_dlp_path
    }
}

/// Where a successful download lands inside `work_dir`
pub fn expected_audio_path(work_dir: &Path) -> PathBuf {
    work_dir.join(format!("{}.mp3", OUTPUT_STEM))
}

/// Map yt-dlp stderr text to a failure kind
pub fn classify_download_failure(stderr: &str) -> TranscriptError {
    let lowered = stderr.to_lowercase();
    let excerpt = truncate_chars(stderr, STDERR_EXCERPT_CHARS);

    let kind = STDERR_SIGNATURES
        .iter()
        .find(|(signature, _)| lowered.contains(signature))
        .map(|(_, kind)| *kind);

    match kind {
        Some(ErrorKind::NoDownloadableAudio) => TranscriptError::NoDownloadableAudio(excerpt),
        Some(ErrorKind::BotDetectionBlocked) => TranscriptError::BotDetectionBlocked,
        _ => TranscriptError::AudioExtractionFailed(excerpt),
    }
}
