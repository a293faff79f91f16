//! Host tool discovery.
//!
//! The audio fallback needs a media downloader and an audio encoder on the host. Whether
//! they exist is checked once at startup and the answer is frozen into a
//! [`ToolAvailability`] snapshot that is shared by reference for the rest of the process.

use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::ToolsConfig;

/// Snapshot of the external capabilities the audio fallback depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolAvailability {
    pub downloader_present: bool,
    pub encoder_present: bool,
    pub speech_client_configured: bool,
}

impl ToolAvailability {
    /// Probe the configured downloader and encoder
    pub async fn probe(tools: &ToolsConfig, speech_client_configured: bool) -> Self {
        let timeout = Duration::from_secs(tools.probe_timeout_secs);

        let (downloader_present, encoder_present) = tokio::join!(
            check_available(&tools.downloader, &tools.downloader_version_flag, timeout),
            check_available(&tools.encoder, &tools.encoder_version_flag, timeout),
        );

        let availability = Self {
            downloader_present,
            encoder_present,
            speech_client_configured,
        };

        if !downloader_present {
            tracing::warn!("{} not found; audio fallback disabled", tools.downloader);
        }
        if !encoder_present {
            tracing::warn!("{} not found; audio fallback and compression disabled", tools.encoder);
        }
        if !speech_client_configured {
            tracing::warn!("Speech-to-text API key not configured; audio fallback disabled");
        }

        availability
    }

    /// Everything is present
    pub fn all() -> Self {
        Self {
            downloader_present: true,
            encoder_present: true,
            speech_client_configured: true,
        }
    }

    /// Human-readable list of what is missing
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.downloader_present {
            missing.push("yt-dlp - required for the audio fallback");
        }
        if !self.encoder_present {
            missing.push("ffmpeg - required for audio conversion and compression");
        }
        if !self.speech_client_configured {
            missing.push("OPENAI_API_KEY - required for speech-to-text");
        }
        missing
    }
}

/// Check whether `command` runs cleanly with `version_flag` within `timeout`.
///
/// Any spawn failure, non-zero exit or timeout counts as "not available".
pub async fn check_available(command: &str, version_flag: &str, timeout: Duration) -> bool {
    let child = Command::new(command)
        .arg(version_flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            tracing::debug!("Probe for {} failed to spawn: {}", command, e);
            false
        }
        Err(_) => {
            tracing::debug!("Probe for {} timed out after {:?}", command, timeout);
            false
        }
    }
}
