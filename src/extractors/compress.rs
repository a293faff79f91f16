use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::AudioCompressor;
use crate::config::ToolsConfig;
use crate::utils::{format_file_size, truncate_chars};

/// Mono 16 kHz at 64 kbps keeps about an hour of speech under 25 MiB
const CHANNELS: &str = "1";
const SAMPLE_RATE: &str = "16000";
const BITRATE: &str = "64k";

/// Audio compressor backed by ffmpeg
pub struct FfmpegCompressor {
    ffmpeg_path: String,
    timeout: Duration,
}

impl FfmpegCompressor {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            ffmpeg_path: tools.encoder.clone(),
            timeout: Duration::from_secs(tools.compress_timeout_secs),
        }
    }

    fn build_args(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-vn".into(),
            "-ac".into(),
            CHANNELS.into(),
            "-ar".into(),
            SAMPLE_RATE.into(),
            "-b:a".into(),
            BITRATE.into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

/// Path of the compressed copy, alongside the input
pub fn compressed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    input.with_file_name(format!("{}_compressed.mp3", stem))
}

#[async_trait]
impl AudioCompressor for FfmpegCompressor {
    async fn compress(&self, input: &Path) -> Result<PathBuf> {
        let output_path = compressed_path(input);
        tracing::debug!("Compressing {} -> {}", input.display(), output_path.display());

        let child = Command::new(&self.ffmpeg_path)
            .args(Self::build_args(input, &output_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| anyhow::anyhow!("ffmpeg timed out after {:?}", self.timeout))?
            .with_context(|| format!("Failed to run {}", self.ffmpeg_path))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to compress audio with ffmpeg: {}", truncate_chars(&error, 200));
        }

        let size = tokio::fs::metadata(&output_path)
            .await
            .context("ffmpeg reported success but wrote no file")?
            .len();
        tracing::info!("Compressed audio to {}", format_file_size(size));

        Ok(output_path)
    }
}
