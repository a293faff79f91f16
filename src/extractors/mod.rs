use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub mod captions;
pub mod compress;
pub mod document;
pub mod youtube;

use crate::TranscriptError;

/// Canonical 11-character YouTube video identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

static VIDEO_ID_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("video id grammar is a valid regex"));

/// Known URL shapes, tried in order. Each captures the identifier in group 1 and requires a
/// non-identifier character (or the end of input) right after it.
static URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"youtube\.com/watch\?(?:[^#\s]*&)?v=([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
        r"youtu\.be/([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
        r"youtube(?:-nocookie)?\.com/embed/([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
        r"youtube\.com/shorts/([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
        r"youtube\.com/live/([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("url patterns are valid regexes"))
    .collect()
});

impl VideoId {
    /// Accept a bare identifier if it matches the platform grammar
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        VIDEO_ID_GRAMMAR
            .is_match(raw)
            .then(|| VideoId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch URL for this video
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the video identifier from a YouTube URL.
///
/// Returns `None` when no known URL shape matches; callers treat that as invalid input.
pub fn extract_video_id(url: &str) -> Option<VideoId> {
    let url = url.trim();

    URL_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|id| VideoId(id.as_str().to_string()))
}

/// Pulls an audio track for a video into a caller-owned directory
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Download audio for `url` into `work_dir`, returning the path of the mp3 file
    async fn extract_audio(&self, url: &str, work_dir: &Path) -> Result<PathBuf, TranscriptError>;

    /// Name of the tool doing the work, for logs
    fn tool_name(&self) -> &str;
}

/// Shrinks an audio file so it fits the speech service upload quota
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioCompressor: Send + Sync {
    /// Write a smaller copy of `input` next to it and return its path
    async fn compress(&self, input: &Path) -> anyhow::Result<PathBuf>;
}
