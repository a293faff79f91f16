//! Viralscope - transcript extraction and viral potential analysis for YouTube videos
//!
//! The heart of the crate is the transcript pipeline: official captions first, captions in
//! any language second, and finally audio download plus speech-to-text. Around it sit thin
//! collaborators for video metadata, scoring, narrative text, and the CLI/HTTP surfaces.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod extractors;
pub mod metadata;
pub mod output;
pub mod server;
pub mod tools;
pub mod transcribe;
pub mod utils;

pub use analysis::{AnalysisError, AnalysisService, VideoAnalysis};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractors::{extract_video_id, VideoId};
pub use tools::ToolAvailability;
pub use transcribe::{Transcript, TranscriptPipeline, TranscriptSource};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Result of one transcript orchestration run
pub type TranscriptResult = std::result::Result<Transcript, TranscriptError>;

/// Classification of every way transcript acquisition can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    CaptionsUnavailable,
    PrerequisiteMissing,
    NoDownloadableAudio,
    BotDetectionBlocked,
    AudioExtractionTimeout,
    AudioExtractionFailed,
    SpeechServiceUnauthorized,
    SpeechServiceRateLimited,
    SpeechServiceUnreachable,
    SpeechServiceEmptyResult,
    UnexpectedFailure,
}

/// Error types produced by the transcript pipeline
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("Invalid YouTube URL: {0}")]
    InvalidUrl(String),

    /// Absorbed by the pipeline; only ever seen by callers of the caption layer itself.
    #[error("Captions unavailable: {0}")]
    CaptionsUnavailable(String),

    #[error("Cannot transcribe audio: {0} is not available")]
    PrerequisiteMissing(String),

    #[error("No downloadable audio for this video (livestream, premiere or protected content): {0}")]
    NoDownloadableAudio(String),

    #[error("YouTube blocked the download as automated traffic. Refresh the cookies file and try again")]
    BotDetectionBlocked,

    #[error("Audio download timed out after {0}s")]
    AudioExtractionTimeout(u64),

    #[error("Failed to download audio: {0}")]
    AudioExtractionFailed(String),

    #[error("Speech service rejected the credentials: {0}")]
    SpeechServiceUnauthorized(String),

    #[error("Speech service rate limit reached: {0}")]
    SpeechServiceRateLimited(String),

    #[error("Speech service unreachable: {0}")]
    SpeechServiceUnreachable(String),

    #[error("Speech service returned no usable text")]
    SpeechServiceEmptyResult,

    #[error("Unexpected failure while extracting the transcript: {0}")]
    UnexpectedFailure(String),
}

impl TranscriptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscriptError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            TranscriptError::CaptionsUnavailable(_) => ErrorKind::CaptionsUnavailable,
            TranscriptError::PrerequisiteMissing(_) => ErrorKind::PrerequisiteMissing,
            TranscriptError::NoDownloadableAudio(_) => ErrorKind::NoDownloadableAudio,
            TranscriptError::BotDetectionBlocked => ErrorKind::BotDetectionBlocked,
            TranscriptError::AudioExtractionTimeout(_) => ErrorKind::AudioExtractionTimeout,
            TranscriptError::AudioExtractionFailed(_) => ErrorKind::AudioExtractionFailed,
            TranscriptError::SpeechServiceUnauthorized(_) => ErrorKind::SpeechServiceUnauthorized,
            TranscriptError::SpeechServiceRateLimited(_) => ErrorKind::SpeechServiceRateLimited,
            TranscriptError::SpeechServiceUnreachable(_) => ErrorKind::SpeechServiceUnreachable,
            TranscriptError::SpeechServiceEmptyResult => ErrorKind::SpeechServiceEmptyResult,
            TranscriptError::UnexpectedFailure(_) => ErrorKind::UnexpectedFailure,
        }
    }

    /// Wrap an unclassified error, keeping only a short excerpt of its text
    pub fn unexpected(err: impl std::fmt::Display) -> Self {
        TranscriptError::UnexpectedFailure(utils::truncate_chars(&err.to_string(), 200))
    }
}

impl From<std::io::Error> for TranscriptError {
    fn from(err: std::io::Error) -> Self {
        TranscriptError::unexpected(err)
    }
}
