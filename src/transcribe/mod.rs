use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::Config;
use crate::extractors::captions::{CaptionFetcher, CaptionSource};
use crate::extractors::compress::FfmpegCompressor;
use crate::extractors::youtube::YtDlpExtractor;
use crate::extractors::{extract_video_id, AudioCompressor, AudioExtractor, VideoId};
use crate::tools::ToolAvailability;
use crate::utils::{format_file_size, is_meaningful};
use crate::{TranscriptError, TranscriptResult};

pub mod whisper;

pub use whisper::{SpeechToText, WhisperClient};

/// Where a transcript came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    /// Captions in one of the preferred languages
    OfficialCaption,
    /// Captions in whatever language the platform listed first
    FallbackLanguageCaption,
    /// Downloaded audio run through the speech service
    SpeechToText,
    /// Text submitted directly for analysis; never produced by the pipeline
    Document,
}

impl std::fmt::Display for TranscriptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptSource::OfficialCaption => write!(f, "official captions"),
            TranscriptSource::FallbackLanguageCaption => write!(f, "fallback-language captions"),
            TranscriptSource::SpeechToText => write!(f, "speech-to-text"),
            TranscriptSource::Document => write!(f, "submitted document"),
        }
    }
}

/// A transcript that passed the meaningfulness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub source: TranscriptSource,
    /// Caption language code, when the text came from captions
    pub language: Option<String>,
}

/// Knobs the orchestrator reads on every run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub min_transcript_chars: usize,
    pub max_upload_bytes: u64,
    pub require_encoder: bool,
    pub encoder_name: String,
    /// Parent for per-run temporary directories; the system temp dir when unset
    pub temp_root: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_transcript_chars: config.app.min_transcript_chars,
            max_upload_bytes: config.speech.max_upload_bytes,
            require_encoder: config.tools.require_encoder,
            encoder_name: config.tools.encoder.clone(),
            temp_root: config.app.temp_dir.clone(),
        }
    }
}

/// Orchestration states. Each run walks these from `Start` to `Done`.
#[derive(Debug)]
enum Step {
    Start,
    TryCaptions(VideoId),
    TryAudioExtract(VideoId),
    TryCompress(PathBuf),
    TryTranscribe(PathBuf),
    Done(TranscriptResult),
}

/// Per-run state. Dropping it deletes the run's temporary directory, so every exit path
/// (including a panic or a cancelled future) cleans up.
struct RunState<'a> {
    url: &'a str,
    work_dir: Option<TempDir>,
}

impl RunState<'_> {
    fn release(&mut self) {
        if let Some(dir) = self.work_dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

/// Transcript acquisition pipeline: captions first, then audio download plus speech-to-text
pub struct TranscriptPipeline {
    captions: Box<dyn CaptionSource>,
    extractor: Box<dyn AudioExtractor>,
    compressor: Box<dyn AudioCompressor>,
    speech: Box<dyn SpeechToText>,
    tools: Arc<ToolAvailability>,
    settings: PipelineSettings,
}

impl TranscriptPipeline {
    pub fn new(
        captions: Box<dyn CaptionSource>,
        extractor: Box<dyn AudioExtractor>,
        compressor: Box<dyn AudioCompressor>,
        speech: Box<dyn SpeechToText>,
        tools: Arc<ToolAvailability>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            captions,
            extractor,
            compressor,
            speech,
            tools,
            settings,
        }
    }

    /// Build the production pipeline and probe the host tools once
    pub async fn from_config(config: &Config) -> crate::Result<Self> {
        let speech = WhisperClient::new(&config.speech).context("Failed to build speech client")?;
        let tools = ToolAvailability::probe(&config.tools, speech.is_configured()).await;

        Ok(Self::new(
            Box::new(CaptionFetcher::from_config(&config.captions)?),
            Box::new(YtDlpExtractor::new(&config.tools)),
            Box::new(FfmpegCompressor::new(&config.tools)),
            Box::new(speech),
            Arc::new(tools),
            PipelineSettings::from_config(config),
        ))
    }

    pub fn tools(&self) -> &ToolAvailability {
        &self.tools
    }

    /// Produce a transcript for `url`, or the reason none could be produced
    pub async fn run(&self, url: &str) -> TranscriptResult {
        let mut run = RunState {
            url,
            work_dir: None,
        };
        let mut step = Step::Start;

        loop {
            step = match step {
                Step::Done(result) => {
                    run.release();
                    if let Err(e) = &result {
                        tracing::error!(kind = ?e.kind(), "Transcript extraction failed: {}", e);
                    }
                    return result;
                }
                step => self.advance(step, &mut run).await,
            };
        }
    }

    async fn advance(&self, step: Step, run: &mut RunState<'_>) -> Step {
        match step {
            Step::Start => match extract_video_id(run.url) {
                Some(id) => {
                    tracing::info!("Processing video ID: {}", id);
                    Step::TryCaptions(id)
                }
                None => Step::Done(Err(TranscriptError::InvalidUrl(run.url.to_string()))),
            },

            // Every caption failure, and captions too short to mean anything, fall through
            // to the audio path without being surfaced.
            Step::TryCaptions(id) => match self.captions.fetch_captions(&id).await {
                Ok(captions) if is_meaningful(&captions.text, self.settings.min_transcript_chars) => {
                    tracing::info!("Using {} ({})", captions.source, captions.language_code);
                    Step::Done(Ok(Transcript {
                        text: captions.text.trim().to_string(),
                        source: captions.source,
                        language: Some(captions.language_code),
                    }))
                }
                Ok(captions) => {
                    tracing::warn!(
                        "Captions too short ({} chars); falling back to audio download",
                        captions.text.trim().chars().count()
                    );
                    Step::TryAudioExtract(id)
                }
                Err(e) => {
                    tracing::warn!("Could not fetch captions ({}); falling back to audio download", e);
                    Step::TryAudioExtract(id)
                }
            },

            Step::TryAudioExtract(id) => {
                if let Some(missing) = self.missing_prerequisite() {
                    return Step::Done(Err(TranscriptError::PrerequisiteMissing(missing)));
                }

                let work_dir = match self.allocate_work_dir() {
                    Ok(dir) => dir,
                    Err(e) => return Step::Done(Err(e)),
                };
                let dir_path = work_dir.path().to_path_buf();
                run.work_dir = Some(work_dir);

                tracing::info!("Downloading audio with {}", self.extractor.tool_name());
                // The canonical URL drops playlist and timestamp parameters.
                match self.extractor.extract_audio(&id.watch_url(), &dir_path).await {
                    Ok(audio_path) => Step::TryCompress(audio_path),
                    Err(e) => Step::Done(Err(e)),
                }
            }

            Step::TryCompress(audio_path) => {
                let size = match tokio::fs::metadata(&audio_path).await {
                    Ok(metadata) => metadata.len(),
                    Err(e) => return Step::Done(Err(e.into())),
                };

                if size <= self.settings.max_upload_bytes {
                    return Step::TryTranscribe(audio_path);
                }

                if !self.tools.encoder_present {
                    tracing::warn!(
                        "Audio is {} but {} is unavailable; uploading as is",
                        format_file_size(size),
                        self.settings.encoder_name
                    );
                    return Step::TryTranscribe(audio_path);
                }

                tracing::info!(
                    "Audio is {} (limit {}); compressing",
                    format_file_size(size),
                    format_file_size(self.settings.max_upload_bytes)
                );
                match self.compressor.compress(&audio_path).await {
                    Ok(compressed) => Step::TryTranscribe(compressed),
                    Err(e) => {
                        tracing::warn!("Compression failed ({:#}); uploading original file", e);
                        Step::TryTranscribe(audio_path)
                    }
                }
            }

            Step::TryTranscribe(audio_path) => match self.speech.transcribe(&audio_path).await {
                Ok(text) if is_meaningful(&text, self.settings.min_transcript_chars) => {
                    tracing::info!("Speech-to-text succeeded");
                    Step::Done(Ok(Transcript {
                        text: text.trim().to_string(),
                        source: TranscriptSource::SpeechToText,
                        language: None,
                    }))
                }
                Ok(_) => Step::Done(Err(TranscriptError::SpeechServiceEmptyResult)),
                Err(e) => Step::Done(Err(e)),
            },

            Step::Done(result) => Step::Done(result),
        }
    }

    /// Name of the first missing prerequisite for the audio path
    fn missing_prerequisite(&self) -> Option<String> {
        if !self.tools.downloader_present {
            return Some(self.extractor.tool_name().to_string());
        }
        if self.settings.require_encoder && !self.tools.encoder_present {
            return Some(self.settings.encoder_name.clone());
        }
        if !self.tools.speech_client_configured || !self.speech.is_configured() {
            return Some("speech-to-text API key (OPENAI_API_KEY)".to_string());
        }
        None
    }

    fn allocate_work_dir(&self) -> Result<TempDir, TranscriptError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("viralscope-");

        let dir = match &self.settings.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }?;

        tracing::debug!("Allocated work dir {}", dir.path().display());
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::captions::{Captions, MockCaptionSource};
    use crate::extractors::{MockAudioCompressor, MockAudioExtractor};
    use crate::transcribe::whisper::MockSpeechToText;
    use crate::ErrorKind;
    use mockall::Sequence;
    use std::path::Path;
    use std::time::Duration;

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=1s";
    const LONG_TEXT: &str = "this transcript is comfortably longer than the threshold";

    struct Mocks {
        captions: MockCaptionSource,
        extractor: MockAudioExtractor,
        compressor: MockAudioCompressor,
        speech: MockSpeechToText,
        tools: ToolAvailability,
    }

    impl Mocks {
        fn new() -> Self {
            let mut extractor = MockAudioExtractor::new();
            extractor.expect_tool_name().return_const("yt-dlp".to_string());
            let mut speech = MockSpeechToText::new();
            speech.expect_is_configured().return_const(true);

            Self {
                captions: MockCaptionSource::new(),
                extractor,
                compressor: MockAudioCompressor::new(),
                speech,
                tools: ToolAvailability::all(),
            }
        }

        fn build(self, temp_root: &Path, max_upload_bytes: u64) -> TranscriptPipeline {
            TranscriptPipeline::new(
                Box::new(self.captions),
                Box::new(self.extractor),
                Box::new(self.compressor),
                Box::new(self.speech),
                Arc::new(self.tools),
                PipelineSettings {
                    min_transcript_chars: 20,
                    max_upload_bytes,
                    require_encoder: true,
                    encoder_name: "ffmpeg".to_string(),
                    temp_root: Some(temp_root.to_path_buf()),
                },
            )
        }
    }

    fn captions(text: &str, source: TranscriptSource) -> Captions {
        Captions {
            text: text.to_string(),
            language_code: "en".to_string(),
            source,
        }
    }

    fn unavailable() -> TranscriptError {
        TranscriptError::CaptionsUnavailable("transcripts are disabled for this video".into())
    }

    /// Extractor that writes `bytes` bytes of fake audio into the work dir
    fn writes_audio(extractor: &mut MockAudioExtractor, bytes: usize) {
        extractor
            .expect_extract_audio()
            .withf(|url, _| url == "https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .times(1)
            .returning(move |_, dir| {
                let path = dir.join("audio.mp3");
                std::fs::write(&path, vec![0u8; bytes]).unwrap();
                Ok(path)
            });
    }

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn meaningful_captions_short_circuit_the_audio_path() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .captions
            .expect_fetch_captions()
            .withf(|id| id.as_str() == "dQw4w9WgXcQ")
            .times(1)
            .returning(|_| Ok(captions(LONG_TEXT, TranscriptSource::OfficialCaption)));
        mocks.extractor.expect_extract_audio().never();
        mocks.speech.expect_transcribe().never();

        let transcript = mocks.build(root.path(), 1024).run(URL).await.unwrap();

        assert_eq!(transcript.source, TranscriptSource::OfficialCaption);
        assert_eq!(transcript.text, LONG_TEXT);
        assert_eq!(transcript.language.as_deref(), Some("en"));
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn fallback_language_captions_keep_their_source() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .captions
            .expect_fetch_captions()
            .returning(|_| Ok(captions(LONG_TEXT, TranscriptSource::FallbackLanguageCaption)));
        mocks.extractor.expect_extract_audio().never();

        let transcript = mocks.build(root.path(), 1024).run(URL).await.unwrap();

        assert_eq!(transcript.source, TranscriptSource::FallbackLanguageCaption);
    }

    #[tokio::test]
    async fn invalid_url_stops_before_any_lookup() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks.captions.expect_fetch_captions().never();
        mocks.extractor.expect_extract_audio().never();

        let err = mocks
            .build(root.path(), 1024)
            .run("https://vimeo.com/12345")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidUrl);
    }

    #[tokio::test]
    async fn missing_captions_fall_back_to_speech_to_text() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .captions
            .expect_fetch_captions()
            .returning(|_| Err(unavailable()));
        writes_audio(&mut mocks.extractor, 64);
        mocks.compressor.expect_compress().never();
        mocks
            .speech
            .expect_transcribe()
            .withf(|path| path.ends_with("audio.mp3") && path.exists())
            .times(1)
            .returning(|_| Ok(format!("  {}  ", LONG_TEXT)));

        let transcript = mocks.build(root.path(), 1024).run(URL).await.unwrap();

        assert_eq!(transcript.source, TranscriptSource::SpeechToText);
        assert_eq!(transcript.text, LONG_TEXT);
        assert_eq!(transcript.language, None);
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn short_captions_count_as_missing() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .captions
            .expect_fetch_captions()
            .returning(|_| Ok(captions("[Music]", TranscriptSource::OfficialCaption)));
        writes_audio(&mut mocks.extractor, 64);
        mocks
            .speech
            .expect_transcribe()
            .returning(|_| Ok(LONG_TEXT.to_string()));

        let transcript = mocks.build(root.path(), 1024).run(URL).await.unwrap();

        assert_eq!(transcript.source, TranscriptSource::SpeechToText);
    }

    #[tokio::test]
    async fn missing_tools_fail_without_spawning_anything() {
        let cases = [
            (
                ToolAvailability { downloader_present: false, ..ToolAvailability::all() },
                "yt-dlp",
            ),
            (
                ToolAvailability { encoder_present: false, ..ToolAvailability::all() },
                "ffmpeg",
            ),
            (
                ToolAvailability { speech_client_configured: false, ..ToolAvailability::all() },
                "OPENAI_API_KEY",
            ),
        ];

        for (tools, named) in cases {
            let root = tempfile::tempdir().unwrap();
            let mut mocks = Mocks::new();
            mocks.tools = tools;
            mocks
                .captions
                .expect_fetch_captions()
                .returning(|_| Err(unavailable()));
            mocks.extractor.expect_extract_audio().never();
            mocks.speech.expect_transcribe().never();

            let err = mocks.build(root.path(), 1024).run(URL).await.unwrap_err();

            assert_eq!(err.kind(), ErrorKind::PrerequisiteMissing);
            assert!(err.to_string().contains(named), "{err} should name {named}");
            assert!(is_empty_dir(root.path()));
        }
    }

    #[tokio::test]
    async fn oversized_audio_is_compressed_before_transcription() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        let mut order = Sequence::new();
        mocks
            .captions
            .expect_fetch_captions()
            .returning(|_| Err(unavailable()));
        writes_audio(&mut mocks.extractor, 4096);
        mocks
            .compressor
            .expect_compress()
            .times(1)
            .in_sequence(&mut order)
            .returning(|input| {
                let output = input.with_file_name("audio_compressed.mp3");
                std::fs::write(&output, vec![0u8; 128]).unwrap();
                Ok(output)
            });
        mocks
            .speech
            .expect_transcribe()
            .withf(|path| path.ends_with("audio_compressed.mp3"))
            .times(1)
            .in_sequence(&mut order)
            .returning(|_| Ok(LONG_TEXT.to_string()));

        let transcript = mocks.build(root.path(), 1024).run(URL).await.unwrap();

        assert_eq!(transcript.source, TranscriptSource::SpeechToText);
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn compression_failure_degrades_to_the_original_file() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .captions
            .expect_fetch_captions()
            .returning(|_| Err(unavailable()));
        writes_audio(&mut mocks.extractor, 4096);
        mocks
            .compressor
            .expect_compress()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("ffmpeg exploded")));
        mocks
            .speech
            .expect_transcribe()
            .withf(|path| path.ends_with("audio.mp3"))
            .times(1)
            .returning(|_| Ok(LONG_TEXT.to_string()));

        let result = mocks.build(root.path(), 1024).run(URL).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn extraction_failures_propagate_and_clean_up() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .captions
            .expect_fetch_captions()
            .returning(|_| Err(unavailable()));
        mocks
            .extractor
            .expect_extract_audio()
            .times(1)
            .returning(|_, dir| {
                // a partial download left behind by the tool
                std::fs::write(dir.join("audio.webm.part"), b"partial").unwrap();
                Err(TranscriptError::BotDetectionBlocked)
            });
        mocks.speech.expect_transcribe().never();

        let err = mocks.build(root.path(), 1024).run(URL).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BotDetectionBlocked);
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn unexpected_failures_still_clean_up() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .captions
            .expect_fetch_captions()
            .returning(|_| Err(unavailable()));
        writes_audio(&mut mocks.extractor, 64);
        mocks
            .speech
            .expect_transcribe()
            .returning(|_| Err(TranscriptError::unexpected("socket closed mid-upload")));

        let err = mocks.build(root.path(), 1024).run(URL).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnexpectedFailure);
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn a_panicking_stage_still_removes_the_work_dir() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .captions
            .expect_fetch_captions()
            .returning(|_| Err(unavailable()));
        writes_audio(&mut mocks.extractor, 64);
        mocks
            .speech
            .expect_transcribe()
            .returning(|_| panic!("speech client bug"));
        let pipeline = Arc::new(mocks.build(root.path(), 1024));

        let handle = tokio::spawn(async move { pipeline.run(URL).await });
        let join_error = handle.await.unwrap_err();

        assert!(join_error.is_panic());
        assert!(is_empty_dir(root.path()));
    }

    /// Writes partial audio, then stalls like a hung download
    struct StalledExtractor {
        work_dir: Arc<std::sync::Mutex<Option<PathBuf>>>,
    }

    #[async_trait::async_trait]
    impl AudioExtractor for StalledExtractor {
        async fn extract_audio(&self, _url: &str, work_dir: &Path) -> Result<PathBuf, TranscriptError> {
            std::fs::write(work_dir.join("audio.part"), b"partial").unwrap();
            *self.work_dir.lock().unwrap() = Some(work_dir.to_path_buf());
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(work_dir.join("audio.mp3"))
        }

        fn tool_name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn dropping_an_in_flight_run_removes_the_work_dir() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .captions
            .expect_fetch_captions()
            .returning(|_| Err(unavailable()));
        mocks.speech.expect_transcribe().never();
        let seen = Arc::new(std::sync::Mutex::new(None));

        let pipeline = TranscriptPipeline::new(
            Box::new(mocks.captions),
            Box::new(StalledExtractor {
                work_dir: Arc::clone(&seen),
            }),
            Box::new(mocks.compressor),
            Box::new(mocks.speech),
            Arc::new(mocks.tools),
            PipelineSettings {
                min_transcript_chars: 20,
                max_upload_bytes: 1024,
                require_encoder: true,
                encoder_name: "ffmpeg".to_string(),
                temp_root: Some(root.path().to_path_buf()),
            },
        );

        let outcome = tokio::time::timeout(Duration::from_millis(200), pipeline.run(URL)).await;

        assert!(outcome.is_err());
        let work_dir = seen.lock().unwrap().clone().expect("extraction started");
        assert!(!work_dir.exists());
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn too_short_speech_output_is_an_empty_result() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .captions
            .expect_fetch_captions()
            .returning(|_| Err(unavailable()));
        writes_audio(&mut mocks.extractor, 64);
        mocks
            .speech
            .expect_transcribe()
            .returning(|_| Ok("thank you.".to_string()));

        let err = mocks.build(root.path(), 1024).run(URL).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SpeechServiceEmptyResult);
    }
}
