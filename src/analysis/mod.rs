use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::extractors::document::Document;
use crate::extractors::extract_video_id;
use crate::metadata::{MetadataError, MetadataSource, VideoMetadata, YouTubeDataClient};
use crate::tools::ToolAvailability;
use crate::transcribe::{TranscriptPipeline, TranscriptSource};
use crate::utils::is_meaningful;
use crate::{TranscriptError, TranscriptResult};

pub mod narrative;
pub mod scoring;

pub use narrative::{GeminiNarrator, Narrator, Recommendation};
pub use scoring::{HeuristicScorer, ViralScorer};

/// Score used when the scorer itself fails
pub const FALLBACK_SCORE: u8 = 50;

/// Category passed to the recommender
const RECOMMENDATION_CATEGORY: &str = "general";

/// Anything that can turn a URL into a transcript
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    async fn transcript(&self, url: &str) -> TranscriptResult;

    fn tools(&self) -> ToolAvailability;
}

#[async_trait]
impl TranscriptProvider for TranscriptPipeline {
    async fn transcript(&self, url: &str) -> TranscriptResult {
        self.run(url).await
    }

    fn tools(&self) -> ToolAvailability {
        *TranscriptPipeline::tools(self)
    }
}

/// Full analysis of one video or document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAnalysis {
    pub request_id: String,
    pub video_metadata: VideoMetadata,
    pub summary: String,
    pub timeline_summary: Vec<String>,
    pub viral_score: u8,
    pub viral_label: String,
    pub viral_explanation: String,
    pub recommendations: Recommendation,
    pub transcript_source: TranscriptSource,
    /// Parts of the analysis that fell back to fixed defaults
    pub degraded: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid YouTube URL: {0}")]
    InvalidUrl(String),

    #[error("Video not found or metadata unavailable: {0}")]
    VideoNotFound(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    #[error("Document text is too short to analyze (need at least {0} characters)")]
    InsufficientText(usize),
}

/// Bucket a score into its label
pub fn viral_label(score: u8) -> &'static str {
    match score {
        80..=u8::MAX => "Very High Potential",
        60..=79 => "Good Potential",
        _ => "Needs Improvement",
    }
}

/// Composes metadata, transcript, narrative, and score into a `VideoAnalysis`
pub struct AnalysisService {
    metadata: Arc<dyn MetadataSource>,
    transcripts: Arc<dyn TranscriptProvider>,
    narrator: Arc<dyn Narrator>,
    scorer: Arc<dyn ViralScorer>,
    min_transcript_chars: usize,
}

impl AnalysisService {
    pub fn new(
        metadata: Arc<dyn MetadataSource>,
        transcripts: Arc<dyn TranscriptProvider>,
        narrator: Arc<dyn Narrator>,
        scorer: Arc<dyn ViralScorer>,
        min_transcript_chars: usize,
    ) -> Self {
        Self {
            metadata,
            transcripts,
            narrator,
            scorer,
            min_transcript_chars,
        }
    }

    pub async fn from_config(config: &Config) -> crate::Result<Self> {
        let pipeline = TranscriptPipeline::from_config(config).await?;

        Ok(Self::new(
            Arc::new(YouTubeDataClient::new(&config.metadata)?),
            Arc::new(pipeline),
            Arc::new(GeminiNarrator::new(&config.narrative)?),
            Arc::new(HeuristicScorer),
            config.app.min_transcript_chars,
        ))
    }

    pub fn tools(&self) -> ToolAvailability {
        self.transcripts.tools()
    }

    pub async fn analyze_video(&self, url: &str) -> Result<VideoAnalysis, AnalysisError> {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("analysis", request_id = %request_id, url = %url);

        self.video_analysis(request_id, url).instrument(span).await
    }

    pub async fn analyze_document(
        &self,
        title: Option<&str>,
        text: &str,
    ) -> Result<VideoAnalysis, AnalysisError> {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("analysis", request_id = %request_id, kind = "document");

        self.document_analysis(request_id, title, text)
            .instrument(span)
            .await
    }

    async fn video_analysis(
        &self,
        request_id: String,
        url: &str,
    ) -> Result<VideoAnalysis, AnalysisError> {
        let id = extract_video_id(url).ok_or_else(|| AnalysisError::InvalidUrl(url.to_string()))?;

        let metadata = self
            .metadata
            .fetch_metadata(&id)
            .await?
            .ok_or_else(|| AnalysisError::VideoNotFound(id.to_string()))?;
        tracing::info!("Analyzing \"{}\" by {}", metadata.title, metadata.channel_name);

        let transcript = self.transcripts.transcript(url).await?;

        Ok(self
            .compose(request_id, metadata, &transcript.text, transcript.source)
            .await)
    }

    async fn document_analysis(
        &self,
        request_id: String,
        title: Option<&str>,
        text: &str,
    ) -> Result<VideoAnalysis, AnalysisError> {
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or("Untitled document");
        let document = Document::new(title, text);

        if !is_meaningful(&document.text, self.min_transcript_chars) {
            return Err(AnalysisError::InsufficientText(self.min_transcript_chars));
        }

        let metadata = VideoMetadata::for_document(&document.title);
        Ok(self
            .compose(request_id, metadata, &document.text, TranscriptSource::Document)
            .await)
    }

    async fn compose(
        &self,
        request_id: String,
        metadata: VideoMetadata,
        text: &str,
        source: TranscriptSource,
    ) -> VideoAnalysis {
        let mut degraded = Vec::new();

        let summary = match self.narrator.summarize(text).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("Summary failed, using fallback: {:#}", e);
                degraded.push("summary".to_string());
                narrative::FALLBACK_SUMMARY.to_string()
            }
        };

        let viral_explanation = match self
            .narrator
            .explain_virality(&metadata.title, metadata.view_count, metadata.like_count, &summary)
            .await
        {
            Ok(explanation) => explanation,
            Err(e) => {
                tracing::warn!("Virality explanation failed, using fallback: {:#}", e);
                degraded.push("viral_explanation".to_string());
                narrative::FALLBACK_EXPLANATION.to_string()
            }
        };

        let recommendations = match self
            .narrator
            .recommend(RECOMMENDATION_CATEGORY, &summary, &viral_explanation)
            .await
        {
            Ok(recommendation) => recommendation,
            Err(e) => {
                tracing::warn!("Recommendation failed, using fallback: {:#}", e);
                degraded.push("recommendations".to_string());
                Recommendation::fallback()
            }
        };

        let viral_score = match self
            .scorer
            .score(text, &metadata.title, metadata.view_count, metadata.like_count)
            .await
        {
            Ok(score) => score.min(100),
            Err(e) => {
                tracing::warn!("Scoring failed, using fallback: {:#}", e);
                degraded.push("viral_score".to_string());
                FALLBACK_SCORE
            }
        };

        tracing::info!(viral_score, source = %source, "Analysis complete");

        VideoAnalysis {
            request_id,
            video_metadata: metadata,
            summary,
            timeline_summary: Vec::new(),
            viral_score,
            viral_label: viral_label(viral_score).to_string(),
            viral_explanation,
            recommendations,
            transcript_source: source,
            degraded,
        }
    }
}
