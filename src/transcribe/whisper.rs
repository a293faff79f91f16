use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::config::SpeechConfig;
use crate::utils::truncate_chars;
use crate::TranscriptError;

/// Anything shorter than this is treated as the service hearing nothing
pub const MIN_SPEECH_CHARS: usize = 10;

/// Speech-to-text backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one audio file. No retries happen here.
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptError>;

    /// Whether credentials are present
    fn is_configured(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// OpenAI Whisper client (`POST /audio/transcriptions`)
pub struct WhisperClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl WhisperClient {
    pub fn new(config: &SpeechConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/audio/transcriptions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl SpeechToText for WhisperClient {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            TranscriptError::SpeechServiceUnauthorized("OPENAI_API_KEY is not configured".to_string())
        })?;

        // The file handle lives only as long as this request body.
        let file = tokio::fs::File::open(audio_path).await?;
        let length = file.metadata().await?.len();
        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let part = Part::stream_with_length(Body::from(file), length)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(TranscriptError::unexpected)?;
        let form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", part);

        tracing::info!("Sending {} bytes to {}", length, self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(TranscriptError::unexpected)?;

        let text = parsed.text.trim().to_string();
        if text.chars().count() < MIN_SPEECH_CHARS {
            return Err(TranscriptError::SpeechServiceEmptyResult);
        }

        Ok(text)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Map a non-success HTTP status from the speech service
pub fn classify_status(status: StatusCode, body: &str) -> TranscriptError {
    let detail = format!("HTTP {}: {}", status.as_u16(), truncate_chars(body, 200));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TranscriptError::SpeechServiceUnauthorized(detail)
        }
        StatusCode::TOO_MANY_REQUESTS => TranscriptError::SpeechServiceRateLimited(detail),
        status if status.is_server_error() => TranscriptError::SpeechServiceUnreachable(detail),
        _ => TranscriptError::UnexpectedFailure(detail),
    }
}

fn classify_transport_error(err: reqwest::Error) -> TranscriptError {
    if err.is_timeout() {
        TranscriptError::SpeechServiceUnreachable(format!("request timed out: {}", err))
    } else if err.is_connect() {
        TranscriptError::SpeechServiceUnreachable(format!("connection failed: {}", err))
    } else {
        TranscriptError::unexpected(err)
    }
}
