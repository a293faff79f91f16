use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::analysis::{AnalysisError, AnalysisService, VideoAnalysis};
use crate::ErrorKind;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnalysisService>,
}

/// Body of `POST /analyze`: a video URL, or raw document text
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AnalyzeRequest {
    pub youtube_url: Option<String>,
    pub document_text: Option<String>,
    pub document_title: Option<String>,
}

#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    TooManyRequests(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            HttpError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            HttpError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            HttpError::Unprocessable(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            HttpError::TooManyRequests(detail) => (StatusCode::TOO_MANY_REQUESTS, detail),
            HttpError::Unavailable(detail) => (StatusCode::SERVICE_UNAVAILABLE, detail),
            HttpError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub fn error_mapper(error: AnalysisError) -> HttpError {
    let detail = error.to_string();

    match error {
        AnalysisError::InvalidUrl(_) => HttpError::BadRequest(detail),
        AnalysisError::VideoNotFound(_) => HttpError::NotFound(detail),
        AnalysisError::Metadata(_) => HttpError::Unavailable(detail),
        AnalysisError::InsufficientText(_) => HttpError::Unprocessable(detail),
        AnalysisError::Transcript(error) => match error.kind() {
            ErrorKind::InvalidUrl => HttpError::BadRequest(detail),
            ErrorKind::NoDownloadableAudio
            | ErrorKind::BotDetectionBlocked
            | ErrorKind::AudioExtractionFailed
            | ErrorKind::SpeechServiceEmptyResult
            | ErrorKind::CaptionsUnavailable => HttpError::Unprocessable(detail),
            ErrorKind::SpeechServiceRateLimited => HttpError::TooManyRequests(detail),
            ErrorKind::PrerequisiteMissing
            | ErrorKind::SpeechServiceUnauthorized
            | ErrorKind::SpeechServiceUnreachable
            | ErrorKind::AudioExtractionTimeout => HttpError::Unavailable(detail),
            ErrorKind::UnexpectedFailure => HttpError::Internal(
                "An unexpected error occurred while extracting video content.".to_string(),
            ),
        },
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/status/:task_id", get(task_status))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(bind: &str, service: Arc<AnalysisService>) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(AppState { service }))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<VideoAnalysis>, HttpError> {
    let Json(request) = payload.map_err(|rejection| HttpError::BadRequest(rejection.body_text()))?;

    let result = match (&request.youtube_url, &request.document_text) {
        (Some(url), _) if !url.trim().is_empty() => {
            tracing::info!(url = %url, "received analyze request");
            state.service.analyze_video(url.trim()).await
        }
        (_, Some(text)) => {
            tracing::info!(chars = text.len(), "received document analyze request");
            state
                .service
                .analyze_document(request.document_title.as_deref(), text)
                .await
        }
        _ => {
            return Err(HttpError::BadRequest(
                "youtube_url or document_text must be provided".to_string(),
            ))
        }
    };

    match result {
        Ok(analysis) => Ok(Json(analysis)),
        Err(error) => {
            tracing::error!(error = %error, "analyze request failed");
            Err(error_mapper(error))
        }
    }
}

/// Analyses run synchronously, so every task id reports as completed
async fn task_status(Path(task_id): Path<String>) -> Json<serde_json::Value> {
    Json(json!({
        "task_id": task_id,
        "status": "completed",
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tools = state.service.tools();
    let missing = tools.missing();
    Json(json!({
        "status": if missing.is_empty() { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "tools": tools,
        "missing": missing,
    }))
}
