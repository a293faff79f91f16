use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::MetadataConfig;
use crate::extractors::VideoId;

static ISO_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?").expect("duration regex is valid"));

/// Video details shown alongside an analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub duration_seconds: u64,
    pub thumbnail_url: Option<String>,
    pub channel_name: String,
    pub view_count: u64,
    pub like_count: u64,
    pub published_at: Option<DateTime<Utc>>,
    pub description: String,
}

impl VideoMetadata {
    /// Metadata for text that did not come from a video
    pub fn for_document(title: &str) -> Self {
        Self {
            title: title.to_string(),
            duration_seconds: 0,
            thumbnail_url: None,
            channel_name: "Submitted document".to_string(),
            view_count: 0,
            like_count: 0,
            published_at: None,
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("YOUTUBE_API_KEY is not configured on the server")]
    MissingApiKey,
}

/// Looks up video metadata. `Ok(None)` covers unknown videos and failed lookups alike.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_metadata(&self, id: &VideoId) -> Result<Option<VideoMetadata>, MetadataError>;
}

/// YouTube Data API v3 client
pub struct YouTubeDataClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl YouTubeDataClient {
    pub fn new(config: &MetadataConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MetadataSource for YouTubeDataClient {
    async fn fetch_metadata(&self, id: &VideoId) -> Result<Option<VideoMetadata>, MetadataError> {
        let api_key = self.api_key.as_deref().ok_or(MetadataError::MissingApiKey)?;

        let url = format!("{}/videos", self.base_url);
        tracing::info!("Fetching metadata for {}", id);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet,statistics,contentDetails"),
                ("id", id.as_str()),
                ("key", api_key),
            ])
            .send()
            .await
            .and_then(|response| response.error_for_status());

        let body = match response {
            Ok(response) => response.text().await,
            Err(e) => {
                tracing::error!("Metadata request failed: {}", e);
                return Ok(None);
            }
        };

        match body {
            Ok(body) => Ok(parse_videos_response(&body)),
            Err(e) => {
                tracing::error!("Failed to read metadata response: {}", e);
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VideoItem {
    snippet: Snippet,
    statistics: Statistics,
    content_details: ContentDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Snippet {
    title: Option<String>,
    channel_title: Option<String>,
    description: Option<String>,
    published_at: Option<String>,
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Thumbnails {
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

// The Data API encodes counters as decimal strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentDetails {
    duration: Option<String>,
}

/// Parse a `videos.list` response body; `None` when it holds no video
pub fn parse_videos_response(body: &str) -> Option<VideoMetadata> {
    let response: VideosResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Unparseable metadata response: {}", e);
            return None;
        }
    };

    let Some(item) = response.items.into_iter().next() else {
        tracing::warn!("No video found in metadata response");
        return None;
    };

    let count = |value: Option<String>| value.and_then(|v| v.parse().ok()).unwrap_or(0);

    Some(VideoMetadata {
        title: item.snippet.title.unwrap_or_else(|| "No Title".to_string()),
        duration_seconds: parse_duration(item.content_details.duration.as_deref().unwrap_or("")),
        thumbnail_url: item.snippet.thumbnails.high.map(|thumb| thumb.url),
        channel_name: item
            .snippet
            .channel_title
            .unwrap_or_else(|| "Unknown Channel".to_string()),
        view_count: count(item.statistics.view_count),
        like_count: count(item.statistics.like_count),
        published_at: item.snippet.published_at.as_deref().and_then(parse_timestamp),
        description: item.snippet.description.unwrap_or_default(),
    })
}

/// Seconds in an ISO 8601 `PT#H#M#S` duration; anything else is 0
pub fn parse_duration(duration: &str) -> u64 {
    let Some(rest) = duration.strip_prefix("PT") else {
        return 0;
    };
    let Some(captures) = ISO_DURATION.captures(rest) else {
        return 0;
    };

    let part = |index: usize| {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };

    part(1)
        .checked_mul(3600)
        .and_then(|seconds| seconds.checked_add(part(2).checked_mul(60)?))
        .and_then(|seconds| seconds.checked_add(part(3)))
        .unwrap_or(0)
}

/// RFC 3339, or a bare `YYYY-MM-DDTHH:MM:SS` taken as UTC; anything else is dropped
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }

    match NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            tracing::warn!("Ignoring unparseable publishedAt {:?}: {}", value, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "items": [{
            "id": "dQw4w9WgXcQ",
            "snippet": {
                "publishedAt": "2009-10-25T06:57:33Z",
                "title": "Never Gonna Give You Up",
                "description": "The official video",
                "channelTitle": "Rick Astley",
                "thumbnails": {"high": {"url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg"}}
            },
            "contentDetails": {"duration": "PT3M33S"},
            "statistics": {"viewCount": "1500000000", "likeCount": "17000000"}
        }]
    }"#;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("PT1H2M3S"), 3723);
        assert_eq!(parse_duration("PT0S"), 0);
        assert_eq!(parse_duration(""), 0);
        assert_eq!(parse_duration("PT90S"), 90);
        assert_eq!(parse_duration("PT4M"), 240);
        assert_eq!(parse_duration("P1DT2H"), 0);
    }

    #[test]
    fn oversized_durations_are_zero() {
        assert_eq!(parse_duration("PT9999999999999999H"), 0);
        assert_eq!(parse_duration("PT99999999999999999999S"), 0);
        assert_eq!(parse_duration("PT1H18446744073709551615S"), 0);
    }

    #[test]
    fn malformed_published_at_keeps_the_video() {
        let body = SAMPLE.replace("2009-10-25T06:57:33Z", "last tuesday");
        let metadata = parse_videos_response(&body).unwrap();

        assert_eq!(metadata.title, "Never Gonna Give You Up");
        assert!(metadata.published_at.is_none());

        let naive = SAMPLE.replace("2009-10-25T06:57:33Z", "2009-10-25T06:57:33");
        assert_eq!(
            parse_videos_response(&naive).unwrap().published_at.unwrap().to_rfc3339(),
            "2009-10-25T06:57:33+00:00"
        );
    }

    #[test]
    fn parses_full_item() {
        let metadata = parse_videos_response(SAMPLE).unwrap();

        assert_eq!(metadata.title, "Never Gonna Give You Up");
        assert_eq!(metadata.channel_name, "Rick Astley");
        assert_eq!(metadata.duration_seconds, 213);
        assert_eq!(metadata.view_count, 1_500_000_000);
        assert_eq!(metadata.like_count, 17_000_000);
        assert!(metadata.thumbnail_url.unwrap().ends_with("hqdefault.jpg"));
        assert_eq!(
            metadata.published_at.unwrap().to_rfc3339(),
            "2009-10-25T06:57:33+00:00"
        );
    }

    #[test]
    fn sparse_item_gets_defaults() {
        let metadata = parse_videos_response(r#"{"items": [{"id": "x"}]}"#).unwrap();

        assert_eq!(metadata.title, "No Title");
        assert_eq!(metadata.channel_name, "Unknown Channel");
        assert_eq!(metadata.view_count, 0);
        assert_eq!(metadata.like_count, 0);
        assert_eq!(metadata.duration_seconds, 0);
        assert!(metadata.published_at.is_none());
    }

    #[test]
    fn empty_or_broken_responses_are_none() {
        assert!(parse_videos_response(r#"{"items": []}"#).is_none());
        assert!(parse_videos_response("{}").is_none());
        assert!(parse_videos_response("<html>").is_none());
    }

    #[tokio::test]
    async fn missing_key_is_a_configuration_error() {
        let client = YouTubeDataClient::new(&MetadataConfig::default()).unwrap();
        let id = VideoId::parse("dQw4w9WgXcQ").unwrap();

        assert_eq!(
            client.fetch_metadata(&id).await,
            Err(MetadataError::MissingApiKey)
        );
    }

    #[tokio::test]
    async fn transport_failures_are_none() {
        let config = MetadataConfig {
            api_key: Some("test-key".to_string()),
            base_url: "http://127.0.0.1:9/youtube/v3".to_string(),
            timeout_secs: 5,
        };
        let client = YouTubeDataClient::new(&config).unwrap();
        let id = VideoId::parse("dQw4w9WgXcQ").unwrap();

        assert_eq!(client.fetch_metadata(&id).await, Ok(None));
    }
}
