//! Caption lookup.
//!
//! [`CaptionFetcher`] holds the language policy: preferred languages first, then whatever
//! track the platform lists first. The wire work sits behind [`CaptionsApi`];
//! [`InnertubeCaptions`] lists tracks through the InnerTube `player` endpoint and downloads
//! each track as timed-text XML.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::VideoId;
use crate::config::CaptionsConfig;
use crate::transcribe::TranscriptSource;
use crate::utils::{collapse_whitespace, without_query_param};
use crate::TranscriptError;

/// Android client identity accepted by the InnerTube player endpoint
const INNERTUBE_CLIENT_NAME: &str = "ANDROID";
const INNERTUBE_CLIENT_VERSION: &str = "20.10.38";

/// Caption text for one video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captions {
    pub text: String,
    pub language_code: String,
    pub source: TranscriptSource,
}

/// One caption track the platform offers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    pub is_generated: bool,
}

/// Why the platform could not give us captions
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptionsFailure {
    #[error("no transcript found for {0}")]
    NoTranscriptFound(String),

    #[error("transcripts are disabled for this video")]
    TranscriptsDisabled,

    #[error("video unavailable: {0}")]
    VideoUnavailable(String),

    #[error("malformed caption response: {0}")]
    Malformed(String),

    #[error("caption request failed: {0}")]
    Transport(String),
}

impl From<CaptionsFailure> for TranscriptError {
    fn from(failure: CaptionsFailure) -> Self {
        TranscriptError::CaptionsUnavailable(failure.to_string())
    }
}

/// Something that can produce caption text for a video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Fetch captions, failing with `TranscriptError::CaptionsUnavailable`
    async fn fetch_captions(&self, id: &VideoId) -> Result<Captions, TranscriptError>;
}

/// Wire access to the platform caption service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionsApi: Send + Sync {
    /// List available tracks in platform order
    async fn list_tracks(&self, id: &VideoId) -> Result<Vec<CaptionTrack>, CaptionsFailure>;

    /// Download one track as its text segments, in chronological order
    async fn fetch_track(&self, track: &CaptionTrack) -> Result<Vec<String>, CaptionsFailure>;
}

/// Caption fetcher applying the language preference and fallback policy
pub struct CaptionFetcher {
    api: Box<dyn CaptionsApi>,
    languages: Vec<String>,
}

impl CaptionFetcher {
    pub fn new(api: Box<dyn CaptionsApi>, languages: Vec<String>) -> Self {
        Self { api, languages }
    }

    /// Fetcher talking to the real platform
    pub fn from_config(config: &CaptionsConfig) -> crate::Result<Self> {
        let api = InnertubeCaptions::new(config)?;
        Ok(Self::new(Box::new(api), config.languages.clone()))
    }

    /// First track matching the preferred languages; manual tracks win over generated ones
    fn preferred_track<'a>(&self, tracks: &'a [CaptionTrack]) -> Option<&'a CaptionTrack> {
        self.languages.iter().find_map(|lang| {
            let matches = |track: &&CaptionTrack| track.language_code.eq_ignore_ascii_case(lang);
            tracks
                .iter()
                .filter(matches)
                .find(|track| !track.is_generated)
                .or_else(|| tracks.iter().find(matches))
        })
    }

    async fn fetch_text(&self, track: &CaptionTrack) -> Result<String, CaptionsFailure> {
        let segments = self.api.fetch_track(track).await?;
        let text = segments
            .iter()
            .map(|segment| segment.trim())
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            return Err(CaptionsFailure::NoTranscriptFound(track.language_code.clone()));
        }
        Ok(text)
    }
}

#[async_trait]
impl CaptionSource for CaptionFetcher {
    async fn fetch_captions(&self, id: &VideoId) -> Result<Captions, TranscriptError> {
        let tracks = self.api.list_tracks(id).await?;
        if tracks.is_empty() {
            return Err(CaptionsFailure::TranscriptsDisabled.into());
        }

        let mut failed_track = None;
        match self.preferred_track(&tracks) {
            Some(track) => match self.fetch_text(track).await {
                Ok(text) => {
                    tracing::info!("Found {} captions", track.language_code);
                    return Ok(Captions {
                        text,
                        language_code: track.language_code.clone(),
                        source: TranscriptSource::OfficialCaption,
                    });
                }
                // Only a "not found" style failure may fall through to other languages.
                Err(CaptionsFailure::NoTranscriptFound(_)) | Err(CaptionsFailure::Malformed(_)) => {
                    failed_track = Some(track);
                }
                Err(other) => return Err(other.into()),
            },
            None => {
                tracing::info!(
                    "No captions in {}; trying first available language",
                    self.languages.join(", ")
                );
            }
        }

        let first = &tracks[0];
        if failed_track == Some(first) {
            return Err(CaptionsFailure::NoTranscriptFound(self.languages.join(", ")).into());
        }

        let text = self.fetch_text(first).await?;
        tracing::info!("Using fallback {} captions", first.language_code);
        Ok(Captions {
            text,
            language_code: first.language_code.clone(),
            source: TranscriptSource::FallbackLanguageCaption,
        })
    }
}

/// Caption access through YouTube's InnerTube API
pub struct InnertubeCaptions {
    client: Client,
    base_url: String,
}

impl InnertubeCaptions {
    pub fn new(config: &CaptionsConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CaptionsApi for InnertubeCaptions {
    async fn list_tracks(&self, id: &VideoId) -> Result<Vec<CaptionTrack>, CaptionsFailure> {
        let url = format!("{}/youtubei/v1/player?prettyPrint=false", self.base_url);
        let body = serde_json::json!({
            "context": {
                "client": {
                    "clientName": INNERTUBE_CLIENT_NAME,
                    "clientVersion": INNERTUBE_CLIENT_VERSION,
                }
            },
            "videoId": id.as_str(),
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CaptionsFailure::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(CaptionsFailure::VideoUnavailable(id.to_string()));
            }
            status => return Err(CaptionsFailure::Transport(format!("HTTP {}", status))),
        }

        let json = response
            .text()
            .await
            .map_err(|e| CaptionsFailure::Transport(e.to_string()))?;

        parse_player_response(&json)
    }

    async fn fetch_track(&self, track: &CaptionTrack) -> Result<Vec<String>, CaptionsFailure> {
        // srv3 is the richer format; the plain timed-text XML is what the parser reads.
        let url = without_query_param(&track.base_url, "fmt")
            .map_err(|e| CaptionsFailure::Malformed(e.to_string()))?;

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CaptionsFailure::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CaptionsFailure::NoTranscriptFound(format!(
                "{} (HTTP {})",
                track.language_code,
                response.status()
            )));
        }

        let xml = response
            .text()
            .await
            .map_err(|e| CaptionsFailure::Transport(e.to_string()))?;

        parse_timedtext(&xml)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    captions: Option<PlayerCaptions>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayerCaptions {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    tracklist: Option<Tracklist>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tracklist {
    #[serde(default)]
    caption_tracks: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrack {
    base_url: String,
    language_code: String,
    kind: Option<String>,
}

/// Turn an InnerTube player response into the caption track list
pub fn parse_player_response(json: &str) -> Result<Vec<CaptionTrack>, CaptionsFailure> {
    let player: PlayerResponse =
        serde_json::from_str(json).map_err(|e| CaptionsFailure::Malformed(e.to_string()))?;

    if let Some(status) = &player.playability_status {
        if status.status != "OK" {
            let reason = status.reason.clone().unwrap_or_else(|| status.status.clone());
            return Err(CaptionsFailure::VideoUnavailable(reason));
        }
    }

    let tracks = player
        .captions
        .and_then(|captions| captions.tracklist)
        .map(|tracklist| tracklist.caption_tracks)
        .ok_or(CaptionsFailure::TranscriptsDisabled)?;

    Ok(tracks
        .into_iter()
        .map(|raw| CaptionTrack {
            base_url: raw.base_url,
            language_code: raw.language_code,
            is_generated: raw.kind.as_deref() == Some("asr"),
        })
        .collect())
}

static TEXT_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<text\b[^>]*>(.*?)</text>").expect("text element regex is valid"));
static INNER_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("inner tag regex is valid"));
static NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("numeric entity regex is valid"));

/// Parse timed-text XML into plain segment strings
pub fn parse_timedtext(xml: &str) -> Result<Vec<String>, CaptionsFailure> {
    let xml = xml.trim();
    if !xml.contains("<transcript") {
        return Err(CaptionsFailure::Malformed(
            "timed-text body has no <transcript> root".to_string(),
        ));
    }

    Ok(TEXT_ELEMENT
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|content| {
            let stripped = INNER_TAG.replace_all(content.as_str(), "");
            collapse_whitespace(&decode_entities(&stripped))
        })
        .filter(|segment| !segment.is_empty())
        .collect())
}

/// Decode the XML/HTML entities YouTube emits; captions are often escaped twice
fn decode_entities(text: &str) -> String {
    let once = text.replace("&amp;", "&");
    let named = once
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");

    NUMERIC_ENTITY
        .replace_all(&named, |caps: &regex::Captures| {
            let raw = &caps[1];
            let code = match raw.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => raw.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn track(lang: &str, generated: bool) -> CaptionTrack {
        CaptionTrack {
            base_url: format!("https://www.youtube.com/api/timedtext?v=x&lang={lang}"),
            language_code: lang.to_string(),
            is_generated: generated,
        }
    }

    fn id() -> VideoId {
        VideoId::parse("dQw4w9WgXcQ").unwrap()
    }

    fn fetcher(api: MockCaptionsApi) -> CaptionFetcher {
        CaptionFetcher::new(Box::new(api), vec!["id".to_string(), "en".to_string()])
    }

    #[tokio::test]
    async fn preferred_language_wins_and_is_official() {
        let mut api = MockCaptionsApi::new();
        api.expect_list_tracks()
            .returning(|_| Ok(vec![track("de", false), track("en", false)]));
        api.expect_fetch_track()
            .withf(|track| track.language_code == "en")
            .times(1)
            .returning(|_| Ok(vec!["hello".into(), " world ".into(), "".into()]));

        let captions = fetcher(api).fetch_captions(&id()).await.unwrap();

        assert_eq!(captions.text, "hello world");
        assert_eq!(captions.language_code, "en");
        assert_eq!(captions.source, TranscriptSource::OfficialCaption);
    }

    #[tokio::test]
    async fn language_order_beats_track_order_and_manual_beats_generated() {
        let mut api = MockCaptionsApi::new();
        api.expect_list_tracks().returning(|_| {
            Ok(vec![track("en", false), track("id", true), track("id", false)])
        });
        api.expect_fetch_track()
            .withf(|track| track.language_code == "id" && !track.is_generated)
            .times(1)
            .returning(|_| Ok(vec!["halo semuanya".into()]));

        let captions = fetcher(api).fetch_captions(&id()).await.unwrap();

        assert_eq!(captions.language_code, "id");
    }

    #[tokio::test]
    async fn falls_back_to_first_listed_language() {
        let mut api = MockCaptionsApi::new();
        api.expect_list_tracks()
            .returning(|_| Ok(vec![track("ja", true), track("fr", false)]));
        api.expect_fetch_track()
            .withf(|track| track.language_code == "ja")
            .times(1)
            .returning(|_| Ok(vec!["こんにちは".into()]));

        let captions = fetcher(api).fetch_captions(&id()).await.unwrap();

        assert_eq!(captions.source, TranscriptSource::FallbackLanguageCaption);
        assert_eq!(captions.language_code, "ja");
    }

    #[tokio::test]
    async fn malformed_preferred_track_falls_back_like_not_found() {
        let mut api = MockCaptionsApi::new();
        api.expect_list_tracks()
            .returning(|_| Ok(vec![track("es", false), track("en", false)]));
        api.expect_fetch_track()
            .withf(|track| track.language_code == "en")
            .times(1)
            .returning(|_| Err(CaptionsFailure::Malformed("bad xml".into())));
        api.expect_fetch_track()
            .withf(|track| track.language_code == "es")
            .times(1)
            .returning(|_| Ok(vec!["hola a todos".into()]));

        let captions = fetcher(api).fetch_captions(&id()).await.unwrap();

        assert_eq!(captions.source, TranscriptSource::FallbackLanguageCaption);
        assert_eq!(captions.text, "hola a todos");
    }

    #[tokio::test]
    async fn disabled_and_unavailable_do_not_enumerate() {
        for failure in [
            CaptionsFailure::TranscriptsDisabled,
            CaptionsFailure::VideoUnavailable("Private video".into()),
        ] {
            let mut api = MockCaptionsApi::new();
            let failure_clone = failure.clone();
            api.expect_list_tracks()
                .returning(move |_| Err(failure_clone.clone()));
            api.expect_fetch_track().never();

            let err = fetcher(api).fetch_captions(&id()).await.unwrap_err();

            assert_eq!(err.kind(), ErrorKind::CaptionsUnavailable);
        }
    }

    #[tokio::test]
    async fn empty_track_list_is_unavailable() {
        let mut api = MockCaptionsApi::new();
        api.expect_list_tracks().returning(|_| Ok(Vec::new()));

        let err = fetcher(api).fetch_captions(&id()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CaptionsUnavailable);
    }

    #[tokio::test]
    async fn failed_preferred_track_is_not_retried_as_fallback() {
        let mut api = MockCaptionsApi::new();
        api.expect_list_tracks().returning(|_| Ok(vec![track("en", false)]));
        api.expect_fetch_track()
            .times(1)
            .returning(|_| Ok(vec!["   ".into()]));

        let err = fetcher(api).fetch_captions(&id()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CaptionsUnavailable);
    }

    #[test]
    fn player_response_lists_tracks_in_order() {
        let json = r#"{
            "playabilityStatus": {"status": "OK"},
            "captions": {"playerCaptionsTracklistRenderer": {"captionTracks": [
                {"baseUrl": "https://example/a", "languageCode": "en", "kind": "asr"},
                {"baseUrl": "https://example/b", "languageCode": "id"}
            ]}}
        }"#;

        let tracks = parse_player_response(json).unwrap();

        assert_eq!(tracks.len(), 2);
        assert!(tracks[0].is_generated);
        assert_eq!(tracks[1].language_code, "id");
        assert!(!tracks[1].is_generated);
    }

    #[test]
    fn player_response_failure_modes() {
        let private = r#"{"playabilityStatus": {"status": "LOGIN_REQUIRED", "reason": "This video is private"}}"#;
        assert_eq!(
            parse_player_response(private),
            Err(CaptionsFailure::VideoUnavailable("This video is private".into()))
        );

        let no_captions = r#"{"playabilityStatus": {"status": "OK"}}"#;
        assert_eq!(
            parse_player_response(no_captions),
            Err(CaptionsFailure::TranscriptsDisabled)
        );

        assert!(matches!(
            parse_player_response("<html>"),
            Err(CaptionsFailure::Malformed(_))
        ));
    }

    #[test]
    fn timedtext_segments_are_decoded_and_cleaned() {
        let xml = r##"<?xml version="1.0" encoding="utf-8" ?><transcript>
            <text start="0.0" dur="1.5">Hey there &amp; welcome</text>
            <text start="1.5" dur="2.0">it&amp;#39;s <font color="#E5E5E5">really</font>
            good</text>
            <text start="3.5" dur="1.0"></text>
            <text start="4.5" dur="1.0">&lt;music&gt;</text>
        </transcript>"##;

        let segments = parse_timedtext(xml).unwrap();

        assert_eq!(
            segments,
            vec!["Hey there & welcome", "it's really good", "<music>"]
        );
    }

    #[test]
    fn timedtext_without_root_is_malformed() {
        assert!(matches!(
            parse_timedtext(""),
            Err(CaptionsFailure::Malformed(_))
        ));
        assert!(matches!(
            parse_timedtext("<html><body>consent</body></html>"),
            Err(CaptionsFailure::Malformed(_))
        ));
    }
}
