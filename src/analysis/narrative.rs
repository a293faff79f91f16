use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::NarrativeConfig;
use crate::utils::truncate_chars;

pub const FALLBACK_SUMMARY: &str = "Summary is unavailable for this content.";
pub const FALLBACK_EXPLANATION: &str =
    "A virality explanation could not be generated for this content.";

/// Prompts stay well inside the model's context window
const MAX_PROMPT_TRANSCRIPT_CHARS: usize = 30_000;

/// A follow-up content idea
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub content_idea: String,
    pub suggested_title: String,
    #[serde(default)]
    pub talking_points: Vec<String>,
}

impl Recommendation {
    pub fn fallback() -> Self {
        Self {
            content_idea: "Recommendations are unavailable right now.".to_string(),
            suggested_title: "N/A".to_string(),
            talking_points: Vec::new(),
        }
    }
}

/// Generates the prose parts of an analysis
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;

    async fn explain_virality(
        &self,
        title: &str,
        view_count: u64,
        like_count: u64,
        summary: &str,
    ) -> Result<String>;

    async fn recommend(&self, category: &str, summary: &str, explanation: &str)
        -> Result<Recommendation>;
}

/// Gemini `generateContent` client
pub struct GeminiNarrator {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl GeminiNarrator {
    pub fn new(config: &NarrativeConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .context("GEMINI_API_KEY is not configured")?;

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini returned {}: {}", status, truncate_chars(&body, 200));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("Unparseable Gemini response")?;
        parsed.text()
    }
}

#[async_trait]
impl Narrator for GeminiNarrator {
    async fn summarize(&self, text: &str) -> Result<String> {
        let excerpt = truncate_chars(text, MAX_PROMPT_TRANSCRIPT_CHARS);
        let prompt = format!(
            "Summarize the following video transcript in one concise paragraph. \
             Focus on the main message and the most memorable moments.\n\n\
             Transcript:\n{}",
            excerpt
        );
        self.generate(&prompt).await
    }

    async fn explain_virality(
        &self,
        title: &str,
        view_count: u64,
        like_count: u64,
        summary: &str,
    ) -> Result<String> {
        let prompt = format!(
            "A video titled \"{}\" has {} views and {} likes.\n\
             Summary: {}\n\n\
             In two or three sentences, explain why this content did or did not spread, \
             citing the hook, the audience, and the format.",
            title, view_count, like_count, summary
        );
        self.generate(&prompt).await
    }

    async fn recommend(
        &self,
        category: &str,
        summary: &str,
        explanation: &str,
    ) -> Result<Recommendation> {
        let prompt = format!(
            "You are a content strategist for the {} category.\n\
             Summary of a reference video: {}\n\
             Why it performed the way it did: {}\n\n\
             Propose one new video. Reply with JSON only, shaped as \
             {{\"content_idea\": string, \"suggested_title\": string, \"talking_points\": [string]}}.",
            category, summary, explanation
        );
        let reply = self.generate(&prompt).await?;
        parse_recommendation(&reply)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Result<String> {
        let text = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("Gemini returned no text");
        }
        Ok(text.to_string())
    }
}

/// Drop a surrounding markdown code fence (with or without a language tag)
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_recommendation(reply: &str) -> Result<Recommendation> {
    serde_json::from_str(strip_code_fences(reply)).context("Recommendation reply is not valid JSON")
}
