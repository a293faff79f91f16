use anyhow::Result;
use async_trait::async_trait;

/// Like/view ratio that earns full engagement points
const FULL_ENGAGEMENT_RATIO: f64 = 0.04;
/// log10 of the view count that earns full reach points (10M views)
const FULL_REACH_LOG: f64 = 7.0;

const ENGAGEMENT_MAX: f64 = 35.0;
const REACH_MAX: f64 = 30.0;
const TITLE_MAX: u32 = 15;
const TRANSCRIPT_MAX: u32 = 20;

const HOOK_PHRASES: &[&str] = &[
    "you",
    "secret",
    "how to",
    "why",
    "never",
    "best",
    "mistake",
    "free",
    "right now",
    "story",
];

/// Scores the viral potential of a piece of content, 0 to 100
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ViralScorer: Send + Sync {
    async fn score(&self, transcript: &str, title: &str, view_count: u64, like_count: u64)
        -> Result<u8>;
}

/// Deterministic scorer built from engagement, reach, and title/transcript hooks
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicScorer;

#[async_trait]
impl ViralScorer for HeuristicScorer {
    async fn score(
        &self,
        transcript: &str,
        title: &str,
        view_count: u64,
        like_count: u64,
    ) -> Result<u8> {
        let total = engagement_points(view_count, like_count)
            + reach_points(view_count)
            + f64::from(title_points(title))
            + f64::from(transcript_points(transcript));

        tracing::debug!(view_count, like_count, total, "Scored content");
        Ok(total.round().clamp(0.0, 100.0) as u8)
    }
}

fn engagement_points(view_count: u64, like_count: u64) -> f64 {
    if view_count == 0 {
        return 0.0;
    }
    let ratio = like_count as f64 / view_count as f64;
    (ratio / FULL_ENGAGEMENT_RATIO * ENGAGEMENT_MAX).min(ENGAGEMENT_MAX)
}

fn reach_points(view_count: u64) -> f64 {
    if view_count == 0 {
        return 0.0;
    }
    ((view_count as f64).log10() / FULL_REACH_LOG * REACH_MAX).min(REACH_MAX)
}

fn title_points(title: &str) -> u32 {
    let mut points = 0;
    if title.chars().any(|c| c.is_ascii_digit()) {
        points += 4;
    }
    if title.contains('?') {
        points += 4;
    }
    if title.contains('!') {
        points += 3;
    }
    if (20..=70).contains(&title.trim().chars().count()) {
        points += 4;
    }
    points.min(TITLE_MAX)
}

fn transcript_points(transcript: &str) -> u32 {
    let words = transcript.split_whitespace().count();
    let mut points = match words {
        w if w >= 300 => 8,
        w if w >= 100 => 4,
        _ => 0,
    };

    let lowered = transcript.to_lowercase();
    let hooks = HOOK_PHRASES
        .iter()
        .filter(|phrase| lowered.contains(*phrase))
        .count() as u32;
    points += (hooks * 2).min(12);

    points.min(TRANSCRIPT_MAX)
}
