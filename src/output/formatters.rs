use anyhow::Result;
use std::fmt::Write;

use crate::analysis::VideoAnalysis;
use crate::transcribe::Transcript;
use crate::utils::format_duration;

/// Human-readable analysis report
pub fn format_as_text(analysis: &VideoAnalysis) -> String {
    let metadata = &analysis.video_metadata;
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "Title:        {}", metadata.title);
    let _ = writeln!(out, "Channel:      {}", metadata.channel_name);
    if metadata.duration_seconds > 0 {
        let _ = writeln!(out, "Duration:     {}", format_duration(metadata.duration_seconds));
    }
    let _ = writeln!(
        out,
        "Views/Likes:  {} / {}",
        metadata.view_count, metadata.like_count
    );
    if let Some(published) = metadata.published_at {
        let _ = writeln!(out, "Published:    {}", published.format("%Y-%m-%d"));
    }
    let _ = writeln!(out, "Source:       {}", analysis.transcript_source);
    let _ = writeln!(
        out,
        "Viral score:  {}/100 ({})",
        analysis.viral_score, analysis.viral_label
    );

    section(&mut out, "Summary", &analysis.summary);
    section(&mut out, "Why it performed", &analysis.viral_explanation);

    let recommendation = &analysis.recommendations;
    let _ = writeln!(out, "\nNext video\n----------");
    let _ = writeln!(out, "Idea:  {}", recommendation.content_idea);
    let _ = writeln!(out, "Title: {}", recommendation.suggested_title);
    for point in &recommendation.talking_points {
        let _ = writeln!(out, "  - {}", point);
    }

    if !analysis.degraded.is_empty() {
        let _ = writeln!(out, "\nFallbacks used: {}", analysis.degraded.join(", "));
    }

    out
}

fn section(out: &mut String, heading: &str, body: &str) {
    let _ = writeln!(out, "\n{}\n{}", heading, "-".repeat(heading.len()));
    let _ = writeln!(out, "{}", body);
}

pub fn format_as_json(analysis: &VideoAnalysis) -> Result<String> {
    Ok(serde_json::to_string_pretty(analysis)?)
}

pub fn format_as_yaml(analysis: &VideoAnalysis) -> Result<String> {
    Ok(serde_yaml::to_string(analysis)?)
}

/// Transcript with a one-line header naming where it came from
pub fn format_transcript(transcript: &Transcript) -> String {
    match &transcript.language {
        Some(language) => format!(
            "[{} | {}]\n{}",
            transcript.source, language, transcript.text
        ),
        None => format!("[{}]\n{}", transcript.source, transcript.text),
    }
}
