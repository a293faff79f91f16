use anyhow::{Context, Result};
use std::path::Path;

use crate::utils::collapse_whitespace;

/// Extensions accepted as plain-text documents
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text", "srt", "vtt"];

/// A text document submitted for analysis instead of a video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub text: String,
}

impl Document {
    pub fn new(title: impl Into<String>, text: &str) -> Self {
        Self {
            title: title.into(),
            text: collapse_whitespace(text),
        }
    }
}

/// Load a local text document, using the file stem as its title
pub async fn load_document(path: &Path) -> Result<Document> {
    if !path.is_file() {
        anyhow::bail!("Document does not exist: {}", path.display());
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();
    if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
        anyhow::bail!(
            "Unsupported document type '{}'; expected one of: {}",
            extension,
            TEXT_EXTENSIONS.join(", ")
        );
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let text = String::from_utf8(bytes).context("Document is not valid UTF-8")?;

    let title = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("Document")
        .replace(['_', '-'], " ");

    Ok(Document::new(title, &text))
}
