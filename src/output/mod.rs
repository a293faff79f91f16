use anyhow::Result;
use std::path::Path;

use crate::analysis::VideoAnalysis;
use crate::cli::OutputFormat;

pub mod formatters;

pub use formatters::*;

pub fn render(analysis: &VideoAnalysis, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_as_text(analysis)),
        OutputFormat::Json => format_as_json(analysis),
        OutputFormat::Yaml => format_as_yaml(analysis),
    }
}

/// Save analysis to file
pub fn save_to_file(analysis: &VideoAnalysis, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render(analysis, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print analysis to console
pub fn print_to_console(analysis: &VideoAnalysis, format: &OutputFormat) -> Result<()> {
    println!("{}", render(analysis, format)?);
    Ok(())
}
