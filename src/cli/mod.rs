use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "viralscope",
    about = "ViralScope - Score the viral potential of YouTube videos and written content",
    version,
    long_about = "Fetches a YouTube video's metadata and transcript (captions first, then audio download plus Whisper speech-to-text), and produces a summary, a viral-potential score and a follow-up content idea."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true, env = "VIRALSCOPE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a YouTube video, or a local text document with --document
    Analyze {
        /// YouTube URL (watch, youtu.be, embed, shorts or live link)
        #[arg(value_name = "URL", required_unless_present = "document")]
        url: Option<String>,

        /// Analyze a local text document instead of a video
        #[arg(short, long, value_name = "FILE", conflicts_with = "url")]
        document: Option<PathBuf>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format (defaults to the configured format)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Print the transcript of a YouTube video and where it came from
    Transcript {
        /// YouTube URL
        #[arg(value_name = "URL")]
        url: String,

        /// Save the transcript to a file instead of printing it
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Run the HTTP API
    Serve {
        /// Address to bind (defaults to the configured address)
        #[arg(short, long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Check which external tools and credentials are available
    Tools,

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable report
    Text,
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

impl OutputFormat {
    /// Parse a configured format name, falling back to text
    pub fn from_config(name: &str) -> Self {
        <Self as ValueEnum>::from_str(name, true).unwrap_or_else(|_| {
            tracing::warn!("Unknown output format '{}' in config; using text", name);
            OutputFormat::Text
        })
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_needs_url_or_document() {
        assert!(Cli::try_parse_from(["viralscope", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["viralscope", "analyze", "--document", "notes.md"]).is_ok());
        assert!(Cli::try_parse_from([
            "viralscope",
            "analyze",
            "https://youtu.be/dQw4w9WgXcQ",
            "--document",
            "notes.md"
        ])
        .is_err());
    }

    #[test]
    fn globals_work_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "viralscope",
            "transcript",
            "https://youtu.be/dQw4w9WgXcQ",
            "--quiet",
            "--config",
            "custom.yaml",
        ])
        .unwrap();

        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
    }

    #[test]
    fn configured_format_names() {
        assert_eq!(OutputFormat::from_config("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from_config("yaml"), OutputFormat::Yaml);
        assert_eq!(OutputFormat::from_config("pdf"), OutputFormat::Text);
    }
}
