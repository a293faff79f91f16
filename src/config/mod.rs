use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variables carrying credentials. They are never written to the config file.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const YOUTUBE_API_KEY_ENV: &str = "YOUTUBE_API_KEY";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const YOUTUBE_COOKIES_PATH_ENV: &str = "YOUTUBE_COOKIES_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Caption lookup settings
    pub captions: CaptionsConfig,

    /// External executables used by the audio fallback
    pub tools: ToolsConfig,

    /// Speech-to-text service settings
    pub speech: SpeechConfig,

    /// Video metadata API settings
    pub metadata: MetadataConfig,

    /// Narrative text generation settings
    pub narrative: NarrativeConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionsConfig {
    /// Preferred caption languages, most preferred first
    pub languages: Vec<String>,

    /// Base URL of the caption service
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Media downloader executable
    pub downloader: String,

    pub downloader_version_flag: String,

    /// Audio encoder executable
    pub encoder: String,

    pub encoder_version_flag: String,

    /// Timeout for each availability probe
    pub probe_timeout_secs: u64,

    /// Timeout for one audio download
    pub download_timeout_secs: u64,

    /// Timeout for one compression pass
    pub compress_timeout_secs: u64,

    /// Cookie file handed to the downloader when present on disk
    pub cookies_path: Option<PathBuf>,

    /// Refuse the audio fallback when the encoder is missing
    pub require_encoder: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// API key, read from OPENAI_API_KEY
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub base_url: String,

    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Files above this size are compressed before upload
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// API key, read from YOUTUBE_API_KEY
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub base_url: String,

    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    /// API key, read from GEMINI_API_KEY
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub base_url: String,

    pub model: String,

    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Parent directory for per-run temporary directories
    pub temp_dir: Option<PathBuf>,

    /// Minimum trimmed transcript length accepted as meaningful
    pub min_transcript_chars: usize,

    /// Address the HTTP server binds to
    pub bind_address: String,

    /// Default output format
    pub default_output_format: String,
}

impl Default for CaptionsConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string(), "en-US".to_string(), "en-GB".to_string()],
            base_url: "https://www.youtube.com".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            downloader: "yt-dlp".to_string(),
            downloader_version_flag: "--version".to_string(),
            encoder: "ffmpeg".to_string(),
            encoder_version_flag: "-version".to_string(),
            probe_timeout_secs: 10,
            download_timeout_secs: 300,
            compress_timeout_secs: 300,
            cookies_path: Some(PathBuf::from("./cookies.txt")),
            require_encoder: true,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "whisper-1".to_string(),
            timeout_secs: 120,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            min_transcript_chars: 20,
            bind_address: "127.0.0.1:8000".to_string(),
            default_output_format: "text".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            captions: CaptionsConfig::default(),
            tools: ToolsConfig::default(),
            speech: SpeechConfig::default(),
            metadata: MetadataConfig::default(),
            narrative: NarrativeConfig::default(),
            app: AppConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file or create default.
    ///
    /// An explicit path that does not exist yields defaults without touching the disk; the
    /// default location gets a fresh config file written on first run.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let (config_path, is_explicit) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::config_path()?, false),
        };

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str::<Config>(&content)
                .context("Failed to parse config file")?
        } else {
            let config = Self::default();
            if !is_explicit {
                config.save_to(&config_path)?;
            }
            config
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("viralscope").join("config.yaml"))
    }

    /// Pull credentials and the cookie path from the environment
    pub fn apply_env(&mut self) {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(key) = read(OPENAI_API_KEY_ENV) {
            self.speech.api_key = Some(key);
        }
        if let Some(key) = read(YOUTUBE_API_KEY_ENV) {
            self.metadata.api_key = Some(key);
        }
        if let Some(key) = read(GEMINI_API_KEY_ENV) {
            self.narrative.api_key = Some(key);
        }
        if let Some(path) = read(YOUTUBE_COOKIES_PATH_ENV) {
            self.tools.cookies_path = Some(PathBuf::from(path));
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.captions.languages.iter().all(|lang| lang.trim().is_empty()) {
            anyhow::bail!("At least one caption language must be configured");
        }

        if self.app.min_transcript_chars == 0 {
            anyhow::bail!("app.min_transcript_chars must be greater than zero");
        }

        let timeouts = [
            ("captions.timeout_secs", self.captions.timeout_secs),
            ("tools.probe_timeout_secs", self.tools.probe_timeout_secs),
            ("tools.download_timeout_secs", self.tools.download_timeout_secs),
            ("tools.compress_timeout_secs", self.tools.compress_timeout_secs),
            ("speech.timeout_secs", self.speech.timeout_secs),
            ("metadata.timeout_secs", self.metadata.timeout_secs),
            ("narrative.timeout_secs", self.narrative.timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            anyhow::bail!("{} must be greater than zero", name);
        }

        if self.speech.max_upload_bytes == 0 {
            anyhow::bail!("speech.max_upload_bytes must be greater than zero");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        let mask = |key: &Option<String>| if key.is_some() { "set" } else { "not set" };

        println!("Current Configuration:");
        println!("  Caption Languages: {}", self.captions.languages.join(", "));
        println!("  Downloader: {}", self.tools.downloader);
        println!("  Encoder: {}", self.tools.encoder);
        match &self.tools.cookies_path {
            Some(path) => println!("  Cookies File: {}", path.display()),
            None => println!("  Cookies File: none"),
        }
        println!("  Speech Model: {} ({})", self.speech.model, mask(&self.speech.api_key));
        println!("  Metadata API Key: {}", mask(&self.metadata.api_key));
        println!("  Narrative Model: {} ({})", self.narrative.model, mask(&self.narrative.api_key));
        println!("  Min Transcript Chars: {}", self.app.min_transcript_chars);
        println!("  Bind Address: {}", self.app.bind_address);
        println!("  Default Format: {}", self.app.default_output_format);
    }
}
