use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use viralscope::cli::{Cli, Commands, OutputFormat};
use viralscope::extractors::document::load_document;
use viralscope::transcribe::{SpeechToText, WhisperClient};
use viralscope::{output, server, AnalysisService, Config, ToolAvailability, TranscriptPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);

    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Analyze {
            url,
            document,
            output,
            format,
        } => {
            let format = format
                .unwrap_or_else(|| OutputFormat::from_config(&config.app.default_output_format));
            let service = AnalysisService::from_config(&config).await?;

            let progress = spinner(cli.quiet, "Analyzing...");
            let work = async {
                let analysis = match (url, document) {
                    (_, Some(path)) => {
                        let document = load_document(&path).await?;
                        service
                            .analyze_document(Some(&document.title), &document.text)
                            .await?
                    }
                    (Some(url), None) => service.analyze_video(&url).await?,
                    (None, None) => anyhow::bail!("Provide a YouTube URL or --document <FILE>"),
                };
                Ok::<_, anyhow::Error>(analysis)
            };
            let result = interruptible(work).await;
            progress.finish_and_clear();
            let analysis = result?;

            match output {
                Some(path) => {
                    output::save_to_file(&analysis, &path, &format)?;
                    println!("Analysis saved to: {}", path.display());
                }
                None => output::print_to_console(&analysis, &format)?,
            }
        }
        Commands::Transcript { url, output } => {
            let pipeline = TranscriptPipeline::from_config(&config).await?;

            let progress = spinner(cli.quiet, "Fetching transcript...");
            let result = interruptible(async { Ok::<_, anyhow::Error>(pipeline.run(&url).await?) }).await;
            progress.finish_and_clear();
            let transcript = result?;

            let content = output::format_transcript(&transcript);
            match output {
                Some(path) => {
                    write_file(&path, &content)?;
                    println!("Transcript saved to: {}", path.display());
                }
                None => println!("{}", content),
            }
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.app.bind_address.clone());
            let service = AnalysisService::from_config(&config).await?;
            server::serve(&bind, Arc::new(service)).await?;
        }
        Commands::Tools => {
            let speech = WhisperClient::new(&config.speech)?;
            let tools = ToolAvailability::probe(&config.tools, speech.is_configured()).await;

            println!("External tools:");
            println!("  {}: {}", config.tools.downloader, found(tools.downloader_present));
            println!("  {}: {}", config.tools.encoder, found(tools.encoder_present));
            println!("  speech-to-text key: {}", found(tools.speech_client_configured));

            let missing = tools.missing();
            if missing.is_empty() {
                println!("\nAll prerequisites for the audio fallback are available.");
            } else {
                println!("\nThe audio fallback is disabled until these are fixed:");
                for item in missing {
                    println!("  • {}", item);
                }
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                match &cli.config {
                    Some(path) => println!("Config file: {}", path.display()),
                    None => println!("Config file: {}", Config::config_path()?.display()),
                }
                println!("Run `viralscope config --show` to print the effective settings.");
            }
        }
    }

    Ok(())
}

/// Drive `work` to completion unless Ctrl-C arrives first. On interrupt the future
/// is dropped here, so child processes and temp dirs are released before exit.
async fn interruptible<T>(work: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        result = work => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::warn!("Interrupted, cleaning up");
            anyhow::bail!("Interrupted")
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "viralscope=debug" } else { "viralscope=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn spinner(quiet: bool, message: &'static str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}

fn found(present: bool) -> &'static str {
    if present {
        "found"
    } else {
        "missing"
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs_err::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
