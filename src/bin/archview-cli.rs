//! # ArchView CLI
//!
//! Run the analysis pipeline against a local diagram, or print the resolved
//! configuration with secrets masked.

use anyhow::{Context, Result};
use archview_core::config::ConfigManager;
use archview_core::gateway::ArkGateway;
use archview_core::logging::{init_structured_logging_with_level, verbosity_level};
use archview_core::pipeline::RequestPipeline;
use archview_core::validation::ImageUpload;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "archview-cli")]
#[command(about = "Describe architecture diagrams through the cached analysis pipeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration directory path (default: ARCHVIEW_CONFIG_DIR or ./config)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Environment to load (development, test, production)
    #[arg(short, long, global = true)]
    environment: Option<String>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a diagram image
    Analyze {
        /// Path to the image file
        #[arg(short, long)]
        image: PathBuf,

        /// Additional instructions appended to the base prompt
        #[arg(short, long)]
        prompt: Option<String>,

        /// Submit the same request this many times concurrently
        #[arg(short, long, default_value_t = 1)]
        repeat: usize,
    },

    /// Show the resolved configuration with secrets masked
    Config {
        /// Output format (json, yaml)
        #[arg(long, default_value = "yaml")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_structured_logging_with_level(Some(verbosity_level(cli.verbose)));

    let manager = load_config(&cli)?;

    match &cli.command {
        Commands::Analyze {
            image,
            prompt,
            repeat,
        } => analyze(&manager, image, prompt.as_deref(), *repeat).await,
        Commands::Config { format } => show_config(&manager, format),
    }
}

fn load_config(cli: &Cli) -> Result<ConfigManager> {
    let manager = match &cli.environment {
        Some(environment) => {
            ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        }
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    }
    .context("Failed to load configuration")?;
    Ok(manager)
}

async fn analyze(
    manager: &ConfigManager,
    image: &Path,
    prompt: Option<&str>,
    repeat: usize,
) -> Result<()> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read image {}", image.display()))?;
    let filename = image.file_name().and_then(|name| name.to_str());

    let gateway = Arc::new(ArkGateway::new(&manager.config().gateway)?);
    let pipeline = Arc::new(RequestPipeline::from_config(manager.config(), gateway)?);

    let started = Instant::now();
    let mut handles = Vec::with_capacity(repeat.max(1));
    for _ in 0..repeat.max(1) {
        let pipeline = Arc::clone(&pipeline);
        let upload = ImageUpload::new(bytes.clone(), filename);
        let prompt = prompt.map(str::to_string);
        handles.push(tokio::spawn(async move {
            pipeline.handle_upload(upload, prompt.as_deref()).await
        }));
    }

    let mut description = None;
    for handle in handles {
        let text = handle.await.context("Analysis task panicked")??;
        if description.is_none() {
            description = Some(text);
        }
    }

    if let Some(text) = description {
        println!("{text}");
    }

    pipeline.shutdown().await;
    let stats = pipeline.cache().stats();
    eprintln!();
    eprintln!("Requests:   {}", repeat.max(1));
    eprintln!("Elapsed:    {:.2?}", started.elapsed());
    eprintln!(
        "Cache:      {} misses, {} joins, {} hits (hit rate {:.0}%)",
        stats.misses,
        stats.joins,
        stats.hits,
        stats.hit_rate() * 100.0
    );
    Ok(())
}

fn show_config(manager: &ConfigManager, format: &str) -> Result<()> {
    let sanitized = manager.debug_config();
    println!("# environment: {}", manager.environment());
    println!("# directory:   {}", manager.config_directory().display());
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&sanitized)?),
        "yaml" => print!("{}", serde_yaml::to_string(&sanitized)?),
        other => anyhow::bail!("Unsupported output format: {other} (expected json or yaml)"),
    }
    Ok(())
}
