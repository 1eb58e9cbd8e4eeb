//! pictag - Image cataloging CLI
//!
//! Walks an image collection, derives structured metadata (tags,
//! description, short title, text classification) through a local Ollama
//! server, and persists the results in a SQLite catalog with thumbnails.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pictag::config::{AppConfig, ExtractionStrategy};
use pictag::db::{images, tags};
use pictag::services::extraction::ExtractionPipeline;
use pictag::services::image_normalizer::ImageNormalizer;
use pictag::services::ollama::OllamaClient;
use pictag::services::tag_normalizer::normalize_tags;
use pictag::workflow::{BatchCoordinator, BatchOptions};
use pictag_common::config::{resolve_data_dir, DataDir};
use pictag_common::db::init_database;

/// Command-line arguments for pictag
#[derive(Parser, Debug)]
#[command(name = "pictag")]
#[command(about = "Catalog images with AI-derived tags, titles and descriptions")]
#[command(version)]
struct Cli {
    /// Data folder for the catalog database, thumbnails and failure logs
    /// (also PICTAG_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Catalog an image file or every image under a directory
    Catalog {
        /// Image file or directory to process
        path: PathBuf,

        /// Re-analyze and overwrite images already in the catalog
        #[arg(long)]
        update_existing: bool,

        /// Number of images analyzed concurrently
        #[arg(long)]
        parallelism: Option<usize>,

        /// Extraction strategy override
        #[arg(long, value_enum)]
        strategy: Option<ExtractionStrategy>,
    },

    /// Analyze one image and print the result without touching the catalog
    Tag {
        /// Image file to analyze
        path: PathBuf,

        /// Extraction strategy override
        #[arg(long, value_enum)]
        strategy: Option<ExtractionStrategy>,
    },

    /// Print catalog entries with their tags, newest first
    List {
        /// Only show entries carrying this tag
        #[arg(long)]
        tag: Option<String>,

        /// Maximum number of entries to print
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print known tags with usage counts
    Tags,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting pictag v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    config.apply_env_overrides();

    let data_dir = DataDir::new(resolve_data_dir(cli.data_dir.as_deref()));

    match cli.command {
        Command::Catalog {
            path,
            update_existing,
            parallelism,
            strategy,
        } => {
            if let Some(strategy) = strategy {
                config.extraction.strategy = strategy;
            }
            let options = BatchOptions {
                update_existing,
                parallelism: parallelism.unwrap_or(config.batch.parallelism),
            };
            run_catalog(&config, &data_dir, &path, options).await
        }
        Command::Tag { path, strategy } => {
            if let Some(strategy) = strategy {
                config.extraction.strategy = strategy;
            }
            run_tag(&config, &path).await
        }
        Command::List { tag, limit } => run_list(&data_dir, tag, limit).await,
        Command::Tags => run_tags(&data_dir).await,
    }
}

/// Build the inference pipeline from configuration
fn build_pipeline(config: &AppConfig) -> Result<Arc<ExtractionPipeline>> {
    let client = OllamaClient::new(
        &config.inference.base_url,
        config.inference.request_timeout(),
    )
    .context("Failed to build inference client")?;
    info!("Inference server: {}", config.inference.base_url);
    info!("Model: {}", config.inference.model);

    Ok(Arc::new(ExtractionPipeline::new(
        Arc::new(client),
        config.inference.clone(),
        config.extraction.clone(),
    )))
}

/// Open the catalog database inside a prepared data folder
async fn open_catalog(data_dir: &DataDir) -> Result<sqlx::SqlitePool> {
    data_dir
        .ensure_exists()
        .context("Failed to initialize data folder")?;
    let db_path = data_dir.database_path();
    let pool = init_database(&db_path).await?;
    info!("Database: {}", db_path.display());
    Ok(pool)
}

async fn run_catalog(
    config: &AppConfig,
    data_dir: &DataDir,
    path: &Path,
    options: BatchOptions,
) -> Result<()> {
    let pool = open_catalog(data_dir).await?;
    let pipeline = build_pipeline(config)?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let coordinator = BatchCoordinator::new(
        pool,
        pipeline,
        config.extraction.clone(),
        data_dir.clone(),
        cancel,
    );
    let summary = coordinator.run(path, &options).await?;

    println!(
        "Processed {} image(s): {} succeeded, {} skipped, {} failed",
        summary.total, summary.succeeded, summary.skipped, summary.failed
    );
    Ok(())
}

async fn run_tag(config: &AppConfig, path: &Path) -> Result<()> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Cannot read image {}", path.display()))?;
    let pipeline = build_pipeline(config)?;

    let normalizer = ImageNormalizer::new(config.extraction.jpeg_quality);
    let max_dimension = config.extraction.max_image_dimension;
    let decode_path = canonical.clone();
    let normalized = tokio::task::spawn_blocking(move || {
        let decoded = normalizer.decode(&decode_path)?;
        normalizer.normalize(&decoded, max_dimension)
    })
    .await
    .context("Image decode task failed")?
    .with_context(|| format!("Cannot read image {}", canonical.display()))?;

    let outcome = pipeline.extract(&canonical, &normalized).await?;
    let normalized_tags = normalize_tags(&outcome.tags, outcome.is_text);

    println!("File:        {}", canonical.display());
    println!("Title:       {}", outcome.short_title);
    println!("Is text:     {}", outcome.is_text);
    println!("Tags:        {}", normalized_tags.join(", "));
    println!("Description: {}", outcome.description);
    if let Some(text) = &outcome.text_contents {
        println!("Text:        {}", text);
    }
    Ok(())
}

async fn run_list(data_dir: &DataDir, tag: Option<String>, limit: Option<usize>) -> Result<()> {
    let pool = open_catalog(data_dir).await?;
    let records = images::list_images(&pool).await?;

    let mut shown = 0usize;
    for record in &records {
        if let Some(wanted) = &tag {
            if !record.tags.iter().any(|t| t == wanted) {
                continue;
            }
        }
        if let Some(max) = limit {
            if shown >= max {
                break;
            }
        }
        println!("#{} {}", record.id, record.full_path);
        if let Some(title) = &record.short_title {
            println!("    title: {}", title);
        }
        if !record.tags.is_empty() {
            println!("    tags:  {}", record.tags.join(", "));
        }
        shown += 1;
    }

    if shown == 0 {
        println!("No catalog entries found");
    }
    Ok(())
}

async fn run_tags(data_dir: &DataDir) -> Result<()> {
    let pool = open_catalog(data_dir).await?;
    let tag_counts = tags::list_tags(&pool).await?;

    if tag_counts.is_empty() {
        println!("No tags found");
        return Ok(());
    }
    for tag in &tag_counts {
        println!("{:6}  {}", tag.image_count, tag.tag_name);
    }
    Ok(())
}

/// Resolves when Ctrl+C or SIGTERM arrives
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
