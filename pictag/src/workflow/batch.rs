//! Batch cataloging coordinator
//!
//! Drives the extraction pipeline across a file tree with bounded
//! concurrency. Every per-file error is caught at this boundary and turned
//! into a failure-log line plus a continue; nothing below it may abort the
//! run. Only an unusable root path fails the batch up front.

use crate::config::ExtractionSettings;
use crate::db::images::{self, NewImage};
use crate::error::PipelineError;
use crate::services::extraction::ExtractionPipeline;
use crate::services::image_normalizer::{ImageNormalizer, NormalizedImage};
use crate::services::image_scanner::ImageScanner;
use crate::services::tag_normalizer::normalize_tags;
use crate::services::thumbnails::ThumbnailStore;
use crate::workflow::failure_log::FailureLog;
use anyhow::Result;
use chrono::{DateTime, Utc};
use pictag_common::config::DataDir;
use pictag_common::human_time::format_elapsed;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Per-run batch options
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Overwrite records that already exist for a path
    pub update_existing: bool,
    /// Worker pool size, 1 = fully sequential
    pub parallelism: usize,
}

/// Final batch statistics
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// What happened to one file
enum TaskOutcome {
    Succeeded,
    Skipped,
    Failed,
}

/// Catalog action taken for one file
enum FileAction {
    Created,
    Updated,
    Skipped,
}

/// Everything one worker task needs, cheap to clone per file
#[derive(Clone)]
struct WorkerContext {
    pool: SqlitePool,
    pipeline: Arc<ExtractionPipeline>,
    normalizer: ImageNormalizer,
    thumbnails: ThumbnailStore,
    settings: ExtractionSettings,
    update_existing: bool,
}

/// Batch driver over the extraction pipeline
pub struct BatchCoordinator {
    pool: SqlitePool,
    pipeline: Arc<ExtractionPipeline>,
    normalizer: ImageNormalizer,
    thumbnails: ThumbnailStore,
    settings: ExtractionSettings,
    data_dir: DataDir,
    cancel: CancellationToken,
}

impl BatchCoordinator {
    pub fn new(
        pool: SqlitePool,
        pipeline: Arc<ExtractionPipeline>,
        settings: ExtractionSettings,
        data_dir: DataDir,
        cancel: CancellationToken,
    ) -> Self {
        let normalizer = ImageNormalizer::new(settings.jpeg_quality);
        let thumbnails = ThumbnailStore::new(data_dir.thumbnails_dir());
        Self {
            pool,
            pipeline,
            normalizer,
            thumbnails,
            settings,
            data_dir,
            cancel,
        }
    }

    /// Catalog every image under `root`
    pub async fn run(&self, root: &Path, options: &BatchOptions) -> Result<BatchSummary> {
        let start = Instant::now();
        let parallelism = options.parallelism.max(1);

        let files = ImageScanner::new().scan(root)?;
        let total = files.len();
        info!(
            "Found {} image(s) to process with parallelism={}",
            total, parallelism
        );

        let failure_log = Arc::new(FailureLog::new(
            self.data_dir.failure_log_path(Utc::now().timestamp_millis()),
        ));
        let processed = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(parallelism));
        let context = WorkerContext {
            pool: self.pool.clone(),
            pipeline: self.pipeline.clone(),
            normalizer: self.normalizer.clone(),
            thumbnails: self.thumbnails.clone(),
            settings: self.settings.clone(),
            update_existing: options.update_existing,
        };

        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        let mut scheduled = 0usize;

        for path in files {
            if self.cancel.is_cancelled() {
                warn!(
                    "Cancellation requested, leaving {} file(s) unscheduled",
                    total - scheduled
                );
                break;
            }

            let permit = semaphore.clone().acquire_owned().await?;
            let ctx = context.clone();
            let processed = processed.clone();
            let failure_log = failure_log.clone();

            scheduled += 1;
            tasks.spawn(async move {
                let outcome = match process_file(ctx, &path).await {
                    Ok(FileAction::Skipped) => TaskOutcome::Skipped,
                    Ok(_) => TaskOutcome::Succeeded,
                    Err(e) => {
                        error!("Error processing image {}: {}", path.display(), e);
                        let log_path = path.canonicalize().unwrap_or_else(|_| path.clone());
                        failure_log.record(&log_path, e.category()).await;
                        TaskOutcome::Failed
                    }
                };
                drop(permit);

                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                info!("Progress: {}/{}", done, total);
                outcome
            });
        }

        let mut succeeded = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskOutcome::Succeeded) => succeeded += 1,
                Ok(TaskOutcome::Skipped) => skipped += 1,
                Ok(TaskOutcome::Failed) => failed += 1,
                Err(e) => {
                    error!("Worker task panicked: {}", e);
                    failed += 1;
                }
            }
        }

        let elapsed = start.elapsed();
        info!(
            "Completed processing all images in {}",
            format_elapsed(elapsed)
        );
        info!(
            "Batch results: {} succeeded, {} skipped, {} failed out of {}",
            succeeded, skipped, failed, total
        );

        Ok(BatchSummary {
            total,
            succeeded,
            skipped,
            failed,
            elapsed,
        })
    }
}

/// Per-file procedure: canonicalize, check catalog, normalize, extract,
/// thumbnail, upsert
async fn process_file(ctx: WorkerContext, path: &Path) -> Result<FileAction, PipelineError> {
    let canonical = path.canonicalize().map_err(|e| PipelineError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let full_path = canonical.to_string_lossy().into_owned();
    info!("Processing: {}", full_path);

    let existing = images::find_by_path(&ctx.pool, &full_path).await?;
    match &existing {
        Some(_) if !ctx.update_existing => {
            info!("Image already exists in database, skipping...");
            return Ok(FileAction::Skipped);
        }
        Some(_) => info!("Image already exists in database, updating..."),
        None => {}
    }

    let (inference_image, thumb_image) =
        decode_and_normalize(&ctx, canonical.clone()).await?;
    info!(
        "Normalized {} to {}x{} ({:.1} KB) for inference",
        full_path,
        inference_image.width,
        inference_image.height,
        inference_image.jpeg_bytes.len() as f64 / 1024.0
    );

    let outcome = ctx.pipeline.extract(&canonical, &inference_image).await?;
    let tags = normalize_tags(&outcome.tags, outcome.is_text);

    let thumbnail_name = match thumb_image {
        Some(thumb) => match ctx.thumbnails.save(&full_path, &thumb.jpeg_bytes) {
            Ok(_) => Some(ThumbnailStore::thumbnail_name(&full_path)),
            Err(e) => {
                let err = PipelineError::ThumbnailWrite {
                    path: canonical.clone(),
                    reason: e.to_string(),
                };
                warn!("{}", err);
                None
            }
        },
        None => None,
    };

    let metadata = std::fs::metadata(&canonical).ok();
    let file_created_at = metadata
        .as_ref()
        .and_then(|m| m.created().ok())
        .map(DateTime::<Utc>::from);
    let file_last_modified = metadata
        .as_ref()
        .and_then(|m| m.modified().ok())
        .map(DateTime::<Utc>::from);

    let record = NewImage {
        full_path: full_path.clone(),
        description: outcome.description,
        short_title: outcome.short_title,
        thumbnail_name,
        is_text: outcome.is_text,
        text_contents: outcome.text_contents,
        file_created_at,
        file_last_modified,
        tags,
    };

    match existing {
        Some(record_in_db) => {
            images::update_image(&ctx.pool, record_in_db.id, &record).await?;
            info!("Updated database entry with ID: {}", record_in_db.id);
            Ok(FileAction::Updated)
        }
        None => {
            let id = images::insert_image(&ctx.pool, &record).await?;
            info!("Saved new database entry with ID: {}", id);
            Ok(FileAction::Created)
        }
    }
}

/// Decode once off the async runtime, encode per bound
async fn decode_and_normalize(
    ctx: &WorkerContext,
    path: PathBuf,
) -> Result<(NormalizedImage, Option<NormalizedImage>), PipelineError> {
    let normalizer = ctx.normalizer.clone();
    let max_image_dimension = ctx.settings.max_image_dimension;
    let thumbnail_dimension = ctx.settings.thumbnail_dimension;
    let keep_thumbnails = ctx.settings.keep_thumbnails;
    let task_path = path.clone();

    let result = tokio::task::spawn_blocking(move || {
        let decoded = normalizer.decode(&task_path)?;
        let inference = normalizer.normalize(&decoded, max_image_dimension)?;
        let thumb = if keep_thumbnails {
            Some(normalizer.normalize(&decoded, thumbnail_dimension)?)
        } else {
            None
        };
        Ok::<_, image::ImageError>((inference, thumb))
    })
    .await;

    match result {
        Ok(Ok(images)) => Ok(images),
        Ok(Err(e)) => Err(PipelineError::Read {
            path,
            reason: e.to_string(),
        }),
        Err(e) => Err(PipelineError::Read {
            path,
            reason: format!("decode task failed: {}", e),
        }),
    }
}
