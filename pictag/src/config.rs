//! Configuration for the pictag cataloger
//!
//! Settings resolve with CLI arguments taking priority over environment
//! variables, which take priority over the TOML config file, which takes
//! priority over compiled defaults. Data dir resolution lives in
//! `pictag_common::config`; this module owns the inference, extraction,
//! and batch settings.

use pictag_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// How the primary extraction call is structured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionStrategy {
    /// One schema-constrained call returns all fields together
    SinglePass,
    /// Free-text description first, then a text-only structured extraction
    TwoPass,
}

impl Default for ExtractionStrategy {
    fn default() -> Self {
        ExtractionStrategy::SinglePass
    }
}

/// How the textual-content flag is decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IsTextStrategy {
    /// Trust the model's structured boolean field
    ModelField,
    /// Compare description embeddings against reference phrases
    EmbeddingHeuristic,
}

impl Default for IsTextStrategy {
    fn default() -> Self {
        IsTextStrategy::ModelField
    }
}

/// Inference endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Ollama base URL (default: http://localhost:11434)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Vision model for extraction (default: gemma3:4b)
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding model for the similarity heuristic (default: nomic-embed-text)
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Dedicated OCR model; falls back to `model` when unset
    #[serde(default)]
    pub ocr_model: Option<String>,

    /// Per-request HTTP timeout in seconds (default: 120)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl InferenceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Model used for the OCR transcription stage
    pub fn ocr_model(&self) -> &str {
        self.ocr_model.as_deref().unwrap_or(&self.model)
    }
}

/// Extraction pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSettings {
    /// Maximum inference calls per stage before giving up (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Bounding dimension for inference input images (default: 600)
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,

    /// Bounding dimension for stored thumbnails (default: 256)
    #[serde(default = "default_thumbnail_dimension")]
    pub thumbnail_dimension: u32,

    /// Persist thumbnails alongside catalog entries (default: true)
    #[serde(default = "default_keep_thumbnails")]
    pub keep_thumbnails: bool,

    /// JPEG re-encode quality, 1-100 (default: 85)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Primary extraction strategy (default: single-pass)
    #[serde(default)]
    pub strategy: ExtractionStrategy,

    /// Textual-content classification strategy (default: model-field)
    #[serde(default)]
    pub is_text_strategy: IsTextStrategy,

    /// Regenerate the short title from the description (default: false)
    #[serde(default)]
    pub refine_title: bool,

    /// Transcribe text-bearing images into `text_contents` (default: false)
    #[serde(default)]
    pub ocr_enabled: bool,
}

/// Batch processing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Number of images processed concurrently (default: 1)
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Data directory override (lowest-priority source for it)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub extraction: ExtractionSettings,

    #[serde(default)]
    pub batch: BatchSettings,
}

impl AppConfig {
    /// Load from the platform config file, falling back to defaults when
    /// the file does not exist. A present-but-broken file is an error so
    /// misconfiguration does not silently vanish.
    pub fn load() -> Result<AppConfig> {
        match pictag_common::config::config_file_path() {
            Ok(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(AppConfig::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read config failed ({}): {}", path.display(), e)))?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse config failed ({}): {}", path.display(), e)))?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Apply environment overrides (sit between CLI flags and the TOML file)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PICTAG_OLLAMA_URL") {
            if !url.trim().is_empty() {
                info!("Ollama URL loaded from environment variable");
                self.inference.base_url = url;
            }
        }
        if let Ok(model) = std::env::var("PICTAG_MODEL") {
            if !model.trim().is_empty() {
                info!("Model loaded from environment variable");
                self.inference.model = model;
            }
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "gemma3:4b".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    5
}

fn default_max_image_dimension() -> u32 {
    600
}

fn default_thumbnail_dimension() -> u32 {
    256
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_keep_thumbnails() -> bool {
    true
}

fn default_parallelism() -> usize {
    1
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            ocr_model: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_image_dimension: default_max_image_dimension(),
            thumbnail_dimension: default_thumbnail_dimension(),
            keep_thumbnails: default_keep_thumbnails(),
            jpeg_quality: default_jpeg_quality(),
            strategy: ExtractionStrategy::default(),
            is_text_strategy: IsTextStrategy::default(),
            refine_title: false,
            ocr_enabled: false,
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
        }
    }
}
