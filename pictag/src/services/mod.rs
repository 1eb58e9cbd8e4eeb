//! Service modules for the image cataloging workflow

pub mod extraction;
pub mod image_normalizer;
pub mod image_scanner;
pub mod ollama;
pub mod similarity;
pub mod tag_normalizer;
pub mod thumbnails;

pub use extraction::{ExtractionOutcome, ExtractionPipeline, ImageFields};
pub use image_normalizer::{ImageNormalizer, NormalizedImage};
pub use image_scanner::{ImageScanner, ScanError};
pub use ollama::{ChatMessage, ChatRequest, ChatResponse, InferenceClient, InferenceError, OllamaClient};
pub use similarity::cosine_similarity;
pub use tag_normalizer::normalize_tags;
pub use thumbnails::ThumbnailStore;
