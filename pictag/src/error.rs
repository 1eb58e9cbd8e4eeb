//! Per-item error taxonomy for the cataloging pipeline
//!
//! Validation failures are consumed by the retry loop inside the
//! extraction pipeline; every other variant surfaces to the batch
//! coordinator, which records the stable category label in the failure
//! log and moves on to the next file.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while cataloging a single image
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source image unreadable or undecodable
    #[error("Cannot read image {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    /// One inference response missing required fields or unparsable
    #[error("Invalid inference response: {}", issues.join("; "))]
    Validation { issues: Vec<String> },

    /// Retry budget exhausted without a valid inference response
    #[error("Extraction failed for {path} after {attempts} attempts: {last_failure}")]
    Extraction {
        path: PathBuf,
        attempts: u32,
        last_failure: String,
    },

    /// Thumbnail persistence failure (warning only, never fails the item)
    #[error("Thumbnail write failed for {path}: {reason}")]
    ThumbnailWrite { path: PathBuf, reason: String },

    /// Catalog lookup/insert/update failure
    #[error("Catalog error: {0}")]
    Catalog(#[from] sqlx::Error),
}

impl PipelineError {
    /// Stable category label recorded in the failure log
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Read { .. } => "ReadError",
            PipelineError::Validation { .. } => "ValidationFailure",
            PipelineError::Extraction { .. } => "ExtractionFailed",
            PipelineError::ThumbnailWrite { .. } => "WriteError",
            PipelineError::Catalog(_) => "CatalogError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_labels_are_stable() {
        let read = PipelineError::Read {
            path: PathBuf::from("/photos/a.jpg"),
            reason: "no such file".to_string(),
        };
        assert_eq!(read.category(), "ReadError");

        let exhausted = PipelineError::Extraction {
            path: PathBuf::from("/photos/a.jpg"),
            attempts: 5,
            last_failure: "tags: MISSING".to_string(),
        };
        assert_eq!(exhausted.category(), "ExtractionFailed");

        let validation = PipelineError::Validation {
            issues: vec!["fullDescription: MISSING".to_string()],
        };
        assert_eq!(validation.category(), "ValidationFailure");
    }
}
