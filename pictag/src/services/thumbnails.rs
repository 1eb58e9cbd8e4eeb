//! Thumbnail persistence
//!
//! Thumbnails are named by a SHA-256 of the canonical source path, not of
//! the image content, so regenerating for the same source always lands on
//! the same file.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Thumbnail directory handle
#[derive(Debug, Clone)]
pub struct ThumbnailStore {
    dir: PathBuf,
}

impl ThumbnailStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic thumbnail filename for a canonical source path
    pub fn thumbnail_name(source_path: &str) -> String {
        let hash = Sha256::digest(source_path.as_bytes());
        format!("{:x}.jpg", hash)
    }

    /// Write thumbnail bytes, overwriting any previous one for this source
    pub fn save(&self, source_path: &str, jpeg_bytes: &[u8]) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(Self::thumbnail_name(source_path));
        std::fs::write(&target, jpeg_bytes)?;
        Ok(target)
    }
}
