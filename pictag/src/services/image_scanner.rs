//! Image file discovery
//!
//! Recursive traversal with symlink-loop detection. A root may be a single
//! file or a directory; either way only files matching the image extension
//! allow-list come back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Image discovery errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Image file scanner
pub struct ImageScanner {
    ignore_patterns: Vec<String>,
}

impl ImageScanner {
    /// Create new scanner with default ignore patterns
    ///
    /// Ignores system entries like .DS_Store, Thumbs.db, .git, etc.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
        }
    }

    /// Collect image files under `root`
    ///
    /// A file root yields at most itself; a directory root is walked
    /// recursively. Unreadable entries are warned about and skipped, never
    /// fatal. Output order is stable (sorted by path).
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }

        if root.is_file() {
            return Ok(if is_image_path(root) {
                vec![root.to_path_buf()]
            } else {
                Vec::new()
            });
        }

        // Traversal is sequential because symlink_visited is mutable
        let mut symlink_visited = HashSet::new();
        let mut images = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && is_image_path(entry.path()) {
                        images.push(entry.path().to_path_buf());
                    }
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        images.sort();
        tracing::debug!("Scan complete: {} image files under {}", images.len(), root.display());
        Ok(images)
    }

    fn should_process_entry(
        &self,
        entry: &DirEntry,
        symlink_visited: &mut HashSet<PathBuf>,
    ) -> bool {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();

        for pattern in &self.ignore_patterns {
            if file_name.contains(pattern) {
                return false;
            }
        }

        if entry.file_type().is_symlink() {
            if let Ok(canonical) = path.canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", path.display());
                    return false;
                }
            }
        }

        true
    }
}

impl Default for ImageScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Check extension against the image allow-list
pub fn is_image_path(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            matches!(
                ext_lower.as_str(),
                "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "tiff" | "tif"
            )
        }
        None => false,
    }
}
