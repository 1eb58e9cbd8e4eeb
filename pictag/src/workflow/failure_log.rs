//! Run-scoped failure log
//!
//! One line per failed file: `"<absolute-path>", "<error-category>"`.
//! The file is created lazily on the first failure, so a clean run leaves
//! nothing behind. Workers share one writer behind a mutex; a log write
//! failure is itself only worth a warning.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

pub struct FailureLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FailureLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one failure entry, opening the log on first use
    pub async fn record(&self, image_path: &Path, category: &str) {
        let mut guard = self.file.lock().await;

        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!(
                        "Failed to create failure log directory {}: {}",
                        parent.display(),
                        e
                    );
                    return;
                }
            }
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(file) => *guard = Some(file),
                Err(e) => {
                    warn!("Failed to open failure log {}: {}", self.path.display(), e);
                    return;
                }
            }
        }

        if let Some(file) = guard.as_mut() {
            let line = format!("\"{}\", \"{}\"\n", image_path.display(), category);
            if let Err(e) = file.write_all(line.as_bytes()) {
                warn!("Failed to write failure log entry: {}", e);
            }
        }
    }
}
