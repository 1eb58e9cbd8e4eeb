//! Configuration file lookup and data folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the data folder location
pub const DATA_DIR_ENV: &str = "PICTAG_DATA_DIR";

/// Database file name inside the data folder
pub const DATABASE_FILE: &str = "image-tags.db";

/// Thumbnail subdirectory inside the data folder
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// Resolve the data folder location, priority order:
/// 1. Command-line argument (highest priority)
/// 2. `PICTAG_DATA_DIR` environment variable
/// 3. `data_dir` key in the TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_data_dir(cli_arg: Option<&Path>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = config_file_path() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml_content.parse::<toml::Value>() {
                if let Some(data_dir) = config.get("data_dir").and_then(|v| v.as_str()) {
                    return PathBuf::from(data_dir);
                }
            }
        }
    }

    // Priority 4: OS-dependent default
    default_data_dir()
}

/// Get the configuration file path for the platform
///
/// Linux tries `~/.config/pictag/config.toml` first, then
/// `/etc/pictag/config.toml`. macOS and Windows use the platform
/// config directory. Returns an error when no config file exists.
pub fn config_file_path() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        if let Some(user_config) = dirs::config_dir().map(|d| d.join("pictag").join("config.toml"))
        {
            if user_config.exists() {
                return Ok(user_config);
            }
        }
        let system_config = PathBuf::from("/etc/pictag/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("pictag").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// OS-dependent default data folder path
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("pictag"))
            .unwrap_or_else(|| PathBuf::from("./pictag_data"))
    } else {
        // Linux: ~/.local/share/pictag, Windows: %LOCALAPPDATA%\pictag
        dirs::data_local_dir()
            .map(|d| d.join("pictag"))
            .unwrap_or_else(|| PathBuf::from("./pictag_data"))
    }
}

/// Prepared data folder layout: database file, thumbnail directory,
/// and run-scoped failure logs all live under one root.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the data folder and its thumbnail subdirectory if missing
    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.thumbnails_dir())?;
        tracing::debug!("Data folder ready: {}", self.root.display());
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.root.join(THUMBNAILS_DIR)
    }

    /// Path of the failure log for a run started at the given Unix
    /// timestamp in milliseconds
    pub fn failure_log_path(&self, started_millis: i64) -> PathBuf {
        self.root
            .join(format!("failed-image-processing-{}.log", started_millis))
    }
}
