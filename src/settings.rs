//! User settings persistence
//!
//! Settings live in a small JSON object, `{ "download_path": "..." }`, under
//! the per-user config directory. Loading never fails: a missing or corrupt
//! file falls back to the platform downloads folder.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DownError, DownResult};

const APP_DIR: &str = "down";
const SETTINGS_FILE: &str = "settings.json";

/// Persisted user preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory new downloads are saved to
    #[serde(default = "default_download_dir")]
    pub download_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_path: default_download_dir(),
        }
    }
}

/// Returns the platform downloads folder, or `~/Downloads` when unknown
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

impl Settings {
    /// Location of the settings file, if the platform has a config directory
    pub fn default_location() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Loads settings from the default location
    pub fn load() -> Self {
        match Self::default_location() {
            Some(path) => Self::load_from(path),
            None => {
                warn!("No config directory on this platform, using default settings");
                Self::default()
            }
        }
    }

    /// Loads settings from `path`, falling back to defaults on any error
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Settings file not found, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to read settings, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_slice(&content) {
            Ok(settings) => {
                debug!(path = %path.display(), "Settings loaded");
                settings
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Corrupt settings file, using defaults");
                Self::default()
            }
        }
    }

    /// Saves settings to the default location
    pub fn save(&self) -> DownResult<()> {
        let path = Self::default_location()
            .ok_or_else(|| DownError::Settings("no config directory available".to_string()))?;
        self.save_to(path)
    }

    /// Saves settings to `path`, creating parent directories as needed
    pub fn save_to(&self, path: impl AsRef<Path>) -> DownResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DownError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                error: e,
            })?;
        }

        let content =
            serde_json::to_vec(self).map_err(|e| DownError::Settings(e.to_string()))?;
        fs::write(path, content)?;

        debug!(path = %path.display(), "Settings saved");
        Ok(())
    }
}
