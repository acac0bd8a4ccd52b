use crate::index::types::IndexConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "fsdex";
const CONFIG_FILE: &str = "config.json";

/// Application configuration stored in the app data directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where indexes are written when no directory is given on the command line
    #[serde(default)]
    pub index_dir: Option<PathBuf>,

    /// Engine settings handed to the builder and searchers
    #[serde(default)]
    pub index: IndexConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            index_dir: None,
            index: IndexConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load config from an explicit file, or return default if it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: AppConfig = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Index directory to use: the explicit override, then config, then the default
    pub fn resolve_index_dir(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit.or(self.index_dir.as_deref()) {
            Some(dir) => Ok(dir.to_path_buf()),
            None => default_index_dir(),
        }
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Default location of the index inside the app data directory
pub fn default_index_dir() -> Result<PathBuf> {
    Ok(get_app_data_dir()?.join("index"))
}

/// Remove an index directory and everything in it
pub fn remove_index(index_dir: &Path) -> Result<bool> {
    if index_dir.exists() {
        fs::remove_dir_all(index_dir)
            .with_context(|| format!("Failed to remove {}", index_dir.display()))?;
        Ok(true)
    } else {
        Ok(false)
    }
}
