use bananashop_core::credentials::CredentialStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Application configuration (persistent)
///
/// Only credentials survive a restart; scenes, history and view state are
/// per-session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Stored credentials (the generation API key)
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,

    /// File this config was loaded from; saves go back here
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl AppConfig {
    /// Load config from standard location
    /// Returns default config if file doesn't exist or is malformed
    pub fn load() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_from(&path),
            Err(e) => {
                log::warn!("Failed to determine config location: {}", e);
                Self::default()
            }
        }
    }

    /// Load config from an explicit file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        let mut config = match Self::try_load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config from {:?}: {}. Using default configuration", path, e);
                Self::default()
            }
        };
        config.path = Some(path.to_path_buf());
        config
    }

    /// Try to load config, returning error if something goes wrong
    fn try_load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to the file it was loaded from
    /// Logs error but doesn't block if save fails
    pub fn save(&self) {
        let Some(path) = &self.path else {
            log::debug!("Config has no backing file; not saving");
            return;
        };
        if let Err(e) = self.try_save(path) {
            log::error!("Failed to save config to {:?}: {}", path, e);
        }
    }

    /// Try to save config atomically (write to temp, then rename)
    fn try_save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, json)?;
        std::fs::rename(temp_path, path)?;

        Ok(())
    }

    /// Get cross-platform config file path
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        use directories::ProjectDirs;

        let proj_dirs = ProjectDirs::from("", "", "bananashop")
            .ok_or("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.json"))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Credentials persist immediately on every change
impl CredentialStore for AppConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.credentials.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.credentials.remove(key);
        } else {
            self.credentials.insert(key.to_string(), value.to_string());
        }
        self.save();
    }
}
