//! Configuration for the Recall CLI
//!
//! Read from `<config_dir>/recall/config.toml`. Every key is optional:
//!
//! ```toml
//! database_path = "/home/me/cards/recall.db"
//! due_limit = 50
//! ```
//!
//! `RECALL_DATABASE` in the environment overrides `database_path`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_DIR: &str = "recall";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "recall.db";
const DATABASE_ENV: &str = "RECALL_DATABASE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Could not determine the {0} directory")]
    DirNotFound(&'static str),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file; defaults to `<data_local_dir>/recall/recall.db`
    pub database_path: Option<PathBuf>,
    /// How many due cards `due` lists when no limit is given
    pub due_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            due_limit: 50,
        }
    }
}

impl Config {
    /// Path of the default config file
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(APP_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::DirNotFound("config"))
    }

    /// Load the default config file, falling back to defaults when it is absent
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::default_path()?)?;
        if let Some(path) = std::env::var_os(DATABASE_ENV) {
            config.database_path = Some(PathBuf::from(path));
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Where the flashcard database lives
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => dirs::data_local_dir()
                .map(|p| p.join(APP_DIR).join(DATABASE_FILE))
                .ok_or(ConfigError::DirNotFound("data")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_from(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "due_limit = 10\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.due_limit, 10);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_explicit_database_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "database_path = \"/tmp/cards.db\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/cards.db"));
    }

    #[test]
    fn test_invalid_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "due_limit = \"lots\"\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Toml { .. })
        ));
    }
}
