//! Executor configuration.
//!
//! Read from `$XDG_CONFIG_HOME/intelicad/executor.toml` when present,
//! otherwise defaults. Command-line flags override both.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "executor.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// How long `stop` waits for the loop to wind down.
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Where exported documents are written before upload.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_join_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("intelicad")
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            poll_interval_secs: default_poll_interval_secs(),
            join_timeout_secs: default_join_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            work_dir: default_work_dir(),
        }
    }
}

impl ExecutorConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("intelicad").join(CONFIG_FILE))
    }

    /// Load from the user config dir, falling back to defaults.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => {
                info!("No executor config found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if config.poll_interval_secs == 0 {
            warn!("poll_interval_secs = 0 busy-polls the backend");
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.backend_url, "http://127.0.0.1:8000");
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.join_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "backend_url = \"http://cad-host:9000\"\npoll_interval_secs = 2\n").unwrap();
        let config = ExecutorConfig::load_from_path(&path).unwrap();
        assert_eq!(config.backend_url, "http://cad-host:9000");
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.join_timeout_secs, 5);
    }

    #[test]
    fn test_bad_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "poll_interval_secs = \"soon\"").unwrap();
        assert!(ExecutorConfig::load_from_path(&path).is_err());
    }
}
