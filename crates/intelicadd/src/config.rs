//! Configuration management for intelicadd.
//!
//! Loads settings from /etc/intelicad/config.toml (or the path in
//! `INTELICAD_CONFIG`) or uses defaults.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use intelicad_common::LlmConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::safety::SafetyRule;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/intelicad/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/intelicad/config.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "INTELICAD_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Largest accepted multipart upload, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for per-job artifact directories.
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("/var/lib/intelicad/artifacts")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

/// Token budgets per planning call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_intent_max_tokens")]
    pub intent_max_tokens: u32,

    #[serde(default = "default_reasoning_max_tokens")]
    pub reasoning_max_tokens: u32,

    #[serde(default = "default_generation_max_tokens")]
    pub generation_max_tokens: u32,

    #[serde(default = "default_retry_max_tokens")]
    pub retry_max_tokens: u32,
}

fn default_intent_max_tokens() -> u32 {
    2048
}

fn default_reasoning_max_tokens() -> u32 {
    3000
}

fn default_generation_max_tokens() -> u32 {
    4096
}

fn default_retry_max_tokens() -> u32 {
    2048
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            intent_max_tokens: default_intent_max_tokens(),
            reasoning_max_tokens: default_reasoning_max_tokens(),
            generation_max_tokens: default_generation_max_tokens(),
            retry_max_tokens: default_retry_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Start from the built-in rule table.
    #[serde(default = "default_true")]
    pub use_default_rules: bool,

    /// Site-specific rules appended after the defaults.
    #[serde(default)]
    pub rules: Vec<SafetyRule>,
}

fn default_true() -> bool {
    true
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            use_default_rules: true,
            rules: Vec::new(),
        }
    }
}

impl SafetyConfig {
    pub fn effective_rules(&self) -> Vec<SafetyRule> {
        let mut rules = if self.use_default_rules {
            SafetyRule::defaults()
        } else {
            Vec::new()
        };
        rules.extend(self.rules.iter().cloned());
        rules
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub safety: SafetyConfig,
}

impl Config {
    /// Load config from the env override, the system paths, or defaults.
    pub fn load() -> Self {
        let config = std::env::var(CONFIG_ENV)
            .map_err(anyhow::Error::from)
            .and_then(|path| Self::load_from_path(&path))
            .or_else(|_| Self::load_from_path(CONFIG_PATH))
            .or_else(|_| Self::load_from_path(DEFAULT_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            });
        config.with_env()
    }

    /// Load config from specific path
    pub fn load_from_path(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path))?;
        info!("Loaded config from {}", path);
        Ok(config)
    }

    fn with_env(mut self) -> Self {
        self.llm = self.llm.with_env_api_key();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.pipeline.generation_max_tokens, 4096);
        assert!(config.safety.use_default_rules);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[server]
bind = "0.0.0.0:9000"

[llm]
endpoint = "http://localhost:11434"
model = "qwen2.5:7b-instruct"

[[safety.rules]]
keywords = ["lens"]
forbidden = ["scale"]
rationale = "optical parts keep their size"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(config.llm.is_ollama());
        // Defaults for missing fields
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.server.max_upload_bytes, 64 * 1024 * 1024);

        let rules = config.safety.effective_rules();
        assert_eq!(rules.len(), SafetyRule::defaults().len() + 1);
        assert_eq!(rules.last().unwrap().keywords, vec!["lens".to_string()]);
    }

    #[test]
    fn test_load_from_missing_path() {
        assert!(Config::load_from_path("/nonexistent/intelicad.toml").is_err());
    }
}
