//! Configuration for the assistant pipeline
//!
//! Every field has a default so a partial TOML file (or none at all) is valid.
//! Binaries layer CLI flags and environment variables on top.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{FormHelperError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub remote: RemoteConfig,
    pub rate_limit: RateLimitConfig,
    pub memory: MemoryConfig,
    pub learning: LearningConfig,
    pub personalization: PersonalizationConfig,
}

impl AssistantConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| FormHelperError::Config(e.to_string()))
    }

    /// Default location of the config file (`~/.config/formhelper/config.toml`)
    pub fn default_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|d| d.join("formhelper").join("config.toml"))
    }

    /// Load from `path` (tilde-expanded), or from the default location if it
    /// exists, or fall back to defaults. An explicit path must exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_toml_file(&*shellexpand::tilde(path)),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_toml_file(path),
                None => Ok(Self::default()),
            },
        }
    }
}

/// Remote reasoning service (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// API key; `None` makes every remote call a configuration failure
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
    /// Upper bound on the user text embedded in a prompt (characters)
    pub max_prompt_chars: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1000,
            temperature: 0.3,
            timeout_ms: 30_000,
            max_prompt_chars: 4000,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Sliding-window limit on outbound remote calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 15,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Memory store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// SQLite path; `None` selects the in-process store
    pub db_path: Option<String>,
    /// Per-operation timeout; a timeout counts as a store failure
    pub timeout_ms: u64,
    /// Probe the store once per session before first use
    pub probe_on_first_use: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: None,
            timeout_ms: 2_000,
            probe_on_first_use: true,
        }
    }
}

impl MemoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Default SQLite location (`~/.local/share/formhelper/memory.db`)
    pub fn default_db_path() -> String {
        dirs::data_local_dir()
            .map(|d| d.join("formhelper").join("memory.db"))
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "formhelper-memory.db".to_string())
    }
}

/// Interaction learning log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub capacity: usize,
    pub hint_count: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            hint_count: 5,
        }
    }
}

/// Response personalization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalizationConfig {
    /// How many frequently used terms to list as related
    pub related_terms: usize,
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self { related_terms: 3 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AssistantConfig::default();
        assert_eq!(config.rate_limit.max_requests, 15);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.learning.capacity, 50);
        assert_eq!(config.personalization.related_terms, 3);
        assert!(config.remote.api_key.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config = AssistantConfig::from_toml_str(
            r#"
            [remote]
            model = "gpt-4o"

            [rate_limit]
            max_requests = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.remote.model, "gpt-4o");
        assert_eq!(config.remote.max_tokens, 1000);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_secs, 60);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AssistantConfig::from_toml_str("[remote\nmodel=").unwrap_err();
        assert!(matches!(err, FormHelperError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[learning]\ncapacity = 10\n").unwrap();
        let config = AssistantConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.learning.capacity, 10);

        let loaded = AssistantConfig::load(path.to_str()).unwrap();
        assert_eq!(loaded.learning.capacity, 10);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            AssistantConfig::load(missing.to_str()),
            Err(FormHelperError::Io(_))
        ));
    }
}
