use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TaleConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"local"` (ONNX) or `"none"`.
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
    /// Keep a degraded model turn when the structured response cannot be parsed.
    pub fallback_on_malformed: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Maximum characters of each recalled narrative quoted in the memory preamble.
    pub excerpt_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 7411,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_tale_dir()
            .join("stories.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_tale_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            timeout_secs: 30,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".into(),
            model: "gemini-2.5-pro".into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            timeout_secs: 120,
            max_output_tokens: 65536,
            fallback_on_malformed: true,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            excerpt_chars: 150,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Returns `~/.taleweave/`, or `./.taleweave` when no home directory is known.
pub fn default_tale_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".taleweave")
}

/// Returns the default config file path: `~/.taleweave/config.toml`
pub fn default_config_path() -> PathBuf {
    default_tale_dir().join("config.toml")
}

impl TaleConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            TaleConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply TALEWEAVE_DB, TALEWEAVE_LOG_LEVEL and TALEWEAVE_GENERATION_MODEL.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TALEWEAVE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("TALEWEAVE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("TALEWEAVE_GENERATION_MODEL") {
            self.generation.model = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TaleConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.excerpt_chars, 150);
        assert_eq!(config.generation.timeout(), Duration::from_secs(120));
        assert!(config.generation.fallback_on_malformed);
        assert!(config.storage.db_path.ends_with("stories.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[embedding]
provider = "none"

[retrieval]
top_k = 5
"#;
        let config: TaleConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.embedding.provider, "none");
        assert_eq!(config.retrieval.top_k, 5);
        // unset fields keep their defaults
        assert_eq!(config.retrieval.excerpt_chars, 150);
        assert_eq!(config.generation.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = TaleConfig::default();
        std::env::set_var("TALEWEAVE_DB", "/tmp/override.db");
        std::env::set_var("TALEWEAVE_LOG_LEVEL", "trace");
        std::env::set_var("TALEWEAVE_GENERATION_MODEL", "gemini-test");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.generation.model, "gemini-test");

        std::env::remove_var("TALEWEAVE_DB");
        std::env::remove_var("TALEWEAVE_LOG_LEVEL");
        std::env::remove_var("TALEWEAVE_GENERATION_MODEL");
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/db.sqlite"), PathBuf::from("/var/db.sqlite"));
    }
}
