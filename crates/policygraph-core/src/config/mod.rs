//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Policygraph configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file holding graph snapshots; defaults to `<config dir>/policygraph.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum number of nodes in a retrieved subgraph
    pub node_budget: usize,
    /// Maximum number of relation triples returned with a context
    pub max_relations: usize,
    /// Maximum number of mentions taken from the fallback extractor
    pub max_mentions: usize,
    /// Ask the LLM for query mentions before falling back to script runs
    pub use_llm_mentions: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            node_budget: 30,
            max_relations: 20,
            max_mentions: 10,
            use_llm_mentions: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Entity mentions shorter than this (in characters) are ignored
    pub min_entity_chars: usize,
    /// Run label deduplication after every rebuild
    pub dedup_after_rebuild: bool,
    /// Document text longer than this is truncated before extraction (0 = unlimited)
    pub max_text_chars: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            min_entity_chars: 2,
            dedup_after_rebuild: true,
            max_text_chars: 32_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("POLICYGRAPH_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                let chars: Vec<char> = key.chars().collect();
                if chars.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix: String = chars[chars.len() - 4..].iter().collect();
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("POLICYGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("policygraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;
        if self.retrieval.node_budget == 0 {
            return Err(anyhow!("retrieval.node_budget must be at least 1"));
        }
        if self.ingestion.min_entity_chars == 0 {
            return Err(anyhow!("ingestion.min_entity_chars must be at least 1"));
        }
        Ok(())
    }

    /// Resolved path of the snapshot database
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("policygraph.db")),
        }
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "storage.database_path" => Ok(self
                .storage
                .database_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(default)".to_string())),

            "retrieval.node_budget" => Ok(self.retrieval.node_budget.to_string()),
            "retrieval.max_relations" => Ok(self.retrieval.max_relations.to_string()),
            "retrieval.max_mentions" => Ok(self.retrieval.max_mentions.to_string()),
            "retrieval.use_llm_mentions" => Ok(self.retrieval.use_llm_mentions.to_string()),

            "ingestion.min_entity_chars" => Ok(self.ingestion.min_entity_chars.to_string()),
            "ingestion.dedup_after_rebuild" => Ok(self.ingestion.dedup_after_rebuild.to_string()),
            "ingestion.max_text_chars" => Ok(self.ingestion.max_text_chars.to_string()),

            "llm.base_url" => Ok(self.llm.base_url.clone()),
            "llm.model" => Ok(self.llm.model.clone()),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),

            // API key is shown redacted
            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok(
                    "(not set - use POLICYGRAPH_API_KEY or OPENAI_API_KEY env var)".to_string(),
                ),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `policygraph config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "storage.database_path" => {
                self.storage.database_path = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }

            "retrieval.node_budget" => {
                let budget: usize = value
                    .parse()
                    .with_context(|| format!("Invalid node_budget value: {}", value))?;
                if budget == 0 {
                    return Err(anyhow!("Node budget must be at least 1"));
                }
                self.retrieval.node_budget = budget;
            }
            "retrieval.max_relations" => {
                self.retrieval.max_relations = value
                    .parse()
                    .with_context(|| format!("Invalid max_relations value: {}", value))?;
            }
            "retrieval.max_mentions" => {
                self.retrieval.max_mentions = value
                    .parse()
                    .with_context(|| format!("Invalid max_mentions value: {}", value))?;
            }
            "retrieval.use_llm_mentions" => {
                self.retrieval.use_llm_mentions = parse_bool(value)?;
            }

            "ingestion.min_entity_chars" => {
                let min: usize = value
                    .parse()
                    .with_context(|| format!("Invalid min_entity_chars value: {}", value))?;
                if min == 0 {
                    return Err(anyhow!("Minimum entity length must be at least 1"));
                }
                self.ingestion.min_entity_chars = min;
            }
            "ingestion.dedup_after_rebuild" => {
                self.ingestion.dedup_after_rebuild = parse_bool(value)?;
            }
            "ingestion.max_text_chars" => {
                self.ingestion.max_text_chars = value
                    .parse()
                    .with_context(|| format!("Invalid max_text_chars value: {}", value))?;
            }

            "llm.base_url" => {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    return Err(anyhow!("Base URL must start with http:// or https://"));
                }
                self.llm.base_url = value.trim_end_matches('/').to_string();
            }
            "llm.model" => {
                self.llm.model = value.to_string();
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            // API key cannot be set via config
            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the POLICYGRAPH_API_KEY or OPENAI_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `policygraph config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = vec![
            "storage.database_path",
            "retrieval.node_budget",
            "retrieval.max_relations",
            "retrieval.max_mentions",
            "retrieval.use_llm_mentions",
            "ingestion.min_entity_chars",
            "ingestion.dedup_after_rebuild",
            "ingestion.max_text_chars",
            "llm.base_url",
            "llm.model",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.api_key",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(anyhow!("Invalid boolean value: {}", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retrieval.node_budget, 30);
        assert_eq!(config.retrieval.max_relations, 20);
        assert_eq!(config.retrieval.max_mentions, 10);
        assert!(!config.retrieval.use_llm_mentions);
        assert_eq!(config.ingestion.min_entity_chars, 2);
        assert!(config.ingestion.dedup_after_rebuild);
        assert_eq!(config.ingestion.max_text_chars, 32_000);
        assert!(config.storage.database_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();
        config.set("retrieval.node_budget", "12").unwrap();
        assert_eq!(config.get("retrieval.node_budget").unwrap(), "12");

        config.set("retrieval.use_llm_mentions", "yes").unwrap();
        assert!(config.retrieval.use_llm_mentions);

        config.set("storage.database_path", "/tmp/graph.db").unwrap();
        assert_eq!(config.get("storage.database_path").unwrap(), "/tmp/graph.db");
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/graph.db"));
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = Config::default();
        assert!(config.set("retrieval.node_budget", "0").is_err());
        assert!(config.set("retrieval.node_budget", "many").is_err());
        assert!(config.set("llm.temperature", "3.5").is_err());
        assert!(config.set("llm.base_url", "ftp://example.com").is_err());
        assert!(config.set("ingestion.dedup_after_rebuild", "maybe").is_err());
        assert!(config.set("no.such.key", "1").is_err());
    }

    #[test]
    fn test_api_key_cannot_be_stored() {
        let mut config = Config::default();
        assert!(config.set("llm.api_key", "sk-secret").is_err());

        config.llm.api_key = Some("sk-secret".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[retrieval]\nnode_budget = 5\n").unwrap();
        assert_eq!(config.retrieval.node_budget, 5);
        assert_eq!(config.retrieval.max_relations, 20);
        assert_eq!(config.ingestion.min_entity_chars, 2);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = Config::default();
        config.set("llm.model", "qwen-plus").unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.llm.model, "qwen-plus");
    }

    #[test]
    fn test_list_contains_all_sections() {
        let config = Config::default();
        let keys: Vec<String> = config.list().unwrap().into_iter().map(|(k, _)| k).collect();
        assert!(keys.iter().any(|k| k.starts_with("storage.")));
        assert!(keys.iter().any(|k| k.starts_with("retrieval.")));
        assert!(keys.iter().any(|k| k.starts_with("ingestion.")));
        assert!(keys.iter().any(|k| k.starts_with("llm.")));
    }
}
