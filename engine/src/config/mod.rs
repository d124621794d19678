//! Configuration management
//!
//! This module handles loading, validation, and management of the Parley
//! configuration. Configuration is stored in TOML format at
//! ~/.parley/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, log level
//! - **provider**: Generation/embedding provider settings
//! - **retrieval**: Vector store endpoint and ranking thresholds
//! - **cache**: Query cache TTL
//! - **memory**: Conversation memory bounds
//! - **tools**: Tool backend endpoints and timeouts
//!
//! Secrets (the provider API key) are not stored in the file; they are read
//! from the environment variable named by `provider.api_key_env`.

use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure
///
/// Represents the complete configuration loaded from ~/.parley/config.toml.
/// Every section has serde defaults, so a partial file (or none at all) is
/// valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Generation/embedding provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Retrieval and ranking settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Query cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Conversation memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Tool dispatcher settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (holds the SQLite database)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Generation/embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL for the provider API
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Generation model name
    #[serde(default = "default_provider_model")]
    pub model: String,

    /// Embedding model name
    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Timeout for generation/embedding calls in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            model: default_provider_model(),
            embed_model: default_embed_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

/// Retrieval and ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL for the vector store API
    #[serde(default = "default_vector_base_url")]
    pub base_url: String,

    /// Collection holding the knowledge base
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Number of documents to retrieve per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum top adjusted score before the fallback tool is forced
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,

    /// Character budget for the assembled prompt context
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,

    /// Timeout for embedding + search in seconds
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: default_vector_base_url(),
            collection: default_collection(),
            top_k: default_top_k(),
            relevance_threshold: default_relevance_threshold(),
            context_budget: default_context_budget(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

/// Query cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for cache entries in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
        }
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum live turns kept per session
    #[serde(default = "default_message_limit")]
    pub message_limit: i64,

    /// Time-to-live for conversation turns in seconds
    #[serde(default = "default_conversation_ttl")]
    pub conversation_ttl_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            message_limit: default_message_limit(),
            conversation_ttl_secs: default_conversation_ttl(),
        }
    }
}

/// Tool dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Name of the designated generic-lookup fallback tool
    #[serde(default = "default_fallback_tool")]
    pub fallback: String,

    /// Timeout for a single tool invocation in seconds
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    /// Base URL for the web lookup backend
    #[serde(default = "default_web_lookup_base_url")]
    pub web_lookup_base_url: String,

    /// Base URL for the platform status backend
    #[serde(default = "default_status_base_url")]
    pub status_base_url: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fallback: default_fallback_tool(),
            timeout_secs: default_tool_timeout(),
            web_lookup_base_url: default_web_lookup_base_url(),
            status_base_url: default_status_base_url(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parley")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_provider_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_provider_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_embed_model() -> String {
    "text-embedding-004".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_vector_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_collection() -> String {
    "community_docs".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_relevance_threshold() -> f64 {
    0.3
}

fn default_context_budget() -> usize {
    6000
}

fn default_retrieval_timeout() -> u64 {
    10
}

fn default_cache_ttl() -> u64 {
    6 * 60 * 60
}

fn default_message_limit() -> i64 {
    20
}

fn default_conversation_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_fallback_tool() -> String {
    "web_lookup".to_string()
}

fn default_tool_timeout() -> u64 {
    10
}

fn default_web_lookup_base_url() -> String {
    "https://api.duckduckgo.com".to_string()
}

fn default_status_base_url() -> String {
    "https://status.example.com".to_string()
}

impl Config {
    /// Path of the configuration file: ~/.parley/config.toml
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".parley")
            .join("config.toml")
    }

    /// Load configuration from the default location, writing a default file
    /// on first run.
    pub fn load_or_create() -> Result<Self, AgentError> {
        Self::load_or_create_at(&Self::default_path())
    }

    /// Load configuration from a specific path, writing a default file there
    /// if none exists.
    pub fn load_or_create_at(path: &std::path::Path) -> Result<Self, AgentError> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .map_err(|e| AgentError::Config(format!("failed to read {:?}: {}", path, e)))?;
            let config: Config = toml::from_str(&raw)
                .map_err(|e| AgentError::Config(format!("invalid config file: {}", e)))?;
            config.validate()?;
            return Ok(config);
        }

        let config = Config::default();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AgentError::Config(format!("failed to create config dir: {}", e)))?;
        }
        let serialized = toml::to_string_pretty(&config)
            .map_err(|e| AgentError::Config(format!("failed to serialize defaults: {}", e)))?;
        fs::write(path, serialized)
            .map_err(|e| AgentError::Config(format!("failed to write {:?}: {}", path, e)))?;

        Ok(config)
    }

    /// Validate ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), AgentError> {
        if !(0.0..=1.0).contains(&self.retrieval.relevance_threshold) {
            return Err(AgentError::Config(format!(
                "retrieval.relevance_threshold must be within [0, 1], got {}",
                self.retrieval.relevance_threshold
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(AgentError::Config(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if self.memory.message_limit <= 0 {
            return Err(AgentError::Config(
                "memory.message_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the SQLite database inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.core.data_dir.join("parley.db")
    }

    /// Read the provider API key from the configured environment variable.
    pub fn provider_api_key(&self) -> Option<String> {
        std::env::var(&self.provider.api_key_env).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.cache.ttl_secs, 21600);
        assert_eq!(config.memory.message_limit, 20);
        assert_eq!(config.retrieval.relevance_threshold, 0.3);
        assert_eq!(config.tools.fallback, "web_lookup");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [memory]
            message_limit = 5
            "#,
        )
        .unwrap();

        assert_eq!(parsed.memory.message_limit, 5);
        // Untouched sections keep their defaults
        assert_eq!(parsed.cache.ttl_secs, 21600);
        assert_eq!(parsed.retrieval.top_k, 5);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = Config::load_or_create_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.memory.message_limit, 20);

        // Second load reads the file back
        let reloaded = Config::load_or_create_at(&path).unwrap();
        assert_eq!(reloaded.cache.ttl_secs, config.cache.ttl_secs);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.retrieval.relevance_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config = Config::default();
        config.memory.message_limit = 0;
        assert!(config.validate().is_err());
    }
}
