//! Configuration management for specforge
//!
//! Settings load from environment variables with defaults. Component configs
//! (`RetrieverConfig`, `BuildOptions`, `OrchestratorConfig`, ...) are derived
//! from the loaded values.
//!
//! # Environment Variables
//!
//! - `SPECFORGE_PROVIDER`: LLM provider (ollama|openai|claude|gemini|grok|groq) - default: "ollama"
//! - `SPECFORGE_MODEL`: Model name - default: "qwen2.5-coder:7b" for Ollama
//! - `SPECFORGE_ENDPOINT`: Custom provider base URL - optional
//! - `SPECFORGE_REQUEST_TIMEOUT`: Per-call timeout in seconds - default: "120"
//! - `SPECFORGE_MAX_RETRIES`: Collaborator call retries - default: "3"
//! - `SPECFORGE_MAX_SESSIONS`: Concurrently executing sessions - default: "4"
//! - `SPECFORGE_WORKSPACE_ROOT`: Session workspaces - default: user cache dir + "specforge/workspaces"
//! - `SPECFORGE_EMBEDDING_DIM`: Vector dimension - default: "384"
//! - `SPECFORGE_EMBEDDING_URL`: OpenAI-compatible embeddings server - optional, hashing embedder otherwise
//! - `SPECFORGE_EMBEDDING_MODEL`: Model name sent to the embeddings server - default: "all-minilm"
//! - `SPECFORGE_CACHE_TTL`: Retrieval cache TTL in seconds - default: "300"
//! - `SPECFORGE_CACHE_CAPACITY`: Retrieval cache entries - default: "256"
//! - `SPECFORGE_STEP_BACKOFF_MS`: Delay between build step retries - default: "1000"
//! - `SPECFORGE_LOG_LEVEL`: Logging level - default: "info"
//!
//! Provider credentials are read by genai itself (`OPENAI_API_KEY`,
//! `ANTHROPIC_API_KEY`, `OLLAMA_HOST`, ...).

use crate::build::{BuildEngine, BuildOptions, StructuredPlanParser};
use crate::collaborators::{
    CollaboratorError, DirectoryIntrospector, Embedder, HashingEmbedder, HttpEmbedder,
    LlmPlanGenerator, LlmSpecificationWriter, Resilient, RetryPolicy,
};
use crate::concepts::ConceptualMapper;
use crate::llm::{BackendError, GenAIClient, LLMClient};
use crate::retrieval::{RetrieverConfig, SemanticRetriever};
use crate::session::{OrchestratorConfig, PipelineServices};
use crate::vector::{StoreError, VectorStore};
use genai::adapter::AdapterKind;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5-coder:7b";
const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_MAX_SESSIONS: usize = 4;
const DEFAULT_EMBEDDING_DIM: usize = 384;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_CAPACITY: usize = 256;
const DEFAULT_STEP_BACKOFF_MS: u64 = 1000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider: {0}. Valid options: ollama, openai, claude, gemini, grok, groq")]
    InvalidProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Backend initialization failed: {0}")]
    BackendInitError(#[from] BackendError),

    #[error("Embedder initialization failed: {0}")]
    EmbedderInitError(#[from] CollaboratorError),

    #[error("Vector store initialization failed: {0}")]
    StoreInitError(#[from] StoreError),
}

pub fn parse_provider(name: &str) -> Result<AdapterKind, ConfigError> {
    match name.to_lowercase().as_str() {
        "ollama" => Ok(AdapterKind::Ollama),
        "openai" => Ok(AdapterKind::OpenAI),
        "claude" | "anthropic" => Ok(AdapterKind::Anthropic),
        "gemini" => Ok(AdapterKind::Gemini),
        "grok" | "xai" => Ok(AdapterKind::Xai),
        "groq" => Ok(AdapterKind::Groq),
        other => Err(ConfigError::InvalidProvider(other.to_string())),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn default_workspace_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("specforge")
        .join("workspaces")
}

/// Main configuration structure for specforge
///
/// `Default::default()` loads from environment variables with fallback
/// defaults.
#[derive(Debug, Clone)]
pub struct SpecforgeConfig {
    pub provider: AdapterKind,
    pub model: String,
    pub endpoint: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub max_sessions: usize,
    pub workspace_root: PathBuf,
    pub embedding_dim: usize,
    pub embedding_url: Option<String>,
    pub embedding_model: String,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub step_backoff_ms: u64,
    pub log_level: String,
}

impl Default for SpecforgeConfig {
    fn default() -> Self {
        // Unknown providers fall back to Ollama here; `from_env` reports them.
        let provider = env::var("SPECFORGE_PROVIDER")
            .ok()
            .and_then(|s| parse_provider(&s).ok())
            .unwrap_or(AdapterKind::Ollama);

        let model = env::var("SPECFORGE_MODEL").unwrap_or_else(|_| match provider {
            AdapterKind::Ollama => DEFAULT_OLLAMA_MODEL.to_string(),
            _ => "default-model".to_string(),
        });

        Self {
            provider,
            model,
            endpoint: env::var("SPECFORGE_ENDPOINT").ok().filter(|s| !s.is_empty()),
            request_timeout_secs: env_parse("SPECFORGE_REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: env_parse("SPECFORGE_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            max_sessions: env_parse("SPECFORGE_MAX_SESSIONS", DEFAULT_MAX_SESSIONS),
            workspace_root: env::var("SPECFORGE_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_workspace_root()),
            embedding_dim: env_parse("SPECFORGE_EMBEDDING_DIM", DEFAULT_EMBEDDING_DIM),
            embedding_url: env::var("SPECFORGE_EMBEDDING_URL").ok().filter(|s| !s.is_empty()),
            embedding_model: env::var("SPECFORGE_EMBEDDING_MODEL")
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string()),
            cache_ttl_secs: env_parse("SPECFORGE_CACHE_TTL", DEFAULT_CACHE_TTL_SECS),
            cache_capacity: env_parse("SPECFORGE_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY),
            step_backoff_ms: env_parse("SPECFORGE_STEP_BACKOFF_MS", DEFAULT_STEP_BACKOFF_MS),
            log_level: env::var("SPECFORGE_LOG_LEVEL")
                .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
                .to_lowercase(),
        }
    }
}

impl SpecforgeConfig {
    /// Like `default()`, but an unrecognized `SPECFORGE_PROVIDER` is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(name) = env::var("SPECFORGE_PROVIDER") {
            parse_provider(&name)?;
        }
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Range-checks numeric values and the log level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be between 1 second and 10 minutes".to_string(),
            ));
        }
        if self.max_retries > 10 {
            return Err(ConfigError::ValidationFailed(
                "Max retries cannot exceed 10".to_string(),
            ));
        }
        if self.max_sessions == 0 || self.max_sessions > 256 {
            return Err(ConfigError::ValidationFailed(
                "Max sessions must be between 1 and 256".to_string(),
            ));
        }
        if self.embedding_dim == 0 || self.embedding_dim > 8192 {
            return Err(ConfigError::ValidationFailed(
                "Embedding dimension must be between 1 and 8192".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "Cache capacity must be at least 1".to_string(),
            ));
        }
        if self.step_backoff_ms > 60_000 {
            return Err(ConfigError::ValidationFailed(
                "Step backoff cannot exceed 60 seconds".to_string(),
            ));
        }
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_timeout(self.request_timeout())
            .with_max_retries(self.max_retries)
    }

    pub fn retriever_config(&self) -> RetrieverConfig {
        RetrieverConfig::default().with_cache(
            Duration::from_secs(self.cache_ttl_secs),
            self.cache_capacity,
        )
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::default().with_backoff(Duration::from_millis(self.step_backoff_ms))
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_max_concurrent_sessions(self.max_sessions)
            .with_workspace_root(self.workspace_root.clone())
    }

    pub fn create_llm_client(&self) -> Result<Arc<dyn LLMClient>, ConfigError> {
        let client = GenAIClient::new(
            self.provider,
            self.model.clone(),
            self.request_timeout(),
            self.endpoint.clone(),
        )?;
        Ok(Arc::new(client))
    }

    /// HTTP embedder when `embedding_url` is set, hashing embedder otherwise.
    pub fn create_embedder(&self) -> Result<Arc<dyn Embedder>, ConfigError> {
        match &self.embedding_url {
            Some(url) => Ok(Arc::new(HttpEmbedder::new(
                url,
                self.embedding_model.clone(),
                self.embedding_dim,
                self.request_timeout(),
            )?)),
            None => Ok(Arc::new(HashingEmbedder::new(self.embedding_dim))),
        }
    }

    /// Wires every pipeline component from this configuration.
    pub fn create_services(&self) -> Result<PipelineServices, ConfigError> {
        let store = Arc::new(VectorStore::in_memory(self.embedding_dim)?);
        let embedder = self.create_embedder()?;
        let llm = self.create_llm_client()?;
        let policy = self.retry_policy();

        Ok(PipelineServices {
            retriever: Arc::new(SemanticRetriever::new(
                store.clone(),
                embedder.clone(),
                self.retriever_config(),
            )),
            mapper: Arc::new(ConceptualMapper::new(store, embedder)),
            build_engine: Arc::new(BuildEngine::new()),
            plan_generator: Arc::new(Resilient::new(
                Arc::new(LlmPlanGenerator::new(llm.clone())),
                policy.clone(),
            )),
            plan_parser: Arc::new(StructuredPlanParser::default()),
            introspector: Arc::new(Resilient::new(
                Arc::new(DirectoryIntrospector::new()),
                policy.clone(),
            )),
            specification_writer: Arc::new(Resilient::new(
                Arc::new(LlmSpecificationWriter::new(llm)),
                policy,
            )),
        })
    }
}

impl fmt::Display for SpecforgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Specforge Configuration:")?;
        writeln!(f, "  Provider: {}", self.provider.as_str())?;
        writeln!(f, "  Model: {}", self.model)?;
        if let Some(ref endpoint) = self.endpoint {
            writeln!(f, "  Endpoint: {}", endpoint)?;
        }
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Max Retries: {}", self.max_retries)?;
        writeln!(f, "  Max Sessions: {}", self.max_sessions)?;
        writeln!(f, "  Workspace Root: {}", self.workspace_root.display())?;
        writeln!(f, "  Embedding Dimension: {}", self.embedding_dim)?;
        match self.embedding_url {
            Some(ref url) => writeln!(f, "  Embeddings: {} ({})", url, self.embedding_model)?,
            None => writeln!(f, "  Embeddings: hashing")?,
        }
        writeln!(f, "  Cache: {} entries, {}s TTL", self.cache_capacity, self.cache_ttl_secs)?;
        writeln!(f, "  Step Backoff: {}ms", self.step_backoff_ms)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = vec![
            EnvGuard::unset("SPECFORGE_PROVIDER"),
            EnvGuard::unset("SPECFORGE_MODEL"),
            EnvGuard::unset("SPECFORGE_MAX_SESSIONS"),
            EnvGuard::unset("SPECFORGE_EMBEDDING_URL"),
            EnvGuard::set("SPECFORGE_LOG_LEVEL", DEFAULT_LOG_LEVEL),
        ];

        let config = SpecforgeConfig::default();
        assert_eq!(config.provider, AdapterKind::Ollama);
        assert_eq!(config.model, DEFAULT_OLLAMA_MODEL);
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        assert!(config.embedding_url.is_none());
        assert!(config.workspace_root.ends_with("specforge/workspaces"));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("SPECFORGE_PROVIDER", "claude"),
            EnvGuard::set("SPECFORGE_MODEL", "custom-model"),
            EnvGuard::set("SPECFORGE_MAX_SESSIONS", "8"),
            EnvGuard::set("SPECFORGE_EMBEDDING_DIM", "64"),
            EnvGuard::set("SPECFORGE_WORKSPACE_ROOT", "/tmp/sf"),
            EnvGuard::set("SPECFORGE_STEP_BACKOFF_MS", "5"),
            EnvGuard::set("SPECFORGE_LOG_LEVEL", "DEBUG"),
        ];

        let config = SpecforgeConfig::default();
        assert_eq!(config.provider, AdapterKind::Anthropic);
        assert_eq!(config.model, "custom-model");
        assert_eq!(config.max_sessions, 8);
        assert_eq!(config.embedding_dim, 64);
        assert_eq!(config.workspace_root, PathBuf::from("/tmp/sf"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.build_options().backoff, Duration::from_millis(5));
        assert_eq!(config.orchestrator_config().max_concurrent_sessions, 8);
    }

    #[test]
    #[serial]
    fn test_unparseable_numbers_fall_back() {
        let _guard = EnvGuard::set("SPECFORGE_CACHE_CAPACITY", "lots");
        assert_eq!(SpecforgeConfig::default().cache_capacity, DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unknown_provider() {
        let _guard = EnvGuard::set("SPECFORGE_PROVIDER", "skynet");
        assert!(matches!(
            SpecforgeConfig::from_env(),
            Err(ConfigError::InvalidProvider(_))
        ));
    }

    #[test]
    #[serial]
    fn test_validation_ranges() {
        let mut config = SpecforgeConfig::default();
        config.log_level = "info".to_string();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = SpecforgeConfig::default();
        config.log_level = "info".to_string();
        config.max_sessions = 0;
        assert!(config.validate().is_err());

        let mut config = SpecforgeConfig::default();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_hashing_embedder_without_url() {
        let _guard = EnvGuard::unset("SPECFORGE_EMBEDDING_URL");
        let mut config = SpecforgeConfig::default();
        config.embedding_dim = 32;
        let embedder = config.create_embedder().unwrap();
        assert_eq!(embedder.dimension(), 32);
    }

    #[test]
    #[serial]
    fn test_config_display() {
        let display = SpecforgeConfig::default().to_string();
        assert!(display.contains("Specforge Configuration:"));
        assert!(display.contains("Workspace Root:"));
    }
}
