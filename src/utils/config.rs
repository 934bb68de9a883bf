//! Configuration loading
//!
//! Settings come from four layers, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. `ragchain.toml` (optional unless a path is given explicitly)
//! 3. `.env` in the working directory (via `dotenvy`)
//! 4. Process environment variables
//!
//! Credentials are only ever read from the environment and are never written
//! back out: [`Config::redacted`] masks them.
//!
//! ```toml
//! [llm]
//! model = "gpt-4o-mini"
//!
//! [pinecone]
//! index_name = "ragchain"
//!
//! [splitter]
//! chunk_size = 100
//! chunk_overlap = 0
//! ```

use crate::types::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ragchain.toml";

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const PINECONE_API_KEY: &str = "PINECONE_API_KEY";
pub const PINECONE_ENV: &str = "PINECONE_ENV";
pub const PINECONE_ENVIRONMENT: &str = "PINECONE_ENVIRONMENT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LLMConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub splitter: SplitterConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(skip)]
    credentials: Credentials,
}

#[derive(Debug, Clone, Default)]
struct Credentials {
    openai_api_key: Option<String>,
    pinecone_api_key: Option<String>,
    pinecone_environment: Option<String>,
}

/// Pinecone credentials, resolved together because the store needs both.
#[derive(Debug, Clone)]
pub struct PineconeCredentials {
    pub api_key: String,
    pub environment: String,
}

// ============= LLM Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature; `None` leaves the provider default in place
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            temperature: None,
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ============= Embeddings Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector size produced by `model`; also used when creating an index
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Inputs per embeddings request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batches in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Entries kept by the embedding cache (0 disables it)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_batch_size() -> usize {
    64
}

fn default_concurrency() -> usize {
    4
}

fn default_cache_capacity() -> usize {
    10_000
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

// ============= Pinecone Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PineconeConfig {
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Cloud used when creating serverless indexes (region comes from the environment)
    #[serde(default = "default_cloud")]
    pub cloud: String,

    #[serde(default = "default_controller_url")]
    pub controller_url: String,

    /// Data-plane host; resolved through the control plane when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_host: Option<String>,

    #[serde(default)]
    pub namespace: String,

    #[serde(default = "default_metric")]
    pub metric: String,
}

fn default_index_name() -> String {
    "ragchain".to_string()
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_controller_url() -> String {
    "https://api.pinecone.io".to_string()
}

fn default_metric() -> String {
    "cosine".to_string()
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            index_name: default_index_name(),
            cloud: default_cloud(),
            controller_url: default_controller_url(),
            index_host: None,
            namespace: String::new(),
            metric: default_metric(),
        }
    }
}

// ============= Splitter Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub chunk_overlap: usize,

    /// Use boundary-aware splitting instead of fixed windows
    #[serde(default)]
    pub semantic: bool,
}

fn default_chunk_size() -> usize {
    100
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: 0,
            semantic: false,
        }
    }
}

// ============= Retry Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

// ============= Tools Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_python_bin")]
    pub python_bin: String,

    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Substrings that send an agent input to the code interpreter
    #[serde(default = "default_trigger_keywords")]
    pub trigger_keywords: Vec<String>,
}

fn default_python_bin() -> String {
    "python3".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_output_bytes() -> usize {
    20_000
}

fn default_trigger_keywords() -> Vec<String> {
    vec!["calculate".to_string()]
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            python_bin: default_python_bin(),
            timeout_secs: default_tool_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            trigger_keywords: default_trigger_keywords(),
        }
    }
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// ============= Loading =============

impl Config {
    /// Load from `path` if it exists, falling back to defaults, then apply
    /// `.env` and the process environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let base = if path.exists() {
            Self::parse_file(path)?
        } else {
            Self::default()
        };
        Self::finish(base)
    }

    /// Like [`Config::load`], but a missing file is an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AppError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        Self::finish(Self::parse_file(path)?)
    }

    /// Parse TOML content without touching the environment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn finish(mut config: Self) -> Result<Self> {
        dotenvy::dotenv().ok();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        self.credentials.openai_api_key = non_empty(OPENAI_API_KEY);
        self.credentials.pinecone_api_key = non_empty(PINECONE_API_KEY);
        self.credentials.pinecone_environment =
            non_empty(PINECONE_ENV).or_else(|| non_empty(PINECONE_ENVIRONMENT));

        if let Some(v) = non_empty("OPENAI_API_BASE") {
            self.llm.api_base = v;
        }
        if let Some(v) = non_empty("OPENAI_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = non_empty("OPENAI_EMBEDDING_MODEL") {
            self.embeddings.model = v;
        }
        if let Some(v) = non_empty("PINECONE_INDEX") {
            self.pinecone.index_name = v;
        }
        if let Some(v) = non_empty("PINECONE_INDEX_HOST") {
            self.pinecone.index_host = Some(v);
        }
        if let Some(v) = non_empty("PINECONE_CONTROLLER_URL") {
            self.pinecone.controller_url = v;
        }
        if let Some(v) = non_empty("PINECONE_NAMESPACE") {
            self.pinecone.namespace = v;
        }
        if let Some(v) = non_empty("RAGCHAIN_CHUNK_SIZE") {
            self.splitter.chunk_size = parse_env("RAGCHAIN_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = non_empty("RAGCHAIN_CHUNK_OVERLAP") {
            self.splitter.chunk_overlap = parse_env("RAGCHAIN_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = non_empty("RAGCHAIN_LOG") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// Check internal consistency. Credentials are checked lazily by their accessors.
    pub fn validate(&self) -> Result<()> {
        if self.splitter.chunk_size == 0 {
            return Err(AppError::Configuration(
                "splitter.chunk_size must be greater than 0".into(),
            ));
        }
        if self.splitter.chunk_overlap >= self.splitter.chunk_size {
            return Err(AppError::Configuration(format!(
                "splitter.chunk_overlap ({}) must be smaller than splitter.chunk_size ({})",
                self.splitter.chunk_overlap, self.splitter.chunk_size
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.embeddings.batch_size == 0 || self.embeddings.concurrency == 0 {
            return Err(AppError::Configuration(
                "embeddings.batch_size and embeddings.concurrency must be at least 1".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(AppError::Configuration(format!(
                "logging.format must be \"pretty\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }
        Ok(())
    }

    pub fn openai_api_key(&self) -> Result<String> {
        self.credentials
            .openai_api_key
            .clone()
            .ok_or_else(|| missing_env(OPENAI_API_KEY))
    }

    pub fn pinecone_credentials(&self) -> Result<PineconeCredentials> {
        let api_key = self
            .credentials
            .pinecone_api_key
            .clone()
            .ok_or_else(|| missing_env(PINECONE_API_KEY))?;
        let environment = self
            .credentials
            .pinecone_environment
            .clone()
            .ok_or_else(|| missing_env(PINECONE_ENV))?;
        Ok(PineconeCredentials {
            api_key,
            environment,
        })
    }

    /// Set credentials directly, bypassing the environment.
    pub fn with_credentials(
        mut self,
        openai_api_key: Option<String>,
        pinecone_api_key: Option<String>,
        pinecone_environment: Option<String>,
    ) -> Self {
        self.credentials = Credentials {
            openai_api_key,
            pinecone_api_key,
            pinecone_environment,
        };
        self
    }

    /// Render the effective configuration as TOML with credentials masked.
    pub fn redacted(&self) -> Result<String> {
        let body = toml::to_string_pretty(self)
            .map_err(|e| AppError::Internal(format!("Failed to render config: {}", e)))?;

        let show = |v: &Option<String>| match v {
            Some(secret) => mask_secret(secret),
            None => "<not set>".to_string(),
        };
        let environment = self
            .credentials
            .pinecone_environment
            .clone()
            .unwrap_or_else(|| "<not set>".to_string());

        Ok(format!(
            "# credentials\n# {} = {}\n# {} = {}\n# {} = {}\n\n{}",
            OPENAI_API_KEY,
            show(&self.credentials.openai_api_key),
            PINECONE_API_KEY,
            show(&self.credentials.pinecone_api_key),
            PINECONE_ENV,
            environment,
            body
        ))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        AppError::Configuration(format!("{} has an invalid value: {:?}", key, value))
    })
}

fn missing_env(name: &str) -> AppError {
    AppError::Configuration(format!(
        "{} is not set (export it or add it to .env)",
        name
    ))
}

/// Keep a short prefix so a key can be recognised without being leaked.
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 8 {
        return "****".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}****", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.splitter.chunk_size, 100);
        assert_eq!(config.splitter.chunk_overlap, 0);
        assert_eq!(config.tools.trigger_keywords, vec!["calculate"]);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = Config::from_toml_str(
            r#"
            [llm]
            model = "gpt-4o"

            [splitter]
            chunk_size = 500
            chunk_overlap = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.api_base, "https://api.openai.com/v1");
        assert_eq!(config.splitter.chunk_size, 500);
        assert_eq!(config.splitter.chunk_overlap, 50);
        assert_eq!(config.pinecone.index_name, "ragchain");
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = Config::from_toml_str("[llm\nmodel = 1").unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config = Config::default();
        config.splitter.chunk_size = 10;
        config.splitter.chunk_overlap = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_and_credentials() {
        let mut config = Config::default();
        config
            .apply_env_with(lookup(&[
                ("OPENAI_API_KEY", "sk-test-123456789"),
                ("PINECONE_API_KEY", "pc-abcdefghijkl"),
                ("PINECONE_ENVIRONMENT", "us-east-1"),
                ("OPENAI_MODEL", "gpt-4o"),
                ("PINECONE_INDEX", "docs"),
                ("RAGCHAIN_CHUNK_SIZE", "250"),
            ]))
            .unwrap();

        assert_eq!(config.openai_api_key().unwrap(), "sk-test-123456789");
        let pinecone = config.pinecone_credentials().unwrap();
        assert_eq!(pinecone.api_key, "pc-abcdefghijkl");
        assert_eq!(pinecone.environment, "us-east-1");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.pinecone.index_name, "docs");
        assert_eq!(config.splitter.chunk_size, 250);
    }

    #[test]
    fn test_pinecone_env_takes_precedence_over_long_name() {
        let mut config = Config::default();
        config
            .apply_env_with(lookup(&[
                ("PINECONE_API_KEY", "key"),
                ("PINECONE_ENV", "gcp-starter"),
                ("PINECONE_ENVIRONMENT", "us-east-1"),
            ]))
            .unwrap();
        assert_eq!(
            config.pinecone_credentials().unwrap().environment,
            "gcp-starter"
        );
    }

    #[test]
    fn test_missing_credentials_name_the_variable() {
        let config = Config::default();
        let err = config.openai_api_key().unwrap_err().to_string();
        assert!(err.contains("OPENAI_API_KEY"));

        let config = Config::default().with_credentials(None, Some("key".into()), None);
        let err = config.pinecone_credentials().unwrap_err().to_string();
        assert!(err.contains("PINECONE_ENV"));
    }

    #[test]
    fn test_invalid_numeric_env_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env_with(lookup(&[("RAGCHAIN_CHUNK_SIZE", "lots")]));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let config = Config::default().with_credentials(
            Some("sk-verysecretvalue".into()),
            None,
            Some("us-east-1".into()),
        );
        let rendered = config.redacted().unwrap();
        assert!(rendered.contains("sk-v****"));
        assert!(!rendered.contains("verysecretvalue"));
        assert!(rendered.contains("PINECONE_API_KEY = <not set>"));
        assert!(rendered.contains("us-east-1"));
        assert!(rendered.contains("[splitter]"));
    }

    #[test]
    fn test_mask_short_secret() {
        assert_eq!(mask_secret("abc"), "****");
    }

    #[test]
    fn test_from_file_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::from_file(dir.path().join("nope.toml"));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}
