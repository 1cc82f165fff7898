//! Configuration for the kyrlex legal assistant.
//!
//! Settings are layered in this order, later sources overriding earlier ones:
//! - built-in defaults (the tuned values the assistant ships with)
//! - an optional TOML file
//! - environment variables prefixed with `KYRLEX_`, nested with `__`
//!   (e.g. `KYRLEX_RETRIEVAL__K=10`, `KYRLEX_GENERATION__API_KEY=...`)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file location, relative to the user's config directory.
const CONFIG_DIR_NAME: &str = "kyrlex";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised by [`Config::validate`].
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("retrieval.k must be greater than zero")]
    ZeroBreadth,

    #[error("generation.temperatures must not be empty")]
    NoTemperatures,

    #[error("generation.max_retries must be at least 1")]
    ZeroRetries,

    #[error("validation.min_answer_length ({min}) exceeds max_answer_length ({max})")]
    InvertedLengthBounds { min: usize, max: usize },

    #[error("retrieval.mmr_lambda must be within [0, 1], got {0}")]
    LambdaOutOfRange(f32),

    #[error("generation.backoff_multiplier must be a finite number of at least 1.0, got {0}")]
    InvalidBackoffMultiplier(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub validation: ValidationConfig,
    pub embeddings: EmbeddingsConfig,
    pub reranker: RerankerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Retrieval breadth, reranking and caching knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks that end up in the assembled context
    pub k: usize,
    /// Hard cap on how many deduplicated candidates are sent to the reranker
    pub rerank_top_n: usize,
    pub use_reranking: bool,
    /// Enable the BM25 keyword channel
    pub use_bm25: bool,
    /// MMR trade-off: 1.0 is pure relevance, 0.0 is pure diversity
    pub mmr_lambda: f32,
    /// Maximum number of assembled contexts kept in the result cache
    pub cache_capacity: usize,
    pub max_chunks_per_source: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 8,
            rerank_top_n: 15,
            use_reranking: true,
            use_bm25: true,
            mmr_lambda: 0.5,
            cache_capacity: 100,
            max_chunks_per_source: 3,
        }
    }
}

/// LLM generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    /// API key, either literal or `${ENV_VAR}`
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Temperatures used by self-consistency mode; the first one is the base temperature
    pub temperatures: Vec<f32>,
    pub streaming_temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
    /// Quality mode: vote across all temperatures instead of single-shot + repair
    pub self_consistency: bool,
    /// Attempt budget for every underlying generation call
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: f64,
    /// Whole-stream attempts in streaming mode
    pub stream_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-flash-latest".to_string(),
            api_key: Some("${GEMINI_API_KEY}".to_string()),
            base_url: None,
            temperatures: vec![0.1, 0.2, 0.15],
            streaming_temperature: 0.1,
            max_output_tokens: 2048,
            top_p: 0.95,
            top_k: 40,
            self_consistency: false,
            max_retries: 3,
            backoff_base_ms: 1000,
            backoff_multiplier: 2.0,
            stream_attempts: 2,
        }
    }
}

/// Answer acceptance bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_answer_length: usize,
    pub max_answer_length: usize,
    /// Contexts longer than this require a citation or legal terminology in the answer
    pub reference_context_threshold: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_answer_length: 20,
            max_answer_length: 1500,
            reference_context_threshold: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub model: String,
    /// OpenAI-compatible `/embeddings` endpoint
    pub base_url: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2".to_string(),
            base_url: "http://localhost:8080/v1/embeddings".to_string(),
            api_key: None,
            dimensions: 384,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RerankerConfig {
    pub model: String,
    /// Cross-encoder server exposing `POST /rerank`
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            model: "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string(),
            base_url: "http://localhost:8081".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON-lines file of pre-chunked statute text
    pub chunks_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunks_path: "db/chunks.jsonl".to_string(),
        }
    }
}

impl StoreConfig {
    /// Chunks path with `~` and `$VAR` expanded.
    pub fn resolved_chunks_path(&self) -> PathBuf {
        PathBuf::from(
            shellexpand::full(&self.chunks_path)
                .map(|p| p.into_owned())
                .unwrap_or_else(|_| self.chunks_path.clone()),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Optional log file; logs go to stderr when unset
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            validation: ValidationConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            reranker: RerankerConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// When `path` is `None` the default location (`~/.config/kyrlex/config.toml`) is
    /// used if it exists. An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        match path {
            Some(path) => {
                builder = builder.add_source(
                    File::from(path.to_path_buf())
                        .format(FileFormat::Toml)
                        .required(true),
                );
            }
            None => {
                if let Some(default_path) = Self::default_path() {
                    builder = builder.add_source(
                        File::from(default_path)
                            .format(FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("KYRLEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from TOML text, filling missing fields with defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// `~/.config/kyrlex/config.toml`, if a config directory exists on this platform.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.retrieval.k == 0 {
            return Err(ValidationError::ZeroBreadth);
        }
        if self.generation.temperatures.is_empty() {
            return Err(ValidationError::NoTemperatures);
        }
        if self.generation.max_retries == 0 {
            return Err(ValidationError::ZeroRetries);
        }
        if self.validation.min_answer_length > self.validation.max_answer_length {
            return Err(ValidationError::InvertedLengthBounds {
                min: self.validation.min_answer_length,
                max: self.validation.max_answer_length,
            });
        }
        if !(0.0..=1.0).contains(&self.retrieval.mmr_lambda) {
            return Err(ValidationError::LambdaOutOfRange(self.retrieval.mmr_lambda));
        }
        let multiplier = self.generation.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ValidationError::InvalidBackoffMultiplier(multiplier));
        }
        Ok(())
    }
}

/// Resolve an optional API key value, expanding `${ENV_VAR}` syntax.
/// Returns None if not configured or the referenced variable is unset.
pub fn resolve_api_key(api_key: &Option<String>) -> Option<String> {
    match api_key {
        Some(key) if key.starts_with("${") && key.ends_with('}') => {
            let var_name = &key[2..key.len() - 1];
            std::env::var(var_name).ok().filter(|v| !v.is_empty())
        }
        Some(key) if !key.is_empty() => Some(key.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_match_tuned_values() {
        let config = Config::default();
        assert_eq!(config.retrieval.k, 8);
        assert_eq!(config.retrieval.rerank_top_n, 15);
        assert_eq!(config.retrieval.cache_capacity, 100);
        assert_eq!(config.generation.temperatures, vec![0.1, 0.2, 0.15]);
        assert_eq!(config.generation.max_retries, 3);
        assert_eq!(config.validation.min_answer_length, 20);
        assert_eq!(config.validation.max_answer_length, 1500);
        assert!(!config.generation.self_consistency);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_backoff_multiplier() {
        let config = Config::from_toml_str(
            "[generation]\nbackoff_base_ms = 1\nbackoff_multiplier = 0.5\nmax_retries = 3",
        );
        assert!(config.is_err());

        let mut config = Config::default();
        config.generation.backoff_multiplier = f64::INFINITY;
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidBackoffMultiplier(f64::INFINITY))
        );

        // Large but finite multipliers are accepted; the retry wrapper caps each sleep
        config.generation.backoff_multiplier = 1e30;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
[retrieval]
k = 12

[generation]
self_consistency = true
"#,
        )
        .unwrap();

        assert_eq!(config.retrieval.k, 12);
        assert_eq!(config.retrieval.rerank_top_n, 15);
        assert!(config.generation.self_consistency);
        assert_eq!(config.generation.model, "gemini-flash-latest");
    }

    #[test]
    fn test_validate_rejects_zero_k() {
        let mut config = Config::default();
        config.retrieval.k = 0;
        assert_eq!(config.validate(), Err(ValidationError::ZeroBreadth));
    }

    #[test]
    fn test_validate_rejects_empty_temperatures() {
        let mut config = Config::default();
        config.generation.temperatures.clear();
        assert_eq!(config.validate(), Err(ValidationError::NoTemperatures));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut config = Config::default();
        config.validation.min_answer_length = 2000;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvertedLengthBounds { min: 2000, max: 1500 })
        ));
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retrieval]\nk = 5\nuse_bm25 = false").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.retrieval.k, 5);
        assert!(!config.retrieval.use_bm25);
        assert!(config.retrieval.use_reranking);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retrieval]\nk = 5").unwrap();

        std::env::set_var("KYRLEX_RETRIEVAL__K", "11");
        let config = Config::load(Some(file.path()));
        std::env::remove_var("KYRLEX_RETRIEVAL__K");

        assert_eq!(config.unwrap().retrieval.k, 11);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_error() {
        let result = Config::load(Some(Path::new("/nonexistent/kyrlex.toml")));
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_resolve_api_key_env_reference() {
        std::env::set_var("KYRLEX_TEST_KEY", "secret");
        assert_eq!(
            resolve_api_key(&Some("${KYRLEX_TEST_KEY}".to_string())),
            Some("secret".to_string())
        );
        std::env::remove_var("KYRLEX_TEST_KEY");
        assert_eq!(resolve_api_key(&Some("${KYRLEX_TEST_KEY}".to_string())), None);
    }

    #[test]
    fn test_resolve_api_key_literal_and_empty() {
        assert_eq!(
            resolve_api_key(&Some("literal".to_string())),
            Some("literal".to_string())
        );
        assert_eq!(resolve_api_key(&Some(String::new())), None);
        assert_eq!(resolve_api_key(&None), None);
    }
}
