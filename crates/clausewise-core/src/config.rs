//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`__` separates nested keys, so
//! `APP_RETRIEVAL__TOP_K=8` sets `retrieval.top_k`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(env_layer());
        Ok(Self { figment })
    }

    /// Layer an explicitly named TOML file over the working-directory files.
    /// `APP_` variables still take precedence.
    pub fn with_file(self, path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::InvalidConfig(format!("config file {} not found", path.display())));
        }
        Ok(Self { figment: self.figment.merge(Toml::file(path)).merge(env_layer()) })
    }

    /// Extract and validate the full settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub expansion: ExpansionConfig,
    pub rerank: RerankConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub confidence: ConfidenceWeights,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        if self.indexing.embed_batch_size == 0 {
            return invalid("indexing.embed_batch_size must be at least 1");
        }
        if self.expansion.multi_phrasing && self.expansion.phrasings == 0 {
            return invalid("expansion.phrasings must be at least 1 when multi_phrasing is enabled");
        }
        if self.rate_limit.max_calls == 0 || self.rate_limit.window_secs == 0 {
            return invalid("rate_limit.max_calls and rate_limit.window_secs must be positive");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return invalid("retry.max_delay_ms must not be below retry.base_delay_ms");
        }
        self.confidence.validate()
    }
}

fn env_layer() -> Env {
    Env::prefixed("APP_").split("__")
}

fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::InvalidConfig(msg.into()))
}

/// Sizes are in chars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub parent_max_chars: usize,
    pub child_chars: usize,
    pub child_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { parent_max_chars: 1500, child_chars: 512, child_overlap: 50 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.child_chars == 0 || self.parent_max_chars == 0 {
            return invalid("chunk sizes must be positive");
        }
        // A window that does not advance never terminates.
        if self.child_overlap >= self.child_chars {
            return invalid(format!(
                "child_overlap ({}) must be smaller than child_chars ({})",
                self.child_overlap, self.child_chars
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub embed_batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self { embed_batch_size: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Final number of child candidates (K).
    pub top_k: usize,
    /// Hits fetched from each index per query variant (M, at least K).
    pub fetch_k: usize,
    /// Dense weight in the fused score.
    pub alpha: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5, fetch_k: 15, alpha: 0.6 }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return invalid("retrieval.top_k must be at least 1");
        }
        if self.fetch_k < self.top_k {
            return invalid(format!("retrieval.fetch_k ({}) must be >= top_k ({})", self.fetch_k, self.top_k));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return invalid(format!("retrieval.alpha ({}) must be within [0, 1]", self.alpha));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub hypothetical_answer: bool,
    pub multi_phrasing: bool,
    pub phrasings: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self { hypothetical_answer: false, multi_phrasing: false, phrasings: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_calls: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_calls: 50, window_secs: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 2_000, max_delay_ms: 30_000, jitter: true }
    }
}

/// Weights of the three confidence signals. They need not sum to one; the
/// combination is normalized by the weights that apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub retrieval: f32,
    pub consistency: f32,
    pub generation: f32,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self { retrieval: 0.5, consistency: 0.1, generation: 0.4 }
    }
}

impl ConfidenceWeights {
    pub fn validate(&self) -> Result<()> {
        let weights = [self.retrieval, self.consistency, self.generation];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return invalid("confidence weights must be finite and non-negative");
        }
        if self.retrieval + self.consistency <= 0.0 {
            return invalid("confidence.retrieval + confidence.consistency must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    /// OpenAI-compatible API root, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the bearer token, if any.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub primary: BackendConfig,
    pub fallback: Option<BackendConfig>,
    pub probe_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary: BackendConfig {
                name: "openai".into(),
                base_url: "https://api.openai.com/v1".into(),
                model: "gpt-4o-mini".into(),
                api_key_env: Some("OPENAI_API_KEY".into()),
                timeout_secs: 60,
            },
            fallback: Some(BackendConfig {
                name: "ollama".into(),
                base_url: "http://localhost:11434/v1".into(),
                model: "llama3.1:8b".into(),
                api_key_env: None,
                timeout_secs: 120,
            }),
            probe_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Deterministic local feature hashing, no network.
    Hash,
    /// The `/embeddings` endpoint of the primary generation backend.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { provider: EmbeddingProvider::Hash, model: "text-embedding-3-small".into(), dim: 384 }
    }
}

/// Expand `~` and `$VAR` / `${VAR}` in a path given on the command line.
/// A reference to an unset variable is left as written.
pub fn expand_path(input: &str) -> PathBuf {
    match shellexpand::full(input) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(input).as_ref()),
    }
}
