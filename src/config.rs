use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Chunking engine parameters.
///
/// Invalid combinations (e.g. `min_chunk_tokens >= max_chunk_tokens`) are
/// rejected when the config is loaded, never mid-operation.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Strategy selector: `auto`, `single`, `headers`, `delimiter`, or `fixed`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_min_chunk_tokens")]
    pub min_chunk_tokens: usize,
    #[serde(default = "default_max_chunk_tokens")]
    pub max_chunk_tokens: usize,
    /// Markdown header levels that open a new chunk under the header strategy.
    #[serde(default = "default_header_split_levels")]
    pub header_split_levels: Vec<usize>,
    /// Line regex used by the delimiter strategy.
    #[serde(default = "default_delimiter_pattern")]
    pub delimiter_pattern: String,
    /// Back off fixed-strategy splits to sentence boundaries.
    #[serde(default = "default_true")]
    pub preserve_sentences: bool,
    /// Target size for fixed-strategy chunks.
    #[serde(default = "default_chunk_size_tokens")]
    pub chunk_size_tokens: usize,
    /// Context carried from the end of one fixed chunk into the next.
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

fn default_strategy() -> String {
    "auto".to_string()
}
fn default_min_chunk_tokens() -> usize {
    64
}
fn default_max_chunk_tokens() -> usize {
    512
}
fn default_header_split_levels() -> Vec<usize> {
    vec![1, 2, 3]
}
fn default_delimiter_pattern() -> String {
    r"^(-{3,}|\*{3,}|_{3,})\s*$".to_string()
}
fn default_true() -> bool {
    true
}
fn default_chunk_size_tokens() -> usize {
    400
}
fn default_overlap_tokens() -> usize {
    40
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            min_chunk_tokens: default_min_chunk_tokens(),
            max_chunk_tokens: default_max_chunk_tokens(),
            header_split_levels: default_header_split_levels(),
            delimiter_pattern: default_delimiter_pattern(),
            preserve_sentences: true,
            chunk_size_tokens: default_chunk_size_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Candidates pulled per channel (chunk-level, document-level) before scoring.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: i64,
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

fn default_candidate_k() -> i64 {
    80
}
fn default_final_limit() -> i64 {
    12
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_k: default_candidate_k(),
            final_limit: default_final_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// File selection for directory ingestion.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let c = &config.chunking;

    if c.max_chunk_tokens == 0 {
        anyhow::bail!("chunking.max_chunk_tokens must be > 0");
    }
    if c.min_chunk_tokens >= c.max_chunk_tokens {
        anyhow::bail!(
            "chunking.min_chunk_tokens ({}) must be < max_chunk_tokens ({})",
            c.min_chunk_tokens,
            c.max_chunk_tokens
        );
    }
    if c.chunk_size_tokens == 0 {
        anyhow::bail!("chunking.chunk_size_tokens must be > 0");
    }
    if c.overlap_tokens >= c.chunk_size_tokens {
        anyhow::bail!(
            "chunking.overlap_tokens ({}) must be < chunk_size_tokens ({})",
            c.overlap_tokens,
            c.chunk_size_tokens
        );
    }
    if c.header_split_levels.is_empty() {
        anyhow::bail!("chunking.header_split_levels must not be empty");
    }
    if c.header_split_levels.iter().any(|&l| !(1..=6).contains(&l)) {
        anyhow::bail!("chunking.header_split_levels entries must be in 1..=6");
    }
    if chunk::parse_selector(&c.strategy).is_none() {
        anyhow::bail!(
            "Unknown chunking strategy: '{}'. Use auto, single, headers, delimiter, or fixed.",
            c.strategy
        );
    }
    if regex::Regex::new(&c.delimiter_pattern).is_err() {
        anyhow::bail!(
            "chunking.delimiter_pattern is not a valid regex: '{}'",
            c.delimiter_pattern
        );
    }

    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if config.retrieval.candidate_k < 1 {
        anyhow::bail!("retrieval.candidate_k must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}
