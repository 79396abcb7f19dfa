//! Configuration types for the retrieval core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::{DocnError, Result};

/// Fallback MMR lambda when neither the call nor the runtime settings give one.
pub const DEFAULT_MMR_LAMBDA: f32 = 0.5;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocnConfig {
    /// Chunking configuration.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Retrieval configuration.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Evaluation configuration.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks; must be below `chunk_size`.
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    /// Keywords extracted per chunk.
    #[serde(default = "default_keyword_count")]
    pub keyword_count: usize,

    /// Attach structural metadata to chunks.
    #[serde(default = "default_true")]
    pub semantic: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            keyword_count: default_keyword_count(),
            semantic: true,
        }
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of results.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity for plain vector search.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Over-fetch multiplier applied before metadata filtering.
    #[serde(default = "default_over_fetch_factor")]
    pub over_fetch_factor: usize,

    /// Candidate pool multiplier for MMR.
    #[serde(default = "default_mmr_pool_factor")]
    pub mmr_pool_factor: usize,

    /// Relaxed similarity threshold for the MMR candidate pool.
    #[serde(default = "default_mmr_pool_min_similarity")]
    pub mmr_pool_min_similarity: f32,

    /// Configured MMR lambda; seeds the runtime settings.
    #[serde(default)]
    pub mmr_lambda: Option<f32>,

    /// RRF constant k.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            over_fetch_factor: default_over_fetch_factor(),
            mmr_pool_factor: default_mmr_pool_factor(),
            mmr_pool_min_similarity: default_mmr_pool_min_similarity(),
            mmr_lambda: None,
            rrf_k: default_rrf_k(),
        }
    }
}

/// Evaluation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Cutoff for @k metrics.
    #[serde(default = "default_eval_k")]
    pub k: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { k: default_eval_k() }
    }
}

/// Whether `lambda` lies in `(0, 1]`.
pub fn is_valid_lambda(lambda: f32) -> bool {
    lambda > 0.0 && lambda <= 1.0
}

/// Runtime-tunable settings shared by retrievers.
///
/// This is the "externally configured" tier of MMR lambda resolution and
/// can change without rebuilding the retriever.
#[derive(Debug, Default)]
pub struct RuntimeSettings {
    mmr_lambda: RwLock<Option<f32>>,
}

impl RuntimeSettings {
    pub fn new(mmr_lambda: Option<f32>) -> Result<Self> {
        let settings = Self::default();
        settings.set_mmr_lambda(mmr_lambda)?;
        Ok(settings)
    }

    /// Current configured lambda, if any.
    pub fn mmr_lambda(&self) -> Option<f32> {
        *self
            .mmr_lambda
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the configured lambda; `None` clears it.
    pub fn set_mmr_lambda(&self, lambda: Option<f32>) -> Result<()> {
        if let Some(value) = lambda {
            if !is_valid_lambda(value) {
                return Err(DocnError::invalid_configuration(format!(
                    "mmr_lambda must be in (0, 1], got {}",
                    value
                )));
            }
        }

        *self
            .mmr_lambda
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = lambda;
        Ok(())
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    1000
}

fn default_overlap() -> usize {
    200
}

fn default_keyword_count() -> usize {
    5
}

fn default_top_k() -> usize {
    10
}

fn default_min_similarity() -> f32 {
    0.7
}

fn default_over_fetch_factor() -> usize {
    2
}

fn default_mmr_pool_factor() -> usize {
    3
}

fn default_mmr_pool_min_similarity() -> f32 {
    0.5
}

fn default_rrf_k() -> u32 {
    60
}

fn default_eval_k() -> usize {
    10
}

impl DocnConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| DocnError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("docn").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("docn.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Reject settings no call could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(DocnError::invalid_configuration("chunk_size must be positive"));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(DocnError::invalid_configuration(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        if let Some(lambda) = self.retrieval.mmr_lambda {
            if !is_valid_lambda(lambda) {
                return Err(DocnError::invalid_configuration(format!(
                    "mmr_lambda must be in (0, 1], got {}",
                    lambda
                )));
            }
        }
        for (name, value) in [
            ("min_similarity", self.retrieval.min_similarity),
            ("mmr_pool_min_similarity", self.retrieval.mmr_pool_min_similarity),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(DocnError::invalid_configuration(format!(
                    "{} must be in [-1, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
