//! Typed application configuration.
//!
//! Loaded from `config.yml` in the data directory (or the path in
//! `KESTREL_CONFIG_PATH`). Every field has a default so a missing or partial
//! file still produces a runnable configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub segmenter: SegmenterConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub retrieval: RetrievalConfig,
    pub engine: EngineConfig,
    pub search: SearchConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Minimum tokens per chunk; short paragraphs accumulate until this.
    pub min_tokens: usize,
    /// Maximum tokens per chunk; longer paragraphs split at sentences.
    pub max_tokens: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_tokens: 50,
            max_tokens: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model name the engine must expose for embeddings.
    pub model: String,
    /// Expected vector dimensionality; vectors are rejected on mismatch.
    pub dimension: usize,
    /// Fixed worker count for the embedding pool.
    pub workers: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            dimension: 768,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub collection: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            collection: "rag_collection".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Nearest neighbours fetched per chat query.
    pub top_k: usize,
    /// Scraped pages shorter than this are discarded before indexing.
    pub min_scraped_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_scraped_chars: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub scrape_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 3,
            scrape_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Ring-buffer capacity of each session's conversation log. The original
    /// design had no eviction policy at all; this bound is a configuration
    /// decision, not a semantic one.
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 200 }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .map_err(|e| ApiError::internal(format!("failed to read {}: {}", path.display(), e)))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| ApiError::BadRequest(format!("invalid config {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let config = AppConfig::load(Path::new("/nonexistent/config.yml")).unwrap();
        assert_eq!(config.segmenter.min_tokens, 50);
        assert_eq!(config.segmenter.max_tokens, 200);
        assert_eq!(config.retrieval.top_k, 3);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "segmenter:\n  min_tokens: 10\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.segmenter.min_tokens, 10);
        assert_eq!(config.segmenter.max_tokens, 200);
        assert_eq!(config.embedding.workers, 4);
    }
}
