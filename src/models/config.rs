use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::search::OutputFormat;
use crate::error::ConfigError;
use crate::services::IndexKind;

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const CONFIG_ENV_VAR: &str = "RAGINDEX_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub answer: AnswerConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
            && !path.is_empty()
        {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|p| p.join("ragindex").join("config.toml"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            return Ok(config);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path()
            .ok_or_else(|| ConfigError::PathError("could not determine config directory".to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Reject relationships between values that can never work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let size = self.indexing.chunk_size as usize;
        let overlap = self.indexing.chunk_overlap as usize;
        if size == 0 || overlap >= size {
            return Err(ConfigError::InvalidChunking { size, overlap });
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.batch_size must be positive".to_string(),
            ));
        }
        if self.retrieval.default_top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.default_top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which embedding backend to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Remote embedding server
    #[default]
    Http,
    /// Seeded pseudo-random vectors for tests and demos
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_parallel_requests")]
    pub parallel_requests: u32,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_mock_seed")]
    pub mock_seed: u64,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_batch_size() -> u32 {
    32
}

fn default_parallel_requests() -> u32 {
    2
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_max_retries() -> u32 {
    3
}

fn default_mock_seed() -> u64 {
    42
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            url: default_embedding_url(),
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
            parallel_requests: default_parallel_requests(),
            dimension: default_dimension(),
            max_retries: default_max_retries(),
            mock_seed: default_mock_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_dir: Option<PathBuf>,
}

fn default_chunk_size() -> u32 {
    800
}

fn default_chunk_overlap() -> u32 {
    80
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/.venv/**".to_string(),
    ]
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            exclude_patterns: default_exclude_patterns(),
            max_file_size: default_max_file_size(),
            index_dir: None,
        }
    }
}

impl IndexingConfig {
    /// Directory holding the persisted index, falling back to the user data dir.
    pub fn resolve_index_dir(&self) -> Option<PathBuf> {
        self.index_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|p| p.join("ragindex").join("index")))
    }
}

/// Index variant selection and per-variant parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub kind: IndexKind,

    #[serde(default)]
    pub lsh: LshParams,

    #[serde(default)]
    pub ivf: IvfParams,

    #[serde(default)]
    pub ivfpq: IvfPqParams,

    #[serde(default)]
    pub hnsw: HnswParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LshParams {
    #[serde(default = "default_lsh_bits")]
    pub n_bits: u32,

    #[serde(default = "default_lsh_tables")]
    pub n_tables: u32,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_lsh_bits() -> u32 {
    8
}

fn default_lsh_tables() -> u32 {
    10
}

fn default_seed() -> u64 {
    1234
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            n_bits: default_lsh_bits(),
            n_tables: default_lsh_tables(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvfParams {
    #[serde(default = "default_n_clusters")]
    pub n_clusters: u32,

    #[serde(default = "default_nprobe")]
    pub nprobe: u32,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_n_clusters() -> u32 {
    100
}

fn default_nprobe() -> u32 {
    10
}

fn default_max_iterations() -> u32 {
    25
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            n_clusters: default_n_clusters(),
            nprobe: default_nprobe(),
            max_iterations: default_max_iterations(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvfPqParams {
    #[serde(default = "default_n_clusters")]
    pub n_clusters: u32,

    #[serde(default = "default_nprobe")]
    pub nprobe: u32,

    #[serde(default = "default_n_subquantizers")]
    pub n_subquantizers: u32,

    #[serde(default = "default_subquantizer_bits")]
    pub subquantizer_bits: u32,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_n_subquantizers() -> u32 {
    8
}

fn default_subquantizer_bits() -> u32 {
    8
}

impl Default for IvfPqParams {
    fn default() -> Self {
        Self {
            n_clusters: default_n_clusters(),
            nprobe: default_nprobe(),
            n_subquantizers: default_n_subquantizers(),
            subquantizer_bits: default_subquantizer_bits(),
            max_iterations: default_max_iterations(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    #[serde(default = "default_m")]
    pub m: u32,

    #[serde(default = "default_ef_construction")]
    pub ef_construction: u32,

    #[serde(default = "default_ef_search")]
    pub ef_search: u32,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_m() -> u32 {
    16
}

fn default_ef_construction() -> u32 {
    200
}

fn default_ef_search() -> u32 {
    64
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: default_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: u32,

    /// Hits farther than this squared L2 distance are treated as irrelevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f32>,

    #[serde(default = "default_embed_timeout")]
    pub embed_timeout_secs: u64,

    #[serde(default = "default_search_timeout")]
    pub search_timeout_ms: u64,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_top_k() -> u32 {
    5
}

fn default_embed_timeout() -> u64 {
    300
}

fn default_search_timeout() -> u64 {
    5_000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_distance: None,
            embed_timeout_secs: default_embed_timeout(),
            search_timeout_ms: default_search_timeout(),
            default_format: OutputFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.embedding.url, DEFAULT_EMBEDDING_URL);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Http);
        assert_eq!(config.index.kind, IndexKind::Flat);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_indexing_config_default() {
        let config = IndexingConfig::default();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 80);
        assert!(!config.exclude_patterns.is_empty());
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_size() {
        let mut config = Config::default();
        config.indexing.chunk_size = 100;
        config.indexing.chunk_overlap = 100;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidChunking {
                size: 100,
                overlap: 100
            })
        ));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            [embedding]
            provider = "mock"
            dimension = 64

            [index]
            kind = "hnsw"

            [index.hnsw]
            m = 8
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Mock);
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.index.kind, IndexKind::Hnsw);
        assert_eq!(config.index.hnsw.m, 8);
        assert_eq!(config.index.hnsw.ef_construction, 200);
        assert_eq!(config.index.ivf.n_clusters, 100);
        assert_eq!(config.indexing.chunk_size, 800);
    }

    #[test]
    fn test_config_roundtrip_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.index.ivfpq, config.index.ivfpq);
        assert_eq!(parsed.retrieval.default_top_k, 5);
    }
}
