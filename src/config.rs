use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

/// Locations of the two durable artifacts. They are created, persisted,
/// and deleted together; a lone survivor is treated as corrupt state.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            metadata_path: default_metadata_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("vector_store/index.bin")
}
fn default_metadata_path() -> PathBuf {
    PathBuf::from("vector_store/metadata.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Upper bound on chunk length, in characters.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    /// Characters repeated between consecutive free-text chunks.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Final number of hits handed to the prompt boundary.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Search over-fetch multiplier, leaving room for prioritization
    /// to reshuffle before truncation.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            overfetch_factor: default_overfetch_factor(),
        }
    }
}

fn default_top_k() -> usize {
    20
}
fn default_overfetch_factor() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"hashed"` (offline, deterministic) or `"ollama"` (HTTP service).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model name, required for the ollama provider.
    #[serde(default)]
    pub model: Option<String>,
    /// Embedding dimensionality. Must match any persisted index.
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
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
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            endpoint: default_endpoint(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hashed".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Batches whose total token estimate falls below this keep their
    /// raw text for direct prompt inclusion instead of being indexed.
    #[serde(default = "default_rag_token_threshold")]
    pub rag_token_threshold: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            rag_token_threshold: default_rag_token_threshold(),
        }
    }
}

fn default_rag_token_threshold() -> usize {
    1500
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chunk_size == 0 {
        anyhow::bail!("chunking.max_chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.max_chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.max_chunk_size");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.overfetch_factor < 1 {
        anyhow::bail!("retrieval.overfetch_factor must be >= 1");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "hashed" => {}
        "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'ollama'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hashed or ollama.",
            other
        ),
    }

    if config.ingestion.rag_token_threshold == 0 {
        anyhow::bail!("ingestion.rag_token_threshold must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunking.max_chunk_size, 500);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.retrieval.top_k, 20);
        assert_eq!(config.retrieval.overfetch_factor, 2);
        assert_eq!(config.embedding.provider, "hashed");
        assert_eq!(config.embedding.dims, 384);
        assert_eq!(config.ingestion.rag_token_threshold, 1500);
    }

    #[test]
    fn test_load_minimal_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[chunking]\nmax_chunk_size = 200\noverlap = 40").unwrap();
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.chunking.max_chunk_size, 200);
        assert_eq!(config.chunking.overlap, 40);
        // Untouched sections fall back to defaults
        assert_eq!(config.retrieval.top_k, 20);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[chunking]\nmax_chunk_size = 100\noverlap = 100").unwrap();
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_ollama_requires_model() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[embedding]\nprovider = \"ollama\"").unwrap();
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[embedding]\nprovider = \"quantum\"").unwrap();
        assert!(load_config(f.path()).is_err());
    }
}
