use crate::error::CatGraphError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Ingest limit used when none is configured: process the whole catalog
pub const NO_INGEST_LIMIT: usize = usize::MAX;

/// Which text-to-vector backend the embedding provider loads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Offline deterministic token hashing
    Hashing,
    /// Ollama `/api/embeddings`
    Ollama,
    /// Local sentence-transformer via candle (requires the `candle` feature)
    Candle,
}

impl EmbeddingBackend {
    /// Model used when `embedding_model` is not configured
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "all-minilm",
            Self::Hashing | Self::Candle => "sentence-transformers/all-MiniLM-L6-v2",
        }
    }
}

/// Which batched path the similarity engine tries before the scalar fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityBackendKind {
    Ndarray,
    Candle,
    Scalar,
}

/// catgraph application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Data directory
    pub data_dir: PathBuf,

    /// JSON record store path
    pub store_path: PathBuf,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Catalog list endpoint (`{result: [key, ...]}`)
    pub catalog_list_url: String,

    /// Catalog show endpoint, queried with `?id={key}`
    pub catalog_show_url: String,

    /// HTTP timeout for source API calls
    pub request_timeout_secs: u64,

    /// Attempts per record metadata fetch
    pub fetch_retries: u32,

    /// Embedding backend
    pub embedding_backend: EmbeddingBackend,

    /// Embedding model name (Hugging Face repo for candle, model tag for
    /// Ollama); unset means [`EmbeddingBackend::default_model`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Ollama API base URL
    pub ollama_base_url: String,

    /// Directory holding downloaded model files
    pub models_dir: PathBuf,

    /// Batched similarity backend
    pub similarity_backend: SimilarityBackendKind,

    /// Node cap for similarity graphs
    pub max_nodes: usize,

    /// Default edge threshold for graph filtering
    pub similarity_threshold: f32,

    /// Maximum catalog entries per ingest run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_limit: Option<usize>,

    /// Substitute a synthetic catalog when the source API is unreachable
    pub demo_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            store_path: PathBuf::from("./data/records.json"),
            log_dir: PathBuf::from("./data/log"),
            log_level: "info".to_string(),
            catalog_list_url: "https://open.alberta.ca/api/3/action/package_list".to_string(),
            catalog_show_url: "https://open.alberta.ca/api/3/action/package_show".to_string(),
            request_timeout_secs: 30,
            fetch_retries: 3,
            embedding_backend: EmbeddingBackend::Hashing,
            embedding_model: None,
            ollama_base_url: "http://localhost:11434".to_string(),
            models_dir: PathBuf::from("./data/models"),
            similarity_backend: SimilarityBackendKind::Ndarray,
            max_nodes: 50,
            similarity_threshold: 0.5,
            ingest_limit: None,
            demo_mode: false,
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then a TOML file, then `CATGRAPH_*` env vars.
    ///
    /// With `path == None` an optional `catgraph.toml` in the working
    /// directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, CatGraphError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        let defaults = Config::try_from(&Self::default())
            .map_err(|e| CatGraphError::config(format!("Failed to build defaults: {}", e)))?;

        let mut builder = Config::builder().add_source(defaults);
        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("catgraph").required(false)),
        };
        builder = builder.add_source(Environment::with_prefix("CATGRAPH").try_parsing(true));

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CatGraphError::config(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Ensure required directories exist, create if not
    pub fn ensure_directories(&self) -> Result<(), CatGraphError> {
        let mut dirs: Vec<&Path> = vec![self.data_dir.as_path(), self.log_dir.as_path()];
        if let Some(parent) = self.store_path.parent() {
            dirs.push(parent);
        }

        for dir in dirs {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    CatGraphError::config(format!(
                        "Failed to create directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Effective ingest limit; unset or 0 processes the whole catalog
    pub fn effective_ingest_limit(&self) -> usize {
        self.ingest_limit
            .filter(|&limit| limit > 0)
            .unwrap_or(NO_INGEST_LIMIT)
    }

    /// Model name for the configured embedding backend
    pub fn embedding_model(&self) -> &str {
        self.embedding_model_for(self.embedding_backend)
    }

    /// Model name for `backend`: the configured one when `backend` is the
    /// active backend, otherwise that backend's default
    pub fn embedding_model_for(&self, backend: EmbeddingBackend) -> &str {
        match &self.embedding_model {
            Some(model) if backend == self.embedding_backend => model,
            _ => backend.default_model(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), CatGraphError> {
        for (name, url) in [
            ("catalog_list_url", &self.catalog_list_url),
            ("catalog_show_url", &self.catalog_show_url),
            ("ollama_base_url", &self.ollama_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(CatGraphError::config(format!(
                    "{} must start with http:// or https://",
                    name
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(CatGraphError::config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }

        if self.max_nodes == 0 {
            return Err(CatGraphError::config("max_nodes cannot be 0"));
        }

        if self.embedding_model().trim().is_empty() {
            return Err(CatGraphError::config("Embedding model name cannot be empty"));
        }

        Ok(())
    }
}
