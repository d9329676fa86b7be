pub mod config;
pub mod error;
pub mod logger;
pub mod model_manager;
pub mod record;

// Re-export commonly used types
pub use config::{AppConfig, EmbeddingBackend, SimilarityBackendKind, NO_INGEST_LIMIT};
pub use error::CatGraphError;
pub use model_manager::{ModelFile, ModelManager, SentenceModel};
pub use record::{record_id, Record, StoredEmbedding};
pub type Result<T> = std::result::Result<T, CatGraphError>;
