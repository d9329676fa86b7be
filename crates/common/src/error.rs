/// catgraph error types
#[derive(Debug, thiserror::Error)]
pub enum CatGraphError {
    /// The catalog key list could not be fetched or parsed. Fatal to an ingest run.
    #[error("Catalog fetch error: {0}")]
    CatalogFetch(String),

    /// Metadata for a single catalog key could not be fetched
    #[error("Record fetch error for {key}: {message}")]
    RecordFetch { key: String, message: String },

    /// The embedding model produced no usable vector
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The embedding model could not be loaded
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Text to embed was empty or whitespace only
    #[error("Cannot embed empty input")]
    EmptyInput,

    /// The record store rejected a write
    #[error("Persist error: {0}")]
    Persist(String),

    /// A stored embedding could not be resolved to a numeric vector
    #[error("Malformed embedding encoding: {0}")]
    MalformedEmbedding(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CatGraphError {
    /// Create catalog fetch error
    pub fn catalog_fetch<S: Into<String>>(msg: S) -> Self {
        Self::CatalogFetch(msg.into())
    }

    /// Create record fetch error
    pub fn record_fetch<K: Into<String>, S: Into<String>>(key: K, msg: S) -> Self {
        Self::RecordFetch {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create embedding error
    pub fn embedding<S: Into<String>>(msg: S) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create model unavailable error
    pub fn model_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Create persist error
    pub fn persist<S: Into<String>>(msg: S) -> Self {
        Self::Persist(msg.into())
    }

    /// Create malformed embedding error
    pub fn malformed_embedding<S: Into<String>>(msg: S) -> Self {
        Self::MalformedEmbedding(msg.into())
    }

    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error aborts a whole batch rather than a single record
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CatalogFetch(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_catalog_and_config_are_fatal() {
        assert!(CatGraphError::catalog_fetch("down").is_fatal());
        assert!(CatGraphError::config("bad").is_fatal());
        assert!(!CatGraphError::record_fetch("p1", "404").is_fatal());
        assert!(!CatGraphError::persist("disk full").is_fatal());
        assert!(!CatGraphError::EmptyInput.is_fatal());
        assert!(!CatGraphError::malformed_embedding("abc").is_fatal());
    }

    #[test]
    fn test_record_fetch_message_names_key() {
        let err = CatGraphError::record_fetch("p1", "status 404");
        assert_eq!(err.to_string(), "Record fetch error for p1: status 404");
    }
}
