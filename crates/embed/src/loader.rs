use catgraph_common::{AppConfig, CatGraphError, EmbeddingBackend, Result};
use tracing::info;

use crate::hashing::HashingLoader;
use crate::model::ModelLoader;

/// Pick the model loader for the configured backend.
///
/// Fails when the backend was compiled out.
pub fn loader_from_config(config: &AppConfig) -> Result<Box<dyn ModelLoader>> {
    info!("Embedding backend: {:?}", config.embedding_backend);

    match config.embedding_backend {
        EmbeddingBackend::Hashing => Ok(Box::new(HashingLoader)),

        #[cfg(feature = "ollama")]
        EmbeddingBackend::Ollama => Ok(Box::new(crate::client::OllamaLoader::new(
            &config.ollama_base_url,
            config.embedding_model(),
        ))),

        #[cfg(feature = "candle")]
        EmbeddingBackend::Candle => Ok(Box::new(crate::bert::BertLoader::new(
            config.models_dir.clone(),
            config.embedding_model(),
        ))),

        #[allow(unreachable_patterns)]
        other => Err(CatGraphError::config(format!(
            "Embedding backend {:?} is not compiled in (enable the matching cargo feature)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_backend_always_available() {
        let config = AppConfig::default();
        let loader = loader_from_config(&config).unwrap();
        assert_eq!(loader.describe(), "hashing encoder");
    }

    #[cfg(feature = "ollama")]
    #[test]
    fn test_ollama_backend_describes_target() {
        let mut config = AppConfig::default();
        config.embedding_backend = EmbeddingBackend::Ollama;
        let loader = loader_from_config(&config).unwrap();
        assert_eq!(loader.describe(), "ollama all-minilm at http://localhost:11434");
    }

    #[cfg(not(feature = "candle"))]
    #[test]
    fn test_compiled_out_backend_is_config_error() {
        let mut config = AppConfig::default();
        config.embedding_backend = EmbeddingBackend::Candle;
        assert!(matches!(
            loader_from_config(&config),
            Err(CatGraphError::Config(_))
        ));
    }
}
