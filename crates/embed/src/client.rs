use async_trait::async_trait;
use catgraph_common::{CatGraphError, Result};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info};

use crate::model::{EmbeddingModel, ModelLoader, ModelOutput};
use crate::types::{EmbedRequest, EmbedResponse, TagsResponse};

/// Ollama embedding client
#[derive(Debug, Clone)]
pub struct OllamaEncoder {
    base_url: String,
    model: String,
    client: Client,
    dimensions: usize,
    max_retries: u32,
}

impl OllamaEncoder {
    /// Create new Ollama client. The dimension is unknown until the first embedding.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        info!("Ollama client initialized: {}", base_url);
        Ok(Self {
            base_url,
            model: model.into(),
            client,
            dimensions: 0,
            max_retries: 3,
        })
    }

    /// Test connection to Ollama and that the model is pulled
    pub async fn test_connection(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatGraphError::network(format!("Failed to connect to Ollama: {}", e)))?;
        if !response.status().is_success() {
            return Ok(false);
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse tags response: {}", e))?;
        Ok(tags.has_model(&self.model))
    }

    /// Generate embedding (with retry logic)
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        debug!("Generating embedding - Model: {}, Text length: {}", self.model, text.len());

        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.try_embed(&url, &request).await {
                Ok(embedding) => {
                    debug!("Received embedding - Dimension: {}", embedding.len());
                    return Ok(embedding);
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        let delay = std::time::Duration::from_secs(2u64.pow(attempt - 1));
                        tracing::warn!(
                            "Embedding request failed (attempt {}/{}): {}. Retrying in {:?}...",
                            attempt,
                            self.max_retries,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CatGraphError::embedding("All retries failed")))
    }

    /// Single attempt to generate embedding
    async fn try_embed(&self, url: &str, request: &EmbedRequest) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CatGraphError::network(format!("Failed to send embedding request: {}", e)))?
            .error_for_status()
            .map_err(|e| CatGraphError::embedding(format!("Ollama embedding API error: {}", e)))?;

        let result: EmbedResponse = response
            .json()
            .await
            .map_err(|e| CatGraphError::embedding(format!("Failed to parse embedding response: {}", e)))?;

        if result.embedding.is_empty() {
            return Err(CatGraphError::embedding("Empty embedding from Ollama"));
        }

        Ok(result.embedding)
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEncoder {
    async fn encode(&self, text: &str) -> Result<ModelOutput> {
        Ok(ModelOutput::Pooled(self.embed(text).await?))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Loads an [`OllamaEncoder`] after checking the server has the model,
/// probing once to learn the output dimension
#[derive(Debug, Clone)]
pub struct OllamaLoader {
    pub base_url: String,
    pub model: String,
}

impl OllamaLoader {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ModelLoader for OllamaLoader {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
        let mut encoder = OllamaEncoder::new(&self.base_url, &self.model)?;
        if !encoder.test_connection().await? {
            return Err(CatGraphError::model_unavailable(format!(
                "Model {} is not available on {}",
                self.model, self.base_url
            )));
        }

        encoder.dimensions = encoder.embed("dimension check").await?.len();
        Ok(Arc::new(encoder))
    }

    fn describe(&self) -> String {
        format!("ollama {} at {}", self.model, self.base_url)
    }
}
