use async_trait::async_trait;
use catgraph_common::Result;
use std::sync::Arc;

/// Raw output of an embedding model, before pooling and normalization
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// One vector per token; the provider mean-pools them
    Tokens(Vec<Vec<f32>>),
    /// Already pooled by the backend (e.g. a remote embedding API)
    Pooled(Vec<f32>),
}

/// Common trait for text embedding models
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Encode non-empty text
    async fn encode(&self, text: &str) -> Result<ModelOutput>;

    /// Output dimension
    fn dimensions(&self) -> usize;

    /// Model name, for logs
    fn name(&self) -> &str;
}

/// Builds an embedding model. Called until it succeeds once.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>>;

    /// What this loader loads, for logs
    fn describe(&self) -> String;
}
