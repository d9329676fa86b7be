//! catgraph embedding provider
//!
//! Text-to-vector models behind a load-once provider. Every vector leaving
//! the provider is mean-pooled and L2-normalized.

#[cfg(feature = "candle")]
mod bert;
#[cfg(feature = "ollama")]
mod client;
mod hashing;
mod loader;
mod model;
mod pooling;
mod provider;
mod types;

#[cfg(feature = "candle")]
pub use bert::{BertEncoder, BertLoader};
#[cfg(feature = "ollama")]
pub use client::{OllamaEncoder, OllamaLoader};
pub use hashing::{HashingEncoder, HashingLoader, HASHING_DIMENSIONS};
pub use loader::loader_from_config;
pub use model::{EmbeddingModel, ModelLoader, ModelOutput};
pub use pooling::{l2_normalize, mean_pool};
pub use provider::EmbeddingProvider;
pub use types::{EmbedRequest, EmbedResponse};
