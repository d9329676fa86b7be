//! Offline token-hashing encoder.
//!
//! Each lowercase word maps to a pseudo-random vector seeded by SHA-256, so
//! texts sharing words land near each other and the same text always gets
//! the same vector, across processes and platforms. No model download.

use async_trait::async_trait;
use catgraph_common::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::model::{EmbeddingModel, ModelLoader, ModelOutput};

/// Output dimension of the hashing encoder (matches all-MiniLM-L6-v2)
pub const HASHING_DIMENSIONS: usize = 384;

/// Deterministic bag-of-words encoder
#[derive(Debug, Clone, Default)]
pub struct HashingEncoder;

impl HashingEncoder {
    pub fn new() -> Self {
        Self
    }

    fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }

    fn token_vector(token: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(HASHING_DIMENSIONS);
        let mut block: u32 = 0;
        while out.len() < HASHING_DIMENSIONS {
            let digest = Sha256::new()
                .chain_update(token.as_bytes())
                .chain_update(block.to_le_bytes())
                .finalize();
            for chunk in digest.chunks_exact(4) {
                if out.len() == HASHING_DIMENSIONS {
                    break;
                }
                let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                out.push((bits as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32);
            }
            block += 1;
        }
        out
    }
}

#[async_trait]
impl EmbeddingModel for HashingEncoder {
    async fn encode(&self, text: &str) -> Result<ModelOutput> {
        Ok(ModelOutput::Tokens(
            Self::tokenize(text).map(|t| Self::token_vector(&t)).collect(),
        ))
    }

    fn dimensions(&self) -> usize {
        HASHING_DIMENSIONS
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Loader for [`HashingEncoder`]; never fails
#[derive(Debug, Clone, Default)]
pub struct HashingLoader;

#[async_trait]
impl ModelLoader for HashingLoader {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
        Ok(Arc::new(HashingEncoder::new()))
    }

    fn describe(&self) -> String {
        "hashing encoder".to_string()
    }
}
