//! Local sentence-transformer inference with candle.
//!
//! Expects a model directory holding `config.json`, `tokenizer.json` and
//! `model.safetensors` (see `ModelManager::ensure_model`). The encoder
//! returns token-level hidden states; pooling happens in the provider.

use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use catgraph_common::{CatGraphError, ModelManager, Result, SentenceModel};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::info;

use crate::model::{EmbeddingModel, ModelLoader, ModelOutput};

/// Longest input in tokens; longer text is truncated
const MAX_TOKENS: usize = 256;

#[derive(Deserialize)]
struct HiddenSize {
    hidden_size: usize,
}

/// Cap encodings at [`MAX_TOKENS`], special tokens included, so a long
/// input still ends in `[SEP]`
fn with_token_limit(mut tokenizer: Tokenizer) -> Result<Tokenizer> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| CatGraphError::model_unavailable(format!("Tokenizer truncation: {}", e)))?;
    tokenizer.with_padding(None);
    Ok(tokenizer)
}

fn candle_err(context: &str) -> impl Fn(candle_core::Error) -> CatGraphError + '_ {
    move |e| CatGraphError::embedding(format!("{}: {}", context, e))
}

/// BERT sentence encoder
pub struct BertEncoder {
    model: Arc<BertModel>,
    tokenizer: Arc<Tokenizer>,
    device: Device,
    dimensions: usize,
    name: String,
}

impl BertEncoder {
    /// Load from a model directory, on CUDA when available
    pub fn from_directory(model_dir: &Path) -> Result<Self> {
        let config_path = model_dir.join("config.json");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let weights_path = model_dir.join("model.safetensors");

        for path in [&config_path, &tokenizer_path, &weights_path] {
            if !path.is_file() {
                return Err(CatGraphError::model_unavailable(format!(
                    "Model file not found: {}",
                    path.display()
                )));
            }
        }

        let config_text = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_text)?;
        let dimensions = serde_json::from_str::<HiddenSize>(&config_text)?.hidden_size;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            CatGraphError::model_unavailable(format!("Failed to load tokenizer: {}", e))
        })?;
        let tokenizer = with_token_limit(tokenizer)?;

        let device = Device::cuda_if_available(0)
            .map_err(|e| CatGraphError::model_unavailable(format!("Device init failed: {}", e)))?;

        // SAFETY: the weights file is not modified while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device) }
            .map_err(|e| CatGraphError::model_unavailable(format!("Failed to map weights: {}", e)))?;
        let model = BertModel::load(vb, &config)
            .map_err(|e| CatGraphError::model_unavailable(format!("Failed to build BERT: {}", e)))?;

        let name = model_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("bert")
            .replacen("--", "/", 1);

        info!(
            model = %name,
            dimensions,
            cuda = device.is_cuda(),
            "Loaded BERT embedding model"
        );

        Ok(Self {
            model: Arc::new(model),
            tokenizer: Arc::new(tokenizer),
            device,
            dimensions,
            name,
        })
    }

    fn encode_sync(
        model: &BertModel,
        tokenizer: &Tokenizer,
        device: &Device,
        text: &str,
    ) -> Result<Vec<Vec<f32>>> {
        let encoding = tokenizer
            .encode(text, true)
            .map_err(|e| CatGraphError::embedding(format!("Tokenization failed: {}", e)))?;

        let ids = encoding.get_ids();
        let type_ids = vec![0u32; ids.len()];

        let input_ids = Tensor::new(ids, device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(candle_err("input_ids tensor"))?;
        let token_type_ids = Tensor::new(type_ids.as_slice(), device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(candle_err("token_type_ids tensor"))?;

        // [1, seq_len, hidden]
        let hidden = model
            .forward(&input_ids, &token_type_ids)
            .map_err(candle_err("BERT forward"))?;

        hidden
            .squeeze(0)
            .and_then(|t| t.to_vec2::<f32>())
            .map_err(candle_err("hidden state readback"))
    }
}

#[async_trait]
impl EmbeddingModel for BertEncoder {
    async fn encode(&self, text: &str) -> Result<ModelOutput> {
        let model = Arc::clone(&self.model);
        let tokenizer = Arc::clone(&self.tokenizer);
        let device = self.device.clone();
        let text = text.to_string();

        // inference is CPU/GPU bound; keep it off the async workers
        let tokens = tokio::task::spawn_blocking(move || {
            Self::encode_sync(&model, &tokenizer, &device, &text)
        })
        .await
        .map_err(|e| CatGraphError::internal(format!("Embedding task panicked: {}", e)))??;

        Ok(ModelOutput::Tokens(tokens))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Downloads the model if needed, then loads it
pub struct BertLoader {
    models_dir: PathBuf,
    model: SentenceModel,
}

impl BertLoader {
    pub fn new(models_dir: PathBuf, repo: impl Into<String>) -> Self {
        Self {
            models_dir,
            model: SentenceModel::bert(repo),
        }
    }
}

#[async_trait]
impl ModelLoader for BertLoader {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
        let manager = ModelManager::new(self.models_dir.clone())?;
        let dir = manager.ensure_model(&self.model).await?;

        let encoder = tokio::task::spawn_blocking(move || BertEncoder::from_directory(&dir))
            .await
            .map_err(|e| CatGraphError::internal(format!("Model load task panicked: {}", e)))??;
        Ok(Arc::new(encoder))
    }

    fn describe(&self) -> String {
        format!("candle BERT {}", self.model.repo)
    }
}
