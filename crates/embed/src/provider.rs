use catgraph_common::{CatGraphError, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::model::{EmbeddingModel, ModelLoader, ModelOutput};
use crate::pooling::{l2_normalize, mean_pool};

/// Embedding provider
///
/// Constructed once at startup and shared by reference. The model is loaded
/// on the first [`ensure_loaded`](Self::ensure_loaded) (or `embed`) call.
/// Concurrent first callers wait on a single load; a failed load leaves the
/// provider unloaded so the next call tries again; a successful load is kept
/// for the lifetime of the provider.
pub struct EmbeddingProvider {
    loader: Box<dyn ModelLoader>,
    model: OnceCell<Arc<dyn EmbeddingModel>>,
}

impl EmbeddingProvider {
    /// Create a provider that loads its model with `loader`
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self::from_boxed(Box::new(loader))
    }

    /// Create a provider from a pre-boxed loader
    pub fn from_boxed(loader: Box<dyn ModelLoader>) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
        }
    }

    /// Load the model if it is not loaded yet
    pub async fn ensure_loaded(&self) -> Result<Arc<dyn EmbeddingModel>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                info!("Loading embedding model: {}", self.loader.describe());
                let model = self.loader.load().await.map_err(|e| {
                    warn!("Embedding model load failed ({}): {}", self.loader.describe(), e);
                    match e {
                        CatGraphError::ModelUnavailable(_) => e,
                        other => CatGraphError::model_unavailable(other.to_string()),
                    }
                })?;
                info!(
                    "Embedding model ready: {} ({} dims)",
                    model.name(),
                    model.dimensions()
                );
                Ok::<_, CatGraphError>(model)
            })
            .await?;

        Ok(Arc::clone(model))
    }

    /// Whether a model has been loaded
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Output dimension, once loaded
    pub fn dimensions(&self) -> Option<usize> {
        self.model.get().map(|m| m.dimensions())
    }

    /// Embed text into a mean-pooled, L2-normalized vector
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(CatGraphError::EmptyInput);
        }

        let model = self.ensure_loaded().await?;
        debug!("Embedding text - Model: {}, Length: {}", model.name(), text.len());

        let mut vector = match model.encode(text).await? {
            ModelOutput::Tokens(tokens) => mean_pool(&tokens, None),
            ModelOutput::Pooled(vector) => vector,
        };

        if vector.is_empty() {
            return Err(CatGraphError::embedding(format!(
                "{} produced no output",
                model.name()
            )));
        }

        let norm = l2_normalize(&mut vector);
        if norm == 0.0 || !norm.is_finite() {
            return Err(CatGraphError::embedding(format!(
                "{} produced a vector that cannot be normalized (norm {})",
                model.name(),
                norm
            )));
        }

        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashingEncoder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` loads, then hands out a hashing encoder
    struct FlakyLoader {
        attempts: Arc<AtomicUsize>,
        failures: usize,
        delay: Duration,
    }

    impl FlakyLoader {
        fn new(failures: usize) -> (Self, Arc<AtomicUsize>) {
            let attempts = Arc::new(AtomicUsize::new(0));
            let loader = Self {
                attempts: Arc::clone(&attempts),
                failures,
                delay: Duration::ZERO,
            };
            (loader, attempts)
        }
    }

    #[async_trait]
    impl ModelLoader for FlakyLoader {
        async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if attempt < self.failures {
                return Err(CatGraphError::network("model host unreachable"));
            }
            Ok(Arc::new(HashingEncoder::new()))
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    struct ConstantModel(ModelOutput);

    #[async_trait]
    impl EmbeddingModel for ConstantModel {
        async fn encode(&self, _text: &str) -> Result<ModelOutput> {
            Ok(self.0.clone())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    struct ConstantLoader(ModelOutput);

    #[async_trait]
    impl ModelLoader for ConstantLoader {
        async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
            Ok(Arc::new(ConstantModel(self.0.clone())))
        }

        fn describe(&self) -> String {
            "constant".to_string()
        }
    }

    #[tokio::test]
    async fn test_empty_input_rejected_without_loading() {
        let (loader, attempts) = FlakyLoader::new(0);
        let provider = EmbeddingProvider::new(loader);

        assert!(matches!(provider.embed("").await, Err(CatGraphError::EmptyInput)));
        assert!(matches!(provider.embed(" \n\t ").await, Err(CatGraphError::EmptyInput)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert!(!provider.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_then_kept() {
        let (loader, attempts) = FlakyLoader::new(1);
        let provider = EmbeddingProvider::new(loader);

        let first = provider.embed("alpha widgets").await;
        assert!(matches!(first, Err(CatGraphError::ModelUnavailable(_))));
        assert!(!provider.is_loaded());

        provider.embed("alpha widgets").await.unwrap();
        provider.embed("beta gadgets").await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(provider.is_loaded());
        assert_eq!(provider.dimensions(), Some(crate::HASHING_DIMENSIONS));
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_load_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(EmbeddingProvider::new(FlakyLoader {
            attempts: Arc::clone(&attempts),
            failures: 0,
            delay: Duration::from_millis(20),
        }));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.embed(&format!("text {}", i)).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_output_is_normalized() {
        let (loader, _) = FlakyLoader::new(0);
        let provider = EmbeddingProvider::new(loader);
        let v = provider.embed("Title: Widgets Description: alpha").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_token_output_is_mean_pooled() {
        let provider = EmbeddingProvider::new(ConstantLoader(ModelOutput::Tokens(vec![
            vec![2.0, 0.0],
            vec![0.0, 2.0],
        ])));
        let v = provider.embed("two tokens").await.unwrap();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((v[0] - expected).abs() < 1e-6);
        assert!((v[1] - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_zero_output_is_an_embedding_error() {
        let provider = EmbeddingProvider::new(ConstantLoader(ModelOutput::Pooled(vec![0.0, 0.0])));
        assert!(matches!(
            provider.embed("anything").await,
            Err(CatGraphError::Embedding(_))
        ));
    }
}
