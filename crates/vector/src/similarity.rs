//! Pairwise cosine similarity backends.
//!
//! Batched backends build one `n x d` matrix, L2-normalize its rows and take
//! a single matrix product. [`ScalarBackend`] is the nested-loop reference
//! every batched backend falls back to.

use catgraph_common::{CatGraphError, SimilarityBackendKind};
use ndarray::Array2;
use tracing::debug;

/// Failure inside a batched backend. Never surfaced past the engine.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Input the backend cannot lay out as a matrix (ragged or zero-width rows)
    #[error("unsupported shape: {0}")]
    Shape(String),

    /// Device-side failure (allocation, kernel, readback)
    #[error("accelerator error: {0}")]
    Accelerator(String),
}

/// A strategy for computing the all-pairs similarity matrix
pub trait SimilarityBackend: Send + Sync {
    /// Backend name, reported in results and logs
    fn name(&self) -> &'static str;

    /// `n x n` cosine similarities for `n` vectors
    fn pairwise(&self, vectors: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, BackendError>;
}

/// Cosine similarity of two vectors.
///
/// Returns 0 when the lengths differ, either vector is empty, or either has
/// zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Common width of all vectors, or a shape error
fn uniform_width(vectors: &[Vec<f32>]) -> Result<usize, BackendError> {
    let width = vectors.first().map(Vec::len).unwrap_or(0);
    if width == 0 {
        return Err(BackendError::Shape("zero-width vectors".to_string()));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != width) {
        return Err(BackendError::Shape(format!(
            "ragged input: expected width {}, found {}",
            width,
            bad.len()
        )));
    }
    Ok(width)
}

/// Unit diagonal, mirrored upper triangle, values clamped to [-1, 1]
fn finalize(mut rows: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
    let n = rows.len();
    for i in 0..n {
        rows[i][i] = 1.0;
        for j in i + 1..n {
            let v = rows[i][j].clamp(-1.0, 1.0);
            rows[i][j] = v;
            rows[j][i] = v;
        }
    }
    rows
}

/// Nested-loop reference implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarBackend;

impl SimilarityBackend for ScalarBackend {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn pairwise(&self, vectors: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, BackendError> {
        let n = vectors.len();
        let mut rows = vec![vec![0.0f32; n]; n];
        for i in 0..n {
            rows[i][i] = 1.0;
            for j in i + 1..n {
                let sim = cosine_similarity(&vectors[i], &vectors[j]);
                rows[i][j] = sim;
                rows[j][i] = sim;
            }
        }
        Ok(rows)
    }
}

/// Batched CPU backend on ndarray
#[derive(Debug, Clone, Copy, Default)]
pub struct NdarrayBackend;

impl SimilarityBackend for NdarrayBackend {
    fn name(&self) -> &'static str {
        "ndarray"
    }

    fn pairwise(&self, vectors: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, BackendError> {
        let n = vectors.len();
        let d = uniform_width(vectors)?;

        let flat: Vec<f32> = vectors.iter().flatten().copied().collect();
        let mut matrix =
            Array2::from_shape_vec((n, d), flat).map_err(|e| BackendError::Shape(e.to_string()))?;

        for mut row in matrix.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row /= norm;
            }
        }

        let product = matrix.dot(&matrix.t());
        let rows = product.outer_iter().map(|r| r.to_vec()).collect();
        Ok(finalize(rows))
    }
}

#[cfg(feature = "candle")]
mod accelerated {
    use super::{finalize, uniform_width, BackendError, SimilarityBackend};
    use candle_core::{Device, Tensor};
    use tracing::{info, warn};

    /// GPU-eligible batched backend on candle tensors
    pub struct CandleBackend {
        device: Device,
    }

    impl CandleBackend {
        /// Use CUDA device 0 when available, otherwise the CPU
        pub fn new() -> Self {
            let device = Device::cuda_if_available(0).unwrap_or_else(|e| {
                warn!("CUDA init failed, similarity will run on CPU: {}", e);
                Device::Cpu
            });
            info!("Candle similarity backend on {:?}", device);
            Self { device }
        }

        pub fn with_device(device: Device) -> Self {
            Self { device }
        }

        /// Every device buffer is owned by this frame and released before it returns,
        /// on the error path too.
        fn product(&self, flat: Vec<f32>, n: usize, d: usize) -> candle_core::Result<Vec<Vec<f32>>> {
            let matrix = Tensor::from_vec(flat, (n, d), &self.device)?;
            let norms = (matrix.sqr()?.sum_keepdim(1)?.sqrt()? + 1e-12)?;
            let normalized = matrix.broadcast_div(&norms)?;
            let product = normalized.matmul(&normalized.t()?)?;
            let rows = product.to_vec2::<f32>()?;

            drop(product);
            drop(normalized);
            drop(norms);
            drop(matrix);
            Ok(rows)
        }
    }

    impl Default for CandleBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SimilarityBackend for CandleBackend {
        fn name(&self) -> &'static str {
            if self.device.is_cuda() {
                "candle-cuda"
            } else {
                "candle-cpu"
            }
        }

        fn pairwise(&self, vectors: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, BackendError> {
            let n = vectors.len();
            let d = uniform_width(vectors)?;
            let flat: Vec<f32> = vectors.iter().flatten().copied().collect();

            let rows = self
                .product(flat, n, d)
                .map_err(|e| BackendError::Accelerator(e.to_string()))?;
            Ok(finalize(rows))
        }
    }
}

#[cfg(feature = "candle")]
pub use accelerated::CandleBackend;

/// Build the configured batched backend
pub fn backend_from_kind(
    kind: SimilarityBackendKind,
) -> Result<Box<dyn SimilarityBackend>, CatGraphError> {
    debug!("Similarity backend: {:?}", kind);
    match kind {
        SimilarityBackendKind::Ndarray => Ok(Box::new(NdarrayBackend)),
        SimilarityBackendKind::Scalar => Ok(Box::new(ScalarBackend)),
        #[cfg(feature = "candle")]
        SimilarityBackendKind::Candle => Ok(Box::new(CandleBackend::new())),
        #[cfg(not(feature = "candle"))]
        SimilarityBackendKind::Candle => Err(CatGraphError::config(
            "Similarity backend candle is not compiled in (enable the `candle` feature)",
        )),
    }
}
