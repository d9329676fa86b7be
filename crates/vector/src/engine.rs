use catgraph_common::{AppConfig, Record, Result};
use tracing::{debug, info, warn};

use crate::similarity::{backend_from_kind, NdarrayBackend, ScalarBackend, SimilarityBackend};
use crate::types::{SimilarityMatrix, SimilarityResult};

/// Similarity engine
///
/// Tries the primary (batched) backend and falls back to [`ScalarBackend`]
/// on any backend failure. Callers only ever see a matrix.
pub struct SimilarityEngine {
    primary: Box<dyn SimilarityBackend>,
    fallback: ScalarBackend,
}

impl SimilarityEngine {
    /// Engine with the ndarray batched backend
    pub fn new() -> Self {
        Self::with_primary(Box::new(NdarrayBackend))
    }

    /// Engine with a specific primary backend
    pub fn with_primary(primary: Box<dyn SimilarityBackend>) -> Self {
        Self {
            primary,
            fallback: ScalarBackend,
        }
    }

    /// Engine with the configured backend
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::with_primary(backend_from_kind(config.similarity_backend)?))
    }

    /// Name of the primary backend
    pub fn primary_name(&self) -> &'static str {
        self.primary.name()
    }

    /// All-pairs similarity over the first `max_nodes` records.
    ///
    /// Records without a resolvable embedding are left out and listed in
    /// `dropped`. No valid embeddings gives an empty result.
    pub fn similarity_matrix(&self, records: &[Record], max_nodes: usize) -> SimilarityResult {
        let limited = &records[..records.len().min(max_nodes)];
        debug!(
            "Processing {} of {} records for similarity",
            limited.len(),
            records.len()
        );

        let mut node_ids = Vec::with_capacity(limited.len());
        let mut vectors = Vec::with_capacity(limited.len());
        let mut dropped = Vec::new();

        for record in limited {
            let id = record.id.to_string();
            match record.embedding.as_ref().map(|e| e.resolve()) {
                Some(Ok(vector)) => {
                    node_ids.push(id);
                    vectors.push(vector);
                }
                Some(Err(e)) => {
                    warn!("Excluding {} from similarity: {}", record.package_id, e);
                    dropped.push(id);
                }
                None => {
                    debug!("Excluding {} from similarity: no embedding", record.package_id);
                    dropped.push(id);
                }
            }
        }

        if vectors.is_empty() {
            warn!("No valid embeddings found for similarity calculation");
            return SimilarityResult {
                dropped,
                ..SimilarityResult::default()
            };
        }

        let (matrix, backend) = self.compute(&vectors);
        info!(
            "Similarity matrix computed - {} nodes via {} ({} excluded)",
            node_ids.len(),
            backend,
            dropped.len()
        );

        SimilarityResult {
            matrix,
            node_ids,
            backend: backend.to_string(),
            dropped,
        }
    }

    fn compute(&self, vectors: &[Vec<f32>]) -> (SimilarityMatrix, &'static str) {
        match self.primary.pairwise(vectors) {
            Ok(rows) => match SimilarityMatrix::from_rows(rows) {
                Some(matrix) if matrix.len() == vectors.len() => {
                    return (matrix, self.primary.name());
                }
                _ => warn!(
                    "{} returned a malformed matrix, falling back to {}",
                    self.primary.name(),
                    self.fallback.name()
                ),
            },
            Err(e) => warn!(
                "{} similarity failed, falling back to {}: {}",
                self.primary.name(),
                self.fallback.name(),
                e
            ),
        }

        let rows = self.fallback.pairwise(vectors).unwrap_or_default();
        let matrix = SimilarityMatrix::from_rows(rows).unwrap_or_default();
        (matrix, self.fallback.name())
    }
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::new()
    }
}
