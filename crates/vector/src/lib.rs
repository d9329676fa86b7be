//! catgraph similarity engine and graph tooling
//!
//! All-pairs cosine similarity over stored embeddings (batched backend with
//! a scalar fallback), similarity graphs anchored on a query record, and
//! Cytoscape / SIF export.

pub mod engine;
pub mod export;
pub mod graph;
pub mod similarity;
pub mod types;

pub use engine::SimilarityEngine;
pub use export::{to_cytoscape, to_sif, ExportFields, NetworkData};
pub use graph::{filter_by_threshold, Graph, GraphLink, GraphNode};
#[cfg(feature = "candle")]
pub use similarity::CandleBackend;
pub use similarity::{
    backend_from_kind, cosine_similarity, BackendError, NdarrayBackend, ScalarBackend,
    SimilarityBackend,
};
pub use types::{SimilarityMatrix, SimilarityResult};
