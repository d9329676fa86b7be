//! Query-time graph building: store -> similarity -> graph -> filter -> export

use catgraph_common::{AppConfig, CatGraphError, Record, Result};
use catgraph_ingest::RecordStore;
use catgraph_vector::{
    cosine_similarity, filter_by_threshold, to_cytoscape, to_sif, ExportFields, Graph, NetworkData,
    SimilarityEngine,
};
use std::cmp::Ordering;
use clap::ValueEnum;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Cytoscape `elements` JSON
    Cytoscape,
    /// Simple Interaction Format
    Sif,
    /// Raw `{nodes, links}` graph
    Json,
}

#[derive(Debug, Clone)]
pub struct GraphOptions {
    pub threshold: f32,
    pub max_nodes: usize,
}

impl GraphOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            threshold: config.similarity_threshold,
            max_nodes: config.max_nodes,
        }
    }

    /// Reject options the command line can set past `AppConfig::validate`
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(CatGraphError::invalid_input(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.max_nodes == 0 {
            return Err(CatGraphError::invalid_input("max_nodes must be at least 1"));
        }
        Ok(())
    }
}

/// Record for a query given as a record id or a catalog key
pub async fn find_query_record(store: &dyn RecordStore, query: &str) -> Result<Option<Record>> {
    if let Ok(id) = Uuid::parse_str(query) {
        if let Some(record) = store.get(&id).await? {
            return Ok(Some(record));
        }
    }
    store.get_by_package(query).await
}

/// The `keep` candidates closest to `anchor` by cosine similarity.
///
/// Candidates without a usable embedding sort last; ties keep store order.
fn nearest_candidates(anchor: &Record, candidates: Vec<Record>, keep: usize) -> Vec<Record> {
    let Some(target) = anchor.embedding.as_ref().and_then(|e| e.resolve().ok()) else {
        return candidates.into_iter().take(keep).collect();
    };

    let mut scored: Vec<(f32, Record)> = candidates
        .into_iter()
        .map(|record| {
            let score = record
                .embedding
                .as_ref()
                .and_then(|e| e.resolve().ok())
                .map(|v| cosine_similarity(&target, &v))
                .unwrap_or(f32::NEG_INFINITY);
            (score, record)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().take(keep).map(|(_, record)| record).collect()
}

/// Similarity graph around `query`, pruned at `options.threshold`.
///
/// The query record is always the first matrix node, followed by the
/// `max_nodes - 1` stored records nearest to it.
pub async fn similarity_graph(
    store: &dyn RecordStore,
    engine: &SimilarityEngine,
    query: &str,
    options: &GraphOptions,
) -> Result<Graph> {
    options.validate()?;

    let anchor = find_query_record(store, query)
        .await?
        .ok_or_else(|| CatGraphError::not_found(format!("No record for query {}", query)))?;
    let query_id = anchor.id;

    let candidates: Vec<Record> = store
        .list()
        .await?
        .into_iter()
        .filter(|r| r.id != query_id)
        .collect();
    let neighbours = nearest_candidates(&anchor, candidates, options.max_nodes - 1);

    let mut records = vec![anchor];
    records.extend(neighbours);

    let result = engine.similarity_matrix(&records, options.max_nodes);
    let query_key = query_id.to_string();
    if result.index_of(&query_key).is_none() {
        warn!(
            "Query record {} has no usable embedding; graph will be empty",
            records[0].package_id
        );
    }

    let graph = Graph::from_similarity(&result, &records, &query_key);
    let filtered = filter_by_threshold(&graph, options.threshold, &query_key);
    info!(
        "Graph for {} - {} of {} nodes, {} of {} links at threshold {}",
        records[0].package_id,
        filtered.nodes.len(),
        graph.nodes.len(),
        filtered.links.len(),
        graph.links.len(),
        options.threshold
    );
    Ok(filtered)
}

/// Serialize a graph in the requested format
pub fn render(graph: &Graph, format: ExportFormat, interaction: &str) -> Result<String> {
    let fields = ExportFields::default();
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(graph)?),
        ExportFormat::Cytoscape => Ok(serde_json::to_string_pretty(&to_cytoscape(
            &NetworkData::from(graph),
            &fields,
        ))?),
        ExportFormat::Sif => Ok(to_sif(&NetworkData::from(graph), interaction, &fields)),
    }
}
