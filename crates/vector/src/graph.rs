//! Similarity graphs anchored on a query record.

use catgraph_common::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::types::SimilarityResult;

/// Graph node: record id, similarity to the query record, display attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            similarity: None,
            attributes: Map::new(),
        }
    }

    pub fn with_similarity(mut self, similarity: f32) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Undirected weighted edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub weight: f32,
}

impl GraphLink {
    pub fn new(source: impl Into<String>, target: impl Into<String>, weight: f32) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

impl Graph {
    /// Full graph over a similarity result.
    ///
    /// One node per matrix entry and one link per unordered pair. Node
    /// `similarity` is the score against `query_id` when the query is part
    /// of the matrix.
    pub fn from_similarity(result: &SimilarityResult, records: &[Record], query_id: &str) -> Self {
        let by_id: HashMap<String, &Record> =
            records.iter().map(|r| (r.id.to_string(), r)).collect();
        let query_index = result.index_of(query_id);

        let nodes = result
            .node_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let mut node = GraphNode::new(id.clone());
                if let Some(q) = query_index {
                    node.similarity = result.matrix.get(q, i);
                }
                if let Some(record) = by_id.get(id) {
                    node = node
                        .with_attribute("label", record.title())
                        .with_attribute("packageId", record.package_id.clone());
                    if let Some(org) = record
                        .metadata
                        .get("organization")
                        .and_then(|o| o.get("title"))
                        .and_then(Value::as_str)
                    {
                        node = node.with_attribute("organization", org);
                    }
                }
                node
            })
            .collect();

        let n = result.node_ids.len();
        let mut links = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in i + 1..n {
                if let Some(weight) = result.matrix.get(i, j) {
                    links.push(GraphLink::new(
                        result.node_ids[i].clone(),
                        result.node_ids[j].clone(),
                        weight,
                    ));
                }
            }
        }

        Self { nodes, links }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Every link endpoint is a node
    pub fn is_consistent(&self) -> bool {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.links
            .iter()
            .all(|l| ids.contains(l.source.as_str()) && ids.contains(l.target.as_str()))
    }
}

/// Prune a graph to the links at or above `threshold`.
///
/// Returns an empty graph when `query_id` is not a node. A node survives if
/// it is the query, an endpoint of a surviving link, or carries its own
/// similarity at or above the threshold.
pub fn filter_by_threshold(graph: &Graph, threshold: f32, query_id: &str) -> Graph {
    if !graph.contains_node(query_id) {
        debug!("Query node {} not in graph", query_id);
        return Graph::default();
    }

    let links: Vec<GraphLink> = graph
        .links
        .iter()
        .filter(|l| l.weight >= threshold)
        .cloned()
        .collect();

    let connected: HashSet<&str> = links
        .iter()
        .flat_map(|l| [l.source.as_str(), l.target.as_str()])
        .collect();

    let nodes: Vec<GraphNode> = graph
        .nodes
        .iter()
        .filter(|n| {
            n.id == query_id
                || connected.contains(n.id.as_str())
                || n.similarity.map_or(false, |s| s >= threshold)
        })
        .cloned()
        .collect();

    // links whose endpoints were never nodes would break consistency
    let kept: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let links = links
        .into_iter()
        .filter(|l| kept.contains(l.source.as_str()) && kept.contains(l.target.as_str()))
        .collect();

    Graph { nodes, links }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimilarityMatrix;
    use serde_json::json;

    fn scenario() -> Graph {
        Graph {
            nodes: vec![
                GraphNode::new("A").with_similarity(1.0),
                GraphNode::new("B").with_similarity(1.0),
                GraphNode::new("C").with_similarity(0.0),
            ],
            links: vec![
                GraphLink::new("A", "B", 1.0),
                GraphLink::new("A", "C", 0.0),
                GraphLink::new("B", "C", 0.0),
            ],
        }
    }

    fn ids(graph: &Graph) -> Vec<&str> {
        graph.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_scenario_keeps_pair() {
        let filtered = filter_by_threshold(&scenario(), 0.5, "A");
        assert_eq!(ids(&filtered), vec!["A", "B"]);
        assert_eq!(filtered.links, vec![GraphLink::new("A", "B", 1.0)]);
        assert!(filtered.is_consistent());
    }

    #[test]
    fn test_missing_query_gives_empty_graph() {
        let filtered = filter_by_threshold(&scenario(), 0.5, "Z");
        assert!(filtered.is_empty());
        assert!(filtered.links.is_empty());
    }

    #[test]
    fn test_query_retained_for_all_thresholds() {
        let graph = Graph {
            nodes: vec![GraphNode::new("Q"), GraphNode::new("X")],
            links: vec![GraphLink::new("Q", "X", 0.3)],
        };
        for step in 0..=10 {
            let threshold = step as f32 / 10.0;
            let filtered = filter_by_threshold(&graph, threshold, "Q");
            assert!(filtered.contains_node("Q"), "dropped at {}", threshold);
            assert!(filtered.is_consistent());
        }
    }

    #[test]
    fn test_threshold_above_max_weight() {
        let mut graph = scenario();
        graph.links.iter_mut().for_each(|l| l.weight = l.weight.min(0.8));
        graph.nodes[1].similarity = Some(0.8);
        graph.nodes[2].similarity = Some(0.95);

        let filtered = filter_by_threshold(&graph, 0.9, "A");
        assert!(filtered.links.is_empty());
        // C is scored directly against the query
        assert_eq!(ids(&filtered), vec!["A", "C"]);
    }

    #[test]
    fn test_dangling_links_dropped() {
        let graph = Graph {
            nodes: vec![GraphNode::new("A")],
            links: vec![GraphLink::new("A", "ghost", 0.9)],
        };
        assert!(!graph.is_consistent());
        let filtered = filter_by_threshold(&graph, 0.5, "A");
        assert!(filtered.links.is_empty());
        assert!(filtered.is_consistent());
    }

    #[test]
    fn test_from_similarity_builds_all_pairs() {
        let records = vec![
            Record::new("a", json!({ "title": "Alpha" }), None),
            Record::new("b", json!({}), None),
            Record::new("c", json!({ "title": "Gamma" }), None),
        ];
        let result = SimilarityResult {
            matrix: SimilarityMatrix::from_rows(vec![
                vec![1.0, 1.0, 0.0],
                vec![1.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ])
            .unwrap(),
            node_ids: records.iter().map(|r| r.id.to_string()).collect(),
            backend: "ndarray".to_string(),
            dropped: Vec::new(),
        };
        let query = records[0].id.to_string();

        let graph = Graph::from_similarity(&result, &records, &query);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.links.len(), 3);
        assert!(graph.is_consistent());
        assert_eq!(graph.nodes[0].attributes["label"], "Alpha");
        assert_eq!(graph.nodes[1].attributes["label"], "b");
        assert_eq!(graph.nodes[2].similarity, Some(0.0));

        let filtered = filter_by_threshold(&graph, 0.5, &query);
        assert_eq!(filtered.nodes.len(), 2);
        assert_eq!(filtered.links.len(), 1);
    }

    #[test]
    fn test_node_serializes_flat() {
        let node = GraphNode::new("n1")
            .with_similarity(0.5)
            .with_attribute("label", "Roads");
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({ "id": "n1", "similarity": 0.5, "label": "Roads" })
        );
    }
}
