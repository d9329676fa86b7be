//! Graph interchange formats: Cytoscape JSON and SIF.
//!
//! Both exporters work on loosely typed [`NetworkData`] so graphs from other
//! tools (with their own key names) can be exported through [`ExportFields`].
//! Entries missing a required key are skipped with a warning.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::graph::Graph;

/// Key names read from node and link maps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportFields {
    pub id: String,
    pub source: String,
    pub target: String,
    pub weight: String,
}

impl Default for ExportFields {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            source: "source".to_string(),
            target: "target".to_string(),
            weight: "weight".to_string(),
        }
    }
}

/// Nodes and links as JSON objects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkData {
    pub nodes: Vec<Map<String, Value>>,
    pub links: Vec<Map<String, Value>>,
}

fn as_object<T: Serialize>(item: &T) -> Option<Map<String, Value>> {
    match serde_json::to_value(item) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

impl From<&Graph> for NetworkData {
    fn from(graph: &Graph) -> Self {
        Self {
            nodes: graph.nodes.iter().filter_map(as_object).collect(),
            links: graph.links.iter().filter_map(as_object).collect(),
        }
    }
}

/// Present and non-null
fn field<'a>(entry: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    entry.get(key).filter(|v| !v.is_null())
}

/// Text form of an id-like value, `None` for empty strings
fn display(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Cytoscape `elements` JSON (`.cyjs`)
pub fn to_cytoscape(network: &NetworkData, fields: &ExportFields) -> Value {
    let mut nodes = Vec::with_capacity(network.nodes.len());
    for node in &network.nodes {
        let Some(id) = field(node, &fields.id) else {
            let entry = Value::Object(node.clone());
            warn!("Node missing {}: {}", fields.id, entry);
            continue;
        };

        let mut data = node.clone();
        data.insert("id".to_string(), id.clone());
        nodes.push(json!({ "data": data }));
    }

    let mut edges = Vec::with_capacity(network.links.len());
    for (index, link) in network.links.iter().enumerate() {
        let (Some(source), Some(target)) = (field(link, &fields.source), field(link, &fields.target))
        else {
            let entry = Value::Object(link.clone());
            warn!("Link missing {}/{}: {}", fields.source, fields.target, entry);
            continue;
        };

        let mut data = link.clone();
        let id = field(link, &fields.id)
            .cloned()
            .unwrap_or_else(|| Value::String(format!("e{}", index)));
        data.insert("id".to_string(), id);
        data.insert("source".to_string(), source.clone());
        data.insert("target".to_string(), target.clone());
        if let Some(weight) = field(link, &fields.weight) {
            data.insert("weight".to_string(), weight.clone());
        }
        edges.push(json!({ "data": data }));
    }

    json!({ "elements": { "nodes": nodes, "edges": edges } })
}

/// Simple Interaction Format, one `source label target` line per link
pub fn to_sif(network: &NetworkData, interaction: &str, fields: &ExportFields) -> String {
    let mut sif = String::new();
    for link in &network.links {
        let source = field(link, &fields.source).and_then(display);
        let target = field(link, &fields.target).and_then(display);
        match (source, target) {
            (Some(source), Some(target)) => {
                sif.push_str(&format!("{} {} {}\n", source, interaction, target));
            }
            _ => warn!("Skipping link without {}/{} in SIF export", fields.source, fields.target),
        }
    }
    sif
}
