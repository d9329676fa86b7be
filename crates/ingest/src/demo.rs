use async_trait::async_trait;
use catgraph_common::{CatGraphError, Result};
use serde_json::{json, Value};

use crate::source::CatalogSource;

const DEMO_KEYS: [&str; 3] = ["package-1", "package-2", "package-3"];

/// Synthetic three-record catalog for offline demos.
///
/// Every record carries `"synthetic": true` in its metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoCatalog;

impl DemoCatalog {
    pub fn new() -> Self {
        Self
    }

    fn metadata(key: &str) -> Value {
        json!({
            "id": key,
            "name": key,
            "title": format!("Demo Package {}", key),
            "notes": format!("This is a synthetic package for {} created for demonstration purposes.", key),
            "tags": [{ "display_name": "demo" }, { "display_name": key }],
            "synthetic": true,
        })
    }
}

#[async_trait]
impl CatalogSource for DemoCatalog {
    async fn fetch_catalog(&self) -> Result<Vec<String>> {
        Ok(DEMO_KEYS.iter().map(|k| k.to_string()).collect())
    }

    async fn fetch_record(&self, key: &str) -> Result<Value> {
        if DEMO_KEYS.contains(&key) {
            Ok(Self::metadata(key))
        } else {
            Err(CatGraphError::record_fetch(key, "not in the demo catalog"))
        }
    }

    fn name(&self) -> &str {
        "demo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_records_are_marked() {
        let demo = DemoCatalog::new();
        let keys = demo.fetch_catalog().await.unwrap();
        assert_eq!(keys, vec!["package-1", "package-2", "package-3"]);

        for key in &keys {
            let metadata = demo.fetch_record(key).await.unwrap();
            assert_eq!(metadata["synthetic"], true);
            assert!(!metadata["notes"].as_str().unwrap().is_empty());
        }
        assert!(demo.fetch_record("real-package").await.is_err());
    }
}
