//! Persisted catalog record and its deterministic identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CatGraphError;
use crate::Result;

/// Namespace for record identities. Changing it re-keys every stored record.
pub const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x5c0e_7a1d_94b3_4f26_8d1e_2b6a_f0c4_9e73);

/// Derive the record id for a source package key.
///
/// The same key always maps to the same id, so re-ingesting overwrites.
pub fn record_id(package_id: &str) -> Uuid {
    Uuid::new_v5(&RECORD_NAMESPACE, package_id.as_bytes())
}

/// Embedding as it may appear in a store row.
///
/// Rows written by this crate hold a numeric array; older rows may hold the
/// vector serialized as text (`"[0.1, 0.2]"` or `"0.1,0.2"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredEmbedding {
    Vector(Vec<f32>),
    Text(String),
}

impl StoredEmbedding {
    /// Resolve to a non-empty numeric vector.
    ///
    /// Text is parsed as JSON first, then as a comma-separated list.
    pub fn resolve(&self) -> Result<Vec<f32>> {
        match self {
            Self::Vector(values) if values.is_empty() => {
                Err(CatGraphError::malformed_embedding("empty vector"))
            }
            Self::Vector(values) => Ok(values.clone()),
            Self::Text(text) => parse_embedding_text(text),
        }
    }
}

impl From<Vec<f32>> for StoredEmbedding {
    fn from(values: Vec<f32>) -> Self {
        Self::Vector(values)
    }
}

fn parse_embedding_text(text: &str) -> Result<Vec<f32>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CatGraphError::malformed_embedding("empty string"));
    }

    if let Ok(values) = serde_json::from_str::<Vec<f32>>(trimmed) {
        if values.is_empty() {
            return Err(CatGraphError::malformed_embedding("empty array"));
        }
        return Ok(values);
    }

    let body = trimmed.trim_matches(|c| matches!(c, '[' | ']' | '{' | '}'));
    body.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    CatGraphError::malformed_embedding(format!("not a number: {:?}", part))
                })
        })
        .collect()
}

/// A catalog record as persisted by the ingestor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Deterministic id derived from `package_id`
    pub id: Uuid,

    /// Source-system key
    #[serde(alias = "package")]
    pub package_id: String,

    /// Source metadata (title, notes, tags, ...)
    pub metadata: serde_json::Value,

    /// L2-normalized embedding, absent when the record had no description.
    /// `notes_embedding` is the column name used by older stores.
    #[serde(default, alias = "notes_embedding")]
    pub embedding: Option<StoredEmbedding>,

    /// When this row was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Build a record for `package_id`, deriving its id
    pub fn new(
        package_id: impl Into<String>,
        metadata: serde_json::Value,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        let package_id = package_id.into();
        Self {
            id: record_id(&package_id),
            package_id,
            metadata,
            embedding: embedding.map(StoredEmbedding::Vector),
            ingested_at: Some(Utc::now()),
        }
    }

    /// String field from metadata, empty when absent or not a string
    pub fn metadata_str(&self, key: &str) -> &str {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }

    /// Display title, falling back to the package key
    pub fn title(&self) -> &str {
        match self.metadata_str("title") {
            "" => &self.package_id,
            title => title,
        }
    }
}
