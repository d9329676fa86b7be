use catgraph_common::{Record, NO_INGEST_LIMIT};
use catgraph_embed::EmbeddingProvider;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::source::CatalogSource;
use crate::store::RecordStore;
use crate::text::embedding_text;

/// One record that did not make it into the store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestFailure {
    pub package_id: String,
    pub error: String,
}

/// Summary of an ingest run. Always returned, even when the run aborts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Catalog keys attempted
    pub processed: usize,
    /// Records written to the store
    pub succeeded: usize,
    /// Records that could not be fetched or written
    pub failed: usize,
    /// Records written without an embedding
    pub missing_embeddings: usize,
    /// The catalog was synthetic (demo mode)
    pub used_fallback_data: bool,
    /// The catalog was fetched and every key was attempted
    pub success: bool,
    pub message: String,
    pub failures: Vec<IngestFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IngestReport {
    fn started() -> Self {
        let now = Utc::now();
        Self {
            processed: 0,
            succeeded: 0,
            failed: 0,
            missing_embeddings: 0,
            used_fallback_data: false,
            success: false,
            message: String::new(),
            failures: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    fn record_failure(&mut self, package_id: &str, error: impl ToString) {
        self.failed += 1;
        self.failures.push(IngestFailure {
            package_id: package_id.to_string(),
            error: error.to_string(),
        });
    }

    fn finish(mut self, success: bool, message: String) -> Self {
        self.success = success;
        self.message = message;
        self.finished_at = Utc::now();
        self
    }
}

/// Sequential catalog ingestor: fetch, embed and upsert one record at a time
pub struct Ingestor {
    source: Arc<dyn CatalogSource>,
    fallback: Option<Arc<dyn CatalogSource>>,
    store: Arc<dyn RecordStore>,
    provider: Arc<EmbeddingProvider>,
    default_limit: usize,
}

impl Ingestor {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn RecordStore>,
        provider: Arc<EmbeddingProvider>,
    ) -> Self {
        Self {
            source,
            fallback: None,
            store,
            provider,
            default_limit: NO_INGEST_LIMIT,
        }
    }

    /// Catalog used when the source catalog cannot be fetched.
    ///
    /// Only set in demo mode; reports from such runs have
    /// `used_fallback_data` set.
    pub fn with_fallback(mut self, fallback: Arc<dyn CatalogSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Cap applied when a run is started without a limit; 0 means no cap
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = if limit == 0 { NO_INGEST_LIMIT } else { limit };
        self
    }

    /// Batch entry point: absent or non-positive `limit` processes the whole
    /// catalog (up to the configured default cap)
    pub async fn run_batch(&self, limit: Option<i64>) -> IngestReport {
        let limit = limit
            .filter(|l| *l > 0)
            .map(|l| usize::try_from(l).unwrap_or(NO_INGEST_LIMIT));
        self.ingest(limit).await
    }

    /// Ingest up to `limit` catalog entries
    pub async fn ingest(&self, limit: Option<usize>) -> IngestReport {
        let mut report = IngestReport::started();

        let (source, keys) = match self.source.fetch_catalog().await {
            Ok(keys) => (Arc::clone(&self.source), keys),
            Err(e) => {
                error!("Failed to fetch catalog from {}: {}", self.source.name(), e);
                match &self.fallback {
                    Some(fallback) => match fallback.fetch_catalog().await {
                        Ok(keys) => {
                            warn!(
                                "Using {} fallback catalog ({} synthetic records)",
                                fallback.name(),
                                keys.len()
                            );
                            report.used_fallback_data = true;
                            (Arc::clone(fallback), keys)
                        }
                        Err(fallback_err) => {
                            let message = format!(
                                "Failed to fetch catalog: {} (fallback also failed: {})",
                                e, fallback_err
                            );
                            return report.finish(false, message);
                        }
                    },
                    None => {
                        return report.finish(false, format!("Failed to fetch catalog: {}", e));
                    }
                }
            }
        };

        let limit = limit.unwrap_or(self.default_limit);
        let total = keys.len().min(limit);
        info!("Processing {} of {} catalog records", total, keys.len());

        for (i, key) in keys.iter().take(total).enumerate() {
            info!("Processing record {}/{}: {}", i + 1, total, key);
            report.processed += 1;
            self.ingest_one(source.as_ref(), key, &mut report).await;
        }

        if let Err(e) = self.store.flush().await {
            error!("Failed to flush record store: {}", e);
        }

        let message = format!(
            "Processed {} records: {} succeeded, {} failed, {} without embedding{}",
            report.processed,
            report.succeeded,
            report.failed,
            report.missing_embeddings,
            if report.used_fallback_data {
                " (synthetic demo data)"
            } else {
                ""
            }
        );
        info!("{}", message);
        report.finish(true, message)
    }

    /// Fetch, embed and persist one key. Every failure is folded into `report`.
    async fn ingest_one(&self, source: &dyn CatalogSource, key: &str, report: &mut IngestReport) {
        let metadata = match source.fetch_record(key).await {
            Ok(metadata) if metadata.is_object() => metadata,
            Ok(_) => {
                warn!("Skipping {}: metadata is missing", key);
                report.record_failure(key, "metadata is missing");
                return;
            }
            Err(e) => {
                warn!("Skipping {}: {}", key, e);
                report.record_failure(key, e);
                return;
            }
        };

        let embedding = self.embed_metadata(key, &metadata).await;
        if embedding.is_none() {
            report.missing_embeddings += 1;
        }

        let record = Record::new(key, metadata, embedding);
        match self.store.upsert(record).await {
            Ok(()) => {
                info!("Stored {}", key);
                report.succeeded += 1;
            }
            Err(e) => {
                warn!("Failed to store {}: {}", key, e);
                report.record_failure(key, e);
            }
        }
    }

    /// Embedding for a record, `None` when it has no description or the
    /// model fails
    async fn embed_metadata(&self, key: &str, metadata: &Value) -> Option<Vec<f32>> {
        let notes = metadata
            .get("notes")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if notes.trim().is_empty() {
            warn!("{} has no description, storing without embedding", key);
            return None;
        }

        match self.provider.embed(&embedding_text(metadata)).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!("Embedding failed for {}, storing without embedding: {}", key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::DemoCatalog;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use catgraph_common::{CatGraphError, Result};
    use catgraph_embed::{EmbeddingModel, HashingLoader, ModelLoader};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory catalog; keys without metadata fail to fetch
    struct FakeCatalog {
        keys: Option<Vec<String>>,
        records: HashMap<String, Value>,
        fetches: AtomicUsize,
    }

    impl FakeCatalog {
        fn new(records: &[(&str, Value)]) -> Self {
            Self {
                keys: Some(records.iter().map(|(k, _)| k.to_string()).collect()),
                records: records
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                fetches: AtomicUsize::new(0),
            }
        }

        fn unreachable() -> Self {
            Self {
                keys: None,
                records: HashMap::new(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CatalogSource for FakeCatalog {
        async fn fetch_catalog(&self) -> Result<Vec<String>> {
            self.keys
                .clone()
                .ok_or_else(|| CatGraphError::catalog_fetch("connection refused"))
        }

        async fn fetch_record(&self, key: &str) -> Result<Value> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.records
                .get(key)
                .cloned()
                .ok_or_else(|| CatGraphError::record_fetch(key, "HTTP 404 Not Found"))
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// Store that rejects one key
    struct RejectingStore {
        inner: MemoryStore,
        reject: String,
    }

    #[async_trait]
    impl RecordStore for RejectingStore {
        async fn upsert(&self, record: Record) -> Result<()> {
            if record.package_id == self.reject {
                return Err(CatGraphError::persist("constraint violation"));
            }
            self.inner.upsert(record).await
        }

        async fn get(&self, id: &uuid::Uuid) -> Result<Option<Record>> {
            self.inner.get(id).await
        }

        async fn list(&self) -> Result<Vec<Record>> {
            self.inner.list().await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }
    }

    struct BrokenLoader;

    #[async_trait]
    impl ModelLoader for BrokenLoader {
        async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
            Err(CatGraphError::model_unavailable("weights missing"))
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    fn package(title: &str, notes: &str) -> Value {
        json!({ "title": title, "notes": notes, "tags": [{ "display_name": "test" }] })
    }

    fn ingestor(source: FakeCatalog, store: Arc<dyn RecordStore>) -> Ingestor {
        Ingestor::new(
            Arc::new(source),
            store,
            Arc::new(EmbeddingProvider::new(HashingLoader)),
        )
    }

    #[tokio::test]
    async fn test_record_failures_do_not_abort_run() {
        let source = FakeCatalog::new(&[
            ("p1", package("One", "first")),
            ("gone", Value::Null),
            ("p3", package("Three", "third")),
        ]);
        let store = Arc::new(MemoryStore::new());
        let report = ingestor(source, store.clone()).ingest(None).await;

        assert!(report.success);
        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].package_id, "gone");
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_notes_stored_without_embedding() {
        let source = FakeCatalog::new(&[("p1", package("Title only", "   "))]);
        let store = Arc::new(MemoryStore::new());
        let report = ingestor(source, store.clone()).ingest(None).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.missing_embeddings, 1);
        let record = store.get_by_package("p1").await.unwrap().unwrap();
        assert!(record.embedding.is_none());
    }

    #[tokio::test]
    async fn test_model_failure_is_soft() {
        let source = FakeCatalog::new(&[("p1", package("One", "first"))]);
        let store = Arc::new(MemoryStore::new());
        let report = Ingestor::new(
            Arc::new(source),
            store.clone(),
            Arc::new(EmbeddingProvider::new(BrokenLoader)),
        )
        .ingest(None)
        .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.missing_embeddings, 1);
    }

    #[tokio::test]
    async fn test_persist_failure_counts_as_failed() {
        let source = FakeCatalog::new(&[("p1", package("One", "first")), ("p2", package("Two", "second"))]);
        let store = Arc::new(RejectingStore {
            inner: MemoryStore::new(),
            reject: "p1".to_string(),
        });
        let report = ingestor(source, store.clone()).ingest(None).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(report.failures[0].error.contains("constraint violation"));
    }

    #[tokio::test]
    async fn test_catalog_failure_reports_instead_of_raising() {
        let store = Arc::new(MemoryStore::new());
        let report = ingestor(FakeCatalog::unreachable(), store.clone()).ingest(None).await;

        assert!(!report.success);
        assert!(!report.used_fallback_data);
        assert_eq!(report.processed, 0);
        assert!(report.message.contains("connection refused"));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_demo_fallback_is_flagged() {
        let store = Arc::new(MemoryStore::new());
        let report = ingestor(FakeCatalog::unreachable(), store.clone())
            .with_fallback(Arc::new(DemoCatalog::new()))
            .ingest(None)
            .await;

        assert!(report.success);
        assert!(report.used_fallback_data);
        assert_eq!(report.succeeded, 3);
        for record in store.list().await.unwrap() {
            assert_eq!(record.metadata["synthetic"], true);
        }
    }

    #[tokio::test]
    async fn test_limit_caps_working_set() {
        let records: Vec<(String, Value)> = (0..5)
            .map(|i| (format!("p{}", i), package("Same", &format!("notes {}", i))))
            .collect();
        let refs: Vec<(&str, Value)> = records.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();

        let source = FakeCatalog::new(&refs);
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(source, store.clone());

        assert_eq!(ingestor.run_batch(Some(2)).await.processed, 2);
        assert_eq!(ingestor.run_batch(Some(0)).await.processed, 5);
        assert_eq!(ingestor.run_batch(Some(-3)).await.processed, 5);
        assert_eq!(ingestor.run_batch(None).await.processed, 5);
        assert_eq!(store.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_default_limit_applies_without_explicit_limit() {
        let source = FakeCatalog::new(&[
            ("p1", package("One", "first")),
            ("p2", package("Two", "second")),
            ("p3", package("Three", "third")),
        ]);
        let ingestor = ingestor(source, Arc::new(MemoryStore::new())).with_default_limit(2);

        assert_eq!(ingestor.run_batch(None).await.processed, 2);
        assert_eq!(ingestor.run_batch(Some(3)).await.processed, 3);
    }

    #[tokio::test]
    async fn test_zero_default_limit_processes_everything() {
        let source = FakeCatalog::new(&[
            ("p1", package("One", "first")),
            ("p2", package("Two", "second")),
            ("p3", package("Three", "third")),
        ]);
        let ingestor = ingestor(source, Arc::new(MemoryStore::new())).with_default_limit(0);

        assert_eq!(ingestor.run_batch(None).await.processed, 3);
    }
}
