use async_trait::async_trait;
use catgraph_common::{AppConfig, CatGraphError, Result};
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Open-data catalog: a key list plus per-key metadata
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// All catalog keys, in catalog order
    async fn fetch_catalog(&self) -> Result<Vec<String>>;

    /// Metadata object for one key
    async fn fetch_record(&self, key: &str) -> Result<Value>;

    /// Source name for logs
    fn name(&self) -> &str;
}

/// Keys from a `package_list` response body
pub fn parse_catalog(body: &Value) -> Result<Vec<String>> {
    let result = body
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| CatGraphError::catalog_fetch("Unexpected response format: missing result list"))?;

    result
        .iter()
        .map(|key| {
            key.as_str()
                .map(str::to_string)
                .ok_or_else(|| CatGraphError::catalog_fetch(format!("Non-string catalog key: {}", key)))
        })
        .collect()
}

/// Metadata from a `package_show` response body
pub fn parse_record(key: &str, body: &Value) -> Result<Value> {
    match body.get("result") {
        Some(result @ Value::Object(_)) => Ok(result.clone()),
        Some(Value::Null) | None => Err(CatGraphError::record_fetch(
            key,
            "Unexpected response format: missing result",
        )),
        Some(other) => Err(CatGraphError::record_fetch(
            key,
            format!("Expected an object result, got {}", other),
        )),
    }
}

/// Failed GET; `retryable` is set for transport errors, 429 and 5xx
#[derive(Debug)]
struct FetchError {
    message: String,
    retryable: bool,
}

impl FetchError {
    fn transient(message: String) -> Self {
        Self {
            message,
            retryable: true,
        }
    }

    fn permanent(message: String) -> Self {
        Self {
            message,
            retryable: false,
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// CKAN action API client (`package_list` / `package_show`)
#[derive(Debug, Clone)]
pub struct CkanClient {
    client: Client,
    list_url: String,
    show_url: String,
    max_retries: u32,
}

impl CkanClient {
    pub fn new(
        list_url: impl Into<String>,
        show_url: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatGraphError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            list_url: list_url.into(),
            show_url: show_url.into(),
            max_retries: max_retries.max(1),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.catalog_list_url,
            &config.catalog_show_url,
            Duration::from_secs(config.request_timeout_secs),
            config.fetch_retries,
        )
    }

    /// GET a JSON document; non-2xx and non-JSON responses are errors
    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> std::result::Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::transient(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(FetchError::permanent(format!("HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("application/json") {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            return Err(FetchError::permanent(format!(
                "expected JSON but got '{}': {}",
                content_type, preview
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::permanent(format!("invalid JSON body: {}", e)))
    }
}

#[async_trait]
impl CatalogSource for CkanClient {
    async fn fetch_catalog(&self) -> Result<Vec<String>> {
        info!("Fetching catalog list from {}", self.list_url);
        let body = self
            .get_json(&self.list_url, &[])
            .await
            .map_err(|e| CatGraphError::catalog_fetch(format!("{}: {}", self.list_url, e)))?;

        let keys = parse_catalog(&body)?;
        info!("Catalog lists {} records", keys.len());
        Ok(keys)
    }

    async fn fetch_record(&self, key: &str) -> Result<Value> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            debug!("Fetching metadata for {} (attempt {})", key, attempt);
            match self.get_json(&self.show_url, &[("id", key)]).await {
                Ok(body) => return parse_record(key, &body),
                Err(e) if !e.retryable => {
                    debug!("Not retrying {}: {}", key, e);
                    return Err(CatGraphError::record_fetch(key, e.message));
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        let delay = Duration::from_millis(500 * 2u64.pow(attempt - 1));
                        warn!(
                            "Metadata fetch for {} failed (attempt {}/{}): {}. Retrying in {:?}...",
                            key, attempt, self.max_retries, e, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e.message);
                }
            }
        }

        Err(CatGraphError::record_fetch(
            key,
            last_error.unwrap_or_else(|| "all retries failed".to_string()),
        ))
    }

    fn name(&self) -> &str {
        &self.list_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local server answering every request with `status` and an empty body;
    /// returns its base URL and a request counter
    async fn fixed_status_server(status: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn client_for(base: &str, retries: u32) -> CkanClient {
        CkanClient::new(
            format!("{}/api/3/action/package_list", base),
            format!("{}/api/3/action/package_show", base),
            Duration::from_secs(5),
            retries,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_catalog() {
        let body = json!({ "success": true, "result": ["p1", "p2"] });
        assert_eq!(parse_catalog(&body).unwrap(), vec!["p1", "p2"]);
    }

    #[test]
    fn test_parse_catalog_missing_result_is_fatal() {
        let err = parse_catalog(&json!({ "success": false })).unwrap_err();
        assert!(err.is_fatal());

        let err = parse_catalog(&json!({ "result": ["ok", 3] })).unwrap_err();
        assert!(matches!(err, CatGraphError::CatalogFetch(_)));
    }

    #[test]
    fn test_parse_record() {
        let body = json!({ "result": { "id": "p1", "title": "Roads" } });
        assert_eq!(parse_record("p1", &body).unwrap()["title"], "Roads");
    }

    #[test]
    fn test_parse_record_missing_result() {
        for body in [json!({}), json!({ "result": null }), json!({ "result": "text" })] {
            let err = parse_record("p1", &body).unwrap_err();
            assert!(matches!(err, CatGraphError::RecordFetch { .. }));
            assert!(!err.is_fatal());
        }
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_catalog_error() {
        let client = CkanClient::new(
            "http://127.0.0.1:9/api/3/action/package_list",
            "http://127.0.0.1:9/api/3/action/package_show",
            Duration::from_secs(2),
            1,
        )
        .unwrap();

        let err = client.fetch_catalog().await.unwrap_err();
        assert!(matches!(err, CatGraphError::CatalogFetch(_)));

        let err = client.fetch_record("p1").await.unwrap_err();
        assert!(matches!(err, CatGraphError::RecordFetch { .. }));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (base, hits) = fixed_status_server("404 Not Found").await;
        let err = client_for(&base, 3).fetch_record("gone").await.unwrap_err();

        assert!(matches!(err, CatGraphError::RecordFetch { .. }));
        assert!(err.to_string().contains("404"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (base, hits) = fixed_status_server("503 Service Unavailable").await;
        let err = client_for(&base, 2).fetch_record("busy").await.unwrap_err();

        assert!(matches!(err, CatGraphError::RecordFetch { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
