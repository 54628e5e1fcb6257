use super::{BlobStore, blob_url};
use crate::BlobError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use tracing::debug;
use veil_ledger::BlobLocator;

/// Configuration for [`HttpBlobStore`]
#[derive(Clone, Debug)]
pub struct HttpBlobConfig {
    /// Aggregator blob endpoint (e.g., "https://aggregator.example.com/v1/blobs")
    pub aggregator_url: String,

    /// Optional custom headers to send with each request
    pub headers: Vec<(String, String)>,
}

impl Default for HttpBlobConfig {
    fn default() -> Self {
        Self {
            aggregator_url: "http://localhost:31415/v1/blobs".to_string(),
            headers: Vec::new(),
        }
    }
}

impl HttpBlobConfig {
    /// Create a new configuration for the aggregator at `aggregator_url`
    pub fn new(aggregator_url: impl Into<String>) -> Self {
        Self {
            aggregator_url: aggregator_url.into(),
            ..Default::default()
        }
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Blob store reached over an HTTP aggregator. Requests carry no timeout of
/// their own; [`crate::ContentFetcher`] bounds each attempt.
pub struct HttpBlobStore {
    config: HttpBlobConfig,
    client: Client,
}

impl HttpBlobStore {
    /// Create a store client with the given configuration
    pub fn new(config: HttpBlobConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Public URL of `locator` on this aggregator
    pub fn url_for(&self, locator: &BlobLocator) -> String {
        blob_url(&self.config.aggregator_url, locator)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl BlobStore for HttpBlobStore {
    async fn get(&self, locator: &BlobLocator) -> Result<Bytes, BlobError> {
        let url = self.url_for(locator);
        debug!(%url, "Fetching blob");

        let mut request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/octet-stream");
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.bytes().await?),
            StatusCode::NOT_FOUND => Err(BlobError::NotFound(locator.to_string())),
            status if status.is_server_error() => Err(BlobError::Unavailable(format!(
                "HTTP {} - {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ))),
            status => Err(BlobError::Rejected {
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(target_arch = "wasm32"))]
    mod integration {
        use super::*;
        use axum::{
            Router,
            extract::{Path, State},
            http::{HeaderMap, StatusCode},
            routing::get,
        };
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::net::TcpListener;

        #[derive(Clone, Default)]
        struct Aggregator {
            outages: Arc<AtomicUsize>,
        }

        async fn serve_blob(
            State(aggregator): State<Aggregator>,
            Path(blob_id): Path<String>,
            headers: HeaderMap,
        ) -> Result<Vec<u8>, StatusCode> {
            if headers.get("accept").and_then(|v| v.to_str().ok())
                != Some("application/octet-stream")
            {
                return Err(StatusCode::NOT_ACCEPTABLE);
            }
            if aggregator
                .outages
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StatusCode::SERVICE_UNAVAILABLE);
            }
            match blob_id.as_str() {
                "known" => Ok(vec![0x89, 0x50, 0x4e, 0x47]),
                "forbidden" => Err(StatusCode::FORBIDDEN),
                _ => Err(StatusCode::NOT_FOUND),
            }
        }

        async fn start_aggregator(aggregator: Aggregator) -> String {
            let app = Router::new()
                .route("/v1/blobs/:blob_id", get(serve_blob))
                .with_state(aggregator);

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            format!("http://{}/v1/blobs", addr)
        }

        #[tokio::test]
        async fn test_get_known_blob() {
            let url = start_aggregator(Aggregator::default()).await;
            let store = HttpBlobStore::new(HttpBlobConfig::new(url));

            let bytes = store.get(&"known".parse().unwrap()).await.unwrap();
            assert_eq!(bytes.as_ref(), &[0x89, 0x50, 0x4e, 0x47]);
        }

        #[tokio::test]
        async fn test_status_mapping() {
            let aggregator = Aggregator::default();
            aggregator.outages.store(1, Ordering::SeqCst);
            let url = start_aggregator(aggregator).await;
            let store = HttpBlobStore::new(HttpBlobConfig::new(url));

            let outage = store.get(&"known".parse().unwrap()).await.unwrap_err();
            assert!(matches!(outage, BlobError::Unavailable(_)));
            assert!(outage.is_transient());

            let missing = store.get(&"missing".parse().unwrap()).await.unwrap_err();
            assert_eq!(missing, BlobError::NotFound("missing".into()));

            let forbidden = store.get(&"forbidden".parse().unwrap()).await.unwrap_err();
            assert_eq!(forbidden, BlobError::Rejected { status: 403 });
        }
    }
}
