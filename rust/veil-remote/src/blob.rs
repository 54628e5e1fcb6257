//! Content-addressed blob storage behind an aggregator.

use crate::BlobError;
use async_trait::async_trait;
use bytes::Bytes;
use veil_common::ConditionalSync;
use veil_ledger::BlobLocator;

mod http;
pub use http::*;

mod memory;
pub use memory::*;

/// Read access to stored blobs.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait BlobStore: ConditionalSync {
    /// Retrieve the bytes stored under `locator`.
    async fn get(&self, locator: &BlobLocator) -> Result<Bytes, BlobError>;
}

/// Public URL of a blob served by the aggregator at `aggregator_url`.
pub fn blob_url(aggregator_url: &str, locator: &BlobLocator) -> String {
    format!("{}/{}", aggregator_url.trim_end_matches('/'), locator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_joins_aggregator_and_locator() {
        let locator: BlobLocator = "abc-123".parse().unwrap();
        assert_eq!(
            blob_url("https://aggregator.example.com/v1/blobs/", &locator),
            "https://aggregator.example.com/v1/blobs/abc-123"
        );
    }
}
