use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use veil_ledger::ObjectId;
use veil_remote::RetryPolicy;

/// Problems with a [`VeilConfig`] document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON for this schema
    #[error("Could not parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Ciphertext retrieval settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Total attempts per blob (default: 3)
    pub attempts: u32,
    /// Per-attempt timeout in seconds (default: 25)
    pub attempt_timeout_seconds: u64,
    /// First backoff in seconds, doubled after each failure (default: 2)
    pub backoff_base_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            attempt_timeout_seconds: 25,
            backoff_base_seconds: 2,
        }
    }
}

/// Configuration for a [`crate::Viewer`]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VeilConfig {
    /// Package that defines posts and credentials
    pub package_id: ObjectId,

    /// Ledger full node JSON-RPC endpoint
    pub rpc_url: String,

    /// Blob aggregator endpoint that public image URLs are built from
    pub aggregator_url: String,

    /// Backend that sponsors access-granting transactions
    pub sponsor_url: Option<String>,

    /// Network name passed to the sponsor
    pub network: String,

    /// Posts shown in the feed, in display order
    pub post_ids: Vec<ObjectId>,

    /// Key servers that must agree before keys are used (default: 1)
    pub threshold: usize,

    /// Decryption session lifetime in minutes (default: 30)
    pub session_ttl_minutes: u32,

    /// How long a credential snapshot is trusted, in seconds (default: 60)
    pub credential_staleness_seconds: u64,

    /// Ciphertext retrieval settings
    pub fetch: FetchConfig,

    /// Upper bound on a key-release round trip in seconds (default: 30)
    pub key_release_timeout_seconds: u64,

    /// Posts decrypted at the same time (default: 4)
    pub concurrency: usize,
}

impl Default for VeilConfig {
    fn default() -> Self {
        Self {
            package_id: ObjectId::new([0; 32]),
            rpc_url: "http://localhost:9000".to_string(),
            aggregator_url: "http://localhost:31415/v1/blobs".to_string(),
            sponsor_url: None,
            network: "testnet".to_string(),
            post_ids: Vec::new(),
            threshold: 1,
            session_ttl_minutes: 30,
            credential_staleness_seconds: 60,
            fetch: FetchConfig::default(),
            key_release_timeout_seconds: 30,
            concurrency: 4,
        }
    }
}

impl VeilConfig {
    /// Create a configuration for the posts package at `package_id`
    pub fn new(package_id: ObjectId) -> Self {
        Self {
            package_id,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON document. Unknown fields are rejected.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold == 0 {
            return Err(ConfigError::Invalid("threshold must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.fetch.attempts == 0 {
            return Err(ConfigError::Invalid("fetch.attempts must be at least 1".into()));
        }
        if self.session_ttl_minutes == 0 {
            return Err(ConfigError::Invalid(
                "session_ttl_minutes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Set the JSON-RPC endpoint
    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = url.into();
        self
    }

    /// Set the blob aggregator endpoint
    pub fn with_aggregator_url(mut self, url: impl Into<String>) -> Self {
        self.aggregator_url = url.into();
        self
    }

    /// Set the sponsoring backend
    pub fn with_sponsor_url(mut self, url: impl Into<String>) -> Self {
        self.sponsor_url = Some(url.into());
        self
    }

    /// Set the network name passed to the sponsor
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Set the posts shown in the feed
    pub fn with_post_ids(mut self, post_ids: Vec<ObjectId>) -> Self {
        self.post_ids = post_ids;
        self
    }

    /// Set the key-server threshold
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the session lifetime
    pub fn with_session_ttl_minutes(mut self, minutes: u32) -> Self {
        self.session_ttl_minutes = minutes;
        self
    }

    /// Set the credential staleness window
    pub fn with_credential_staleness(mut self, staleness: Duration) -> Self {
        self.credential_staleness_seconds = staleness.as_secs();
        self
    }

    /// Set the ciphertext retrieval settings
    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    /// Set the key-release timeout
    pub fn with_key_release_timeout(mut self, timeout: Duration) -> Self {
        self.key_release_timeout_seconds = timeout.as_secs();
        self
    }

    /// Set how many posts are decrypted at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Retry policy for the content fetcher.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_attempts(self.fetch.attempts)
            .with_attempt_timeout(Duration::from_secs(self.fetch.attempt_timeout_seconds))
            .with_backoff_base(Duration::from_secs(self.fetch.backoff_base_seconds))
    }

    /// Credential staleness window.
    pub fn credential_staleness(&self) -> Duration {
        Duration::from_secs(self.credential_staleness_seconds)
    }

    /// Key-release timeout.
    pub fn key_release_timeout(&self) -> Duration {
        Duration::from_secs(self.key_release_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = VeilConfig::default();
        assert_eq!(config.threshold, 1);
        assert_eq!(config.session_ttl_minutes, 30);
        assert_eq!(config.credential_staleness(), Duration::from_secs(60));
        assert_eq!(config.key_release_timeout(), Duration::from_secs(30));
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn it_reads_partial_documents() {
        let config = VeilConfig::from_json(
            r#"{
                "package_id": "0x2a",
                "post_ids": ["0x1", "0x2"],
                "threshold": 2,
                "fetch": { "attempts": 5 }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config,
            VeilConfig::new("0x2a".parse().unwrap())
                .with_post_ids(vec!["0x1".parse().unwrap(), "0x2".parse().unwrap()])
                .with_threshold(2)
                .with_fetch(FetchConfig {
                    attempts: 5,
                    ..Default::default()
                })
        );
    }

    #[test]
    fn it_rejects_unknown_fields_and_bad_ranges() {
        assert!(matches!(
            VeilConfig::from_json(r#"{ "treshold": 2 }"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            VeilConfig::from_json(r#"{ "concurrency": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
    }
}
