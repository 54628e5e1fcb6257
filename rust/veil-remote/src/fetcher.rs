use crate::{BlobError, BlobStore, FetchError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use veil_ledger::BlobLocator;

/// How hard the fetcher tries before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (default: 3)
    pub attempts: u32,
    /// Upper bound on a single attempt (default: 25 s)
    pub attempt_timeout: Duration,
    /// Wait after the first failure; doubles after each further one
    /// (default: 2 s)
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            attempt_timeout: Duration::from_secs(25),
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Set the number of attempts
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Set the per-attempt timeout
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the initial backoff
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Wait before the attempt following failed attempt number `attempt`
    /// (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

enum Failure {
    TimedOut,
    Store(BlobError),
}

/// Retrieves ciphertext from a [`BlobStore`] with bounded attempts and
/// exponential backoff.
#[derive(Clone)]
pub struct ContentFetcher {
    store: Arc<dyn BlobStore>,
    policy: RetryPolicy,
}

impl ContentFetcher {
    /// Create a fetcher reading from `store`
    pub fn new(store: Arc<dyn BlobStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// The retry policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch the blob at `locator`.
    ///
    /// Only timeouts and transient store errors (5xx, transport) are retried.
    /// A missing blob (404) or any other refused request fails after the
    /// first attempt, even with attempts left in the policy.
    #[instrument(skip(self, locator), fields(%locator))]
    pub async fn fetch(&self, locator: &BlobLocator) -> Result<Bytes, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let failure =
                match tokio::time::timeout(self.policy.attempt_timeout, self.store.get(locator))
                    .await
                {
                    Ok(Ok(bytes)) => {
                        debug!(attempt, size = bytes.len(), "Fetched blob");
                        return Ok(bytes);
                    }
                    Ok(Err(error)) => Failure::Store(error),
                    Err(_) => Failure::TimedOut,
                };

            let retryable = match &failure {
                Failure::TimedOut => true,
                Failure::Store(error) => error.is_transient(),
            };
            if !retryable || attempt >= self.policy.attempts {
                return Err(match failure {
                    Failure::TimedOut => FetchError::TimedOut { attempts: attempt },
                    Failure::Store(last) => FetchError::Failed {
                        attempts: attempt,
                        last,
                    },
                });
            }

            let wait = self.policy.backoff(attempt);
            match &failure {
                Failure::TimedOut => warn!(attempt, ?wait, "Blob fetch timed out, retrying"),
                Failure::Store(error) => warn!(attempt, ?wait, %error, "Blob fetch failed, retrying"),
            }
            tokio::time::sleep(wait).await;
        }
    }
}
