use super::{KeyReleaseService, KeyRequest, ReleasedKeys};
use crate::KeyReleaseError;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fans a key request out to several servers and succeeds as soon as
/// `request.threshold` of them released identical keys.
#[derive(Clone)]
pub struct KeyServerCommittee {
    servers: Vec<Arc<dyn KeyReleaseService>>,
}

impl KeyServerCommittee {
    /// A committee of `servers`
    pub fn new(servers: Vec<Arc<dyn KeyReleaseService>>) -> Self {
        Self { servers }
    }

    /// Number of member servers
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// True if the committee has no members
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl KeyReleaseService for KeyServerCommittee {
    async fn fetch_keys(&self, request: &KeyRequest) -> Result<ReleasedKeys, KeyReleaseError> {
        let required = request.threshold;
        if required == 0 || required > self.servers.len() {
            return Err(KeyReleaseError::ThresholdNotMet {
                required,
                agreed: 0,
            });
        }

        // Each member answers for itself; agreement is counted here.
        let member_request = KeyRequest {
            threshold: 1,
            ..request.clone()
        };
        let mut pending: FuturesUnordered<_> = self
            .servers
            .iter()
            .map(|server| server.fetch_keys(&member_request))
            .collect();

        let mut tallies: Vec<(ReleasedKeys, usize)> = Vec::new();
        let mut denial = None;
        while let Some(response) = pending.next().await {
            match response {
                Ok(keys) => {
                    let count = match tallies.iter_mut().find(|(seen, _)| seen == &keys) {
                        Some((_, count)) => {
                            *count += 1;
                            *count
                        }
                        None => {
                            tallies.push((keys.clone(), 1));
                            1
                        }
                    };
                    if count >= required {
                        debug!(required, "Key release threshold reached");
                        return Ok(keys);
                    }
                }
                Err(error) => {
                    warn!(%error, "Key server refused");
                    if matches!(error, KeyReleaseError::Denied(_)) {
                        denial = Some(error);
                    }
                }
            }
        }

        let agreed = tallies.iter().map(|(_, count)| *count).max().unwrap_or(0);
        Err(denial.unwrap_or(KeyReleaseError::ThresholdNotMet { required, agreed }))
    }
}
