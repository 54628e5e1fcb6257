use super::{IDENTITY_KEY_LENGTH, KeyReleaseService, KeyRequest, ReleasedKeys, envelope};
use crate::KeyReleaseError;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};
use veil_common::time::{now, to_unix_millis};
use veil_ledger::{EncryptionId, MemoryLedger};

const IDENTITY_KEY_CONTEXT: &str = "veil key server 2024-06 identity key";

/// A key server that evaluates the access policy against a
/// [`MemoryLedger`]. Clones share the master secret and counters.
#[derive(Clone)]
pub struct MemoryKeyServer {
    master: [u8; 32],
    ledger: MemoryLedger,
    available: Arc<AtomicBool>,
    requests: Arc<AtomicUsize>,
}

impl MemoryKeyServer {
    /// A server holding `master`, judging requests against `ledger`.
    pub fn new(master: [u8; 32], ledger: MemoryLedger) -> Self {
        Self {
            master,
            ledger,
            available: Arc::new(AtomicBool::new(true)),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A server with a freshly generated master secret.
    pub fn generate(ledger: MemoryLedger) -> Result<Self, KeyReleaseError> {
        let mut master = [0u8; 32];
        getrandom::getrandom(&mut master).map_err(|e| KeyReleaseError::Encoding(e.to_string()))?;
        Ok(Self::new(master, ledger))
    }

    /// Encrypt `plaintext` so that only holders of a credential for the
    /// post carrying `id` can have it released.
    pub fn seal(&self, id: &EncryptionId, plaintext: &[u8]) -> Result<Vec<u8>, KeyReleaseError> {
        envelope::seal(id, &self.identity_key(id), plaintext)
    }

    /// Take the server offline or bring it back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Key requests received so far, including refused ones.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn identity_key(&self, id: &EncryptionId) -> [u8; IDENTITY_KEY_LENGTH] {
        let mut material = self.master.to_vec();
        material.extend_from_slice(id.as_bytes());
        blake3::derive_key(IDENTITY_KEY_CONTEXT, &material)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl KeyReleaseService for MemoryKeyServer {
    async fn fetch_keys(&self, request: &KeyRequest) -> Result<ReleasedKeys, KeyReleaseError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(KeyReleaseError::Unavailable("server offline".into()));
        }

        let package = self.ledger.package();
        request
            .certificate
            .verify(package.id(), to_unix_millis(now()))?;
        request.verify_signature()?;

        let approved = self
            .ledger
            .evaluate(&request.tx_bytes, &request.certificate.user)
            .map_err(|error| {
                warn!(%error, user = %request.certificate.user, "Policy check refused key release");
                KeyReleaseError::Denied(error.to_string())
            })?;

        let mut keys = ReleasedKeys::new();
        for id in &request.ids {
            if id != &approved {
                return Err(KeyReleaseError::Denied(format!(
                    "proof approves {approved}, not {id}"
                )));
            }
            keys.insert(id.clone(), self.identity_key(id));
        }

        if request.threshold > 1 {
            return Err(KeyReleaseError::ThresholdNotMet {
                required: request.threshold,
                agreed: 1,
            });
        }

        debug!(ids = keys.len(), user = %request.certificate.user, "Released keys");
        Ok(keys)
    }
}
