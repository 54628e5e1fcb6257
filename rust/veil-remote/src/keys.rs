//! Threshold key release.
//!
//! Ciphertexts are sealed under an identity key derived from an
//! [`EncryptionId`]. Key servers release identity keys only to a holder of a
//! valid [`SessionCertificate`] whose authorization proof passes the on-ledger
//! policy check. Decryption then happens locally.

use crate::KeyReleaseError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use veil_common::ConditionalSync;
use veil_credentials::Ed25519Signer;
use veil_ledger::{AuthorizationProof, EncryptionId};

mod certificate;
pub use certificate::*;

pub mod envelope;

mod memory;
pub use memory::*;

mod committee;
pub use committee::*;

/// Length of a released identity key.
pub const IDENTITY_KEY_LENGTH: usize = 32;

/// A request for the identity keys of one or more encryption identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    /// Identifiers whose keys are requested
    pub ids: Vec<EncryptionId>,
    /// Unsigned authorization proof bytes, evaluated by each server
    pub tx_bytes: Vec<u8>,
    /// Wallet-signed binding of the session key to the viewer
    pub certificate: SessionCertificate,
    /// Session key signature over `tx_bytes`
    pub request_signature: Vec<u8>,
    /// Servers that must release matching keys
    pub threshold: usize,
}

impl KeyRequest {
    /// Build a request for the identifier the proof is bound to, signed
    /// with the session key that `certificate` vouches for.
    pub fn new(
        proof: &AuthorizationProof,
        certificate: SessionCertificate,
        session_key: &Ed25519Signer,
        threshold: usize,
    ) -> Result<Self, KeyReleaseError> {
        let request_signature = session_key
            .sign_bytes(proof.tx_bytes())
            .map_err(|e| KeyReleaseError::Encoding(e.to_string()))?
            .to_vec();

        Ok(Self {
            ids: vec![proof.encryption_id().clone()],
            tx_bytes: proof.tx_bytes().to_vec(),
            certificate,
            request_signature,
            threshold,
        })
    }

    /// Check that the request was signed by the certified session key.
    pub fn verify_signature(&self) -> Result<(), KeyReleaseError> {
        self.certificate
            .session_key
            .verify(&self.tx_bytes, &self.request_signature)
            .map_err(|e| KeyReleaseError::InvalidCertificate(format!("request signature: {e}")))
    }
}

/// Identity keys released by key servers.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ReleasedKeys {
    keys: BTreeMap<EncryptionId, [u8; IDENTITY_KEY_LENGTH]>,
}

impl ReleasedKeys {
    /// An empty key set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the key for `id`
    pub fn insert(&mut self, id: EncryptionId, key: [u8; IDENTITY_KEY_LENGTH]) {
        self.keys.insert(id, key);
    }

    /// The key released for `id`
    pub fn get(&self, id: &EncryptionId) -> Option<&[u8; IDENTITY_KEY_LENGTH]> {
        self.keys.get(id)
    }

    /// Identifiers covered
    pub fn ids(&self) -> impl Iterator<Item = &EncryptionId> {
        self.keys.keys()
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if no keys were released
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for ReleasedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.keys.keys()).finish()
    }
}

/// A key-release client: obtains identity keys and opens ciphertexts with
/// them.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait KeyReleaseService: ConditionalSync {
    /// Ask for the keys named in `request`.
    async fn fetch_keys(&self, request: &KeyRequest) -> Result<ReleasedKeys, KeyReleaseError>;

    /// Open `ciphertext` locally with previously released keys.
    fn decrypt(&self, ciphertext: &[u8], keys: &ReleasedKeys) -> Result<Vec<u8>, KeyReleaseError> {
        envelope::open(ciphertext, keys)
    }
}
