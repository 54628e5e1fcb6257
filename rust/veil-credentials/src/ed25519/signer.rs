//! Ed25519 signer implementation.

use super::{Ed25519KeyError, Ed25519Verifier};
use crate::Address;
use ed25519_dalek::SigningKey;
use signature::Signer;

/// An Ed25519 key pair able to sign on behalf of an [`Address`].
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    verifier: Ed25519Verifier,
    key: SigningKey,
}

impl From<SigningKey> for Ed25519Signer {
    fn from(key: SigningKey) -> Self {
        let verifier = Ed25519Verifier::from(key.verifying_key());
        Self { verifier, key }
    }
}

impl Ed25519Signer {
    /// Generate a new key pair from the platform RNG.
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG fails.
    pub fn generate() -> Result<Self, Ed25519KeyError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)?;
        Ok(SigningKey::from_bytes(&seed).into())
    }

    /// Import a key pair from its 32 byte seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed is not exactly 32 bytes.
    pub fn import(seed: &[u8]) -> Result<Self, Ed25519KeyError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| Ed25519KeyError::InvalidSeedLength(seed.len()))?;
        Ok(SigningKey::from_bytes(&seed).into())
    }

    /// Export the 32 byte seed.
    #[must_use]
    pub fn export(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// The public half of this key pair.
    #[must_use]
    pub const fn verifier(&self) -> &Ed25519Verifier {
        &self.verifier
    }

    /// The ledger address controlled by this key.
    #[must_use]
    pub fn address(&self) -> Address {
        self.verifier.address()
    }

    /// Sign a message, returning the detached 64 byte signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying signer fails.
    pub fn sign_bytes(&self, message: &[u8]) -> Result<[u8; 64], signature::Error> {
        Ok(self.key.try_sign(message)?.to_bytes())
    }
}
