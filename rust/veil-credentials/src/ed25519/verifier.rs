//! Ed25519 public keys.

use super::Ed25519KeyError;
use crate::Address;
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use signature::Verifier;

/// An Ed25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Verifier(VerifyingKey);

impl From<VerifyingKey> for Ed25519Verifier {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}

impl Ed25519Verifier {
    /// Parse a public key from its 32 byte encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid curve point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, Ed25519KeyError> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| Ed25519KeyError::InvalidPublicKey)
    }

    /// The 32 byte encoding of this key.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// The ledger address this key controls.
    #[must_use]
    pub fn address(&self) -> Address {
        Address::from_ed25519(&self.to_bytes())
    }

    /// Verify a detached signature over `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is malformed or does not verify.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), Ed25519KeyError> {
        let signature: [u8; 64] = signature
            .try_into()
            .map_err(|_| Ed25519KeyError::InvalidSignatureLength(signature.len()))?;
        self.0
            .verify(message, &Signature::from_bytes(&signature))
            .map_err(|_| Ed25519KeyError::Verification)
    }
}

impl Serialize for Ed25519Verifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Ed25519Verifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = serde_bytes::ByteBuf::deserialize(deserializer)?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::invalid_length(bytes.len(), &"32 bytes"))?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
