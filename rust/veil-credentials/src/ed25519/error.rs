//! Error types for Ed25519 key operations.

use thiserror::Error;

/// Errors from generating, importing or using Ed25519 keys.
#[derive(Debug, Clone, Error)]
pub enum Ed25519KeyError {
    /// The seed bytes have the wrong length (expected 32).
    #[error("expected 32 seed bytes, got {0}")]
    InvalidSeedLength(usize),

    /// The public key bytes do not describe a curve point.
    #[error("invalid ed25519 public key")]
    InvalidPublicKey,

    /// A signature was not 64 bytes long.
    #[error("expected 64 signature bytes, got {0}")]
    InvalidSignatureLength(usize),

    /// Random number generation failed.
    #[error("RNG error: {0}")]
    Rng(getrandom::Error),

    /// The signature does not verify against the message.
    #[error("signature verification failed")]
    Verification,
}

impl From<getrandom::Error> for Ed25519KeyError {
    fn from(e: getrandom::Error) -> Self {
        Self::Rng(e)
    }
}
