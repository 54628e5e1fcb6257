//! Ed25519 key types backing viewer identities and session keys.

mod error;
mod signer;
mod verifier;

pub use error::Ed25519KeyError;
pub use signer::Ed25519Signer;
pub use verifier::Ed25519Verifier;

/// Length in bytes of a detached Ed25519 signature.
pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;
