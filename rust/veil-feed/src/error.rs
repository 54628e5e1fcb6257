use serde::Serialize;
use thiserror::Error;
use veil_credentials::{Ed25519KeyError, WalletError};
use veil_ledger::{LedgerError, ObjectId};
use veil_remote::{FetchError, KeyReleaseError};

/// Everything that can stop a viewer from seeing gated content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// No wallet or identity is available to act for the viewer
    #[error("No wallet connected")]
    NoWalletConnected,

    /// The viewer declined a signing prompt
    #[error("Signing request was rejected")]
    SigningRejected,

    /// The decryption session ran out; a new one must be started explicitly
    #[error("Decryption session expired")]
    SessionExpired,

    /// The viewer holds no credential for the post
    #[error("No access credential held for {content_id}")]
    CredentialNotFound {
        /// The post in question
        content_id: ObjectId,
    },

    /// Ciphertext could not be retrieved
    #[error(transparent)]
    FetchFailure(#[from] FetchError),

    /// Key servers refused, or did not answer in time
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Released keys did not open the ciphertext
    #[error("Decryption failed: {0}")]
    DecryptionFailure(String),

    /// A session key could not be created
    #[error("Session key error: {0}")]
    SessionKey(String),

    /// A ledger query or submission failed
    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<WalletError> for AccessError {
    fn from(error: WalletError) -> Self {
        match error {
            WalletError::Disconnected => AccessError::NoWalletConnected,
            WalletError::Rejected | WalletError::Failed(_) => AccessError::SigningRejected,
        }
    }
}

impl From<LedgerError> for AccessError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Wallet(error) => error.into(),
            error => AccessError::Ledger(error),
        }
    }
}

impl From<KeyReleaseError> for AccessError {
    fn from(error: KeyReleaseError) -> Self {
        match error {
            KeyReleaseError::Decryption(reason) => AccessError::DecryptionFailure(reason),
            error => AccessError::AuthorizationDenied(error.to_string()),
        }
    }
}

impl From<Ed25519KeyError> for AccessError {
    fn from(error: Ed25519KeyError) -> Self {
        AccessError::SessionKey(error.to_string())
    }
}

/// Coarse class of a failed decryption, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Wallet missing or prompt declined
    Wallet,
    /// Session missing or expired
    Session,
    /// No credential for the post
    Credential,
    /// Ciphertext retrieval gave up
    Fetch,
    /// Key release refused or timed out
    Authorization,
    /// Ciphertext did not open
    Decryption,
    /// Ledger query failed
    Ledger,
}

/// Why a decryption ended in failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReason {
    /// Error class
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
}

impl From<&AccessError> for FailureReason {
    fn from(error: &AccessError) -> Self {
        let kind = match error {
            AccessError::NoWalletConnected | AccessError::SigningRejected => FailureKind::Wallet,
            AccessError::SessionExpired | AccessError::SessionKey(_) => FailureKind::Session,
            AccessError::CredentialNotFound { .. } => FailureKind::Credential,
            AccessError::FetchFailure(_) => FailureKind::Fetch,
            AccessError::AuthorizationDenied(_) => FailureKind::Authorization,
            AccessError::DecryptionFailure(_) => FailureKind::Decryption,
            AccessError::Ledger(_) => FailureKind::Ledger,
        };
        FailureReason {
            kind,
            message: error.to_string(),
        }
    }
}
