use crate::ObjectId;
use thiserror::Error;
use veil_credentials::WalletError;

/// Errors raised while talking to the ledger or interpreting its objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The request never produced a response.
    #[error("Ledger request failed: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("Ledger RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Message reported by the node
        message: String,
    },

    /// An object did not have the shape its type promises.
    #[error("Malformed ledger object {object_id}: {reason}")]
    Malformed {
        /// The offending object
        object_id: ObjectId,
        /// What was wrong with it
        reason: String,
    },

    /// A response could not be decoded at all.
    #[error("Unexpected ledger response: {0}")]
    UnexpectedResponse(String),

    /// The object does not exist.
    #[error("Object {0} not found")]
    NotFound(ObjectId),

    /// Policy evaluation rejected an authorization proof.
    #[error("Access policy denied the request: {0}")]
    Denied(String),

    /// Transaction bytes could not be encoded or decoded.
    #[error("Transaction encoding failed: {0}")]
    Encoding(String),

    /// A transaction was refused by the sponsor or the ledger.
    #[error("Transaction submission failed: {0}")]
    Submission(String),

    /// The wallet refused or failed to sign.
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl From<reqwest::Error> for LedgerError {
    fn from(error: reqwest::Error) -> Self {
        LedgerError::Transport(error.to_string())
    }
}
