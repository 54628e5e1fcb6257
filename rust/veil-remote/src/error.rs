use thiserror::Error;

/// A single failed read from a blob store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    /// The store does not hold the blob
    #[error("Blob {0} not found")]
    NotFound(String),

    /// The store answered with a server error; trying again may help
    #[error("Blob store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the request
    #[error("Blob store rejected the request: HTTP {status}")]
    Rejected {
        /// HTTP status code
        status: u16,
    },

    /// The request did not reach the store
    #[error("Transport error: {0}")]
    Transport(String),
}

impl BlobError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BlobError::Unavailable(_) | BlobError::Transport(_))
    }
}

impl From<reqwest::Error> for BlobError {
    fn from(error: reqwest::Error) -> Self {
        BlobError::Transport(error.to_string())
    }
}

/// Retrieval gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Every attempt ran into the per-attempt timeout
    #[error("Blob storage is experiencing delays: {attempts} attempts timed out")]
    TimedOut {
        /// Attempts made
        attempts: u32,
    },

    /// The last attempt failed outright
    #[error("Failed to fetch content after {attempts} attempts: {last}")]
    Failed {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last: BlobError,
    },
}

impl FetchError {
    /// Attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::TimedOut { attempts } | FetchError::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Failures while obtaining or using released keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyReleaseError {
    /// The policy check rejected the authorization proof
    #[error("Key release denied: {0}")]
    Denied(String),

    /// The session certificate or request signature did not check out
    #[error("Invalid session certificate: {0}")]
    InvalidCertificate(String),

    /// A key server could not be reached
    #[error("Key server unavailable: {0}")]
    Unavailable(String),

    /// Too few servers released matching keys
    #[error("Only {agreed} of {required} key servers released keys")]
    ThresholdNotMet {
        /// Servers required to agree
        required: usize,
        /// Servers that did agree
        agreed: usize,
    },

    /// Ciphertext could not be opened with the released keys
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// A value could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(String),
}
