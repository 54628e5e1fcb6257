//! Off-ledger plumbing for gated posts: ciphertext retrieval from a blob
//! aggregator ([`BlobStore`], [`ContentFetcher`]) and threshold key release
//! ([`KeyReleaseService`]).

#![warn(missing_docs)]

mod error;
pub use error::*;

pub mod blob;
pub use blob::{BlobStore, HttpBlobConfig, HttpBlobStore, MemoryBlobStore, blob_url};

mod fetcher;
pub use fetcher::*;

pub mod keys;
pub use keys::{
    KeyReleaseService, KeyRequest, KeyServerCommittee, MemoryKeyServer, ReleasedKeys,
    SessionCertificate,
};
