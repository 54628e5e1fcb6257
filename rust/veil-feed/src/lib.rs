//! Access-gated decryption for a content feed.
//!
//! A viewer opens a time-limited decryption [`Session`] by signing one wallet
//! challenge. For every encrypted post the viewer holds a credential for, the
//! [`DecryptionEngine`] builds an authorization proof, fetches the ciphertext,
//! asks the key servers for the identity key and decrypts locally. The
//! [`feed`] module classifies posts and merges in the engine's progress, and
//! [`Viewer`] wires the pieces together.

#![warn(missing_docs)]

mod error;
pub use error::*;

mod config;
pub use config::*;

mod session;
pub use session::*;

mod engine;
pub use engine::*;

mod scheduler;
pub use scheduler::*;

pub mod feed;
pub use feed::{Post, PostView, classify, merge};

mod access;
pub use access::*;

mod viewer;
pub use viewer::*;
