//! Viewer identity for the veil crates.
//!
//! A viewer is identified on the ledger by an [`Address`] derived from an
//! Ed25519 public key. Everything that needs the viewer's approval (signing
//! the session challenge, signing a sponsored transaction) goes through the
//! [`Wallet`] trait so the prompt can be backed by a browser extension, a
//! zkLogin provider or, in tests and demos, a local [`KeyWallet`].

mod address;
pub use address::*;

pub mod ed25519;
pub use ed25519::{Ed25519KeyError, Ed25519Signer, Ed25519Verifier};

mod wallet;
pub use wallet::*;
