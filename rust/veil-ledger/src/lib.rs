//! Everything the viewer needs from the ledger.
//!
//! Posts and access credentials live on the ledger as loosely typed objects.
//! This crate gives them a strict schema ([`ContentRecord`],
//! [`AccessCredential`]), defines the query and submission seams
//! ([`LedgerReader`], [`LedgerWriter`]) with a JSON-RPC reader, a sponsored
//! transaction writer and an in-memory ledger, builds the unsigned
//! authorization proofs that key servers evaluate ([`ProofBuilder`]), and
//! caches which credentials a viewer holds ([`CredentialStore`]).

mod error;
pub use error::*;

mod object;
pub use object::*;

mod record;
pub use record::*;

mod client;
pub use client::*;

pub mod proof;
pub use proof::{AuthorizationProof, ProofBuilder, TransactionKind};

mod credentials;
pub use credentials::*;

mod memory;
pub use memory::*;

mod rpc;
pub use rpc::*;

mod sponsor;
pub use sponsor::*;
