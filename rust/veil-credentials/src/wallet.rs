use crate::{Address, Ed25519KeyError, Ed25519Signer, Ed25519Verifier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tracing::debug;
use veil_common::ConditionalSync;

/// What a signature is allowed to mean. The scope is prepended to the
/// signed bytes so a personal-message signature can never be replayed as a
/// transaction approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum IntentScope {
    /// Approval of transaction bytes.
    TransactionData = 0,
    /// Approval of an arbitrary human-readable message.
    PersonalMessage = 3,
}

impl IntentScope {
    /// The digest a wallet signs for `message` under this scope.
    pub fn digest(self, message: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[self as u8, 0, 0]);
        hasher.update(message);
        *hasher.finalize().as_bytes()
    }
}

/// Errors surfaced by a wallet prompt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// The human operator declined the prompt.
    #[error("the signing request was rejected")]
    Rejected,

    /// No account is connected to the wallet.
    #[error("no wallet account is connected")]
    Disconnected,

    /// The wallet could not produce a signature.
    #[error("wallet failure: {0}")]
    Failed(String),
}

impl From<Ed25519KeyError> for WalletError {
    fn from(error: Ed25519KeyError) -> Self {
        WalletError::Failed(error.to_string())
    }
}

/// A signature produced by a wallet, together with the public key needed to
/// check it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSignature {
    /// Public key of the signer.
    pub public_key: Ed25519Verifier,
    /// Detached signature over the scoped digest.
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl WalletSignature {
    /// The address that produced this signature.
    pub fn signer(&self) -> Address {
        self.public_key.address()
    }

    /// Check the signature over `message` under `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature does not verify.
    pub fn verify(&self, scope: IntentScope, message: &[u8]) -> Result<(), Ed25519KeyError> {
        self.public_key
            .verify(&scope.digest(message), &self.signature)
    }
}

/// A connected account that can be asked to approve signatures. Every call
/// may suspend until a human answers the prompt; no timeout is imposed here.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Wallet: ConditionalSync {
    /// The connected account's address.
    fn address(&self) -> Address;

    /// Ask the operator to sign a personal message.
    async fn sign_personal_message(&self, message: &[u8])
    -> Result<WalletSignature, WalletError>;

    /// Ask the operator to sign transaction bytes.
    async fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<WalletSignature, WalletError>;
}

/// A wallet backed by a local Ed25519 key. Prompts are answered
/// automatically according to its approval setting, which makes it useful
/// for demos and for exercising rejection paths.
#[derive(Debug)]
pub struct KeyWallet {
    signer: Ed25519Signer,
    approve: AtomicBool,
    prompts: AtomicUsize,
}

impl KeyWallet {
    /// A wallet that approves every prompt.
    pub fn new(signer: Ed25519Signer) -> Self {
        Self {
            signer,
            approve: AtomicBool::new(true),
            prompts: AtomicUsize::new(0),
        }
    }

    /// A wallet for a deterministic key, handy in tests.
    ///
    /// # Errors
    ///
    /// Returns an error if `seed` is not 32 bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, Ed25519KeyError> {
        Ok(Self::new(Ed25519Signer::import(seed)?))
    }

    /// Decide how future prompts are answered.
    pub fn set_approval(&self, approve: bool) {
        self.approve.store(approve, Ordering::SeqCst);
    }

    /// How many prompts have been shown, approved or not.
    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    fn sign(&self, scope: IntentScope, message: &[u8]) -> Result<WalletSignature, WalletError> {
        let prompt = self.prompts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(address = %self.address(), ?scope, prompt, "Wallet prompt");

        if !self.approve.load(Ordering::SeqCst) {
            return Err(WalletError::Rejected);
        }

        let signature = self
            .signer
            .sign_bytes(&scope.digest(message))
            .map_err(|e| WalletError::Failed(e.to_string()))?;

        Ok(WalletSignature {
            public_key: *self.signer.verifier(),
            signature: signature.to_vec(),
        })
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Wallet for KeyWallet {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_personal_message(
        &self,
        message: &[u8],
    ) -> Result<WalletSignature, WalletError> {
        self.sign(IntentScope::PersonalMessage, message)
    }

    async fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<WalletSignature, WalletError> {
        self.sign(IntentScope::TransactionData, tx_bytes)
    }
}
