use crate::{LedgerError, LedgerObject, ObjectId, StructTag};
use async_trait::async_trait;
use veil_common::ConditionalSync;
use veil_credentials::{Address, Wallet};

/// Read access to ledger objects.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait LedgerReader: ConditionalSync {
    /// Fetch objects by id. Ids that do not resolve to an object are left
    /// out of the result; order follows `ids` otherwise.
    async fn multi_get_objects(&self, ids: &[ObjectId]) -> Result<Vec<LedgerObject>, LedgerError>;

    /// Every object of type `object_type` currently owned by `owner`.
    async fn owned_objects(
        &self,
        owner: &Address,
        object_type: &StructTag,
    ) -> Result<Vec<LedgerObject>, LedgerError>;
}

/// Outcome of an access-granting transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantReceipt {
    /// Digest of the executed transaction
    pub digest: String,
    /// The credential the transaction created, when it could be identified
    pub credential_id: Option<ObjectId>,
}

/// Submission of transactions that change ledger state.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait LedgerWriter: ConditionalSync {
    /// Mint an access credential for `content_id` and transfer it to the
    /// wallet's address in the same transaction.
    async fn grant_access(
        &self,
        content_id: &ObjectId,
        wallet: &dyn Wallet,
    ) -> Result<GrantReceipt, LedgerError>;
}
