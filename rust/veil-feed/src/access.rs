use crate::AccessError;
use std::sync::Arc;
use tracing::{info, instrument};
use veil_credentials::Wallet;
use veil_ledger::{CredentialStore, LedgerWriter, ObjectId};

/// Obtains access credentials for the viewer.
pub struct AccessGranter {
    writer: Arc<dyn LedgerWriter>,
    credentials: Arc<CredentialStore>,
}

impl AccessGranter {
    /// Grant through `writer`, refreshing `credentials` afterwards.
    pub fn new(writer: Arc<dyn LedgerWriter>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            writer,
            credentials,
        }
    }

    /// Mint a credential for `content_id` and hand it to the wallet's
    /// account. The credential store forgets its snapshot for that account
    /// so the new credential shows up on the next lookup. Returns the new
    /// credential's id when the ledger reported it.
    #[instrument(skip(self, wallet))]
    pub async fn request_access(
        &self,
        content_id: &ObjectId,
        wallet: Option<&dyn Wallet>,
    ) -> Result<Option<ObjectId>, AccessError> {
        let wallet = wallet.ok_or(AccessError::NoWalletConnected)?;

        let receipt = self.writer.grant_access(content_id, wallet).await?;
        self.credentials.invalidate(&wallet.address());

        info!(digest = %receipt.digest, credential = ?receipt.credential_id, "Access granted");
        Ok(receipt.credential_id)
    }
}
