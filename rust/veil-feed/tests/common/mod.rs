#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use testresult::TestResult;
use tokio::sync::Semaphore;
use veil_credentials::{KeyWallet, Wallet};
use veil_feed::{DecryptionEngine, EngineSettings, SessionManager};
use veil_ledger::{
    ContentRecord, CredentialStore, EncryptionId, LedgerReader, MemoryLedger, ObjectId,
    ProofBuilder,
};
use veil_remote::{
    ContentFetcher, KeyReleaseError, KeyReleaseService, KeyRequest, MemoryBlobStore,
    MemoryKeyServer, ReleasedKeys, RetryPolicy,
};

pub const PNG: &[u8] = &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];
pub const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0];

/// Holds key requests until permits are added to `gate`.
pub struct GatedKeys {
    pub inner: MemoryKeyServer,
    pub gate: Arc<Semaphore>,
}

#[async_trait]
impl KeyReleaseService for GatedKeys {
    async fn fetch_keys(&self, request: &KeyRequest) -> Result<ReleasedKeys, KeyReleaseError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| KeyReleaseError::Unavailable("gate closed".into()))?;
        self.inner.fetch_keys(request).await
    }
}

/// An in-memory ledger, blob store and key server, with one viewer.
pub struct Fixture {
    pub ledger: MemoryLedger,
    pub blobs: MemoryBlobStore,
    pub server: MemoryKeyServer,
    pub wallet: Arc<KeyWallet>,
    pub sessions: Arc<SessionManager>,
    pub credentials: Arc<CredentialStore>,
}

impl Fixture {
    pub fn new() -> TestResult<Self> {
        let ledger = MemoryLedger::new("0x2a".parse()?);
        let server = MemoryKeyServer::new([8; 32], ledger.clone());
        let credentials = Arc::new(CredentialStore::new(
            Arc::new(ledger.clone()),
            ledger.package(),
        ));
        Ok(Self {
            sessions: Arc::new(SessionManager::new(
                *ledger.package().id(),
                Duration::from_secs(30 * 60),
            )),
            blobs: MemoryBlobStore::new(),
            wallet: Arc::new(KeyWallet::from_seed(&[6; 32])?),
            ledger,
            server,
            credentials,
        })
    }

    /// Seal `plaintext`, store it under `locator` and publish a post for it.
    pub async fn publish_sealed(
        &self,
        encryption_id: &[u8],
        locator: &str,
        plaintext: &[u8],
    ) -> TestResult<ContentRecord> {
        let encryption_id = EncryptionId::new(encryption_id.to_vec());
        self.blobs
            .put(locator.parse()?, self.server.seal(&encryption_id, plaintext)?);
        let id = self.ledger.publish_post(
            self.wallet.address(),
            "sealed post",
            Some(locator.parse()?),
            Some(encryption_id),
            250_000_000,
        );
        self.record(&id).await
    }

    pub async fn record(&self, id: &ObjectId) -> TestResult<ContentRecord> {
        let objects = self.ledger.multi_get_objects(&[*id]).await?;
        let object = objects.first().ok_or("post not published")?;
        Ok(self.ledger.package().parse_post(object)?)
    }

    pub fn grant(&self, record: &ContentRecord) -> TestResult<ObjectId> {
        let credential = self
            .ledger
            .mint_credential(&record.id, &self.wallet.address())?;
        self.credentials.invalidate(&self.wallet.address());
        Ok(credential)
    }

    pub async fn open_session(&self) -> TestResult {
        self.sessions
            .initialize(Some(self.wallet.as_ref() as &dyn Wallet))
            .await?;
        Ok(())
    }

    pub fn engine(&self, keys: Arc<dyn KeyReleaseService>) -> Arc<DecryptionEngine> {
        self.engine_with(keys, EngineSettings::default())
    }

    pub fn engine_with(
        &self,
        keys: Arc<dyn KeyReleaseService>,
        settings: EngineSettings,
    ) -> Arc<DecryptionEngine> {
        Arc::new(DecryptionEngine::new(
            self.sessions.clone(),
            self.credentials.clone(),
            ProofBuilder::new(self.ledger.package()),
            ContentFetcher::new(Arc::new(self.blobs.clone()), RetryPolicy::default()),
            keys,
            settings,
        ))
    }

    pub fn gated(&self) -> (Arc<GatedKeys>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Arc::new(GatedKeys {
                inner: self.server.clone(),
                gate: gate.clone(),
            }),
            gate,
        )
    }
}
