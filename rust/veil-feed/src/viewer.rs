use crate::{
    AccessError, AccessGranter, ConfigError, DecryptionEngine, DecryptionScheduler,
    EngineSettings, Post, PostView, Session, SessionManager, TaskState, VeilConfig, classify,
    feed::parse_records, merge,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument};
use veil_credentials::Wallet;
use veil_ledger::{
    CredentialStore, LedgerReader, LedgerWriter, ObjectId, PostsPackage, ProofBuilder, RpcConfig,
    RpcLedger, SponsorConfig, SponsoredWriter,
};
use veil_remote::{BlobStore, ContentFetcher, HttpBlobConfig, HttpBlobStore, KeyReleaseService};

/// External services a [`Viewer`] talks to.
pub struct ViewerParts {
    /// Ledger queries
    pub reader: Arc<dyn LedgerReader>,
    /// Access-grant submission
    pub writer: Arc<dyn LedgerWriter>,
    /// Key release
    pub keys: Arc<dyn KeyReleaseService>,
    /// Ciphertext storage
    pub blobs: Arc<dyn BlobStore>,
    /// The connected wallet, if any
    pub wallet: Option<Arc<dyn Wallet>>,
}

impl ViewerParts {
    /// Network-backed parts for `config`: a JSON-RPC ledger at `rpc_url`,
    /// grants sponsored through `sponsor_url` on `network`, and ciphertext
    /// from `aggregator_url`. Key release has no endpoint in the
    /// configuration and is passed in.
    pub fn from_config(
        config: &VeilConfig,
        keys: Arc<dyn KeyReleaseService>,
        wallet: Option<Arc<dyn Wallet>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let sponsor_url = config.sponsor_url.as_ref().ok_or_else(|| {
            ConfigError::Invalid("sponsor_url is required to grant access".into())
        })?;

        let reader: Arc<dyn LedgerReader> =
            Arc::new(RpcLedger::new(RpcConfig::new(config.rpc_url.clone())));
        let writer = SponsoredWriter::new(
            SponsorConfig::new(sponsor_url.clone()).with_network(config.network.clone()),
            reader.clone(),
            PostsPackage::new(config.package_id),
        );
        let blobs = HttpBlobStore::new(HttpBlobConfig::new(config.aggregator_url.clone()));

        Ok(Self {
            reader,
            writer: Arc::new(writer),
            keys,
            blobs: Arc::new(blobs),
            wallet,
        })
    }
}

/// One viewer's feed: sessions, credentials, access grants and background
/// decryption, assembled from explicitly injected services.
///
/// Must be created inside a tokio runtime; the decryption worker is spawned
/// on construction and stops when the viewer is dropped.
pub struct Viewer {
    config: VeilConfig,
    package: PostsPackage,
    reader: Arc<dyn LedgerReader>,
    wallet: Option<Arc<dyn Wallet>>,
    sessions: Arc<SessionManager>,
    credentials: Arc<CredentialStore>,
    engine: Arc<DecryptionEngine>,
    granter: AccessGranter,
    scheduler: DecryptionScheduler,
}

impl Viewer {
    /// Wire a viewer together.
    pub fn new(config: VeilConfig, parts: ViewerParts) -> Self {
        let package = PostsPackage::new(config.package_id);
        let sessions = Arc::new(SessionManager::new(
            config.package_id,
            Duration::from_secs(u64::from(config.session_ttl_minutes) * 60),
        ));
        let credentials = Arc::new(
            CredentialStore::new(parts.reader.clone(), package)
                .with_staleness(config.credential_staleness()),
        );
        let engine = Arc::new(DecryptionEngine::new(
            sessions.clone(),
            credentials.clone(),
            ProofBuilder::new(package),
            ContentFetcher::new(parts.blobs, config.retry_policy()),
            parts.keys,
            EngineSettings {
                threshold: config.threshold,
                key_release_timeout: config.key_release_timeout(),
            },
        ));
        let scheduler = DecryptionScheduler::spawn(engine.clone(), config.concurrency);
        let granter = AccessGranter::new(parts.writer, credentials.clone());

        Self {
            config,
            package,
            reader: parts.reader,
            wallet: parts.wallet,
            sessions,
            credentials,
            engine,
            granter,
            scheduler,
        }
    }

    /// The configuration in effect
    pub fn config(&self) -> &VeilConfig {
        &self.config
    }

    /// The decryption engine, for direct state queries
    pub fn engine(&self) -> &Arc<DecryptionEngine> {
        &self.engine
    }

    /// The active decryption session. A session opened by an account the
    /// wallet has since switched away from is ended here.
    pub fn session(&self) -> Option<Session> {
        let session = self.sessions.current()?;
        let account = self.wallet.as_ref().map(|wallet| wallet.address());
        if account == Some(session.signer_address()) {
            return Some(session);
        }
        info!(signer = %session.signer_address(), "Wallet account changed, ending decryption session");
        self.sessions.clear();
        None
    }

    /// True while the session signing prompt is open
    pub fn is_starting_session(&self) -> bool {
        self.sessions.is_initializing()
    }

    /// Ask the wallet to open a decryption session.
    pub async fn start_session(&self) -> Result<Session, AccessError> {
        self.sessions.initialize(self.wallet.as_deref()).await
    }

    /// Drop the decryption session.
    pub fn end_session(&self) {
        self.sessions.clear();
    }

    /// Obtain a credential for `content_id`.
    pub async fn request_access(
        &self,
        content_id: &ObjectId,
    ) -> Result<Option<ObjectId>, AccessError> {
        self.granter
            .request_access(content_id, self.wallet.as_deref())
            .await
    }

    /// Put a failed post back in line; the next [`Viewer::refresh`] queues
    /// it again.
    pub fn retry(&self, content_id: &ObjectId) -> bool {
        self.engine.reset(content_id)
    }

    /// Notified on every decryption state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.engine.subscribe()
    }

    /// Load the configured posts, classify them against the viewer's
    /// credentials, queue those that need decrypting (when a session is
    /// active) and return the feed with current progress.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Vec<PostView>, AccessError> {
        let objects = self.reader.multi_get_objects(&self.config.post_ids).await?;
        let records = parse_records(&self.package, &objects);

        let viewer = self.wallet.as_ref().map(|wallet| wallet.address());
        let credentials = self.credentials.list_credentials(viewer.as_ref()).await?;
        let posts = classify(&records, &credentials, &self.config.aggregator_url);

        if self.session().is_some() {
            for post in &posts {
                if let Post::NeedsDecryption { record, .. } = post {
                    if self.engine.state(&record.id) == TaskState::Idle {
                        debug!(content_id = %record.id, "Queueing decryption");
                        self.scheduler.enqueue(record.clone());
                    }
                }
            }
        }

        Ok(merge(posts, &self.engine.snapshot()))
    }
}
