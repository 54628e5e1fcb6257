use crate::{AccessError, FailureReason, SessionManager};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use veil_ledger::{
    AccessCredential, ContentRecord, CredentialStore, ObjectId, ProofBuilder, find_credential,
};
use veil_remote::{ContentFetcher, KeyReleaseService, KeyRequest};

/// Image encodings the feed can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Portable Network Graphics
    Png,
    /// JPEG, assumed for anything that is not PNG
    Jpeg,
}

impl ImageFormat {
    /// MIME type for rendering.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Pick the image format from the leading bytes: `0x89 0x50` is PNG,
/// everything else is treated as JPEG.
pub fn sniff_format(bytes: &[u8]) -> ImageFormat {
    match bytes {
        [0x89, 0x50, ..] => ImageFormat::Png,
        _ => ImageFormat::Jpeg,
    }
}

/// Decrypted image bytes ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renderable {
    /// Sniffed encoding
    pub format: ImageFormat,
    /// Plaintext image
    pub bytes: Bytes,
}

impl Renderable {
    /// Wrap plaintext, sniffing its format.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            format: sniff_format(&bytes),
            bytes,
        }
    }

    /// MIME type for rendering.
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Progress of one post's decryption.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Not started, or reset for a retry
    #[default]
    Idle,
    /// A pipeline is running
    Decrypting,
    /// Finished successfully
    Decrypted(Renderable),
    /// Finished unsuccessfully; only [`DecryptionEngine::reset`] leaves this
    Failed(FailureReason),
}

impl TaskState {
    /// True for `Decrypted` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Decrypted(_) | TaskState::Failed(_))
    }
}

/// What a call to [`DecryptionEngine::decrypt`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// This call ran the pipeline to a terminal state
    Ran,
    /// Another call is running the pipeline for this post
    AlreadyInFlight,
    /// The post already finished; reset it to try again
    AlreadySettled,
}

/// Settings for a [`DecryptionEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Key servers that must agree
    pub threshold: usize,
    /// Upper bound on key release
    pub key_release_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            threshold: 1,
            key_release_timeout: Duration::from_secs(30),
        }
    }
}

/// Marks a task as running; puts it back to `Idle` if the pipeline is
/// abandoned before finishing.
struct InFlight<'a> {
    engine: &'a DecryptionEngine,
    content_id: ObjectId,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, state: TaskState) {
        self.engine.transition(self.content_id, state);
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(content_id = %self.content_id, "Decryption abandoned");
            self.engine.transition(self.content_id, TaskState::Idle);
        }
    }
}

/// Drives each encrypted post from `Idle` to `Decrypted` or `Failed`, with at
/// most one pipeline per post in flight.
pub struct DecryptionEngine {
    sessions: Arc<SessionManager>,
    credentials: Arc<CredentialStore>,
    proofs: ProofBuilder,
    fetcher: ContentFetcher,
    keys: Arc<dyn KeyReleaseService>,
    settings: EngineSettings,
    tasks: Mutex<HashMap<ObjectId, TaskState>>,
    version: watch::Sender<u64>,
}

impl DecryptionEngine {
    /// Create an engine. Every dependency is shared with the caller.
    pub fn new(
        sessions: Arc<SessionManager>,
        credentials: Arc<CredentialStore>,
        proofs: ProofBuilder,
        fetcher: ContentFetcher,
        keys: Arc<dyn KeyReleaseService>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            sessions,
            credentials,
            proofs,
            fetcher,
            keys,
            settings,
            tasks: Mutex::new(HashMap::new()),
            version: watch::channel(0).0,
        }
    }

    /// State of one post.
    pub fn state(&self, content_id: &ObjectId) -> TaskState {
        self.tasks
            .lock()
            .get(content_id)
            .cloned()
            .unwrap_or_default()
    }

    /// States of every post the engine has seen.
    pub fn snapshot(&self) -> HashMap<ObjectId, TaskState> {
        self.tasks.lock().clone()
    }

    /// A receiver whose value changes on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Move a finished post back to `Idle` so it can be tried again. Returns
    /// false if the post was not in a terminal state.
    pub fn reset(&self, content_id: &ObjectId) -> bool {
        {
            let mut tasks = self.tasks.lock();
            match tasks.get(content_id) {
                Some(state) if state.is_terminal() => {
                    tasks.remove(content_id);
                }
                _ => return false,
            }
        }
        self.version.send_modify(|version| *version += 1);
        true
    }

    /// Decrypt the image of `record`.
    ///
    /// Fails without touching the post's state when there is no usable
    /// session or the viewer holds no credential for the post. Otherwise the
    /// pipeline's outcome is recorded as the post's state, and `Ok` says
    /// whether this call ran it.
    #[instrument(skip(self, record), fields(content_id = %record.id))]
    pub async fn decrypt(&self, record: &ContentRecord) -> Result<Trigger, AccessError> {
        if let Some(trigger) = self.settled_trigger(&record.id) {
            return Ok(trigger);
        }

        let encryption_id = record.encryption_id.as_ref().ok_or_else(|| {
            AccessError::DecryptionFailure(format!("post {} is not encrypted", record.id))
        })?;
        let session = self.sessions.require()?;
        let credentials = self
            .credentials
            .list_credentials(Some(&session.signer_address()))
            .await?;
        let credential = find_credential(&record.id, &credentials)
            .cloned()
            .ok_or(AccessError::CredentialNotFound {
                content_id: record.id,
            })?;

        let in_flight = {
            let mut tasks = self.tasks.lock();
            let state = tasks.entry(record.id).or_default();
            match state {
                TaskState::Decrypting => return Ok(Trigger::AlreadyInFlight),
                TaskState::Decrypted(_) | TaskState::Failed(_) => {
                    return Ok(Trigger::AlreadySettled);
                }
                TaskState::Idle => *state = TaskState::Decrypting,
            }
            InFlight {
                engine: self,
                content_id: record.id,
                settled: false,
            }
        };
        self.version.send_modify(|version| *version += 1);

        let outcome = self
            .run(record, encryption_id, &credential, &session)
            .await;
        let state = match outcome {
            Ok(renderable) => {
                info!(format = renderable.mime_type(), "Decrypted");
                TaskState::Decrypted(renderable)
            }
            Err(error) => {
                warn!(%error, "Decryption failed");
                TaskState::Failed(FailureReason::from(&error))
            }
        };
        in_flight.settle(state);
        Ok(Trigger::Ran)
    }

    fn settled_trigger(&self, content_id: &ObjectId) -> Option<Trigger> {
        match self.tasks.lock().get(content_id) {
            Some(TaskState::Decrypting) => Some(Trigger::AlreadyInFlight),
            Some(state) if state.is_terminal() => Some(Trigger::AlreadySettled),
            _ => None,
        }
    }

    async fn run(
        &self,
        record: &ContentRecord,
        encryption_id: &veil_ledger::EncryptionId,
        credential: &AccessCredential,
        session: &crate::Session,
    ) -> Result<Renderable, AccessError> {
        let proof =
            self.proofs
                .approve_access(encryption_id, &record.id, &credential.credential_id)?;

        let locator = record.image_locator.as_ref().ok_or_else(|| {
            AccessError::DecryptionFailure("encrypted post has no image".into())
        })?;
        let ciphertext = self.fetcher.fetch(locator).await?;
        debug!(size = ciphertext.len(), "Fetched ciphertext");

        let request = KeyRequest::new(
            &proof,
            session.certificate().clone(),
            session.session_key(),
            self.settings.threshold,
        )?;
        let keys = tokio::time::timeout(
            self.settings.key_release_timeout,
            self.keys.fetch_keys(&request),
        )
        .await
        .map_err(|_| {
            AccessError::AuthorizationDenied(format!(
                "key servers did not answer within {:?}",
                self.settings.key_release_timeout
            ))
        })??;

        let plaintext = self.keys.decrypt(&ciphertext, &keys)?;
        Ok(Renderable::new(plaintext))
    }

    fn transition(&self, content_id: ObjectId, state: TaskState) {
        {
            let mut tasks = self.tasks.lock();
            match state {
                TaskState::Idle => tasks.remove(&content_id),
                state => tasks.insert(content_id, state),
            };
        }
        self.version.send_modify(|version| *version += 1);
    }
}
