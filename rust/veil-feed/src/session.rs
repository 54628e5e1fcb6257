use crate::AccessError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, instrument};
use veil_common::time::{from_unix_millis, now, to_unix_millis};
use veil_credentials::{Address, Ed25519Signer, Wallet};
use veil_ledger::ObjectId;
use veil_remote::SessionCertificate;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// A time-limited authorization, created by one wallet signature, that lets
/// the viewer request decryption keys without further prompts.
#[derive(Clone)]
pub struct Session {
    certificate: SessionCertificate,
    session_key: Arc<Ed25519Signer>,
}

impl Session {
    /// The account that signed the session challenge
    pub fn signer_address(&self) -> Address {
        self.certificate.user
    }

    /// When the session was opened
    pub fn issued_at(&self) -> SystemTime {
        from_unix_millis(self.certificate.issued_at)
    }

    /// When the session stops being valid
    pub fn expires_at(&self) -> SystemTime {
        from_unix_millis(self.certificate.expires_at())
    }

    /// True once `at` is past [`Session::expires_at`]
    pub fn is_expired_at(&self, at: SystemTime) -> bool {
        self.certificate.is_expired_at(to_unix_millis(at))
    }

    /// Certificate presented to key servers
    pub fn certificate(&self) -> &SessionCertificate {
        &self.certificate
    }

    /// Ephemeral key that signs key requests
    pub fn session_key(&self) -> &Ed25519Signer {
        &self.session_key
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("signer_address", &self.signer_address())
            .field("issued_at", &self.certificate.issued_at)
            .field("ttl_minutes", &self.certificate.ttl_minutes)
            .finish()
    }
}

enum Slot {
    Empty,
    Active(Session),
    Expired,
}

struct Initializing<'a>(&'a AtomicBool);

impl Drop for Initializing<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Holds at most one decryption session and creates it on request.
pub struct SessionManager {
    package: ObjectId,
    ttl_minutes: u32,
    clock: Clock,
    slot: Mutex<Slot>,
    prompt: tokio::sync::Mutex<()>,
    initializing: AtomicBool,
}

impl SessionManager {
    /// Sessions for the posts package `package`, valid for `ttl`
    /// (rounded down to whole minutes, at least one).
    pub fn new(package: ObjectId, ttl: Duration) -> Self {
        let ttl_minutes = u32::try_from(ttl.as_secs() / 60).unwrap_or(u32::MAX).max(1);
        Self {
            package,
            ttl_minutes,
            clock: Arc::new(now),
            slot: Mutex::new(Slot::Empty),
            prompt: tokio::sync::Mutex::new(()),
            initializing: AtomicBool::new(false),
        }
    }

    /// Read time from `clock` instead of the system clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The active session, if it has not expired. An expired session is
    /// dropped here.
    pub fn current(&self) -> Option<Session> {
        self.require().ok()
    }

    /// The active session, or why there is none: [`AccessError::SessionExpired`]
    /// if one lapsed, [`AccessError::NoWalletConnected`] if none was opened.
    pub fn require(&self) -> Result<Session, AccessError> {
        let mut slot = self.slot.lock();
        match &*slot {
            Slot::Active(session) if session.is_expired_at((self.clock)()) => {
                debug!(signer = %session.signer_address(), "Decryption session expired");
                *slot = Slot::Expired;
                Err(AccessError::SessionExpired)
            }
            Slot::Active(session) => Ok(session.clone()),
            Slot::Expired => Err(AccessError::SessionExpired),
            Slot::Empty => Err(AccessError::NoWalletConnected),
        }
    }

    /// True while a signing prompt is open
    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    /// Forget the session, e.g. on sign-out
    pub fn clear(&self) {
        *self.slot.lock() = Slot::Empty;
    }

    /// Open a session by asking `wallet` to sign the session challenge.
    /// Concurrent callers share a single prompt; whoever waited reuses the
    /// session the first caller created.
    #[instrument(skip(self, wallet))]
    pub async fn initialize(&self, wallet: Option<&dyn Wallet>) -> Result<Session, AccessError> {
        let wallet = wallet.ok_or(AccessError::NoWalletConnected)?;
        let user = wallet.address();

        let _prompt = self.prompt.lock().await;
        if let Some(session) = self.current() {
            if session.signer_address() == user {
                return Ok(session);
            }
        }

        self.initializing.store(true, Ordering::SeqCst);
        let _initializing = Initializing(&self.initializing);

        let session_key = Ed25519Signer::generate()?;
        let issued_at = to_unix_millis((self.clock)());
        let challenge = SessionCertificate::challenge(
            &self.package,
            session_key.verifier(),
            issued_at,
            self.ttl_minutes,
        );
        let signature = wallet.sign_personal_message(&challenge).await?;

        let session = Session {
            certificate: SessionCertificate {
                user,
                package: self.package,
                session_key: *session_key.verifier(),
                issued_at,
                ttl_minutes: self.ttl_minutes,
                signature,
            },
            session_key: Arc::new(session_key),
        };
        *self.slot.lock() = Slot::Active(session.clone());

        info!(signer = %user, ttl_minutes = self.ttl_minutes, "Decryption session started");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_credentials::KeyWallet;

    fn manual_clock(start: SystemTime) -> (Clock, Arc<Mutex<SystemTime>>) {
        let time = Arc::new(Mutex::new(start));
        let reader = time.clone();
        (Arc::new(move || *reader.lock()), time)
    }

    fn manager() -> SessionManager {
        SessionManager::new("0x2a".parse().unwrap(), Duration::from_secs(30 * 60))
    }

    #[tokio::test]
    async fn it_needs_a_wallet() {
        let result = manager().initialize(None).await;
        assert_eq!(result.unwrap_err(), AccessError::NoWalletConnected);
    }

    #[tokio::test]
    async fn a_declined_prompt_opens_no_session() {
        let manager = manager();
        let wallet = KeyWallet::from_seed(&[4; 32]).unwrap();
        wallet.set_approval(false);

        let result = manager.initialize(Some(&wallet)).await;
        assert_eq!(result.unwrap_err(), AccessError::SigningRejected);
        assert!(manager.current().is_none());
        assert!(!manager.is_initializing());
    }

    #[tokio::test]
    async fn the_certificate_verifies_for_the_package() {
        let manager = manager();
        let wallet = KeyWallet::from_seed(&[4; 32]).unwrap();

        let session = manager.initialize(Some(&wallet)).await.unwrap();

        assert_eq!(session.signer_address(), wallet.address());
        assert_eq!(
            session.expires_at().duration_since(session.issued_at()).unwrap(),
            Duration::from_secs(30 * 60)
        );
        session
            .certificate()
            .verify(&"0x2a".parse().unwrap(), session.certificate().issued_at)
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_initialization_prompts_once() {
        let manager = Arc::new(manager());
        let wallet = Arc::new(KeyWallet::from_seed(&[4; 32]).unwrap());

        let calls = (0..8).map(|_| {
            let manager = manager.clone();
            let wallet = wallet.clone();
            tokio::spawn(async move { manager.initialize(Some(&*wallet)).await })
        });
        let mut sessions = Vec::new();
        for call in calls.collect::<Vec<_>>() {
            sessions.push(call.await.unwrap().unwrap());
        }

        assert_eq!(wallet.prompts(), 1);
        assert!(
            sessions
                .iter()
                .all(|s| s.certificate() == sessions[0].certificate())
        );
    }

    #[tokio::test]
    async fn expired_sessions_are_reported_then_replaced_only_on_request() {
        let start = now();
        let (clock, time) = manual_clock(start);
        let manager = manager().with_clock(clock);
        let wallet = KeyWallet::from_seed(&[4; 32]).unwrap();

        assert_eq!(manager.require().unwrap_err(), AccessError::NoWalletConnected);
        manager.initialize(Some(&wallet)).await.unwrap();
        assert!(manager.current().is_some());

        *time.lock() = start + Duration::from_secs(31 * 60);
        assert!(manager.current().is_none());
        assert_eq!(manager.require().unwrap_err(), AccessError::SessionExpired);
        assert_eq!(wallet.prompts(), 1);

        manager.initialize(Some(&wallet)).await.unwrap();
        assert!(manager.current().is_some());
        assert_eq!(wallet.prompts(), 2);

        manager.clear();
        assert_eq!(manager.require().unwrap_err(), AccessError::NoWalletConnected);
    }
}
