use crate::{AccessCredential, LedgerError, LedgerReader, ObjectId, PostsPackage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use veil_credentials::Address;

/// How long a credential snapshot is served from cache by default.
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(60);

/// True iff any credential unlocks `content_id`.
pub fn has_access(content_id: &ObjectId, credentials: &[AccessCredential]) -> bool {
    find_credential(content_id, credentials).is_some()
}

/// The first credential that unlocks `content_id`. A viewer may hold more
/// than one; any of them is an equally valid proof.
pub fn find_credential<'a>(
    content_id: &ObjectId,
    credentials: &'a [AccessCredential],
) -> Option<&'a AccessCredential> {
    credentials
        .iter()
        .find(|credential| &credential.content_id == content_id)
}

struct Snapshot {
    fetched_at: Instant,
    credentials: Arc<Vec<AccessCredential>>,
}

#[derive(Default)]
struct Cache {
    snapshots: HashMap<Address, Snapshot>,
    // Bumped on every invalidation so a query that started before the
    // invalidation cannot repopulate the cache with stale results.
    generations: HashMap<Address, u64>,
}

/// Answers "which credentials does this viewer hold?", with a bounded
/// staleness window. Grants must call [`CredentialStore::invalidate`] as soon
/// as they succeed.
pub struct CredentialStore {
    reader: Arc<dyn LedgerReader>,
    package: PostsPackage,
    staleness: Duration,
    cache: Mutex<Cache>,
}

impl CredentialStore {
    /// A store that queries `reader` for credentials defined by `package`.
    pub fn new(reader: Arc<dyn LedgerReader>, package: PostsPackage) -> Self {
        Self {
            reader,
            package,
            staleness: DEFAULT_STALENESS,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Serve cached snapshots for at most `staleness`.
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    /// Every credential owned by `viewer`. Without a viewer there is nothing
    /// to look up and the result is empty.
    pub async fn list_credentials(
        &self,
        viewer: Option<&Address>,
    ) -> Result<Arc<Vec<AccessCredential>>, LedgerError> {
        let Some(viewer) = viewer else {
            return Ok(Arc::new(Vec::new()));
        };

        let generation = {
            let cache = self.cache.lock();
            if let Some(snapshot) = cache.snapshots.get(viewer) {
                if snapshot.fetched_at.elapsed() < self.staleness {
                    return Ok(Arc::clone(&snapshot.credentials));
                }
            }
            cache.generations.get(viewer).copied().unwrap_or(0)
        };

        let objects = self
            .reader
            .owned_objects(viewer, &self.package.credential_type())
            .await?;

        let credentials: Vec<AccessCredential> = objects
            .iter()
            .filter_map(|object| match self.package.parse_credential(object) {
                Ok(credential) => Some(credential),
                Err(error) => {
                    warn!(%viewer, %error, "Skipping malformed access credential");
                    None
                }
            })
            .collect();
        debug!(%viewer, count = credentials.len(), "Fetched access credentials");

        let credentials = Arc::new(credentials);
        let mut cache = self.cache.lock();
        if cache.generations.get(viewer).copied().unwrap_or(0) == generation {
            cache.snapshots.insert(
                *viewer,
                Snapshot {
                    fetched_at: Instant::now(),
                    credentials: Arc::clone(&credentials),
                },
            );
        }
        Ok(credentials)
    }

    /// Drop the cached snapshot for `viewer` so the next query hits the
    /// ledger.
    pub fn invalidate(&self, viewer: &Address) {
        let mut cache = self.cache.lock();
        cache.snapshots.remove(viewer);
        *cache.generations.entry(*viewer).or_insert(0) += 1;
        debug!(%viewer, "Invalidated credential snapshot");
    }
}
