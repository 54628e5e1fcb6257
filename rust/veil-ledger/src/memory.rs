use crate::proof::{APPROVE_FUNCTION, CallArg, Command};
use crate::{
    BlobLocator, EncryptionId, GrantReceipt, LedgerError, LedgerObject, LedgerReader,
    LedgerWriter, ObjectId, Owner, POSTS_MODULE, PostsPackage, ProofBuilder, StructTag,
    TransactionKind,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use veil_common::time::{now, to_unix_millis};
use veil_credentials::{Address, Wallet};

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectId, LedgerObject>,
    next_object: u64,
}

impl State {
    fn fresh_id(&mut self) -> ObjectId {
        self.next_object += 1;
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"veil-memory-ledger-object");
        hasher.update(&self.next_object.to_le_bytes());
        ObjectId::new(*hasher.finalize().as_bytes())
    }
}

/// A ledger held entirely in memory. Clones share state, so one instance can
/// serve as the reader, the writer and the policy evaluator of a test or
/// demo. Objects are stored in the same loosely typed shape the real ledger
/// reports, so everything read back goes through the strict schema.
#[derive(Clone)]
pub struct MemoryLedger {
    package: PostsPackage,
    state: Arc<RwLock<State>>,
    object_queries: Arc<AtomicUsize>,
    owned_queries: Arc<AtomicUsize>,
}

impl MemoryLedger {
    /// An empty ledger with the posts package published at `package`.
    pub fn new(package: ObjectId) -> Self {
        Self {
            package: PostsPackage::new(package),
            state: Arc::new(RwLock::new(State::default())),
            object_queries: Arc::new(AtomicUsize::new(0)),
            owned_queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The posts package this ledger hosts.
    pub fn package(&self) -> PostsPackage {
        self.package
    }

    /// Publish a post as a shared object and return its id.
    pub fn publish_post(
        &self,
        author: Address,
        caption: &str,
        image_locator: Option<BlobLocator>,
        encryption_id: Option<EncryptionId>,
        fee_mist: u64,
    ) -> ObjectId {
        let mut state = self.state.write();
        let id = state.fresh_id();
        let fields = json!({
            "id": { "id": id.to_string() },
            "author": author.to_string(),
            "caption": caption,
            "created_at": to_unix_millis(now()).to_string(),
            "image_blob_id": image_locator.map(String::from),
            "encryption_id": encryption_id.map(|id| id.as_bytes().to_vec()).unwrap_or_default(),
            "fee_mist": fee_mist.to_string(),
        });
        state.objects.insert(
            id,
            LedgerObject {
                object_id: id,
                object_type: self.package.post_type(),
                owner: Owner::Shared,
                fields: into_map(fields),
            },
        );
        id
    }

    /// Mint a credential for `post` owned by `owner`. Nothing stops an owner
    /// from holding several credentials for the same post.
    pub fn mint_credential(&self, post: &ObjectId, owner: &Address) -> Result<ObjectId, LedgerError> {
        let mut state = self.state.write();
        self.mint_locked(&mut state, post, owner)
    }

    /// Store an arbitrary object, e.g. one that violates the schema.
    pub fn insert_object(&self, object: LedgerObject) {
        self.state.write().objects.insert(object.object_id, object);
    }

    /// How many batch-get queries have been served.
    pub fn object_queries(&self) -> usize {
        self.object_queries.load(Ordering::SeqCst)
    }

    /// How many owned-object queries have been served.
    pub fn owned_queries(&self) -> usize {
        self.owned_queries.load(Ordering::SeqCst)
    }

    /// Dry-run an approval transaction on behalf of `caller`, the way a key
    /// server does before releasing a key. Returns the encryption identifier
    /// the transaction proves access to.
    pub fn evaluate(&self, tx_bytes: &[u8], caller: &Address) -> Result<EncryptionId, LedgerError> {
        let tx = TransactionKind::decode(tx_bytes).map_err(|e| LedgerError::Denied(e.to_string()))?;

        let [Command::MoveCall(call)] = tx.commands.as_slice() else {
            return Err(LedgerError::Denied(
                "expected exactly one policy call".into(),
            ));
        };
        if &call.package != self.package.id()
            || call.module != POSTS_MODULE
            || call.function != APPROVE_FUNCTION
        {
            return Err(LedgerError::Denied(format!(
                "{}::{}::{} is not the access policy",
                call.package, call.module, call.function
            )));
        }

        let arguments: Vec<Option<&CallArg>> =
            call.arguments.iter().map(|arg| tx.resolve(arg)).collect();
        let [
            Some(CallArg::Pure(id)),
            Some(CallArg::Object(post_id)),
            Some(CallArg::Object(credential_id)),
        ] = arguments.as_slice()
        else {
            return Err(LedgerError::Denied(
                "policy call expects (id, post, credential)".into(),
            ));
        };

        let state = self.state.read();
        let post = state
            .objects
            .get(post_id)
            .ok_or_else(|| LedgerError::Denied(format!("post {post_id} does not exist")))
            .and_then(|object| self.package.parse_post(object))?;

        let requested = EncryptionId::new(id.clone());
        if post.encryption_id.as_ref() != Some(&requested) {
            return Err(LedgerError::Denied(format!(
                "encryption id {requested} does not match post {post_id}"
            )));
        }

        let credential_object = state.objects.get(credential_id).ok_or_else(|| {
            LedgerError::Denied(format!("credential {credential_id} does not exist"))
        })?;
        if credential_object.owner != Owner::Address(*caller) {
            return Err(LedgerError::Denied(format!(
                "credential {credential_id} is not owned by {caller}"
            )));
        }
        let credential = self
            .package
            .parse_credential(credential_object)
            .map_err(|e| LedgerError::Denied(e.to_string()))?;
        if &credential.content_id != post_id {
            return Err(LedgerError::Denied(format!(
                "credential {credential_id} unlocks {} rather than {post_id}",
                credential.content_id
            )));
        }

        debug!(%post_id, %caller, "Access policy approved");
        Ok(requested)
    }

    fn mint_locked(
        &self,
        state: &mut State,
        post: &ObjectId,
        owner: &Address,
    ) -> Result<ObjectId, LedgerError> {
        let is_post = state
            .objects
            .get(post)
            .is_some_and(|object| object.object_type == self.package.post_type());
        if !is_post {
            return Err(LedgerError::NotFound(*post));
        }

        let id = state.fresh_id();
        let fields = json!({
            "id": { "id": id.to_string() },
            "post_id": post.to_string(),
        });
        state.objects.insert(
            id,
            LedgerObject {
                object_id: id,
                object_type: self.package.credential_type(),
                owner: Owner::Address(*owner),
                fields: into_map(fields),
            },
        );
        Ok(id)
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl LedgerReader for MemoryLedger {
    async fn multi_get_objects(&self, ids: &[ObjectId]) -> Result<Vec<LedgerObject>, LedgerError> {
        self.object_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.objects.get(id).cloned())
            .collect())
    }

    async fn owned_objects(
        &self,
        owner: &Address,
        object_type: &StructTag,
    ) -> Result<Vec<LedgerObject>, LedgerError> {
        self.owned_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();
        Ok(state
            .objects
            .values()
            .filter(|object| {
                object.owner == Owner::Address(*owner) && &object.object_type == object_type
            })
            .cloned()
            .collect())
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl LedgerWriter for MemoryLedger {
    async fn grant_access(
        &self,
        content_id: &ObjectId,
        wallet: &dyn Wallet,
    ) -> Result<GrantReceipt, LedgerError> {
        let recipient = wallet.address();
        let tx_bytes = ProofBuilder::new(self.package)
            .grant_access(content_id, &recipient)
            .encode()?;
        wallet.sign_transaction(&tx_bytes).await?;

        // Minting and transferring happen in one write, so no reader can
        // observe a credential without an owner.
        let mut state = self.state.write();
        let credential_id = self.mint_locked(&mut state, content_id, &recipient)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(&tx_bytes);
        hasher.update(credential_id.as_bytes());
        let digest = hex::encode(hasher.finalize().as_bytes());

        debug!(%content_id, %recipient, %credential_id, "Granted access");
        Ok(GrantReceipt {
            digest,
            credential_id: Some(credential_id),
        })
    }
}
