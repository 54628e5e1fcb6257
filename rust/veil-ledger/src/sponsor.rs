//! Gas-sponsored submission of access grants.
//!
//! The viewer builds only the transaction kind. A sponsoring backend wraps it
//! with gas and a sender, the wallet signs the full bytes, and the backend
//! executes the co-signed transaction.

use crate::{
    GrantReceipt, LedgerError, LedgerReader, LedgerWriter, ObjectId, PostsPackage, ProofBuilder,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use veil_credentials::{Wallet, WalletSignature};

/// Signature scheme flag prefixed to serialized Ed25519 signatures.
const ED25519_FLAG: u8 = 0x00;

/// Configuration for [`SponsoredWriter`]
#[derive(Clone, Debug)]
pub struct SponsorConfig {
    /// Base URL of the sponsoring backend (e.g., "https://api.example.com")
    pub endpoint: String,

    /// Network name the backend should execute on
    pub network: String,

    /// Identity token forwarded for accounts that sign with a login proof
    pub identity_token: Option<String>,

    /// Optional timeout for requests in seconds (default: 30)
    pub timeout_seconds: Option<u64>,

    /// Optional custom headers to send with each request
    pub headers: Vec<(String, String)>,
}

impl Default for SponsorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000".to_string(),
            network: "testnet".to_string(),
            identity_token: None,
            timeout_seconds: Some(30),
            headers: Vec::new(),
        }
    }
}

impl SponsorConfig {
    /// Create a new sponsor configuration
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the network name
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Forward an identity token with sponsorship requests
    pub fn with_identity_token(mut self, token: impl Into<String>) -> Self {
        self.identity_token = Some(token.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SponsorRequest<'a> {
    transaction_block_kind_bytes: String,
    network: &'a str,
    sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    zk_login_jwt: Option<&'a str>,
}

#[derive(Serialize)]
struct ExecuteRequest {
    signature: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct Sponsored {
    bytes: String,
    digest: String,
}

#[derive(Deserialize)]
struct Executed {
    digest: String,
}

/// `flag || signature || public key`, base64 encoded.
pub fn serialize_signature(signature: &WalletSignature) -> String {
    let mut bytes = Vec::with_capacity(1 + signature.signature.len() + 32);
    bytes.push(ED25519_FLAG);
    bytes.extend_from_slice(&signature.signature);
    bytes.extend_from_slice(&signature.public_key.to_bytes());
    STANDARD.encode(bytes)
}

/// Ledger writer that routes grants through a sponsoring backend, so viewers
/// need no gas of their own.
pub struct SponsoredWriter {
    config: SponsorConfig,
    client: Client,
    reader: Arc<dyn LedgerReader>,
    package: PostsPackage,
}

impl SponsoredWriter {
    /// Create a writer. `reader` is used to locate the credential once the
    /// grant has executed.
    pub fn new(config: SponsorConfig, reader: Arc<dyn LedgerReader>, package: PostsPackage) -> Self {
        let mut client_builder = Client::builder();

        if let Some(timeout) = config.timeout_seconds {
            client_builder = client_builder.timeout(std::time::Duration::from_secs(timeout));
        }

        let client = client_builder.build().unwrap_or_else(|_| Client::new());

        Self {
            config,
            client,
            reader,
            package,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/sponsor-transaction{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        body: &B,
    ) -> Result<T, LedgerError> {
        let mut request = self.client.post(&url).json(body);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LedgerError::Submission(format!(
                "HTTP {} from {url}: {detail}",
                status.as_u16()
            )));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::UnexpectedResponse(e.to_string()))?;
        Ok(envelope.data)
    }

    async fn find_credential(&self, content_id: &ObjectId, wallet: &dyn Wallet) -> Option<ObjectId> {
        let owned = match self
            .reader
            .owned_objects(&wallet.address(), &self.package.credential_type())
            .await
        {
            Ok(owned) => owned,
            Err(error) => {
                warn!(%error, "Could not look up granted credential");
                return None;
            }
        };

        owned
            .iter()
            .filter_map(|object| self.package.parse_credential(object).ok())
            .find(|credential| &credential.content_id == content_id)
            .map(|credential| credential.credential_id)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl LedgerWriter for SponsoredWriter {
    async fn grant_access(
        &self,
        content_id: &ObjectId,
        wallet: &dyn Wallet,
    ) -> Result<GrantReceipt, LedgerError> {
        let sender = wallet.address();
        let kind = ProofBuilder::new(self.package).grant_access(content_id, &sender);

        let sponsored: Sponsored = self
            .post(
                self.url(""),
                &SponsorRequest {
                    transaction_block_kind_bytes: STANDARD.encode(kind.encode()?),
                    network: &self.config.network,
                    sender: sender.to_string(),
                    zk_login_jwt: self.config.identity_token.as_deref(),
                },
            )
            .await?;
        debug!(digest = %sponsored.digest, "Transaction sponsored");

        let tx_bytes = STANDARD
            .decode(&sponsored.bytes)
            .map_err(|e| LedgerError::UnexpectedResponse(format!("sponsored bytes: {e}")))?;
        let signature = wallet.sign_transaction(&tx_bytes).await?;

        let executed: Executed = self
            .post(
                self.url(&format!("/{}", sponsored.digest)),
                &ExecuteRequest {
                    signature: serialize_signature(&signature),
                },
            )
            .await?;
        info!(digest = %executed.digest, post = %content_id, "Access granted");

        Ok(GrantReceipt {
            credential_id: self.find_credential(content_id, wallet).await,
            digest: executed.digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = SponsorConfig::new("https://api.example.com")
            .with_network("mainnet")
            .with_identity_token("jwt")
            .with_header("X-Custom", "value");

        assert_eq!(config.network, "mainnet");
        assert_eq!(config.identity_token.as_deref(), Some("jwt"));
        assert_eq!(config.headers.len(), 1);
    }

    #[cfg(not(target_arch = "wasm32"))]
    mod integration {
        use super::*;
        use crate::proof::{CallArg, Command};
        use crate::{MemoryLedger, TransactionKind};
        use axum::{
            Json, Router,
            extract::{Path, State},
            http::StatusCode,
            routing::post,
        };
        use serde_json::{Value, json};
        use std::collections::HashMap;
        use tokio::net::TcpListener;
        use veil_credentials::{Ed25519Verifier, IntentScope, KeyWallet};

        #[derive(Clone)]
        struct Backend {
            ledger: MemoryLedger,
            pending: Arc<parking_lot::Mutex<HashMap<String, Vec<u8>>>>,
        }

        async fn sponsor(
            State(backend): State<Backend>,
            Json(body): Json<Value>,
        ) -> Result<Json<Value>, StatusCode> {
            let bytes = body["transactionBlockKindBytes"]
                .as_str()
                .and_then(|text| STANDARD.decode(text).ok())
                .ok_or(StatusCode::BAD_REQUEST)?;
            TransactionKind::decode(&bytes).map_err(|_| StatusCode::BAD_REQUEST)?;

            let digest = blake3::hash(&bytes).to_hex().to_string();
            backend.pending.lock().insert(digest.clone(), bytes.clone());
            Ok(Json(json!({ "data": { "bytes": STANDARD.encode(&bytes), "digest": digest } })))
        }

        async fn execute(
            State(backend): State<Backend>,
            Path(digest): Path<String>,
            Json(body): Json<Value>,
        ) -> Result<Json<Value>, StatusCode> {
            let bytes = backend
                .pending
                .lock()
                .remove(&digest)
                .ok_or(StatusCode::NOT_FOUND)?;

            let serialized = body["signature"]
                .as_str()
                .and_then(|text| STANDARD.decode(text).ok())
                .filter(|raw| raw.len() == 97 && raw[0] == ED25519_FLAG)
                .ok_or(StatusCode::BAD_REQUEST)?;
            let public_key: [u8; 32] = serialized[65..].try_into().map_err(|_| StatusCode::BAD_REQUEST)?;
            let signature = WalletSignature {
                public_key: Ed25519Verifier::from_bytes(&public_key)
                    .map_err(|_| StatusCode::BAD_REQUEST)?,
                signature: serialized[1..65].to_vec(),
            };
            signature
                .verify(IntentScope::TransactionData, &bytes)
                .map_err(|_| StatusCode::UNAUTHORIZED)?;

            let kind = TransactionKind::decode(&bytes).map_err(|_| StatusCode::BAD_REQUEST)?;
            let Some(Command::MoveCall(call)) = kind.commands.first() else {
                return Err(StatusCode::BAD_REQUEST);
            };
            let Some(CallArg::Object(post_id)) = call.arguments.first().and_then(|a| kind.resolve(a))
            else {
                return Err(StatusCode::BAD_REQUEST);
            };
            backend
                .ledger
                .mint_credential(post_id, &signature.signer())
                .map_err(|_| StatusCode::NOT_FOUND)?;

            Ok(Json(json!({ "data": { "digest": digest } })))
        }

        async fn start_backend(ledger: MemoryLedger) -> String {
            let backend = Backend {
                ledger,
                pending: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            };
            let app = Router::new()
                .route("/api/sponsor-transaction", post(sponsor))
                .route("/api/sponsor-transaction/:digest", post(execute))
                .with_state(backend);

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            format!("http://{}", addr)
        }

        #[tokio::test]
        async fn it_grants_access_through_the_sponsor() -> testresult::TestResult {
            let ledger = MemoryLedger::new("0x2a".parse()?);
            let package = ledger.package();
            let author = KeyWallet::from_seed(&[1; 32])?;
            let viewer = KeyWallet::from_seed(&[2; 32])?;
            let post = ledger.publish_post(author.address(), "paid", None, None, 1_000);

            let url = start_backend(ledger.clone()).await;
            let writer = SponsoredWriter::new(
                SponsorConfig::new(url),
                Arc::new(ledger.clone()),
                package,
            );

            let receipt = writer.grant_access(&post, &viewer).await?;
            assert_eq!(viewer.prompts(), 1);

            let credential = receipt.credential_id.ok_or("no credential resolved")?;
            let owned = ledger
                .owned_objects(&viewer.address(), &package.credential_type())
                .await?;
            assert_eq!(owned.len(), 1);
            assert_eq!(owned[0].object_id, credential);
            Ok(())
        }

        #[tokio::test]
        async fn a_rejected_signature_grants_nothing() -> testresult::TestResult {
            let ledger = MemoryLedger::new("0x2a".parse()?);
            let package = ledger.package();
            let viewer = KeyWallet::from_seed(&[2; 32])?;
            viewer.set_approval(false);
            let post = ledger.publish_post(viewer.address(), "paid", None, None, 1_000);

            let url = start_backend(ledger.clone()).await;
            let writer = SponsoredWriter::new(SponsorConfig::new(url), Arc::new(ledger.clone()), package);

            let result = writer.grant_access(&post, &viewer).await;
            assert!(matches!(result, Err(LedgerError::Wallet(_))));
            assert!(
                ledger
                    .owned_objects(&viewer.address(), &package.credential_type())
                    .await?
                    .is_empty()
            );
            Ok(())
        }

        #[tokio::test]
        async fn backend_failures_are_submission_errors() -> testresult::TestResult {
            let ledger = MemoryLedger::new("0x2a".parse()?);
            let package = ledger.package();
            let viewer = KeyWallet::from_seed(&[2; 32])?;
            let missing: ObjectId = "0xabc".parse()?;

            let url = start_backend(ledger.clone()).await;
            let writer = SponsoredWriter::new(SponsorConfig::new(url), Arc::new(ledger), package);

            let result = writer.grant_access(&missing, &viewer).await;
            assert!(matches!(result, Err(LedgerError::Submission(_))));
            Ok(())
        }
    }
}
