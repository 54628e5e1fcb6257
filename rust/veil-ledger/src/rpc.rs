//! JSON-RPC reader for a ledger full node.

use crate::{LedgerError, LedgerObject, LedgerReader, ObjectId, Owner, StructTag};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use veil_credentials::Address;

/// The node refuses batch reads larger than this.
const MAX_OBJECTS_PER_QUERY: usize = 50;
/// Guard against a node that never stops reporting another page.
const MAX_PAGES: usize = 100;

/// Configuration for [`RpcLedger`]
#[derive(Clone, Debug)]
pub struct RpcConfig {
    /// Full node JSON-RPC endpoint (e.g., "https://fullnode.testnet.sui.io:443")
    pub endpoint: String,

    /// Optional timeout for requests in seconds (default: 30)
    pub timeout_seconds: Option<u64>,

    /// Optional custom headers to send with each request
    pub headers: Vec<(String, String)>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            timeout_seconds: Some(30),
            headers: Vec::new(),
        }
    }
}

impl RpcConfig {
    /// Create a new RPC configuration
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
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

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct ObjectResponse {
    data: Option<ObjectData>,
    error: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectData {
    object_id: ObjectId,
    owner: Option<OwnerJson>,
    content: Option<Content>,
}

#[derive(Deserialize)]
enum OwnerJson {
    AddressOwner(Address),
    ObjectOwner(ObjectId),
    Shared(Value),
    Immutable,
}

#[derive(Deserialize)]
#[serde(tag = "dataType")]
enum Content {
    #[serde(rename = "moveObject")]
    MoveObject {
        #[serde(rename = "type")]
        object_type: String,
        fields: Map<String, Value>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedPage {
    data: Vec<ObjectResponse>,
    next_cursor: Option<String>,
    has_next_page: bool,
}

impl ObjectResponse {
    /// Apply the envelope schema. `None` means the object is missing, deleted
    /// or not a struct; shape violations are reported as errors.
    fn into_object(self) -> Result<Option<LedgerObject>, String> {
        if let Some(error) = self.error {
            debug!(%error, "Ledger reported no object");
            return Ok(None);
        }
        let Some(data) = self.data else {
            return Ok(None);
        };
        let Some(Content::MoveObject {
            object_type,
            fields,
        }) = data.content
        else {
            return Ok(None);
        };

        let object_type: StructTag = object_type.parse().map_err(|e| format!("{e}"))?;
        let owner = match data.owner {
            Some(OwnerJson::AddressOwner(address)) => Owner::Address(address),
            Some(OwnerJson::ObjectOwner(parent)) => Owner::Object(parent),
            Some(OwnerJson::Shared(_)) => Owner::Shared,
            Some(OwnerJson::Immutable) => Owner::Immutable,
            None => return Err(format!("object {} has no owner", data.object_id)),
        };

        Ok(Some(LedgerObject {
            object_id: data.object_id,
            object_type,
            owner,
            fields,
        }))
    }
}

fn collect_objects(responses: Vec<ObjectResponse>, into: &mut Vec<LedgerObject>) {
    for response in responses {
        match response.into_object() {
            Ok(Some(object)) => into.push(object),
            Ok(None) => {}
            Err(reason) => warn!(%reason, "Dropping malformed ledger object"),
        }
    }
}

/// Ledger reader speaking JSON-RPC 2.0 to a full node.
pub struct RpcLedger {
    config: RpcConfig,
    client: Client,
    next_id: AtomicU64,
}

impl RpcLedger {
    /// Create a new RPC reader with the given configuration
    pub fn new(config: RpcConfig) -> Self {
        let mut client_builder = Client::builder();

        if let Some(timeout) = config.timeout_seconds {
            client_builder = client_builder.timeout(std::time::Duration::from_secs(timeout));
        }

        let client = client_builder.build().unwrap_or_else(|_| Client::new());

        Self {
            config,
            client,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!(
                "HTTP {} - {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::UnexpectedResponse(e.to_string()))?;

        if let Some(error) = envelope.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| LedgerError::UnexpectedResponse(format!("{method} returned no result")))
    }
}

fn object_options() -> Value {
    json!({ "showType": true, "showOwner": true, "showContent": true })
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl LedgerReader for RpcLedger {
    async fn multi_get_objects(&self, ids: &[ObjectId]) -> Result<Vec<LedgerObject>, LedgerError> {
        let mut objects = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_OBJECTS_PER_QUERY) {
            let responses: Vec<ObjectResponse> = self
                .call("sui_multiGetObjects", json!([chunk, object_options()]))
                .await?;
            collect_objects(responses, &mut objects);
        }
        Ok(objects)
    }

    async fn owned_objects(
        &self,
        owner: &Address,
        object_type: &StructTag,
    ) -> Result<Vec<LedgerObject>, LedgerError> {
        let query = json!({
            "filter": { "StructType": object_type.to_string() },
            "options": object_options(),
        });

        let mut objects = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let page: OwnedPage = self
                .call(
                    "suix_getOwnedObjects",
                    json!([owner.to_string(), query, cursor, Value::Null]),
                )
                .await?;
            collect_objects(page.data, &mut objects);

            match page.next_cursor {
                Some(next) if page.has_next_page => cursor = Some(next),
                _ => return Ok(objects),
            }
        }

        Err(LedgerError::UnexpectedResponse(format!(
            "owned objects of {owner} did not finish paging after {MAX_PAGES} pages"
        )))
    }
}
