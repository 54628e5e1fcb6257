use crate::{BlobLocator, EncryptionId, LedgerError, LedgerObject, ObjectId, Owner, StructTag};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use veil_credentials::Address;

/// Module that defines posts and their access credentials.
pub const POSTS_MODULE: &str = "posts";
/// Struct name of a published post.
pub const POST_STRUCT: &str = "Post";
/// Struct name of an access credential.
pub const CREDENTIAL_STRUCT: &str = "ViewerToken";

const MIST_PER_SUI: f64 = 1_000_000_000.0;

/// A published post as recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Object id of the post
    pub id: ObjectId,
    /// Publishing address
    pub author: Address,
    /// Public caption
    pub caption: String,
    /// Ledger-assigned creation time in unix milliseconds
    pub created_at: u64,
    /// Where the image bytes live, if the post has an image
    pub image_locator: Option<BlobLocator>,
    /// Present iff the image is encrypted
    pub encryption_id: Option<EncryptionId>,
    /// Advisory access fee in MIST
    pub access_fee: u64,
}

impl ContentRecord {
    /// True when the image can only be read with a credential and a session.
    pub fn is_encrypted(&self) -> bool {
        self.encryption_id.is_some()
    }

    /// The advisory fee converted from MIST for display.
    pub fn fee_in_sui(&self) -> f64 {
        self.access_fee as f64 / MIST_PER_SUI
    }
}

/// Proof, owned by one viewer, of a one-time grant of access to one post.
/// Credentials never expire and cannot be revoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessCredential {
    /// Object id of the credential
    pub credential_id: ObjectId,
    /// The post it unlocks
    pub content_id: ObjectId,
}

/// The on-ledger package that defines posts and credentials. All schema
/// checks are made against its struct types, so objects from look-alike
/// packages are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostsPackage {
    id: ObjectId,
}

impl PostsPackage {
    /// The package published at `id`.
    pub const fn new(id: ObjectId) -> Self {
        Self { id }
    }

    /// The package id.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// `<package>::posts::Post`
    pub fn post_type(&self) -> StructTag {
        StructTag::new(self.id, POSTS_MODULE, POST_STRUCT)
    }

    /// `<package>::posts::ViewerToken`
    pub fn credential_type(&self) -> StructTag {
        StructTag::new(self.id, POSTS_MODULE, CREDENTIAL_STRUCT)
    }

    /// Apply the post schema to a raw ledger object.
    pub fn parse_post(&self, object: &LedgerObject) -> Result<ContentRecord, LedgerError> {
        self.expect_type(object, &self.post_type())?;
        let fields: PostFields = decode_fields(object)?;

        let image_locator = match fields.image_blob_id {
            Some(locator) if !locator.is_empty() => {
                Some(
                    BlobLocator::try_from(locator).map_err(|e| LedgerError::Malformed {
                        object_id: object.object_id,
                        reason: e.to_string(),
                    })?,
                )
            }
            _ => None,
        };

        let encryption_id = fields
            .encryption_id
            .filter(|bytes| !bytes.is_empty())
            .map(EncryptionId::new);

        Ok(ContentRecord {
            id: object.object_id,
            author: fields.author,
            caption: fields.caption,
            created_at: fields.created_at,
            image_locator,
            encryption_id,
            access_fee: fields.fee_mist.unwrap_or(0),
        })
    }

    /// Apply the credential schema to a raw ledger object.
    pub fn parse_credential(&self, object: &LedgerObject) -> Result<AccessCredential, LedgerError> {
        self.expect_type(object, &self.credential_type())?;
        if !matches!(object.owner, Owner::Address(_)) {
            return Err(LedgerError::Malformed {
                object_id: object.object_id,
                reason: "access credentials must be owned by an address".into(),
            });
        }
        let fields: CredentialFields = decode_fields(object)?;
        Ok(AccessCredential {
            credential_id: object.object_id,
            content_id: fields.post_id,
        })
    }

    fn expect_type(&self, object: &LedgerObject, expected: &StructTag) -> Result<(), LedgerError> {
        if &object.object_type != expected {
            return Err(LedgerError::Malformed {
                object_id: object.object_id,
                reason: format!("expected type {expected}, found {}", object.object_type),
            });
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct PostFields {
    author: Address,
    caption: String,
    #[serde(deserialize_with = "ledger_u64")]
    created_at: u64,
    #[serde(default)]
    image_blob_id: Option<String>,
    #[serde(default)]
    encryption_id: Option<Vec<u8>>,
    #[serde(default, deserialize_with = "optional_ledger_u64")]
    fee_mist: Option<u64>,
}

#[derive(Deserialize)]
struct CredentialFields {
    post_id: ObjectId,
}

fn decode_fields<T: for<'de> Deserialize<'de>>(object: &LedgerObject) -> Result<T, LedgerError> {
    serde_json::from_value(Value::Object(object.fields.clone())).map_err(|e| {
        LedgerError::Malformed {
            object_id: object.object_id,
            reason: e.to_string(),
        }
    })
}

/// The ledger renders 64 bit integers as decimal strings so they survive JSON
/// number precision limits; small values sometimes arrive as plain numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum LedgerU64 {
    Number(u64),
    Text(String),
}

impl LedgerU64 {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            LedgerU64::Number(value) => Ok(value),
            LedgerU64::Text(text) => text.parse().map_err(E::custom),
        }
    }
}

fn ledger_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    LedgerU64::deserialize(deserializer)?.into_u64()
}

fn optional_ledger_u64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    Option::<LedgerU64>::deserialize(deserializer)?
        .map(LedgerU64::into_u64)
        .transpose()
}
