use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use veil_credentials::{Address, AddressParseError, parse_hex32};

/// Identifier of an object on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Wrap raw id bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw id bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for ObjectId {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Self)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// The key identifier a ciphertext was sealed under. Key servers only release
/// the key for an identifier when the policy call carries the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EncryptionId(#[serde(with = "serde_bytes")] Vec<u8>);

impl EncryptionId {
    /// Wrap raw identifier bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True when there are no identifier bytes, which the ledger uses to
    /// mean "not encrypted".
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for EncryptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl FromStr for EncryptionId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        hex::decode(digits).map(Self)
    }
}

/// Errors raised when a blob locator is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobLocatorError {
    /// The locator was empty.
    #[error("blob locator is empty")]
    Empty,

    /// The locator contained characters outside the url-safe base64 alphabet.
    #[error("blob locator '{0}' contains invalid characters")]
    InvalidCharacters(String),
}

/// A pointer into the content-addressed blob store. Locators are url-safe
/// base64 so they can be appended to an aggregator URL as one path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobLocator(String);

impl BlobLocator {
    /// The locator text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BlobLocator {
    type Error = BlobLocatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(BlobLocatorError::Empty);
        }
        let valid = value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '=');
        if !valid {
            return Err(BlobLocatorError::InvalidCharacters(value));
        }
        Ok(Self(value))
    }
}

impl FromStr for BlobLocator {
    type Err = BlobLocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl From<BlobLocator> for String {
    fn from(locator: BlobLocator) -> Self {
        locator.0
    }
}

impl Display for BlobLocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised when parsing a fully qualified struct type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructTagError {
    /// The type did not have the `package::module::Name` shape.
    #[error("expected <package>::<module>::<name>, got '{0}'")]
    Shape(String),

    /// The package id was not valid hex.
    #[error(transparent)]
    Package(#[from] AddressParseError),
}

/// A fully qualified struct type such as `0x2a::posts::Post`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructTag {
    /// Package that defines the type
    pub package: ObjectId,
    /// Module within the package
    pub module: String,
    /// Struct name
    pub name: String,
}

impl StructTag {
    /// A struct defined by `package`.
    pub fn new(package: ObjectId, module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package,
            module: module.into(),
            name: name.into(),
        }
    }
}

impl Display for StructTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.package, self.module, self.name)
    }
}

impl FromStr for StructTag {
    type Err = StructTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Generic parameters are not part of the identity we match on.
        let base = s.split('<').next().unwrap_or(s);
        let parts: Vec<&str> = base.split("::").collect();
        match parts.as_slice() {
            [package, module, name] if !module.is_empty() && !name.is_empty() => Ok(Self {
                package: package.parse()?,
                module: (*module).to_string(),
                name: (*name).to_string(),
            }),
            _ => Err(StructTagError::Shape(s.to_string())),
        }
    }
}

/// Who may use an object in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Owned by a single address.
    Address(Address),
    /// Wrapped inside another object.
    Object(ObjectId),
    /// Shared, usable by anyone.
    Shared,
    /// Frozen, readable by anyone.
    Immutable,
}

/// An object as the ledger reports it, before any schema is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerObject {
    /// Object id
    pub object_id: ObjectId,
    /// Struct type of the object's contents
    pub object_type: StructTag,
    /// Ownership
    pub owner: Owner,
    /// The struct's fields as structured JSON
    pub fields: Map<String, Value>,
}
