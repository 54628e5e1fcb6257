use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Length in bytes of ledger addresses and object ids.
pub const ADDRESS_LENGTH: usize = 32;

/// Signature scheme flag prepended to the public key before hashing it into
/// an address.
const ED25519_FLAG: u8 = 0x00;

/// Errors produced when parsing a `0x`-prefixed hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    /// The `0x` prefix is missing.
    #[error("missing 0x prefix in '{0}'")]
    MissingPrefix(String),

    /// More hex digits than fit in 32 bytes, or none at all.
    #[error("expected 1 to 64 hex digits, got {0}")]
    InvalidLength(usize),

    /// A character outside `[0-9a-fA-F]`.
    #[error("invalid hex in '{0}'")]
    InvalidHex(String),
}

/// Parse a `0x`-prefixed hex string into 32 bytes. Short forms such as
/// `0x6` are left-padded with zeros, matching how the ledger prints system
/// objects.
pub fn parse_hex32(input: &str) -> Result<[u8; ADDRESS_LENGTH], AddressParseError> {
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or_else(|| AddressParseError::MissingPrefix(input.to_string()))?;

    if digits.is_empty() || digits.len() > ADDRESS_LENGTH * 2 {
        return Err(AddressParseError::InvalidLength(digits.len()));
    }

    let padded = format!("{digits:0>64}");
    let mut bytes = [0u8; ADDRESS_LENGTH];
    hex::decode_to_slice(&padded, &mut bytes)
        .map_err(|_| AddressParseError::InvalidHex(input.to_string()))?;
    Ok(bytes)
}

/// The ledger identity of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// Wrap raw address bytes.
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derive the address controlled by an Ed25519 public key.
    pub fn from_ed25519(public_key: &[u8; 32]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[ED25519_FLAG]);
        hasher.update(public_key);
        Self(*hasher.finalize().as_bytes())
    }

    /// The raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_pads_short_addresses() {
        let clock: Address = "0x6".parse().unwrap();
        assert_eq!(clock.as_bytes()[31], 6);
        assert!(clock.as_bytes()[..31].iter().all(|byte| *byte == 0));
        assert_eq!(
            clock.to_string(),
            "0x0000000000000000000000000000000000000000000000000000000000000006"
        );
    }

    #[test]
    fn it_normalizes_case() {
        let upper: Address = "0xABCDEF".parse().unwrap();
        let lower: Address = "0xabcdef".parse().unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn it_rejects_malformed_input() {
        assert!(matches!(
            "abcd".parse::<Address>(),
            Err(AddressParseError::MissingPrefix(_))
        ));
        assert!(matches!(
            "0x".parse::<Address>(),
            Err(AddressParseError::InvalidLength(0))
        ));
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(AddressParseError::InvalidHex(_))
        ));
        let too_long = format!("0x{}", "1".repeat(65));
        assert!(matches!(
            too_long.parse::<Address>(),
            Err(AddressParseError::InvalidLength(65))
        ));
    }

    #[test]
    fn it_derives_distinct_addresses_per_key() {
        let a = Address::from_ed25519(&[1; 32]);
        let b = Address::from_ed25519(&[2; 32]);
        assert_ne!(a, b);
        assert_eq!(a, Address::from_ed25519(&[1; 32]));
    }

    #[test]
    fn it_serializes_as_hex_string() {
        let address: Address = "0x42".parse().unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{address}\""));
        let parsed: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, address);
    }
}
