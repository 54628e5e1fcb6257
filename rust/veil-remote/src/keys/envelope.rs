//! The sealed ciphertext format.
//!
//! An envelope names the identifier it was sealed under, so the reader knows
//! which released key opens it. The body is XORed with a keyed BLAKE3
//! keystream and authenticated with a keyed BLAKE3 tag.

use super::{IDENTITY_KEY_LENGTH, ReleasedKeys};
use crate::KeyReleaseError;
use serde::{Deserialize, Serialize};
use veil_ledger::EncryptionId;

const NONCE_LENGTH: usize = 24;
const MAC_CONTEXT: &str = "veil envelope 2024-06 authentication key";

#[derive(Serialize, Deserialize)]
struct Envelope {
    id: EncryptionId,
    #[serde(with = "serde_bytes")]
    nonce: Vec<u8>,
    #[serde(with = "serde_bytes")]
    body: Vec<u8>,
    #[serde(with = "serde_bytes")]
    tag: Vec<u8>,
}

fn apply_keystream(key: &[u8; IDENTITY_KEY_LENGTH], nonce: &[u8], data: &mut [u8]) {
    let mut stream = vec![0u8; data.len()];
    blake3::Hasher::new_keyed(key)
        .update(nonce)
        .finalize_xof()
        .fill(&mut stream);
    for (byte, mask) in data.iter_mut().zip(stream) {
        *byte ^= mask;
    }
}

fn tag(key: &[u8; IDENTITY_KEY_LENGTH], nonce: &[u8], body: &[u8]) -> blake3::Hash {
    let mac_key = blake3::derive_key(MAC_CONTEXT, key);
    blake3::Hasher::new_keyed(&mac_key)
        .update(nonce)
        .update(body)
        .finalize()
}

/// Seal `plaintext` under the identity key of `id`.
pub fn seal(
    id: &EncryptionId,
    key: &[u8; IDENTITY_KEY_LENGTH],
    plaintext: &[u8],
) -> Result<Vec<u8>, KeyReleaseError> {
    let mut nonce = vec![0u8; NONCE_LENGTH];
    getrandom::getrandom(&mut nonce).map_err(|e| KeyReleaseError::Encoding(e.to_string()))?;

    let mut body = plaintext.to_vec();
    apply_keystream(key, &nonce, &mut body);
    let tag = tag(key, &nonce, &body).as_bytes().to_vec();

    serde_ipld_dagcbor::to_vec(&Envelope {
        id: id.clone(),
        nonce,
        body,
        tag,
    })
    .map_err(|e| KeyReleaseError::Encoding(e.to_string()))
}

fn decode(ciphertext: &[u8]) -> Result<Envelope, KeyReleaseError> {
    serde_ipld_dagcbor::from_slice(ciphertext)
        .map_err(|e| KeyReleaseError::Decryption(format!("not a sealed envelope: {e}")))
}

/// Open a ciphertext with whichever released key matches its identifier.
pub fn open(ciphertext: &[u8], keys: &ReleasedKeys) -> Result<Vec<u8>, KeyReleaseError> {
    let Envelope {
        id,
        nonce,
        mut body,
        tag: expected,
    } = decode(ciphertext)?;

    let key = keys
        .get(&id)
        .ok_or_else(|| KeyReleaseError::Decryption(format!("no key released for {id}")))?;

    let expected: [u8; blake3::OUT_LEN] = expected
        .try_into()
        .map_err(|_| KeyReleaseError::Decryption("malformed tag".into()))?;
    if tag(key, &nonce, &body) != blake3::Hash::from(expected) {
        return Err(KeyReleaseError::Decryption(
            "ciphertext failed authentication".into(),
        ));
    }

    apply_keystream(key, &nonce, &mut body);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_opens_what_it_seals() {
        let id = EncryptionId::new(vec![1, 2, 3]);
        let key = [5u8; IDENTITY_KEY_LENGTH];
        let sealed = seal(&id, &key, b"picture").unwrap();

        let mut keys = ReleasedKeys::new();
        keys.insert(id.clone(), key);

        assert_eq!(open(&sealed, &keys).unwrap(), b"picture");
    }

    #[test]
    fn the_wrong_key_fails_authentication() {
        let id = EncryptionId::new(vec![1, 2, 3]);
        let sealed = seal(&id, &[5u8; IDENTITY_KEY_LENGTH], b"picture").unwrap();

        let mut keys = ReleasedKeys::new();
        keys.insert(id, [6u8; IDENTITY_KEY_LENGTH]);
        assert!(matches!(
            open(&sealed, &keys),
            Err(KeyReleaseError::Decryption(_))
        ));

        assert!(open(b"garbage", &ReleasedKeys::new()).is_err());
    }
}
