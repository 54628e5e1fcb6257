use crate::KeyReleaseError;
use serde::{Deserialize, Serialize};
use veil_credentials::{Address, Ed25519Verifier, IntentScope, WalletSignature};
use veil_ledger::ObjectId;

const MILLIS_PER_MINUTE: u64 = 60_000;

/// A viewer's wallet signature delegating key requests for one package to an
/// ephemeral session key, for a limited time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCertificate {
    /// Viewer the session acts for
    pub user: Address,
    /// Package whose policy the session may invoke
    pub package: ObjectId,
    /// Ephemeral key that signs individual requests
    pub session_key: Ed25519Verifier,
    /// Issue time, unix milliseconds
    pub issued_at: u64,
    /// Lifetime in minutes
    pub ttl_minutes: u32,
    /// Wallet signature over [`SessionCertificate::challenge`]
    pub signature: WalletSignature,
}

impl SessionCertificate {
    /// The personal message a wallet signs to open a session.
    pub fn challenge(
        package: &ObjectId,
        session_key: &Ed25519Verifier,
        issued_at: u64,
        ttl_minutes: u32,
    ) -> Vec<u8> {
        format!(
            "Accessing keys of package {package} for {ttl_minutes} mins from {issued_at}, session key {}",
            hex::encode(session_key.to_bytes())
        )
        .into_bytes()
    }

    /// End of validity, unix milliseconds.
    pub fn expires_at(&self) -> u64 {
        self.issued_at
            .saturating_add(u64::from(self.ttl_minutes) * MILLIS_PER_MINUTE)
    }

    /// True once `now` (unix milliseconds) is past the end of validity.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.expires_at()
    }

    /// Check the wallet signature, the signer, the package and the lifetime.
    pub fn verify(&self, package: &ObjectId, now: u64) -> Result<(), KeyReleaseError> {
        if &self.package != package {
            return Err(KeyReleaseError::InvalidCertificate(format!(
                "issued for package {}, not {package}",
                self.package
            )));
        }
        if self.signature.signer() != self.user {
            return Err(KeyReleaseError::InvalidCertificate(
                "signed by a different account".into(),
            ));
        }
        if self.is_expired_at(now) {
            return Err(KeyReleaseError::InvalidCertificate("session expired".into()));
        }
        let challenge =
            Self::challenge(&self.package, &self.session_key, self.issued_at, self.ttl_minutes);
        self.signature
            .verify(IntentScope::PersonalMessage, &challenge)
            .map_err(|e| KeyReleaseError::InvalidCertificate(e.to_string()))
    }
}
