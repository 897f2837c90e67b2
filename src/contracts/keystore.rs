//! The HSM / PKCS#11-style keystore contract (`spec.md` §6.1).
//!
//! The core never speaks PKCS#11 itself; it consumes a keystore through
//! this narrow async trait. A real implementation would map `generate`/
//! `sign`/`remove`/`random_bytes` onto actual HSM sessions (one per
//! thread, per `spec.md` §5 "Shared-resource policy"); that plumbing is
//! explicitly out of scope here (`spec.md` §1).

use std::fmt;

use async_trait::async_trait;

/// Errors the keystore contract can report (`spec.md` §6.1).
#[derive(Debug, Clone)]
pub enum KeystoreError {
    NotFound,
    Io(String),
    Backend(String),
}

impl fmt::Display for KeystoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("key not found"),
            Self::Io(m) => write!(f, "keystore io error: {m}"),
            Self::Backend(m) => write!(f, "keystore backend error: {m}"),
        }
    }
}

impl std::error::Error for KeystoreError {}

impl From<KeystoreError> for crate::error::CoreError {
    fn from(e: KeystoreError) -> Self {
        match e {
            KeystoreError::NotFound => crate::error::CoreError::NotFound(e.to_string()),
            KeystoreError::Io(_) => crate::error::CoreError::Io(e.to_string()),
            KeystoreError::Backend(_) => crate::error::CoreError::Backend(e.to_string()),
        }
    }
}

/// An opaque handle to a key living inside the keystore, returned by
/// `generate` and `find_by_locator`. The core never inspects this beyond
/// passing it back to `sign`/`remove`.
#[derive(Debug, Clone)]
pub struct KeyHandle {
    pub locator: Box<str>,
}

/// The HSM contract (`spec.md` §6.1): `generate_key`, `find_key_by_locator`,
/// `sign(key, data)`, `remove_key`, `random_bytes`.
#[async_trait]
pub trait Keystore: Send + Sync {
    async fn initialize(&self) -> Result<(), KeystoreError>;
    async fn finalize(&self) -> Result<(), KeystoreError>;

    /// Generate a new key in `repository` using `algorithm`/`bits`,
    /// returning its opaque locator. Blocking (treated as an opaque
    /// blocking call by the scheduler, `spec.md` §5).
    async fn generate(
        &self,
        repository: &str,
        algorithm: domain::base::iana::SecAlg,
        bits: u16,
    ) -> Result<KeyHandle, KeystoreError>;

    async fn find_by_locator(&self, locator: &str) -> Result<Option<KeyHandle>, KeystoreError>;

    /// The wire-format public key octets for `key`, as they belong in a
    /// DNSKEY record's public key field. The core never sees private key
    /// material; this is the one piece of key content it does need.
    async fn public_key(&self, key: &KeyHandle) -> Result<Vec<u8>, KeystoreError>;

    async fn sign(&self, key: &KeyHandle, data: &[u8]) -> Result<Vec<u8>, KeystoreError>;

    async fn remove(&self, key: &KeyHandle) -> Result<(), KeystoreError>;

    async fn random_bytes(&self, n: usize) -> Result<Vec<u8>, KeystoreError>;
}
