//! The zone-I/O contract (`spec.md` §6 "Out of scope"/§1): the signer
//! driver reads unsigned RRsets in and writes signed RRsets out through
//! this handle without the core knowing whether the backing store is a
//! zone file, a DNS connection, or something else.

use async_trait::async_trait;
use domain::zonetree::StoredRecord;

use crate::contracts::keystore::KeystoreError;

#[derive(Debug, Clone)]
pub enum ZoneViewError {
    Io(String),
    Malformed(String),
}

impl std::fmt::Display for ZoneViewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(m) => write!(f, "zone io error: {m}"),
            Self::Malformed(m) => write!(f, "malformed zone data: {m}"),
        }
    }
}

impl std::error::Error for ZoneViewError {}

impl From<ZoneViewError> for crate::error::CoreError {
    fn from(e: ZoneViewError) -> Self {
        crate::error::CoreError::Io(e.to_string())
    }
}

impl From<KeystoreError> for ZoneViewError {
    fn from(e: KeystoreError) -> Self {
        Self::Io(e.to_string())
    }
}

/// A read/write handle onto one zone's RRset contents, delivered in and
/// out via an adapter (`spec.md` §1, §3.6 `input_adapter`/`output_adapter`).
#[async_trait]
pub trait ZoneView: Send + Sync {
    /// Read the zone's current (unsigned, or previously-signed)
    /// contents, along with its SOA serial.
    async fn read(&self) -> Result<(Vec<StoredRecord>, u32), ZoneViewError>;

    /// Write the fully-signed RRset list out, with the computed outbound
    /// SOA serial (`spec.md` §4.7 "write").
    async fn write(&self, records: &[StoredRecord], serial: u32) -> Result<(), ZoneViewError>;
}
