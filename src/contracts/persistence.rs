//! The database-backed persistence contract (`spec.md` §6.2).
//!
//! The core consumes the database through this transactional view over
//! typed entities; it never issues SQL (or any wire protocol) itself. A
//! single enforcer pass takes a consistent snapshot via
//! [`Persistence::transaction`] and commits as one unit; on an
//! optimistic-concurrency conflict the transaction returns
//! [`PersistenceError::Conflict`] and the calling task returns `DEFER`
//! turned `PROMPTLY` by `spec.md` §7's propagation policy.

use std::fmt;

use async_trait::async_trait;

use crate::model::key::KeyData;
use crate::model::policy::Policy;
use crate::model::zone::Zone;

#[derive(Debug, Clone)]
pub enum PersistenceError {
    NotFound(String),
    Conflict(String),
    Backend(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(m) => write!(f, "not found: {m}"),
            Self::Conflict(m) => write!(f, "optimistic concurrency conflict: {m}"),
            Self::Backend(m) => write!(f, "backend error: {m}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<PersistenceError> for crate::error::CoreError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::NotFound(m) => crate::error::CoreError::NotFound(m),
            PersistenceError::Conflict(m) => crate::error::CoreError::Conflict(m),
            PersistenceError::Backend(m) => crate::error::CoreError::Backend(m),
        }
    }
}

/// A row's optimistic-concurrency revision counter (`spec.md` §6.2).
pub type Rev = u64;

/// A consistent, as-of-one-instant view over one zone's policy and key
/// set, taken by [`Persistence::transaction`] (`spec.md` §4.6 step 1,
/// §6.2 "a single pass of the enforcer takes a consistent snapshot").
pub struct ZoneSnapshot {
    pub zone: Zone,
    pub zone_rev: Rev,
    pub policy: Policy,
    pub keys: Vec<KeyData>,
    pub key_revs: foldhash::HashMap<crate::model::key::KeyId, Rev>,
}

/// An in-flight transaction: mutations are buffered in the snapshot and
/// a list of newly-generated keys, then applied by
/// [`Persistence::commit`] as a single optimistic-concurrency-checked
/// unit, or rejected with `Conflict` (`spec.md` §6.2). Holds no reference
/// back to the [`Persistence`] it came from, so it can be a plain
/// `'static` value -- the backend that produced it is the only one that
/// knows how to commit it, which is why `commit` lives on [`Persistence`]
/// rather than on `Transaction` itself.
pub struct Transaction {
    pub snapshot: ZoneSnapshot,
    pub new_keys: Vec<KeyData>,
}

impl Transaction {
    pub fn insert_key(&mut self, key: KeyData) {
        self.new_keys.push(key);
    }
}

/// Typed entities and their CRUD operations, plus the transactional
/// snapshot used by the enforcer (`spec.md` §6.2).
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Whether this backend requires the process-wide "enforcer work
    /// lock" workaround described in `spec.md` §5 "Shared-resource
    /// policy" / `SPEC_FULL.md` §5, as opposed to relying purely on
    /// per-transaction optimistic retry. A property of the backend, not
    /// of the core's design (`spec.md` §9 "Global mutable state").
    fn requires_global_lock(&self) -> bool;

    async fn zone_names(&self) -> Result<Vec<Box<str>>, PersistenceError>;

    /// Take a consistent snapshot of one zone's policy and key set for one
    /// enforcer pass (`spec.md` §4.6 step 1).
    async fn begin(&self, zone_name: &str) -> Result<Transaction, PersistenceError>;

    /// Apply a transaction's buffered mutations as one optimistic-
    /// concurrency-checked unit (`spec.md` §6.2).
    async fn commit(&self, transaction: Transaction) -> Result<(), PersistenceError>;

    async fn list_policies(&self) -> Result<Vec<Policy>, PersistenceError>;
    async fn get_policy(&self, name: &str) -> Result<Policy, PersistenceError>;
    async fn put_policy(&self, policy: Policy) -> Result<(), PersistenceError>;
    async fn delete_policy(&self, name: &str) -> Result<(), PersistenceError>;

    async fn list_zones(&self) -> Result<Vec<Zone>, PersistenceError>;
    async fn add_zone(&self, zone: Zone) -> Result<(), PersistenceError>;
    async fn delete_zone(&self, name: &str) -> Result<(), PersistenceError>;
}
