//! In-memory fakes for [`Keystore`] and [`Persistence`], standing in for
//! the HSM and database external collaborators in tests (`spec.md` §8,
//! `SPEC_FULL.md` §8).

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use domain::base::iana::SecAlg;

use crate::contracts::keystore::{KeyHandle, Keystore, KeystoreError};
use crate::contracts::persistence::{Persistence, PersistenceError, Transaction, ZoneSnapshot};
use crate::model::key::KeyData;
use crate::model::policy::Policy;
use crate::model::zone::Zone;

/// An in-memory keystore: `generate` allocates a fresh locator and hands
/// back deterministic "signatures" (the data, reversed) so tests can
/// assert on round-tripping without real cryptography.
pub struct FakeKeystore {
    next_id: StdMutex<u64>,
}

impl FakeKeystore {
    pub fn new() -> Self {
        Self {
            next_id: StdMutex::new(0),
        }
    }
}

impl Default for FakeKeystore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Keystore for FakeKeystore {
    async fn initialize(&self) -> Result<(), KeystoreError> {
        Ok(())
    }

    async fn finalize(&self) -> Result<(), KeystoreError> {
        Ok(())
    }

    async fn generate(
        &self,
        repository: &str,
        algorithm: SecAlg,
        bits: u16,
    ) -> Result<KeyHandle, KeystoreError> {
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        Ok(KeyHandle {
            locator: format!("{repository}-{algorithm}-{bits}-{id}").into_boxed_str(),
        })
    }

    async fn find_by_locator(&self, locator: &str) -> Result<Option<KeyHandle>, KeystoreError> {
        Ok(Some(KeyHandle {
            locator: locator.into(),
        }))
    }

    async fn public_key(&self, key: &KeyHandle) -> Result<Vec<u8>, KeystoreError> {
        Ok(key.locator.as_bytes().to_vec())
    }

    async fn sign(&self, _key: &KeyHandle, data: &[u8]) -> Result<Vec<u8>, KeystoreError> {
        Ok(data.iter().rev().copied().collect())
    }

    async fn remove(&self, _key: &KeyHandle) -> Result<(), KeystoreError> {
        Ok(())
    }

    async fn random_bytes(&self, n: usize) -> Result<Vec<u8>, KeystoreError> {
        Ok(vec![0x42; n])
    }
}

struct FakeState {
    policies: foldhash::HashMap<Box<str>, Policy>,
    zones: foldhash::HashMap<Box<str>, Zone>,
    keys: foldhash::HashMap<Box<str>, Vec<KeyData>>,
}

/// An in-memory persistence layer, consistent-snapshot transactions
/// included, backed by a single `std::sync::Mutex` (so it never needs the
/// global-lock workaround -- `requires_global_lock` returns `false`).
pub struct FakePersistence {
    state: StdMutex<FakeState>,
}

impl FakePersistence {
    pub fn new() -> Self {
        Self {
            state: StdMutex::new(FakeState {
                policies: foldhash::HashMap::default(),
                zones: foldhash::HashMap::default(),
                keys: foldhash::HashMap::default(),
            }),
        }
    }

    pub fn seed_policy(&self, policy: Policy) {
        self.state
            .lock()
            .unwrap()
            .policies
            .insert(policy.name.clone(), policy);
    }

    pub fn seed_zone(&self, zone: Zone, keys: Vec<KeyData>) {
        let mut state = self.state.lock().unwrap();
        let owner = zone.owner().into_boxed_str();
        state.zones.insert(owner.clone(), zone);
        state.keys.insert(owner, keys);
    }
}

impl Default for FakePersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Persistence for FakePersistence {
    fn requires_global_lock(&self) -> bool {
        false
    }

    async fn zone_names(&self) -> Result<Vec<Box<str>>, PersistenceError> {
        Ok(self.state.lock().unwrap().zones.keys().cloned().collect())
    }

    async fn begin(&self, zone_name: &str) -> Result<Transaction, PersistenceError> {
        let state = self.state.lock().unwrap();
        let zone = state
            .zones
            .get(zone_name)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(zone_name.to_string()))?;
        let policy = state
            .policies
            .get(&zone.policy_id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(zone.policy_id.to_string()))?;
        let keys = state.keys.get(zone_name).cloned().unwrap_or_default();
        drop(state);

        let snapshot = ZoneSnapshot {
            zone,
            zone_rev: 0,
            policy,
            keys,
            key_revs: foldhash::HashMap::default(),
        };
        Ok(Transaction {
            snapshot,
            new_keys: Vec::new(),
        })
    }

    async fn commit(&self, transaction: Transaction) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().unwrap();
        let owner = transaction.snapshot.zone.owner().into_boxed_str();
        state.zones.insert(owner.clone(), transaction.snapshot.zone);
        let mut keys = transaction.snapshot.keys;
        keys.extend(transaction.new_keys);
        state.keys.insert(owner, keys);
        Ok(())
    }

    async fn list_policies(&self) -> Result<Vec<Policy>, PersistenceError> {
        Ok(self.state.lock().unwrap().policies.values().cloned().collect())
    }

    async fn get_policy(&self, name: &str) -> Result<Policy, PersistenceError> {
        self.state
            .lock()
            .unwrap()
            .policies
            .get(name)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(name.to_string()))
    }

    async fn put_policy(&self, policy: Policy) -> Result<(), PersistenceError> {
        self.state.lock().unwrap().policies.insert(policy.name.clone(), policy);
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> Result<(), PersistenceError> {
        self.state.lock().unwrap().policies.remove(name);
        Ok(())
    }

    async fn list_zones(&self) -> Result<Vec<Zone>, PersistenceError> {
        Ok(self.state.lock().unwrap().zones.values().cloned().collect())
    }

    async fn add_zone(&self, zone: Zone) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().unwrap();
        let owner = zone.owner().into_boxed_str();
        state.zones.insert(owner.clone(), zone);
        state.keys.entry(owner).or_default();
        Ok(())
    }

    async fn delete_zone(&self, name: &str) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().unwrap();
        state.zones.remove(name);
        state.keys.remove(name);
        Ok(())
    }
}

/// A fake [`crate::contracts::DsHook`] recording every invocation, for
/// assertions in enforcer tests.
pub struct RecordingDsHook {
    pub calls: StdMutex<Vec<(crate::contracts::dshook::DsHookKind, String)>>,
}

impl RecordingDsHook {
    pub fn new() -> Self {
        Self {
            calls: StdMutex::new(Vec::new()),
        }
    }
}

impl Default for RecordingDsHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::contracts::DsHook for RecordingDsHook {
    async fn run(
        &self,
        kind: crate::contracts::dshook::DsHookKind,
        zone: &str,
        _dnskey_rr: &str,
    ) -> Result<(), crate::error::CoreError> {
        self.calls.lock().unwrap().push((kind, zone.to_string()));
        Ok(())
    }
}
