//! Narrow trait contracts for the core's external collaborators
//! (`spec.md` §6): the HSM keystore, the persistence layer, zone I/O, and
//! the DS-submit/retract hook. The core only ever talks to these traits;
//! concrete adaptors (a real PKCS#11 keystore, a real database, on-disk
//! zone files) are out of scope for this crate (`spec.md` §1 "Out of
//! scope") and are supplied by callers.

pub mod dshook;
pub mod keystore;
pub mod persistence;
pub mod zonefile;
pub mod zoneview;

#[cfg(any(test, feature = "test-fakes"))]
pub mod fakes;

pub use dshook::DsHook;
pub use keystore::{Keystore, KeystoreError};
pub use persistence::{Persistence, PersistenceError};
pub use zoneview::ZoneView;
