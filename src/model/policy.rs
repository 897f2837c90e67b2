//! Per-zone policy: the immutable-during-one-enforcer-pass template that
//! drives key generation, timing, and denial-of-existence. See `spec.md`
//! §3.4.
//!
//! Grounded on `examples/NLnetLabs-cascade/src/policy/mod.rs`
//! (`KeyManagerPolicy`, `SignerPolicy`, `KeyParameters`, `DsAlgorithm`),
//! generalized to the field set `spec.md` names and stripped of the
//! teacher's file-watching reload machinery (policies are loaded through
//! the `Persistence` contract here, not read off disk directly by this
//! crate).

use std::fmt;
use std::time::Duration;

use domain::base::iana::SecAlg;
use serde::{Deserialize, Serialize};

use crate::clock::TimeSpan;

/// The role a policy-key plays in the zone's trust chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyRole {
    /// Key-Signing Key: signs the DNSKEY RRset, published at the parent as a DS.
    Ksk,
    /// Zone-Signing Key: signs all other RRsets in the zone.
    Zsk,
    /// Combined-Signing Key: plays both roles at once.
    Csk,
}

/// A template describing how many keys of a given role must exist and how
/// they are to be generated and rolled over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyKey {
    pub role: KeyRole,
    pub algorithm: SecAlg,
    pub bits: u16,
    /// `None` means the key is never rolled over on a timer (still subject
    /// to `roll_*_now` and operator-triggered rollover).
    pub lifetime: Option<TimeSpan>,
    pub repository: Box<str>,
    pub standby_count: u32,
    /// RFC 5011 trust-anchor rollover: a successor's DNSKEY is introduced
    /// on the `omnipresent` track rather than `rumoured`, observing the
    /// hold-down timer rather than ordinary propagation admissibility.
    pub rfc5011: bool,
    /// Suppresses automatic introduction of a successor key on lifetime
    /// expiry; an operator must roll the key explicitly.
    pub manual_rollover: bool,
    /// Minimize the time records are present that are not strictly needed
    /// (shortens the `rumoured`/`unretentive` windows where safe).
    pub minimize: bool,
}

/// NSEC3 hash parameters, sans the GLOSSARY's "resalt interval", which is
/// zone-state (see [`crate::model::zone::Zone::next_resalt`]), not policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Nsec3Params {
    pub algorithm: u8,
    pub iterations: u16,
    pub salt_length: u8,
    pub resalt_interval: TimeSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DenialPolicy {
    NSec,
    NSec3 { opt_out: bool, params: Nsec3Params },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialPolicy {
    Keep,
    Counter,
    UnixTime,
    DateCounter,
}

impl fmt::Display for SerialPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Keep => "keep",
            Self::Counter => "counter",
            Self::UnixTime => "unixtime",
            Self::DateCounter => "datecounter",
        })
    }
}

/// Signature timing policy (`spec.md` §3.4 "Signature timing").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureTiming {
    pub resign: TimeSpan,
    pub refresh: TimeSpan,
    pub jitter: TimeSpan,
    pub inception_offset: TimeSpan,
    pub validity_default: TimeSpan,
    pub validity_denial: TimeSpan,
    pub validity_keyset: TimeSpan,
    pub max_zone_ttl: TimeSpan,
}

/// Zone-side timing: propagation delay and SOA handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneTiming {
    pub propagation_delay: TimeSpan,
    pub soa_ttl: TimeSpan,
    pub soa_minimum: TimeSpan,
    pub serial_policy: SerialPolicy,
}

/// Parent-side timing: how long it takes a DS change to be observable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentTiming {
    pub registration_delay: TimeSpan,
    pub propagation_delay: TimeSpan,
    pub ds_ttl: TimeSpan,
    pub parent_soa_ttl: TimeSpan,
    pub parent_soa_minimum: TimeSpan,
}

impl ParentTiming {
    /// Total admissibility window for a DS record to be considered
    /// `omnipresent` once it has been `seen` at the parent: the parent's
    /// own propagation plus the registration delay, folded into the same
    /// `last_change + ttl + propagation_delay + safety` shape the record
    /// sub-state machine uses for every other record class.
    pub fn admissibility_window(&self) -> Duration {
        self.ds_ttl.duration() + self.propagation_delay.duration() + self.registration_delay.duration()
    }
}

/// A fully resolved, immutable-for-one-pass policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub name: Box<str>,
    pub signature: SignatureTiming,
    pub denial: DenialPolicy,
    pub keys: Vec<PolicyKey>,
    pub zone_timing: ZoneTiming,
    pub parent_timing: ParentTiming,
    /// Safety margin added on top of `ttl + propagation_delay` before a
    /// newly-published record may be considered fully propagated.
    pub publish_safety: TimeSpan,
    /// Safety margin added on top of `ttl + propagation_delay` before a
    /// withdrawn record's residual caches may be considered expired.
    pub retire_safety: TimeSpan,
}

impl Policy {
    pub fn key_by_role(&self, role: KeyRole) -> impl Iterator<Item = &PolicyKey> {
        self.keys.iter().filter(move |k| k.role == role)
    }
}
