//! Per-key instance data and the per-record-class sub-state machine that
//! the enforcer drives. See `spec.md` §3.5, supplemented from
//! `examples/original_source/enforcer-ng` with the `hsm_key` linkage and
//! backup lifecycle (DESIGN.md, Component F).

use domain::base::iana::SecAlg;
use serde::{Deserialize, Serialize};

use crate::model::policy::KeyRole;

/// A stable, process-local identifier for a [`KeyData`] row. Stands in for
/// the database primary key; an arena index rather than a pointer, per
/// `spec.md` §9's note on cyclic/shared ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId(pub u64);

/// The DNSSEC record classes a key participates in. `RrsigDnskey` covers
/// the signature over the DNSKEY RRset (every key contributes); `Rrsig`
/// (signatures over ordinary RRsets) applies only to keys with a ZSK role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordClass {
    Ds,
    Dnskey,
    RrsigDnskey,
    Rrsig,
}

impl RecordClass {
    pub const ALL: [RecordClass; 4] = [
        RecordClass::Ds,
        RecordClass::Dnskey,
        RecordClass::RrsigDnskey,
        RecordClass::Rrsig,
    ];

    /// Whether this record class even exists for the given role; `Rrsig`
    /// (ordinary RRset signatures) only applies to ZSK/CSK roles.
    pub fn applies_to(self, role: KeyRole) -> bool {
        match self {
            RecordClass::Rrsig => matches!(role, KeyRole::Zsk | KeyRole::Csk),
            _ => true,
        }
    }
}

/// A record's propagation phase. `Na` ("not applicable") is a fifth value
/// used only for record classes that do not apply to a key's role -- it is
/// never a transition target, so the monotone ordering in `spec.md` §8
/// invariant 5 is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordState {
    Hidden,
    Rumoured,
    Omnipresent,
    Unretentive,
    Na,
}

/// One record class's sub-state: `(state, last_change, ttl, minimize)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecordSubState {
    pub state: RecordState,
    /// Wall-clock seconds at which `state` last changed.
    pub last_change: i64,
    /// TTL in force for this record class at the time of the last change
    /// (policy TTLs can change between passes; admissibility windows use
    /// the TTL that was actually published).
    pub ttl: u32,
    pub minimize: bool,
}

impl RecordSubState {
    pub fn not_applicable() -> Self {
        Self {
            state: RecordState::Na,
            last_change: 0,
            ttl: 0,
            minimize: false,
        }
    }

    pub fn new(state: RecordState, now: i64, ttl: u32, minimize: bool) -> Self {
        Self {
            state,
            last_change: now,
            ttl,
            minimize,
        }
    }
}

/// How far along the DS record is at the parent, as last observed (or
/// commanded) by the operator. See `spec.md` §3.5 and §6.3 `key ds-*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DsAtParent {
    Unsubmitted,
    Submit,
    Submitted,
    Seen,
    Retract,
    Retracted,
}

/// The lifecycle of a key's backup at the keystore, per `spec.md` §6.3
/// `backup list|prepare|commit|rollback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupState {
    NotRequired,
    RequiredToBeBacked,
    Requested,
    Done,
}

/// Linkage to the keystore-side key object, supplemented from the original
/// `enforcer-ng` schema's `hsm_key` table (DESIGN.md, Component F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HsmKey {
    pub locator: Box<str>,
    pub repository: Box<str>,
    pub backup: BackupState,
}

/// A key instance within a zone, and the state machines that govern its
/// introduction and retirement. See `spec.md` §3.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyData {
    pub id: KeyId,
    pub hsm_key: HsmKey,
    pub algorithm: SecAlg,
    pub bits: u16,
    pub role: KeyRole,
    pub keytag: u16,
    pub inception: i64,
    /// `true` while the key is being brought into service; `false` once it
    /// is being withdrawn. Drives which direction `hidden -> ... -> hidden`
    /// the record sub-states are expected to move.
    pub introducing: bool,
    pub ds_at_parent: DsAtParent,
    pub ds: RecordSubState,
    pub dnskey: RecordSubState,
    pub rrsig_dnskey: RecordSubState,
    pub rrsig: RecordSubState,
    /// Keys whose movement in a given record class must precede this key's
    /// own movement in that class (`spec.md` §3.5 "Dependencies", §8
    /// invariant 6).
    pub dependencies: Vec<KeyDependency>,
    /// Copied from the generating `PolicyKey.rfc5011` at creation time.
    /// When set, this key's DNSKEY sub-state skips the `rumoured`
    /// admissibility window and is introduced straight onto the
    /// `omnipresent` track, per RFC 5011 automated trust anchor rollover
    /// (`spec.md` §4.6). See `enforcer::keystate::step_record`.
    pub rfc5011: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeyDependency {
    pub on: KeyId,
    pub class: RecordClass,
}

impl KeyData {
    pub fn record(&self, class: RecordClass) -> RecordSubState {
        match class {
            RecordClass::Ds => self.ds,
            RecordClass::Dnskey => self.dnskey,
            RecordClass::RrsigDnskey => self.rrsig_dnskey,
            RecordClass::Rrsig => self.rrsig,
        }
    }

    pub fn record_mut(&mut self, class: RecordClass) -> &mut RecordSubState {
        match class {
            RecordClass::Ds => &mut self.ds,
            RecordClass::Dnskey => &mut self.dnskey,
            RecordClass::RrsigDnskey => &mut self.rrsig_dnskey,
            RecordClass::Rrsig => &mut self.rrsig,
        }
    }

    /// A key is eligible for removal once every applicable record class has
    /// reached `hidden` (or `na`) and stayed there past the retention
    /// safety window -- `spec.md` §3.5 "Lifecycle".
    pub fn fully_retired(&self) -> bool {
        RecordClass::ALL
            .iter()
            .filter(|c| c.applies_to(self.role))
            .all(|&c| matches!(self.record(c).state, RecordState::Hidden))
    }
}
