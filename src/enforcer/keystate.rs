//! The per-record-class sub-state machine: admissibility windows,
//! cross-key dependencies, and the transition table. See `spec.md` §4.6.
//!
//! Grounded on `examples/original_source/enforcer-ng` keystate logic
//! (`libhsm`/`keystate.c` family) for the `hidden -> rumoured ->
//! omnipresent -> unretentive -> hidden` cycle and its admissibility
//! conditions, and supplemented with RFC-5011 handling per `SPEC_FULL.md`
//! §4 (a `rfc5011`-flagged policy-key's successor enters on the
//! `omnipresent` track rather than `rumoured`).

use crate::model::key::{DsAtParent, KeyData, KeyDependency, RecordClass, RecordState, RecordSubState};
use crate::model::policy::{ParentTiming, Policy};

/// One requested mutation to a key's record sub-state, or a DS-hook side
/// effect, produced by [`step_record`] (`spec.md` §4.6 "Side effects").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEffect {
    /// No transition is admissible yet; `at` is the wall-clock second at
    /// which it next might be (used to compute the enforcer's next wake).
    Wait { at: i64 },
    /// Transition happened; no side effect beyond the state change.
    Moved,
    /// Transition happened, and the DS-submit command should fire.
    MovedEmitDsSubmit,
    /// Transition happened, and the DS-retract command should fire.
    MovedEmitDsRetract,
}

/// Safety margins added on top of `ttl + propagation_delay` before a
/// transition is admissible (`spec.md` §4.6 "Admissibility").
#[derive(Debug, Clone, Copy)]
pub struct SafetyMargins {
    pub publish_safety: u64,
    pub retire_safety: u64,
    pub propagation_delay: u64,
}

impl SafetyMargins {
    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            publish_safety: policy.publish_safety.as_secs(),
            retire_safety: policy.retire_safety.as_secs(),
            propagation_delay: policy.zone_timing.propagation_delay.as_secs(),
        }
    }
}

/// Whether `now` has reached the admissibility boundary for leaving
/// `from` in the given direction: `rumoured -> omnipresent` needs
/// `now >= last_change + ttl + propagation_delay + publish_safety`;
/// `unretentive -> hidden` needs the same shape with `retire_safety`
/// (`spec.md` §4.6 "Admissibility").
fn admissible_at(sub: &RecordSubState, safety: u64, margins: &SafetyMargins) -> i64 {
    sub.last_change + sub.ttl as i64 + margins.propagation_delay as i64 + safety as i64
}

/// Advance one key's one record-class sub-state by at most one step,
/// honoring admissibility, DS-at-parent observation, and the successor
/// dependency rule (`spec.md` §4.6 "Cross-key dependency").
///
/// `successor_state` is the same record class's state on the key that
/// depends on this one moving (`spec.md` §3.5 "Dependencies"); `None` if
/// no key depends on this one in this class.
#[allow(clippy::too_many_arguments)]
pub fn step_record(
    key: &mut KeyData,
    class: RecordClass,
    now: i64,
    margins: &SafetyMargins,
    parent_timing: &ParentTiming,
    successor_state: Option<RecordState>,
    successor_ds_seen: bool,
) -> StepEffect {
    if !class.applies_to(key.role) {
        return StepEffect::Moved;
    }

    let sub = key.record(class);
    match sub.state {
        RecordState::Na => StepEffect::Moved,

        RecordState::Hidden if key.introducing && key.rfc5011 && class == RecordClass::Dnskey => {
            // RFC 5011 automated trust anchor rollover: this policy-key's
            // successor DNSKEY is already trusted by validators running
            // the hold-down timer, so it is introduced directly on the
            // omnipresent track rather than waiting out the ordinary
            // rumoured admissibility window.
            *key.record_mut(class) = RecordSubState::new(RecordState::Omnipresent, now, sub.ttl, sub.minimize);
            StepEffect::Moved
        }

        RecordState::Hidden if key.introducing => {
            // hidden -> rumoured: publish immediately, no admissibility
            // window (the record simply starts existing).
            *key.record_mut(class) = RecordSubState::new(RecordState::Rumoured, now, sub.ttl, sub.minimize);
            if class == RecordClass::Ds {
                StepEffect::MovedEmitDsSubmit
            } else {
                StepEffect::Moved
            }
        }

        RecordState::Rumoured => {
            if class == RecordClass::Ds {
                if key.ds_at_parent != DsAtParent::Seen {
                    return StepEffect::Wait { at: now };
                }
            }
            let boundary = if class == RecordClass::Ds {
                key.record(class).last_change + parent_timing.admissibility_window().as_secs() as i64
            } else {
                admissible_at(&sub, margins.publish_safety, margins)
            };
            if now < boundary {
                return StepEffect::Wait { at: boundary };
            }
            *key.record_mut(class) =
                RecordSubState::new(RecordState::Omnipresent, now, sub.ttl, sub.minimize);
            StepEffect::Moved
        }

        RecordState::Omnipresent if !key.introducing => {
            // omnipresent -> unretentive: only once the successor has
            // taken over this record class (`spec.md` §4.6 "Cross-key
            // dependency").
            let successor_ready = match class {
                RecordClass::Ds => successor_ds_seen && successor_state == Some(RecordState::Omnipresent),
                _ => successor_state == Some(RecordState::Omnipresent) || successor_state.is_none(),
            };
            if !successor_ready {
                return StepEffect::Wait { at: now };
            }
            *key.record_mut(class) =
                RecordSubState::new(RecordState::Unretentive, now, sub.ttl, sub.minimize);
            if class == RecordClass::Ds {
                StepEffect::MovedEmitDsRetract
            } else {
                StepEffect::Moved
            }
        }

        RecordState::Unretentive => {
            if class == RecordClass::Ds && key.ds_at_parent != DsAtParent::Retracted {
                return StepEffect::Wait { at: now };
            }
            let boundary = if class == RecordClass::Ds {
                key.record(class).last_change + parent_timing.admissibility_window().as_secs() as i64
            } else {
                admissible_at(&sub, margins.retire_safety, margins)
            };
            if now < boundary {
                return StepEffect::Wait { at: boundary };
            }
            *key.record_mut(class) = RecordSubState::new(RecordState::Hidden, now, sub.ttl, sub.minimize);
            StepEffect::Moved
        }

        // Already stable in its current direction; nothing to do.
        RecordState::Hidden | RecordState::Omnipresent => StepEffect::Moved,
    }
}

/// Whether `dependency` (on `key'`, in `class`) is satisfied, per
/// `spec.md` §8 invariant 6: "`k.dependencies` include `k'` for class `c`
/// implies `k.c.state >= unretentive` implies `k'.c.state == omnipresent`
/// at the moment of transition".
pub fn dependency_satisfied(dependency: &KeyDependency, all_keys: &[KeyData]) -> bool {
    all_keys
        .iter()
        .find(|k| k.id == dependency.on)
        .map(|k| matches!(k.record(dependency.class).state, RecordState::Omnipresent))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::policy::KeyRole;

    fn margins() -> SafetyMargins {
        SafetyMargins {
            publish_safety: 1,
            retire_safety: 1,
            propagation_delay: 300,
        }
    }

    fn parent_timing() -> ParentTiming {
        ParentTiming {
            registration_delay: crate::clock::TimeSpan::from_secs(0),
            propagation_delay: crate::clock::TimeSpan::from_secs(0),
            ds_ttl: crate::clock::TimeSpan::from_secs(0),
            parent_soa_ttl: crate::clock::TimeSpan::from_secs(0),
            parent_soa_minimum: crate::clock::TimeSpan::from_secs(0),
        }
    }

    fn fresh_zsk(now: i64) -> KeyData {
        KeyData {
            id: crate::model::key::KeyId(1),
            hsm_key: crate::model::key::HsmKey {
                locator: "loc-1".into(),
                repository: "repo".into(),
                backup: crate::model::key::BackupState::NotRequired,
            },
            algorithm: domain::base::iana::SecAlg::ECDSAP256SHA256,
            bits: 256,
            role: KeyRole::Zsk,
            keytag: 1234,
            inception: now,
            introducing: true,
            ds_at_parent: DsAtParent::Unsubmitted,
            ds: RecordSubState::not_applicable(),
            dnskey: RecordSubState::new(RecordState::Hidden, now, 3600, false),
            rrsig_dnskey: RecordSubState::new(RecordState::Hidden, now, 3600, false),
            rrsig: RecordSubState::new(RecordState::Hidden, now, 3600, false),
            dependencies: vec![],
            rfc5011: false,
        }
    }

    #[test]
    fn hidden_to_rumoured_is_immediate() {
        let mut key = fresh_zsk(0);
        let effect = step_record(
            &mut key,
            RecordClass::Dnskey,
            0,
            &margins(),
            &parent_timing(),
            None,
            false,
        );
        assert_eq!(effect, StepEffect::Moved);
        assert_eq!(key.dnskey.state, RecordState::Rumoured);
    }

    #[test]
    fn rumoured_waits_for_admissibility_window() {
        let mut key = fresh_zsk(0);
        key.dnskey.state = RecordState::Rumoured;
        key.dnskey.last_change = 0;

        let too_early = step_record(
            &mut key,
            RecordClass::Dnskey,
            100,
            &margins(),
            &parent_timing(),
            None,
            false,
        );
        assert!(matches!(too_early, StepEffect::Wait { .. }));
        assert_eq!(key.dnskey.state, RecordState::Rumoured);

        // ttl(3600) + propagation_delay(300) + publish_safety(1) = 3901
        let on_time = step_record(
            &mut key,
            RecordClass::Dnskey,
            3901,
            &margins(),
            &parent_timing(),
            None,
            false,
        );
        assert_eq!(on_time, StepEffect::Moved);
        assert_eq!(key.dnskey.state, RecordState::Omnipresent);
    }

    #[test]
    fn unretentive_blocks_on_successor_not_ready() {
        let mut key = fresh_zsk(0);
        key.introducing = false;
        key.dnskey.state = RecordState::Omnipresent;
        key.dnskey.last_change = 0;

        let blocked = step_record(
            &mut key,
            RecordClass::Dnskey,
            1_000_000,
            &margins(),
            &parent_timing(),
            Some(RecordState::Rumoured),
            false,
        );
        assert_eq!(blocked, StepEffect::Wait { at: 1_000_000 });
        assert_eq!(key.dnskey.state, RecordState::Omnipresent);

        let unblocked = step_record(
            &mut key,
            RecordClass::Dnskey,
            1_000_000,
            &margins(),
            &parent_timing(),
            Some(RecordState::Omnipresent),
            false,
        );
        assert_eq!(unblocked, StepEffect::Moved);
        assert_eq!(key.dnskey.state, RecordState::Unretentive);
    }

    #[test]
    fn ds_rumoured_requires_parent_seen() {
        let mut key = fresh_zsk(0);
        key.role = KeyRole::Ksk;
        key.ds = RecordSubState::new(RecordState::Rumoured, 0, 3600, false);
        key.ds_at_parent = DsAtParent::Submitted;

        let waiting = step_record(
            &mut key,
            RecordClass::Ds,
            1_000_000,
            &margins(),
            &parent_timing(),
            None,
            false,
        );
        assert!(matches!(waiting, StepEffect::Wait { .. }));

        key.ds_at_parent = DsAtParent::Seen;
        let moved = step_record(
            &mut key,
            RecordClass::Ds,
            1_000_000,
            &margins(),
            &parent_timing(),
            None,
            false,
        );
        assert_eq!(moved, StepEffect::Moved);
        assert_eq!(key.ds.state, RecordState::Omnipresent);
    }

    #[test]
    fn rfc5011_key_enters_dnskey_on_omnipresent_track() {
        let mut key = fresh_zsk(0);
        key.rfc5011 = true;

        let effect = step_record(
            &mut key,
            RecordClass::Dnskey,
            0,
            &margins(),
            &parent_timing(),
            None,
            false,
        );
        assert_eq!(effect, StepEffect::Moved);
        assert_eq!(key.dnskey.state, RecordState::Omnipresent);
    }

    #[test]
    fn rfc5011_flag_does_not_affect_ds_introduction() {
        let mut key = fresh_zsk(0);
        key.role = KeyRole::Ksk;
        key.rfc5011 = true;
        key.ds = RecordSubState::new(RecordState::Hidden, 0, 3600, false);

        let effect = step_record(
            &mut key,
            RecordClass::Ds,
            0,
            &margins(),
            &parent_timing(),
            None,
            false,
        );
        assert_eq!(effect, StepEffect::MovedEmitDsSubmit);
        assert_eq!(key.ds.state, RecordState::Rumoured);
    }
}
