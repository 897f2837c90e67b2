//! The enforcer state machine: component G of `spec.md` §2, the heart of
//! the coordination engine (`spec.md` §4.6).
//!
//! For each zone, the "enforce" task loads the zone's policy and key set,
//! computes any key deficit, walks every key's per-record-class
//! sub-state machine ([`keystate`]), and emits DS-hook side effects and a
//! `signconf_needs_writing` flag that hands off to [`crate::signer`].

pub mod keystate;

use std::sync::Arc;

use tracing::{info, warn};

use crate::center::Center;
use crate::contracts::dshook::DsHookKind;
use crate::error::CoreError;
use crate::model::key::{DsAtParent, KeyData, KeyId, RecordClass, RecordState};
use crate::model::policy::{KeyRole, Policy};
use crate::model::zone::Zone;
use crate::scheduler::task::{Task, TaskKind, TaskOutcome};

use keystate::{dependency_satisfied, step_record, SafetyMargins, StepEffect};

/// Dispatches one popped [`Task`] to the component that owns its class,
/// translating [`CoreError`]s into the reschedule hints of `spec.md` §4.2
/// per the propagation policy of `spec.md` §7: callbacks never throw
/// across the schedule boundary.
pub async fn run_task(center: &Arc<Center>, task: &Task) -> Result<TaskOutcome, CoreError> {
    match &task.kind {
        TaskKind::Enforce => enforce_zone(center, &task.triple.owner).await,
        TaskKind::HsmKeyGenerate { policy_key_index } => {
            generate_deficit_key(center, &task.triple.owner, *policy_key_index).await
        }
        TaskKind::SignConf | TaskKind::Read | TaskKind::Sign | TaskKind::Write => {
            crate::signer::run_task(center, task).await
        }
    }
}

/// One enforcer pass over a single zone (`spec.md` §4.6).
async fn enforce_zone(center: &Arc<Center>, zone_name: &str) -> Result<TaskOutcome, CoreError> {
    let mut txn = center.persistence.begin(zone_name).await?;
    let now = center.clock.now();
    let margins = SafetyMargins::from_policy(&txn.snapshot.policy);
    let parent_timing = txn.snapshot.policy.parent_timing.clone();

    // Step 2: compute deficits. If any policy-key role is short of its
    // required count (active + standby), schedule an async
    // "hsm-key-generate" task and retry later (`spec.md` §4.6 step 2).
    if let Some(index) = find_key_deficit(&txn.snapshot.policy, &txn.snapshot.keys) {
        schedule_key_generation(center, zone_name, index).await?;
        return Ok(TaskOutcome::Defer);
    }

    // Step 3: walk each key's per-record-class sub-state machine.
    let mut next_wake: Option<i64> = None;
    let mut signconf_needs_writing = false;
    let keys_snapshot = txn.snapshot.keys.clone();

    for idx in 0..txn.snapshot.keys.len() {
        for class in RecordClass::ALL {
            let key_id = txn.snapshot.keys[idx].id;
            if !class.applies_to(txn.snapshot.keys[idx].role) {
                continue;
            }

            let successor = find_successor(&keys_snapshot, key_id, class);
            let successor_state = successor.map(|k| k.record(class).state);
            let successor_ds_seen = successor
                .map(|k| k.ds_at_parent == DsAtParent::Seen)
                .unwrap_or(false);

            // Cross-key dependency gate (`spec.md` §3.5/§8 invariant 6):
            // refuse the transition if a named dependency hasn't reached
            // `omnipresent` in this class yet.
            let deps_ok = txn.snapshot.keys[idx]
                .dependencies
                .iter()
                .filter(|d| d.class == class)
                .all(|d| dependency_satisfied(d, &keys_snapshot));
            if !deps_ok {
                next_wake = earliest(next_wake, now + 1);
                continue;
            }

            let key = &mut txn.snapshot.keys[idx];
            let before = key.record(class).state;
            let effect = step_record(
                key,
                class,
                now,
                &margins,
                &parent_timing,
                successor_state,
                successor_ds_seen,
            );
            let after = key.record(class).state;

            match effect {
                StepEffect::Wait { at } => next_wake = earliest(next_wake, at),
                StepEffect::Moved => {
                    if before != after {
                        signconf_needs_writing |=
                            matches!(class, RecordClass::Dnskey | RecordClass::RrsigDnskey);
                        info!(zone = zone_name, key = key.keytag, ?class, ?before, ?after, "key record transitioned");
                    }
                }
                StepEffect::MovedEmitDsSubmit => {
                    signconf_needs_writing = true;
                    key.ds_at_parent = DsAtParent::Submit;
                    emit_ds_hook(center, DsHookKind::Submit, zone_name, key).await;
                }
                StepEffect::MovedEmitDsRetract => {
                    key.ds_at_parent = DsAtParent::Retract;
                    emit_ds_hook(center, DsHookKind::Retract, zone_name, key).await;
                }
            }
        }
    }

    // Retire fully-hidden keys past their retention safety window
    // (`spec.md` §3.5 "Lifecycle").
    txn.snapshot.keys.retain(|k| !k.fully_retired());

    // Pending-rollover flags force introduction of a fresh key even if
    // lifetime hasn't elapsed (`spec.md` §4.6 "Pending-rollover flags").
    maybe_introduce_rollovers(&mut txn.snapshot.zone, &txn.snapshot.policy, now);

    if signconf_needs_writing {
        txn.snapshot.zone.signconf_needs_writing = true;
    }
    let next_lifetime_boundary = next_policy_key_lifetime_boundary(&txn.snapshot.policy, &keys_snapshot, now);
    next_wake = earliest(next_wake, next_lifetime_boundary);

    center.persistence.commit(txn).await?;

    if signconf_needs_writing {
        let _ = center
            .schedule
            .push(Task::whenever(zone_name, TaskKind::SignConf))
            .await;
    }

    match next_wake {
        Some(t) => Ok(TaskOutcome::At(t + 1)),
        None => Ok(TaskOutcome::At(crate::clock::WHENEVER)),
    }
}

async fn emit_ds_hook(center: &Arc<Center>, kind: DsHookKind, zone_name: &str, key: &KeyData) {
    let dnskey_rr = format!(
        "{zone_name} IN DNSKEY 257 3 {} <locator:{}>",
        u8::from(key.algorithm),
        key.hsm_key.locator
    );
    if let Err(err) = center.ds_hook.run(kind, zone_name, &dnskey_rr).await {
        warn!(zone = zone_name, ?kind, %err, "ds hook failed, will retry next pass");
    }
}

/// Find the key (if any) whose record class this key's own record class
/// movement is gated on, i.e. the key being introduced to take over the
/// same role while `key_id`'s key is being retired (`spec.md` §3.5
/// "Dependencies").
fn find_successor(keys: &[KeyData], key_id: KeyId, class: RecordClass) -> Option<&KeyData> {
    let retiring = keys.iter().find(|k| k.id == key_id)?;
    keys.iter().find(|k| {
        k.id != key_id
            && k.role == retiring.role
            && k.introducing
            && class.applies_to(k.role)
    })
}

/// Step 2 of `spec.md` §4.6: for each policy-key, is the number of keys
/// already assigned (introducing or fully active) short of what the
/// policy requires (1 active + `standby_count`)? Returns the index of
/// the first short policy-key, if any.
fn find_key_deficit(policy: &Policy, keys: &[KeyData]) -> Option<usize> {
    for (index, policy_key) in policy.keys.iter().enumerate() {
        let required = 1 + policy_key.standby_count as usize;
        let have = keys
            .iter()
            .filter(|k| k.role == policy_key.role && k.introducing)
            .count();
        if have < required {
            return Some(index);
        }
    }
    None
}

async fn schedule_key_generation(
    center: &Arc<Center>,
    zone_name: &str,
    policy_key_index: usize,
) -> Result<(), CoreError> {
    let _ = center
        .schedule
        .push(Task::new(
            zone_name,
            TaskKind::HsmKeyGenerate { policy_key_index },
            center.clock.now(),
        ))
        .await;
    Ok(())
}

/// The "hsm-key-generate" task: asks the keystore for a new key and
/// inserts it into the zone's key set, `hidden`/`introducing` (`spec.md`
/// §4.6 step 2).
async fn generate_deficit_key(
    center: &Arc<Center>,
    zone_name: &str,
    policy_key_index: usize,
) -> Result<TaskOutcome, CoreError> {
    let mut txn = center.persistence.begin(zone_name).await?;
    let Some(policy_key) = txn.snapshot.policy.keys.get(policy_key_index).cloned() else {
        return Ok(TaskOutcome::Success);
    };

    let handle = center
        .keystore
        .generate(&policy_key.repository, policy_key.algorithm, policy_key.bits)
        .await?;

    let now = center.clock.now();
    let next_id = KeyId(
        txn.snapshot
            .keys
            .iter()
            .map(|k| k.id.0)
            .max()
            .unwrap_or(0)
            + 1,
    );

    let key = KeyData {
        id: next_id,
        hsm_key: crate::model::key::HsmKey {
            locator: handle.locator,
            repository: policy_key.repository.clone(),
            backup: crate::model::key::BackupState::RequiredToBeBacked,
        },
        algorithm: policy_key.algorithm,
        bits: policy_key.bits,
        role: policy_key.role,
        keytag: 0,
        inception: now,
        introducing: true,
        ds_at_parent: DsAtParent::Unsubmitted,
        ds: if RecordClass::Ds.applies_to(policy_key.role) {
            crate::model::key::RecordSubState::new(RecordState::Hidden, now, 3600, policy_key.minimize)
        } else {
            crate::model::key::RecordSubState::not_applicable()
        },
        dnskey: crate::model::key::RecordSubState::new(RecordState::Hidden, now, 3600, policy_key.minimize),
        rrsig_dnskey: crate::model::key::RecordSubState::new(RecordState::Hidden, now, 3600, policy_key.minimize),
        rrsig: if RecordClass::Rrsig.applies_to(policy_key.role) {
            crate::model::key::RecordSubState::new(RecordState::Hidden, now, 3600, policy_key.minimize)
        } else {
            crate::model::key::RecordSubState::not_applicable()
        },
        dependencies: vec![],
        rfc5011: policy_key.rfc5011,
    };

    txn.insert_key(key);
    center.persistence.commit(txn).await?;
    info!(zone = zone_name, role = ?policy_key.role, "generated key to fill policy deficit");
    Ok(TaskOutcome::Promptly)
}

/// Apply `roll_*_now` flags by flipping them off and relying on the next
/// enforcer pass's deficit computation to introduce a fresh key, unless
/// the policy-key is `manual_rollover` (`spec.md` §4.6 "Pending-rollover
/// flags").
fn maybe_introduce_rollovers(zone: &mut Zone, policy: &Policy, now: i64) {
    for role in [KeyRole::Ksk, KeyRole::Zsk, KeyRole::Csk] {
        let pending = match role {
            KeyRole::Ksk => zone.roll_ksk_now,
            KeyRole::Zsk => zone.roll_zsk_now,
            KeyRole::Csk => zone.roll_csk_now,
        };
        if !pending {
            continue;
        }
        let manual = policy.key_by_role(role).any(|k| k.manual_rollover);
        if manual {
            continue;
        }
        zone.clear_roll_now(role);
        match role {
            KeyRole::Ksk => zone.next_roll_ksk = Some(now),
            KeyRole::Zsk => zone.next_roll_zsk = Some(now),
            KeyRole::Csk => zone.next_roll_csk = Some(now),
        }
    }
}

/// The earliest moment a policy-key's lifetime next expires, forcing a
/// rollover (`spec.md` §4.6 "Next-wake computation").
fn next_policy_key_lifetime_boundary(policy: &Policy, keys: &[KeyData], now: i64) -> Option<i64> {
    policy
        .keys
        .iter()
        .filter(|pk| !pk.manual_rollover)
        .filter_map(|pk| pk.lifetime)
        .flat_map(|lifetime| {
            keys.iter()
                .filter(move |k| k.introducing)
                .map(move |k| k.inception + lifetime.as_secs() as i64)
        })
        .filter(|&t| t > now)
        .min()
}

fn earliest(a: Option<i64>, b: i64) -> Option<i64> {
    Some(match a {
        Some(a) => a.min(b),
        None => b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::contracts::fakes::{FakeKeystore, FakePersistence, RecordingDsHook};
    use crate::model::policy::{
        DenialPolicy, ParentTiming as PT, PolicyKey, SerialPolicy, SignatureTiming, ZoneTiming,
    };
    use crate::scheduler::fifoq::FifoQueue;
    use crate::scheduler::schedule::Schedule;
    use domain::base::iana::SecAlg;
    use std::str::FromStr;

    fn scenario_a_policy() -> Policy {
        Policy {
            name: "zsk-only".into(),
            signature: SignatureTiming {
                resign: crate::clock::TimeSpan::from_secs(3600),
                refresh: crate::clock::TimeSpan::from_secs(3600),
                jitter: crate::clock::TimeSpan::from_secs(0),
                inception_offset: crate::clock::TimeSpan::from_secs(0),
                validity_default: crate::clock::TimeSpan::from_secs(86400),
                validity_denial: crate::clock::TimeSpan::from_secs(86400),
                validity_keyset: crate::clock::TimeSpan::from_secs(86400),
                max_zone_ttl: crate::clock::TimeSpan::from_secs(86400),
            },
            denial: DenialPolicy::NSec,
            keys: vec![PolicyKey {
                role: KeyRole::Zsk,
                algorithm: SecAlg::ECDSAP256SHA256,
                bits: 256,
                lifetime: Some(crate::clock::TimeSpan::from_secs(7200)),
                repository: "softhsm".into(),
                standby_count: 0,
                rfc5011: false,
                manual_rollover: false,
                minimize: false,
            }],
            zone_timing: ZoneTiming {
                propagation_delay: crate::clock::TimeSpan::from_secs(300),
                soa_ttl: crate::clock::TimeSpan::from_secs(3600),
                soa_minimum: crate::clock::TimeSpan::from_secs(3600),
                serial_policy: SerialPolicy::Counter,
            },
            parent_timing: PT {
                registration_delay: crate::clock::TimeSpan::from_secs(0),
                propagation_delay: crate::clock::TimeSpan::from_secs(0),
                ds_ttl: crate::clock::TimeSpan::from_secs(0),
                parent_soa_ttl: crate::clock::TimeSpan::from_secs(0),
                parent_soa_minimum: crate::clock::TimeSpan::from_secs(0),
            },
            publish_safety: crate::clock::TimeSpan::from_secs(0),
            retire_safety: crate::clock::TimeSpan::from_secs(0),
        }
    }

    struct Harness {
        center: Arc<Center>,
        clock: Arc<FakeClock>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(FakeClock::new(0));
        let persistence = Arc::new(FakePersistence::new());
        persistence.seed_policy(scenario_a_policy());
        let zone = Zone {
            name: domain::base::Name::from_str("example.com.").unwrap(),
            policy_id: "zsk-only".into(),
            input_adapter: crate::model::zone::InputAdapter::File("/tmp/in.zone".into()),
            output_adapter: crate::model::zone::OutputAdapter::File("/tmp/out.zone".into()),
            signconf_path: "/tmp/signconf.xml".into(),
            signconf_needs_writing: false,
            roll_ksk_now: false,
            roll_zsk_now: false,
            roll_csk_now: false,
            next_roll_ksk: None,
            next_roll_zsk: None,
            next_roll_csk: None,
            ttl_end_ds: 0,
            ttl_end_dk: 0,
            ttl_end_rs: 0,
            input_serial: None,
            outbound_serial: None,
            next_resalt: None,
        };
        persistence.seed_zone(zone, vec![]);

        let center = Center::for_tests(
            clock.clone(),
            persistence,
            Arc::new(FakeKeystore::new()),
            Arc::new(RecordingDsHook::new()),
            Arc::new(Schedule::new()),
            Arc::new(FifoQueue::new()),
        );
        Harness { center, clock }
    }

    #[tokio::test]
    async fn scenario_a_cold_start_generates_and_schedules() {
        let h = harness();
        let outcome = enforce_zone(&h.center, "example.com.").await.unwrap();
        // Deficit found (no ZSK yet); the pass defers while
        // hsm-key-generate runs.
        assert_eq!(outcome, TaskOutcome::Defer);

        // Drain the generated task.
        let task = h
            .center
            .schedule
            .pop_due(h.clock.as_ref(), None)
            .await
            .unwrap();
        let outcome = run_task(&h.center, &task).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Promptly);

        // Next pass: the ZSK exists, so DNSKEY moves to rumoured.
        let outcome = enforce_zone(&h.center, "example.com.").await.unwrap();
        let txn = h.center.persistence.begin("example.com.").await.unwrap();
        assert_eq!(txn.snapshot.keys.len(), 1);
        assert_eq!(txn.snapshot.keys[0].dnskey.state, RecordState::Rumoured);
        // next wake = ttl(3600) + propagation_delay(300) + 1 = 3901
        assert_eq!(outcome, TaskOutcome::At(3901));
    }

    #[tokio::test]
    async fn scenario_a_full_propagation_to_omnipresent() {
        let h = harness();
        enforce_zone(&h.center, "example.com.").await.unwrap();
        let task = h.center.schedule.pop_due(h.clock.as_ref(), None).await.unwrap();
        run_task(&h.center, &task).await.unwrap();
        enforce_zone(&h.center, "example.com.").await.unwrap();

        h.clock.set(3900);
        enforce_zone(&h.center, "example.com.").await.unwrap();
        let txn = h.center.persistence.begin("example.com.").await.unwrap();
        assert_eq!(txn.snapshot.keys[0].dnskey.state, RecordState::Omnipresent);
        assert_eq!(txn.snapshot.keys[0].rrsig.state, RecordState::Rumoured);
    }
}
