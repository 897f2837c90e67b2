//! The four-step signer driver: render a zone's signing configuration,
//! read its unsigned contents in, sign changed RRsets, and write the
//! signed zone back out.
//!
//! The teacher's own zone-signer unit builds on `domain`'s in-process
//! signing engine (`SigningKey`/`KeySet`/`sign_sorted_zone_records`),
//! which assumes the signer holds private key material directly. This
//! daemon's keys live behind an HSM-shaped `Keystore` contract that only
//! ever hands back a signature for data it is given, so RRSIGs are
//! assembled by hand here: build the to-be-signed octets per RFC 4034
//! §3.1.8.1, call `Keystore::sign`, and wrap the result in an `Rrsig`
//! record. The denial-of-existence chain itself (NSEC or NSEC3, see
//! [`denial`]) is still built by handing `domain`'s own zone signer an
//! empty key set, the same trick the teacher uses to separate "generate
//! denial records" from "generate RRSIGs".

pub mod denial;

use std::sync::Arc;

use bytes::Bytes;
use domain::base::iana::Class;
use domain::base::{Record, Rtype, Serial, Ttl};
use domain::rdata::{Dnskey, Rrsig, Soa, ZoneRecordData};
use domain::zonetree::{StoredName, StoredRecord};
use tracing::{debug, info, warn};

use crate::center::Center;
use crate::contracts::keystore::KeyHandle;
use crate::error::CoreError;
use crate::model::key::{KeyData, RecordClass, RecordState};
use crate::model::policy::{Policy, SerialPolicy};
use crate::model::zone::{InputAdapter, OutputAdapter};
use crate::scheduler::task::{Task, TaskKind, TaskOutcome};
use crate::scheduler::worker_pool::SignJob;

/// Dispatches one of the four signer-class task kinds. Called only for
/// `TaskKind::{SignConf, Read, Sign, Write}`; every other kind is handled
/// by [`crate::enforcer`].
pub async fn run_task(center: &Arc<Center>, task: &Task) -> Result<TaskOutcome, CoreError> {
    let owner = &task.triple.owner;
    match &task.kind {
        TaskKind::SignConf => render_signconf(center, owner).await,
        TaskKind::Read => read_zone(center, owner).await,
        TaskKind::Sign => fan_out_sign(center, owner).await,
        TaskKind::Write => write_zone(center, owner).await,
        other => unreachable!("signer::run_task called with non-signer task kind {other:?}"),
    }
}

/// Render the zone's policy and active key set to `signconf_path`, then
/// hand off to the `Read` step.
async fn render_signconf(center: &Arc<Center>, owner: &str) -> Result<TaskOutcome, CoreError> {
    let mut txn = center.persistence.begin(owner).await?;

    let doc = SignConfDocument {
        policy: txn.snapshot.policy.name.clone(),
        denial: format!("{:?}", txn.snapshot.policy.denial),
        keys: txn
            .snapshot
            .keys
            .iter()
            .map(|k| SignConfKey {
                role: k.role,
                keytag: k.keytag,
                algorithm: k.algorithm,
                active: matches!(
                    k.dnskey.state,
                    RecordState::Rumoured | RecordState::Omnipresent
                ),
            })
            .collect(),
    };
    let rendered =
        toml::to_string_pretty(&doc).map_err(|e| CoreError::Assert(format!("rendering signconf: {e}")))?;
    crate::util::write_file(&txn.snapshot.zone.signconf_path, rendered.as_bytes())?;

    txn.snapshot.zone.signconf_needs_writing = false;
    center.persistence.commit(txn).await?;

    let _ = center.schedule.push(Task::whenever(owner, TaskKind::Read)).await;
    Ok(TaskOutcome::Success)
}

#[derive(Debug, serde::Serialize)]
struct SignConfDocument {
    policy: Box<str>,
    denial: String,
    keys: Vec<SignConfKey>,
}

#[derive(Debug, serde::Serialize)]
struct SignConfKey {
    role: crate::model::policy::KeyRole,
    keytag: u16,
    algorithm: domain::base::iana::SecAlg,
    active: bool,
}

/// Read the zone's unsigned contents in via its input adapter, apply the
/// outbound SOA serial policy, and stage the result for signing.
async fn read_zone(center: &Arc<Center>, owner: &str) -> Result<TaskOutcome, CoreError> {
    let mut txn = center.persistence.begin(owner).await?;

    let mut records = match &txn.snapshot.zone.input_adapter {
        InputAdapter::File(path) => {
            crate::contracts::zonefile::read_zonefile(path, &txn.snapshot.zone.name)?
        }
        InputAdapter::Dns { .. } => {
            return Err(CoreError::Config(
                "the DNS input adapter is not supported by this build".into(),
            ));
        }
    };

    let mut soa_index = None;
    let mut current_serial = 0u32;
    for (i, record) in records.iter().enumerate() {
        if let ZoneRecordData::Soa(soa) = record.data() {
            current_serial = u32::from(soa.serial());
            soa_index = Some(i);
            break;
        }
    }

    let now = center.clock.now();
    let new_serial = compute_outbound_serial(
        &txn.snapshot.policy,
        current_serial,
        txn.snapshot.zone.outbound_serial,
        now,
    );

    if let Some(i) = soa_index {
        if let ZoneRecordData::Soa(soa) = records[i].data().clone() {
            let owner_name = records[i].owner().clone();
            let ttl = records[i].ttl();
            let new_soa = Soa::new(
                soa.mname().clone(),
                soa.rname().clone(),
                Serial::from(new_serial),
                soa.refresh(),
                soa.retry(),
                soa.expire(),
                soa.minimum(),
            );
            records[i] = Record::new(owner_name, Class::IN, ttl, ZoneRecordData::Soa(new_soa));
        }
    }

    txn.snapshot.zone.input_serial = Some(current_serial);
    txn.snapshot.zone.outbound_serial = Some(new_serial);
    center.persistence.commit(txn).await?;

    center
        .unsigned
        .lock()
        .unwrap()
        .insert(owner.into(), (records, new_serial));

    let _ = center.schedule.push(Task::whenever(owner, TaskKind::Sign)).await;
    Ok(TaskOutcome::Success)
}

/// The zone's serial under its configured policy, bumped past `previous`
/// (the last serial actually written out) if the naturally-derived value
/// would not sort strictly after it.
fn compute_outbound_serial(policy: &Policy, current: u32, previous: Option<u32>, now: i64) -> u32 {
    let bump = |candidate: Serial| -> Serial {
        match previous.map(Serial::from) {
            Some(prev) if candidate <= prev => prev.add(1),
            _ => candidate,
        }
    };

    let serial = match policy.zone_timing.serial_policy {
        SerialPolicy::Keep => return current,
        SerialPolicy::Counter => bump(Serial::from(current)),
        SerialPolicy::UnixTime => bump(Serial::from(now as u32)),
        SerialPolicy::DateCounter => {
            let date_value = jiff::Timestamp::from_second(now)
                .map(|ts| ts.to_zoned(jiff::tz::TimeZone::UTC))
                .map(|z| ((z.year() as u32 * 100 + z.month() as u32) * 100 + z.day() as u32) * 100)
                .unwrap_or(current);
            bump(Serial::from(date_value))
        }
    };
    u32::from(serial)
}

/// Fan out one `SignJob` per distinct RRset owner onto the FIFO queue,
/// synthesizing DNSKEY records for every active key first, and block
/// until every subtask reports in.
async fn fan_out_sign(center: &Arc<Center>, owner: &str) -> Result<TaskOutcome, CoreError> {
    let txn = center.persistence.begin(owner).await?;
    let apex = txn.snapshot.zone.name.clone();

    let mut records = {
        let unsigned = center.unsigned.lock().unwrap();
        unsigned
            .get(owner)
            .map(|(records, _serial)| records.clone())
            .ok_or_else(|| CoreError::Config(format!("no unsigned records staged for zone {owner}")))?
    };

    for key in &txn.snapshot.keys {
        if matches!(
            key.dnskey.state,
            RecordState::Rumoured | RecordState::Omnipresent
        ) {
            records.push(build_dnskey_record(center, &apex, key).await?);
        }
    }

    let mut owners: Vec<StoredName> = Vec::new();
    for record in &records {
        if !owners.contains(record.owner()) {
            owners.push(record.owner().clone());
        }
    }

    {
        let mut unsigned = center.unsigned.lock().unwrap();
        if let Some(entry) = unsigned.get_mut(owner) {
            entry.0 = records;
        }
    }

    let submitter = center.next_submitter();
    let mut tries = 0u32;
    for rrset_owner in &owners {
        let job = SignJob {
            zone: owner.into(),
            rrset_owner: rrset_owner.fmt_with_dot().to_string().into_boxed_str(),
        };
        center.fifoq.push(job, submitter, &mut tries).await;
    }

    let failed = center.fifoq.wait_for(submitter, owners.len() as u64).await;
    if failed > 0 {
        warn!(zone = owner, failed, "some RRsets failed to sign, deferring the zone");
        return Ok(TaskOutcome::Defer);
    }

    center.persistence.commit(txn).await?;
    let _ = center.schedule.push(Task::whenever(owner, TaskKind::Write)).await;
    Ok(TaskOutcome::Success)
}

/// Sign every RRset at one owner name, popped from the FIFO queue by a
/// worker. Stages its output in [`Center::signed`] for the `Write` step
/// to collect once every subtask for the zone has reported in.
pub async fn sign_one(center: &Arc<Center>, job: &SignJob) -> Result<(), CoreError> {
    // Read-only: the transaction is never committed back, it only carries
    // the active key set this subtask needs to pick a signer.
    let txn = center.persistence.begin(&job.zone).await?;
    let apex = txn.snapshot.zone.name.clone();

    let records: Vec<StoredRecord> = {
        let unsigned = center.unsigned.lock().unwrap();
        let Some((records, _serial)) = unsigned.get(&*job.zone) else {
            return Err(CoreError::Config(format!(
                "no unsigned records staged for zone {}",
                job.zone
            )));
        };
        records
            .iter()
            .filter(|r| r.owner().fmt_with_dot().to_string() == *job.rrset_owner)
            .cloned()
            .collect()
    };
    if records.is_empty() {
        return Ok(());
    }

    let mut by_type: std::collections::BTreeMap<Rtype, Vec<StoredRecord>> =
        std::collections::BTreeMap::new();
    for record in &records {
        by_type.entry(record.rtype()).or_default().push(record.clone());
    }

    let mut signed_records = records;
    for (rtype, rrset) in by_type {
        if rtype == Rtype::RRSIG {
            continue;
        }
        let Some(signing_key) = select_key(&txn.snapshot.keys, rtype) else {
            debug!(zone = %job.zone, %rtype, "no active signing key for this record class, leaving unsigned");
            continue;
        };
        let rrsig = sign_rrset(center, &apex, signing_key, rtype, &rrset, &txn.snapshot.policy).await?;
        signed_records.push(rrsig);
    }

    let mut signed = center.signed.lock().unwrap();
    let entry = signed.entry(job.zone.clone()).or_insert_with(|| (Vec::new(), 0));
    entry.0.extend(signed_records);
    Ok(())
}

/// Build the denial-of-existence chain, sign it, and write the fully
/// signed zone out via its output adapter.
async fn write_zone(center: &Arc<Center>, owner: &str) -> Result<TaskOutcome, CoreError> {
    let txn = center.persistence.begin(owner).await?;
    let apex = txn.snapshot.zone.name.clone();
    let policy = txn.snapshot.policy.clone();

    let (mut records, serial) = {
        let mut signed = center.signed.lock().unwrap();
        signed
            .remove(owner)
            .ok_or_else(|| CoreError::Config(format!("no signed records staged for zone {owner}")))?
    };

    let before = records.len();
    denial::build_chain(&policy.denial, &apex, &mut records)
        .map_err(|e| CoreError::Assert(format!("building denial chain: {e}")))?;

    let new_denial: Vec<StoredRecord> = records[before..].to_vec();
    for denial_record in &new_denial {
        let Some(signing_key) = select_key(&txn.snapshot.keys, denial_record.rtype()) else {
            continue;
        };
        let rrsig = sign_rrset(
            center,
            &apex,
            signing_key,
            denial_record.rtype(),
            std::slice::from_ref(denial_record),
            &policy,
        )
        .await?;
        records.push(rrsig);
    }

    match &txn.snapshot.zone.output_adapter {
        OutputAdapter::File(path) => {
            crate::contracts::zonefile::write_zonefile(path, &records)?;
        }
        OutputAdapter::Dns { .. } => {
            return Err(CoreError::Config(
                "the DNS output adapter is not supported by this build".into(),
            ));
        }
    }

    info!(zone = owner, serial, "wrote signed zone");
    center.persistence.commit(txn).await?;
    Ok(TaskOutcome::Success)
}

/// The active key carrying the given record class for `rtype`: `Rrsig`
/// (ZSK/CSK only) for ordinary RRsets, `RrsigDnskey` (any role) for the
/// DNSKEY RRset.
fn select_key(keys: &[KeyData], rtype: Rtype) -> Option<&KeyData> {
    let class = if rtype == Rtype::DNSKEY {
        RecordClass::RrsigDnskey
    } else {
        RecordClass::Rrsig
    };
    keys.iter().find(|k| {
        class.applies_to(k.role)
            && matches!(
                k.record(class).state,
                RecordState::Rumoured | RecordState::Omnipresent
            )
    })
}

async fn build_dnskey_record(
    center: &Center,
    apex: &StoredName,
    key: &KeyData,
) -> Result<StoredRecord, CoreError> {
    let handle = KeyHandle {
        locator: key.hsm_key.locator.clone(),
    };
    let public_key = center.keystore.public_key(&handle).await?;
    let flags = match key.role {
        crate::model::policy::KeyRole::Zsk => 256,
        crate::model::policy::KeyRole::Ksk | crate::model::policy::KeyRole::Csk => 257,
    };
    let dnskey = Dnskey::new(flags, 3, key.algorithm, Bytes::from(public_key));
    let ttl = Ttl::from_secs(key.dnskey.ttl);
    Ok(Record::new(apex.clone(), Class::IN, ttl, ZoneRecordData::Dnskey(dnskey)))
}

/// Assemble the RFC 4034 §3.1.8.1 signing octets for one RRset and turn
/// the keystore's raw signature into an `RRSIG` record.
async fn sign_rrset(
    center: &Center,
    zone_name: &StoredName,
    signing_key: &KeyData,
    rtype: Rtype,
    rrset: &[StoredRecord],
    policy: &Policy,
) -> Result<StoredRecord, CoreError> {
    let now = center.clock.now();
    let inception = Serial::from(
        now.saturating_sub(policy.signature.inception_offset.duration().as_secs() as i64)
            .max(0) as u32,
    );
    let validity = match rtype {
        Rtype::NSEC | Rtype::NSEC3 => policy.signature.validity_denial.duration(),
        Rtype::DNSKEY => policy.signature.validity_keyset.duration(),
        _ => policy.signature.validity_default.duration(),
    };
    let expiration = Serial::from(now.saturating_add(validity.as_secs() as i64) as u32);

    let owner = rrset[0].owner().clone();
    let ttl = rrset[0].ttl();
    let labels = label_count(&owner);

    let mut sorted_rrset = rrset.to_vec();
    sorted_rrset.sort_by(|a, b| a.data().to_string().cmp(&b.data().to_string()));

    let mut to_sign = Vec::new();
    let unsigned_rrsig = Rrsig::new(
        rtype,
        signing_key.algorithm,
        labels,
        ttl.as_secs(),
        expiration,
        inception,
        signing_key.keytag,
        zone_name.clone(),
        Bytes::new(),
    );
    unsigned_rrsig
        .compose_canonical(&mut to_sign)
        .expect("composing into a Vec never fails");
    for record in &sorted_rrset {
        record
            .compose_canonical(&mut to_sign)
            .expect("composing into a Vec never fails");
    }

    let handle = KeyHandle {
        locator: signing_key.hsm_key.locator.clone(),
    };
    let signature = center.keystore.sign(&handle, &to_sign).await?;

    let rrsig = Rrsig::new(
        rtype,
        signing_key.algorithm,
        labels,
        ttl.as_secs(),
        expiration,
        inception,
        signing_key.keytag,
        zone_name.clone(),
        Bytes::from(signature),
    );
    Ok(Record::new(owner, Class::IN, ttl, ZoneRecordData::Rrsig(rrsig)))
}

/// The RRSIG `labels` field: the signed name's label count, excluding the
/// root label (RFC 4034 §3.1.3).
fn label_count(name: &StoredName) -> u8 {
    name.iter_labels().count().saturating_sub(1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_count_excludes_root() {
        let name: StoredName = "www.example.com.".parse().unwrap();
        assert_eq!(label_count(&name), 3);
    }

    #[test]
    fn counter_policy_bumps_past_previous_serial() {
        let policy_json = r#"{
            "name": "test",
            "signature": {"resign": "PT1H", "refresh": "PT1H", "jitter": "PT1H",
                "inception_offset": "PT1H", "validity_default": "P1D",
                "validity_denial": "P1D", "validity_keyset": "P1D", "max_zone_ttl": "P1D"},
            "denial": "NSec",
            "keys": [],
            "zone_timing": {"propagation_delay": "PT1H", "soa_ttl": "PT1H",
                "soa_minimum": "PT1H", "serial_policy": "Counter"},
            "parent_timing": {"registration_delay": "PT1H", "propagation_delay": "PT1H",
                "ds_ttl": "PT1H", "parent_soa_ttl": "PT1H", "parent_soa_minimum": "PT1H"},
            "publish_safety": "PT1H", "retire_safety": "PT1H"
        }"#;
        let policy: Policy = serde_json::from_str(policy_json).unwrap();
        assert_eq!(compute_outbound_serial(&policy, 5, Some(10), 0), 11);
        assert_eq!(compute_outbound_serial(&policy, 20, Some(10), 0), 20);
    }
}
