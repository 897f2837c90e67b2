//! The HTTP control API: `spec.md` §6.3's operator command surface
//! (`queue`, `flush`, `zone`, `policy`, `key`, `backup`, `update`) as an
//! `axum` router, grounded on the teacher's `src/units/http_server.rs`
//! request/response shape. The wire types themselves live in
//! `keystone-api` so `keystonectl` can depend on them without depending
//! on this whole daemon crate.

use std::fmt;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use keystone_api as api;
use tracing::info;

use crate::center::Center;
use crate::contracts::persistence::PersistenceError;
use crate::error::CoreError;
use crate::model::key::{BackupState, DsAtParent, KeyData, RecordState};
use crate::model::policy::KeyRole;
use crate::model::zone::{InputAdapter, OutputAdapter, Zone};
use crate::scheduler::task::{Task, TaskClass, TaskKind, TaskType, Triple};

pub fn router(center: Arc<Center>) -> Router {
    Router::new()
        .route("/queue", get(queue_list))
        .route("/flush", post(flush))
        .route("/zone/list", get(zone_list))
        .route("/zone/add", post(zone_add))
        .route("/zone/delete", post(zone_delete))
        .route("/policy/list", get(policy_list))
        .route("/policy/import", post(policy_import))
        .route("/policy/purge", post(policy_purge))
        .route("/key/list", get(key_list))
        .route("/key/generate", post(key_generate))
        .route("/key/import", post(key_import))
        .route("/key/export", get(key_export))
        .route("/key/ds", post(key_ds_update))
        .route("/key/rollover", post(key_rollover))
        .route("/key/purge", post(key_purge))
        .route("/backup/list", get(backup_list))
        .route("/backup/prepare", post(backup_prepare))
        .route("/backup/commit", post(backup_commit))
        .route("/backup/rollback", post(backup_rollback))
        .route("/update", post(update))
        .with_state(center)
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<api::ApiError>)>;

fn core_error(e: impl Into<CoreError>) -> (StatusCode, Json<api::ApiError>) {
    let e = e.into();
    let kind = match &e {
        CoreError::Assert(_) => api::ErrorKind::Assert,
        CoreError::Config(_) => api::ErrorKind::Config,
        CoreError::Backend(_) => api::ErrorKind::Backend,
        CoreError::Conflict(_) => api::ErrorKind::Conflict,
        CoreError::NotFound(_) => api::ErrorKind::NotFound,
        CoreError::Io(_) | CoreError::Unchanged(_) => api::ErrorKind::Io,
    };
    let status = match kind {
        api::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        api::ErrorKind::Conflict => StatusCode::CONFLICT,
        api::ErrorKind::Config => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(api::ApiError {
            kind,
            message: e.to_string().into_boxed_str(),
        }),
    )
}

fn api_error(
    status: StatusCode,
    kind: api::ErrorKind,
    message: impl fmt::Display,
) -> (StatusCode, Json<api::ApiError>) {
    (
        status,
        Json(api::ApiError {
            kind,
            message: message.to_string().into_boxed_str(),
        }),
    )
}

//----------- queue / flush ---------------------------------------------------

async fn queue_list(State(center): State<Arc<Center>>) -> Json<api::QueueListResult> {
    let tasks = center
        .schedule
        .queue()
        .await
        .into_iter()
        .map(|t| api::TaskInfo {
            owner: t.triple.owner.clone(),
            class: t.triple.class.to_string().into_boxed_str(),
            ty: t.triple.ty.to_string().into_boxed_str(),
            due_date: t.due_date,
            backoff: t.backoff,
        })
        .collect();
    Json(api::QueueListResult { tasks })
}

async fn flush(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::FlushRequest>,
) -> Json<api::FlushResult> {
    let ty = req.ty.and_then(|t| match &*t {
        "enforce" => Some(TaskType::Enforce),
        "hsm-key-generate" => Some(TaskType::HsmKeyGenerate),
        "signconf" => Some(TaskType::SignConf),
        "read" => Some(TaskType::Read),
        "sign" => Some(TaskType::Sign),
        "write" => Some(TaskType::Write),
        _ => None,
    });
    let before = center.schedule.len().await;
    center.schedule.flush(ty).await;
    info!("operator flushed the schedule");
    Json(api::FlushResult { flushed: before })
}

//----------- zone -------------------------------------------------------------

async fn zone_list(State(center): State<Arc<Center>>) -> ApiResult<api::ZoneListResult> {
    let zones = center.persistence.list_zones().await.map_err(core_error)?;
    let mut entries = Vec::with_capacity(zones.len());
    for zone in zones {
        let owner = zone.owner();
        let key_count = center
            .persistence
            .begin(&owner)
            .await
            .map(|t| t.snapshot.keys.len())
            .unwrap_or(0);
        entries.push(api::ZoneListEntry {
            name: owner.into_boxed_str(),
            policy: zone.policy_id.clone(),
            key_count,
            signconf_needs_writing: zone.signconf_needs_writing,
        });
    }
    Ok(Json(api::ZoneListResult { zones: entries }))
}

async fn zone_add(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::ZoneAdd>,
) -> ApiResult<()> {
    let already_exists = center
        .persistence
        .list_zones()
        .await
        .map_err(core_error)?
        .iter()
        .any(|z| z.owner() == *req.name);
    if already_exists {
        return Err(api_error(
            StatusCode::CONFLICT,
            api::ErrorKind::Conflict,
            api::ZoneAddError::AlreadyExists,
        ));
    }
    if center.persistence.get_policy(&req.policy).await.is_err() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            api::ErrorKind::Config,
            api::ZoneAddError::NoSuchPolicy,
        ));
    }

    let (input_adapter, output_adapter) = match req.source {
        api::ZoneSource::Zonefile { path } => (
            InputAdapter::File(path.as_ref().into()),
            OutputAdapter::File(format!("{path}.signed").into()),
        ),
        api::ZoneSource::Dns { addr } => (InputAdapter::Dns { addr }, OutputAdapter::Dns { addr }),
    };

    let name: domain::zonetree::StoredName = req
        .name
        .parse()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, api::ErrorKind::Config, e))?;
    let owner = req.name.clone();
    let zone = Zone {
        name,
        policy_id: req.policy,
        input_adapter,
        output_adapter,
        signconf_path: format!("/var/lib/keystoned/signconf/{owner}.xml").into(),
        signconf_needs_writing: true,
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
    center.persistence.add_zone(zone).await.map_err(core_error)?;
    let _ = center
        .schedule
        .push(Task::new(owner, TaskKind::Enforce, center.clock.now()))
        .await;
    Ok(Json(()))
}

async fn zone_delete(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::ZoneDelete>,
) -> ApiResult<()> {
    center.persistence.delete_zone(&req.name).await.map_err(core_error)?;
    center.schedule.cancel_all(&req.name).await;
    Ok(Json(()))
}

//----------- policy ------------------------------------------------------------

async fn policy_list(State(center): State<Arc<Center>>) -> ApiResult<api::PolicyListResult> {
    let policies = center
        .persistence
        .list_policies()
        .await
        .map_err(core_error)?
        .into_iter()
        .map(|p| p.name)
        .collect();
    Ok(Json(api::PolicyListResult { policies }))
}

async fn policy_import(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::PolicyImport>,
) -> ApiResult<()> {
    let mut policy: crate::model::policy::Policy = toml::from_str(&req.toml).map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            api::ErrorKind::Config,
            api::PolicyImportError::Parse(e.to_string().into_boxed_str()),
        )
    })?;
    policy.name = req.name;
    center.persistence.put_policy(policy).await.map_err(core_error)?;
    Ok(Json(()))
}

async fn policy_purge(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::PolicyPurge>,
) -> ApiResult<()> {
    let zones = center.persistence.list_zones().await.map_err(core_error)?;
    let in_use: Vec<Box<str>> = zones
        .iter()
        .filter(|z| z.policy_id == req.name)
        .map(|z| z.owner().into_boxed_str())
        .collect();
    if !in_use.is_empty() {
        return Err(api_error(
            StatusCode::CONFLICT,
            api::ErrorKind::Conflict,
            api::PolicyPurgeError::InUse { zones: in_use },
        ));
    }
    center.persistence.delete_policy(&req.name).await.map_err(core_error)?;
    Ok(Json(()))
}

//----------- key ---------------------------------------------------------------

fn key_info(k: &KeyData) -> api::KeyInfo {
    api::KeyInfo {
        keytag: k.keytag,
        role: match k.role {
            KeyRole::Ksk => api::KeyRoleInfo::Ksk,
            KeyRole::Zsk => api::KeyRoleInfo::Zsk,
            KeyRole::Csk => api::KeyRoleInfo::Csk,
        },
        locator: k.hsm_key.locator.clone(),
        introducing: k.introducing,
        ds_at_parent: match k.ds_at_parent {
            DsAtParent::Unsubmitted => api::DsAtParentInfo::Unsubmitted,
            DsAtParent::Submit => api::DsAtParentInfo::Submit,
            DsAtParent::Submitted => api::DsAtParentInfo::Submitted,
            DsAtParent::Seen => api::DsAtParentInfo::Seen,
            DsAtParent::Retract => api::DsAtParentInfo::Retract,
            DsAtParent::Retracted => api::DsAtParentInfo::Retracted,
        },
        ds: record_state_info(k.ds.state),
        dnskey: record_state_info(k.dnskey.state),
        rrsig_dnskey: record_state_info(k.rrsig_dnskey.state),
        rrsig: record_state_info(k.rrsig.state),
    }
}

fn record_state_info(s: RecordState) -> api::RecordStateInfo {
    match s {
        RecordState::Hidden => api::RecordStateInfo::Hidden,
        RecordState::Rumoured => api::RecordStateInfo::Rumoured,
        RecordState::Omnipresent => api::RecordStateInfo::Omnipresent,
        RecordState::Unretentive => api::RecordStateInfo::Unretentive,
        RecordState::Na => api::RecordStateInfo::Na,
    }
}

async fn key_list(
    State(center): State<Arc<Center>>,
    Query(q): Query<api::KeyListQuery>,
) -> ApiResult<api::KeyListResult> {
    let txn = center.persistence.begin(&q.zone).await.map_err(core_error)?;
    let keys = txn.snapshot.keys.iter().map(key_info).collect();
    Ok(Json(api::KeyListResult { keys }))
}

async fn key_generate(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::KeyGenerate>,
) -> ApiResult<api::KeyGenerateResult> {
    let mut txn = center.persistence.begin(&req.zone).await.map_err(core_error)?;
    let role = match req.role {
        api::KeyRoleInfo::Ksk => KeyRole::Ksk,
        api::KeyRoleInfo::Zsk => KeyRole::Zsk,
        api::KeyRoleInfo::Csk => KeyRole::Csk,
    };
    let policy_key = txn
        .snapshot
        .policy
        .key_by_role(role)
        .next()
        .cloned()
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                api::ErrorKind::Config,
                "zone's policy defines no key of that role",
            )
        })?;

    let handle = center
        .keystore
        .generate(&policy_key.repository, policy_key.algorithm, policy_key.bits)
        .await
        .map_err(core_error)?;
    let now = center.clock.now();
    let next_id = crate::model::key::KeyId(
        txn.snapshot.keys.iter().map(|k| k.id.0).max().unwrap_or(0) + 1,
    );
    let key = KeyData {
        id: next_id,
        hsm_key: crate::model::key::HsmKey {
            locator: handle.locator.clone(),
            repository: policy_key.repository.clone(),
            backup: BackupState::RequiredToBeBacked,
        },
        algorithm: policy_key.algorithm,
        bits: policy_key.bits,
        role,
        keytag: 0,
        inception: now,
        introducing: true,
        ds_at_parent: DsAtParent::Unsubmitted,
        ds: init_substate(crate::model::key::RecordClass::Ds, role, now, policy_key.minimize),
        dnskey: init_substate(crate::model::key::RecordClass::Dnskey, role, now, policy_key.minimize),
        rrsig_dnskey: init_substate(
            crate::model::key::RecordClass::RrsigDnskey,
            role,
            now,
            policy_key.minimize,
        ),
        rrsig: init_substate(crate::model::key::RecordClass::Rrsig, role, now, policy_key.minimize),
        dependencies: vec![],
        rfc5011: policy_key.rfc5011,
    };
    let locator = handle.locator;
    txn.insert_key(key);
    center.persistence.commit(txn).await.map_err(core_error)?;
    Ok(Json(api::KeyGenerateResult { locator }))
}

fn init_substate(
    class: crate::model::key::RecordClass,
    role: KeyRole,
    now: i64,
    minimize: bool,
) -> crate::model::key::RecordSubState {
    if class.applies_to(role) {
        crate::model::key::RecordSubState::new(RecordState::Hidden, now, 3600, minimize)
    } else {
        crate::model::key::RecordSubState::not_applicable()
    }
}

/// `key import`: adopt a key that already exists in the keystore (e.g.
/// provisioned out of band on the HSM) rather than generating a fresh one.
async fn key_import(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::KeyImport>,
) -> ApiResult<()> {
    let handle = center
        .keystore
        .find_by_locator(&req.locator)
        .await
        .map_err(core_error)?
        .ok_or_else(|| core_error(CoreError::NotFound("no such key in keystore".into())))?;

    let mut txn = center.persistence.begin(&req.zone).await.map_err(core_error)?;
    let role = match req.role {
        api::KeyRoleInfo::Ksk => KeyRole::Ksk,
        api::KeyRoleInfo::Zsk => KeyRole::Zsk,
        api::KeyRoleInfo::Csk => KeyRole::Csk,
    };
    let policy_key = txn
        .snapshot
        .policy
        .key_by_role(role)
        .next()
        .cloned()
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                api::ErrorKind::Config,
                "zone's policy defines no key of that role",
            )
        })?;
    let now = center.clock.now();
    let next_id = crate::model::key::KeyId(
        txn.snapshot.keys.iter().map(|k| k.id.0).max().unwrap_or(0) + 1,
    );
    let key = KeyData {
        id: next_id,
        hsm_key: crate::model::key::HsmKey {
            locator: handle.locator,
            repository: policy_key.repository.clone(),
            backup: BackupState::RequiredToBeBacked,
        },
        algorithm: policy_key.algorithm,
        bits: policy_key.bits,
        role,
        keytag: 0,
        inception: now,
        introducing: true,
        ds_at_parent: DsAtParent::Unsubmitted,
        ds: init_substate(crate::model::key::RecordClass::Ds, role, now, policy_key.minimize),
        dnskey: init_substate(crate::model::key::RecordClass::Dnskey, role, now, policy_key.minimize),
        rrsig_dnskey: init_substate(
            crate::model::key::RecordClass::RrsigDnskey,
            role,
            now,
            policy_key.minimize,
        ),
        rrsig: init_substate(crate::model::key::RecordClass::Rrsig, role, now, policy_key.minimize),
        dependencies: vec![],
        rfc5011: policy_key.rfc5011,
    };
    txn.insert_key(key);
    center.persistence.commit(txn).await.map_err(core_error)?;
    wake_enforcer(&center, &req.zone).await;
    Ok(Json(()))
}

async fn key_export(
    State(center): State<Arc<Center>>,
    Query(q): Query<api::KeyExportQuery>,
) -> ApiResult<api::KeyExportResult> {
    let txn = center.persistence.begin(&q.zone).await.map_err(core_error)?;
    let key = find_key(&txn.snapshot.keys, q.keytag).map_err(core_error)?;
    let handle = center
        .keystore
        .find_by_locator(&key.hsm_key.locator)
        .await
        .map_err(core_error)?
        .ok_or_else(|| core_error(CoreError::NotFound("key handle vanished from keystore".into())))?;
    let public_key = center.keystore.public_key(&handle).await.map_err(core_error)?;
    let dnskey_rr = format!(
        "{} IN DNSKEY 257 3 {} {}",
        q.zone,
        key.algorithm.into_int(),
        base64_encode(&public_key)
    );
    Ok(Json(api::KeyExportResult {
        dnskey_rr: dnskey_rr.into_boxed_str(),
    }))
}

fn base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
        let n = (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32;
        out.push(ALPHABET[(n >> 18 & 0x3f) as usize] as char);
        out.push(ALPHABET[(n >> 12 & 0x3f) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[(n >> 6 & 0x3f) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(n & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}

fn find_key(keys: &[KeyData], keytag: u16) -> Result<&KeyData, CoreError> {
    keys.iter()
        .find(|k| k.keytag == keytag)
        .ok_or_else(|| CoreError::NotFound(format!("no key with tag {keytag}")))
}

async fn key_ds_update(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::KeyDsUpdate>,
) -> ApiResult<()> {
    let mut txn = center.persistence.begin(&req.zone).await.map_err(core_error)?;
    let key = txn
        .snapshot
        .keys
        .iter_mut()
        .find(|k| k.keytag == req.keytag)
        .ok_or_else(|| core_error(CoreError::NotFound(format!("no key with tag {}", req.keytag))))?;
    key.ds_at_parent = match req.observation {
        api::DsObservation::Submit => DsAtParent::Submit,
        api::DsObservation::Seen => DsAtParent::Seen,
        api::DsObservation::Retract => DsAtParent::Retract,
        api::DsObservation::Gone => DsAtParent::Retracted,
    };
    center.persistence.commit(txn).await.map_err(core_error)?;
    wake_enforcer(&center, &req.zone).await;
    Ok(Json(()))
}

async fn key_rollover(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::KeyRollover>,
) -> ApiResult<()> {
    let mut txn = center.persistence.begin(&req.zone).await.map_err(core_error)?;
    match req.role {
        api::RolloverRole::Ksk => txn.snapshot.zone.roll_ksk_now = true,
        api::RolloverRole::Zsk => txn.snapshot.zone.roll_zsk_now = true,
        api::RolloverRole::Csk => txn.snapshot.zone.roll_csk_now = true,
    }
    center.persistence.commit(txn).await.map_err(core_error)?;
    wake_enforcer(&center, &req.zone).await;
    Ok(Json(()))
}

async fn key_purge(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::KeyPurge>,
) -> ApiResult<()> {
    let mut txn = center.persistence.begin(&req.zone).await.map_err(core_error)?;
    let key = find_key(&txn.snapshot.keys, req.keytag).map_err(core_error)?;
    if !key.fully_retired() {
        return Err(core_error(CoreError::Conflict(
            "key has not fully retired yet".into(),
        )));
    }
    let handle = crate::contracts::keystore::KeyHandle {
        locator: key.hsm_key.locator.clone(),
    };
    center.keystore.remove(&handle).await.map_err(core_error)?;
    txn.snapshot.keys.retain(|k| k.keytag != req.keytag);
    center.persistence.commit(txn).await.map_err(core_error)?;
    Ok(Json(()))
}

/// Operator-triggered state changes (`ds-*`, `rollover`) should take
/// effect on the next pass rather than waiting out the current backoff;
/// cancel and re-push the zone's `enforce` task at `now` to get there.
async fn wake_enforcer(center: &Arc<Center>, owner: &str) {
    let triple = Triple::new(owner, TaskClass::Enforcer, TaskType::Enforce);
    center.schedule.cancel(&triple).await;
    let _ = center
        .schedule
        .push(Task::new(owner, TaskKind::Enforce, center.clock.now()))
        .await;
}

//----------- backup --------------------------------------------------------------

async fn backup_list(
    State(center): State<Arc<Center>>,
    Query(q): Query<api::BackupRepositorySelect>,
) -> ApiResult<api::BackupListResult> {
    let mut entries = Vec::new();
    for zone in center.persistence.list_zones().await.map_err(core_error)? {
        let owner = zone.owner();
        let Ok(txn) = center.persistence.begin(&owner).await else {
            continue;
        };
        for key in &txn.snapshot.keys {
            if let Some(repo) = &q.repository {
                if key.hsm_key.repository != *repo {
                    continue;
                }
            }
            let state = match key.hsm_key.backup {
                BackupState::NotRequired => continue,
                BackupState::RequiredToBeBacked => api::BackupStateInfo::RequiredToBeBacked,
                BackupState::Requested => api::BackupStateInfo::Requested,
                BackupState::Done => api::BackupStateInfo::Done,
            };
            entries.push(api::BackupListEntry {
                zone: owner.clone().into_boxed_str(),
                keytag: key.keytag,
                locator: key.hsm_key.locator.clone(),
                state,
            });
        }
    }
    Ok(Json(api::BackupListResult { keys: entries }))
}

async fn backup_transition(
    center: &Arc<Center>,
    repository: Option<&str>,
    from: impl Fn(BackupState) -> bool,
    to: BackupState,
) -> Result<usize, PersistenceError> {
    let mut changed = 0;
    for zone in center.persistence.list_zones().await? {
        let owner = zone.owner();
        let mut txn = center.persistence.begin(&owner).await?;
        let mut any = false;
        for key in &mut txn.snapshot.keys {
            if let Some(repo) = repository {
                if &*key.hsm_key.repository != repo {
                    continue;
                }
            }
            if from(key.hsm_key.backup) {
                key.hsm_key.backup = to;
                any = true;
                changed += 1;
            }
        }
        if any {
            center.persistence.commit(txn).await?;
        }
    }
    Ok(changed)
}

async fn backup_prepare(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::BackupRepositorySelect>,
) -> ApiResult<api::BackupChangeResult> {
    let changed = backup_transition(
        &center,
        req.repository.as_deref(),
        |s| s == BackupState::RequiredToBeBacked,
        BackupState::Requested,
    )
    .await
    .map_err(core_error)?;
    Ok(Json(api::BackupChangeResult { changed }))
}

async fn backup_commit(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::BackupRepositorySelect>,
) -> ApiResult<api::BackupChangeResult> {
    let changed = backup_transition(
        &center,
        req.repository.as_deref(),
        |s| s == BackupState::Requested,
        BackupState::Done,
    )
    .await
    .map_err(core_error)?;
    Ok(Json(api::BackupChangeResult { changed }))
}

async fn backup_rollback(
    State(center): State<Arc<Center>>,
    Json(req): Json<api::BackupRepositorySelect>,
) -> ApiResult<api::BackupChangeResult> {
    let changed = backup_transition(
        &center,
        req.repository.as_deref(),
        |s| s == BackupState::Requested,
        BackupState::RequiredToBeBacked,
    )
    .await
    .map_err(core_error)?;
    Ok(Json(api::BackupChangeResult { changed }))
}

//----------- update --------------------------------------------------------------

/// `update conf|kasp|zonelist|all` (`spec.md` §6.3): re-reads configuration
/// sources on operator demand. This daemon loads policies/zones through
/// the `Persistence` contract rather than watching files directly
/// (DESIGN.md, Component F), so "update" here means: re-evaluate every
/// zone's policy against its current key set and wake the enforcer for
/// every zone.
async fn update(
    State(center): State<Arc<Center>>,
    Json(target): Json<api::UpdateTarget>,
) -> ApiResult<api::UpdateResult> {
    let zones = center.persistence.list_zones().await.map_err(core_error)?;
    let mut zones_changed = 0;
    for zone in &zones {
        wake_enforcer(&center, &zone.owner()).await;
        zones_changed += 1;
    }
    let policies_changed = match target {
        api::UpdateTarget::Conf | api::UpdateTarget::All => {
            center.persistence.list_policies().await.map_err(core_error)?.len()
        }
        _ => 0,
    };
    Ok(Json(api::UpdateResult {
        policies_changed,
        zones_changed,
    }))
}
