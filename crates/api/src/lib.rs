//! Wire types for the operator command surface (`spec.md` §6.3): the
//! request/response bodies `keystoned`'s HTTP control API and
//! `keystonectl` exchange. Shared by both binaries so the CLI and the
//! daemon never drift on a field name, matching how the teacher splits
//! its own API types into `crates/api`.
//!
//! Zones are identified here by their dotted owner name as plain text
//! (`Box<str>`), the same representation `Persistence` keys zones by
//! internally -- there is no need for callers of this wire format to
//! parse or construct a `domain::base::Name`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `(owner, class, type)`, as printed by the `queue` command (`spec.md`
/// §3.1/§6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub owner: Box<str>,
    pub class: Box<str>,
    pub ty: Box<str>,
    pub due_date: i64,
    pub backoff: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueListResult {
    pub tasks: Vec<TaskInfo>,
}

/// `flush [type]` (`spec.md` §6.3): an empty `ty` flushes every task.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlushRequest {
    pub ty: Option<Box<str>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushResult {
    pub flushed: usize,
}

//----------- zone ---------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ZoneSource {
    Zonefile { path: Box<str> },
    Dns { addr: std::net::SocketAddr },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneAdd {
    pub name: Box<str>,
    pub policy: Box<str>,
    pub source: ZoneSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ZoneAddError {
    AlreadyExists,
    NoSuchPolicy,
}

impl fmt::Display for ZoneAddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AlreadyExists => "a zone of this name already exists",
            Self::NoSuchPolicy => "no policy with that name exists",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneListEntry {
    pub name: Box<str>,
    pub policy: Box<str>,
    pub key_count: usize,
    pub signconf_needs_writing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneListResult {
    pub zones: Vec<ZoneListEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneDelete {
    pub name: Box<str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ZoneDeleteError {
    NoSuchZone,
}

impl fmt::Display for ZoneDeleteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no zone of that name is known")
    }
}

//----------- policy --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyListResult {
    pub policies: Vec<Box<str>>,
}

/// `policy import`: the raw TOML document the operator hands to the CLI,
/// forwarded to the daemon verbatim (the daemon, not the CLI, owns
/// parsing it into `crate::model::policy::Policy`, `spec.md` §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyImport {
    pub name: Box<str>,
    pub toml: Box<str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PolicyImportError {
    Parse(Box<str>),
}

impl fmt::Display for PolicyImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(m) => write!(f, "could not parse policy: {m}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyPurge {
    pub name: Box<str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PolicyPurgeError {
    NoSuchPolicy,
    InUse { zones: Vec<Box<str>> },
}

impl fmt::Display for PolicyPurgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchPolicy => f.write_str("no policy of that name exists"),
            Self::InUse { zones } => write!(f, "still in use by {} zone(s)", zones.len()),
        }
    }
}

//----------- key ------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum KeyRoleInfo {
    Ksk,
    Zsk,
    Csk,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum RecordStateInfo {
    Hidden,
    Rumoured,
    Omnipresent,
    Unretentive,
    Na,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum DsAtParentInfo {
    Unsubmitted,
    Submit,
    Submitted,
    Seen,
    Retract,
    Retracted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyInfo {
    pub keytag: u16,
    pub role: KeyRoleInfo,
    pub locator: Box<str>,
    pub introducing: bool,
    pub ds_at_parent: DsAtParentInfo,
    pub ds: RecordStateInfo,
    pub dnskey: RecordStateInfo,
    pub rrsig_dnskey: RecordStateInfo,
    pub rrsig: RecordStateInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyListQuery {
    pub zone: Box<str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyListResult {
    pub keys: Vec<KeyInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyGenerate {
    pub zone: Box<str>,
    pub role: KeyRoleInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyGenerateResult {
    pub locator: Box<str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyExportQuery {
    pub zone: Box<str>,
    pub keytag: u16,
}

/// `key export`: the DNSKEY RR text for one key, suitable for handing to
/// a registrar tool (`spec.md` §6.3 "key ... export").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyExportResult {
    pub dnskey_rr: Box<str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyImport {
    pub zone: Box<str>,
    pub locator: Box<str>,
    pub role: KeyRoleInfo,
}

/// `key ds-submit|ds-seen|ds-retract|ds-gone`: the operator reporting a
/// parent-side DS observation (`spec.md` §3.5 `ds_at_parent`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum DsObservation {
    Submit,
    Seen,
    Retract,
    Gone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyDsUpdate {
    pub zone: Box<str>,
    pub keytag: u16,
    pub observation: DsObservation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum RolloverRole {
    Ksk,
    Zsk,
    Csk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRollover {
    pub zone: Box<str>,
    pub role: RolloverRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPurge {
    pub zone: Box<str>,
    pub keytag: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KeyCommandError {
    NoSuchZone,
    NoSuchKey,
    NotYetRetired,
}

impl fmt::Display for KeyCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoSuchZone => "no zone of that name is known",
            Self::NoSuchKey => "no key with that tag exists in the zone",
            Self::NotYetRetired => "key has not fully retired yet; use --force semantics are not supported",
        })
    }
}

//----------- backup ---------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum BackupStateInfo {
    RequiredToBeBacked,
    Requested,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupListEntry {
    pub zone: Box<str>,
    pub keytag: u16,
    pub locator: Box<str>,
    pub state: BackupStateInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupListResult {
    pub keys: Vec<BackupListEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackupRepositorySelect {
    pub repository: Option<Box<str>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupChangeResult {
    pub changed: usize,
}

//----------- update ---------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum UpdateTarget {
    Conf,
    Kasp,
    Zonelist,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResult {
    pub policies_changed: usize,
    pub zones_changed: usize,
}

//----------- errors as HTTP status -------------------------------------------

/// Maps one `CoreError` kind onto the exit-code taxonomy of `spec.md` §7,
/// so `keystonectl` can report a distinguishable process exit status
/// without depending on `keystoned`'s internal `CoreError` type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ErrorKind {
    Assert,
    Config,
    Backend,
    Conflict,
    NotFound,
    Io,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Assert => 70,
            Self::Config => 78,
            Self::Backend => 69,
            Self::Conflict => 75,
            Self::NotFound => 1,
            Self::Io => 74,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: Box<str>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}
