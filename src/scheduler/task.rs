//! A unit of recurring or one-shot work, identified by the triple
//! `(owner, class, type)`. See `spec.md` §3.1/§4.2.
//!
//! Grounded on `examples/original_source/enforcer-ng/src/scheduler/task.h`
//! and `common/scheduler/task.c` for the field set, generalized per
//! REDESIGN FLAGS (`spec.md` §9 "Dynamic dispatch"): the original's
//! function-pointer callback becomes [`TaskKind`], a sum type over the
//! task kinds this daemon runs, so the state machine is statically
//! exhaustive instead of type-erased.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::clock::WHENEVER;
use crate::model::key::KeyId;

/// Back-off floor and ceiling, in seconds (`spec.md` §3.1).
pub const BACKOFF_MIN: i64 = 60;
pub const BACKOFF_MAX: i64 = 86_400;

/// The class of owner a task runs against; determines locking behavior
/// (`spec.md` §4.2: "a process-wide enforcer lock when `class ==
/// \"enforcer\"`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskClass {
    Enforcer,
    Signer,
}

impl fmt::Display for TaskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enforcer => "enforcer",
            Self::Signer => "signer",
        })
    }
}

/// The specific kind of work within a class. `Whatever` is a lookup
/// wildcard only (`spec.md` §4.2), never the type of a task actually in
/// the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskType {
    Enforce,
    HsmKeyGenerate,
    SignConf,
    Read,
    Sign,
    Write,
    /// Matches any type for the same (owner, class) in cancel/replace
    /// lookups (`spec.md` §4.2).
    Whatever,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enforce => "enforce",
            Self::HsmKeyGenerate => "hsm-key-generate",
            Self::SignConf => "signconf",
            Self::Read => "read",
            Self::Sign => "sign",
            Self::Write => "write",
            Self::Whatever => "*",
        })
    }
}

/// The identity of a task: `(owner, class, type)`. Two tasks with equal
/// triples may never coexist in the schedule (`spec.md` §3.1 invariant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub owner: Box<str>,
    pub class: TaskClass,
    pub ty: TaskType,
}

impl Triple {
    pub fn new(owner: impl Into<Box<str>>, class: TaskClass, ty: TaskType) -> Self {
        Self {
            owner: owner.into(),
            class,
            ty,
        }
    }

    /// True if `other` would match this triple in a cancel/replace lookup,
    /// honoring the `Whatever` type wildcard (`spec.md` §4.2).
    pub fn matches(&self, other: &Triple) -> bool {
        self.owner == other.owner
            && self.class == other.class
            && (self.ty == other.ty || self.ty == TaskType::Whatever || other.ty == TaskType::Whatever)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.class, self.ty)
    }
}

/// The key used to look up the shared per-owner lock: `(owner, class)`,
/// deliberately excluding the type so that tasks with the same owner and
/// class but distinct types still serialize on one lock (`spec.md` §3.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub owner: Box<str>,
    pub class: TaskClass,
}

impl LockKey {
    pub fn for_triple(triple: &Triple) -> Self {
        Self {
            owner: triple.owner.clone(),
            class: triple.class,
        }
    }
}

/// Typed payload for each task kind, replacing the original's
/// `(callback, userdata, freedata)` triple with an exhaustive sum type.
#[derive(Debug, Clone)]
pub enum TaskKind {
    /// Run the enforcer pass for a zone.
    Enforce,
    /// Ask the keystore to generate a key of the given role/algorithm for
    /// a deficit discovered during an enforcer pass.
    HsmKeyGenerate { policy_key_index: usize },
    /// Render the zone's signing configuration document.
    SignConf,
    /// Read the zone's unsigned contents into the in-memory view.
    Read,
    /// Sign changed RRsets (fans out into the FIFO queue).
    Sign,
    /// Write the signed zone out via its output adapter.
    Write,
}

impl TaskKind {
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::Enforce => TaskType::Enforce,
            Self::HsmKeyGenerate { .. } => TaskType::HsmKeyGenerate,
            Self::SignConf => TaskType::SignConf,
            Self::Read => TaskType::Read,
            Self::Sign => TaskType::Sign,
            Self::Write => TaskType::Write,
        }
    }

    pub fn task_class(&self) -> TaskClass {
        match self {
            Self::Enforce | Self::HsmKeyGenerate { .. } => TaskClass::Enforcer,
            Self::SignConf | Self::Read | Self::Sign | Self::Write => TaskClass::Signer,
        }
    }
}

/// The hint a callback returns, interpreted by [`Task::perform`]'s caller
/// into a reschedule decision (`spec.md` §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Destroy the task; it has nothing left to do.
    Success,
    /// Reschedule at `now`.
    Promptly,
    /// Reschedule at the epoch, so it sorts before every other due task.
    Immediately,
    /// Double the backoff (clamped) and reschedule at `now + backoff`.
    Defer,
    /// Reschedule at an explicit wall-clock second.
    At(i64),
}

/// An element of work in the schedule. Carries a reference to the owning
/// key/zone by stable id, never a raw pointer (`spec.md` §9 "Cyclic /
/// shared ownership").
#[derive(Debug, Clone)]
pub struct Task {
    pub triple: Triple,
    pub kind: TaskKind,
    pub due_date: i64,
    pub backoff: i64,
    /// Cleared whenever the task is (re)scheduled on its own terms; set by
    /// [`crate::scheduler::schedule::Schedule::flush`] so a flushed task can
    /// be told apart from one that reached `due_date` naturally in logs.
    pub flush: bool,
    /// Non-owning: a keystone-internal key id this task concerns, if any
    /// (used by `HsmKeyGenerate` to report back which deficit it filled).
    pub key_hint: Option<KeyId>,
}

impl Task {
    pub fn new(owner: impl Into<Box<str>>, kind: TaskKind, due_date: i64) -> Self {
        let triple = Triple::new(owner, kind.task_class(), kind.task_type());
        Self {
            triple,
            kind,
            due_date,
            backoff: BACKOFF_MIN,
            flush: false,
            key_hint: None,
        }
    }

    pub fn whenever(owner: impl Into<Box<str>>, kind: TaskKind) -> Self {
        Self::new(owner, kind, WHENEVER)
    }

    /// Interpret a callback's [`TaskOutcome`] into the task's next
    /// `due_date`, mutating `backoff` per `spec.md` §4.2. Returns `None`
    /// if the task should be destroyed (`SUCCESS`).
    pub fn apply_outcome(&mut self, outcome: TaskOutcome, now: i64) -> Option<i64> {
        match outcome {
            TaskOutcome::Success => {
                self.backoff = BACKOFF_MIN;
                None
            }
            TaskOutcome::Promptly => Some(now),
            TaskOutcome::Immediately => Some(0),
            TaskOutcome::Defer => {
                self.backoff = (self.backoff * 2).clamp(BACKOFF_MIN, BACKOFF_MAX);
                Some(now + self.backoff)
            }
            TaskOutcome::At(t) => Some(t),
        }
    }
}

/// Comparison order for dispatch: time, then owner, then type, then class
/// (`spec.md` §4.2).
impl Task {
    pub fn dispatch_key(&self) -> (i64, &str, TaskType, TaskClass) {
        (
            self.due_date,
            &self.triple.owner,
            self.triple.ty,
            self.triple.class,
        )
    }
}

/// A shared, reusable per-triple lock handle. Typically one lock per
/// owner-tuple, shared by every task with the same [`LockKey`]
/// (`spec.md` §3.1).
pub type TaskLock = Arc<AsyncMutex<()>>;

pub fn duration_until(due_date: i64, now: i64) -> Option<Duration> {
    if due_date <= now {
        None
    } else {
        Some(Duration::from_secs((due_date - now) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enforce_task() -> Task {
        Task::new("example.com.", TaskKind::Enforce, 0)
    }

    #[test]
    fn defer_doubles_backoff_and_clamps_to_ceiling() {
        let mut task = enforce_task();
        assert_eq!(task.backoff, BACKOFF_MIN);

        let mut backoffs = vec![task.backoff];
        for _ in 0..20 {
            task.apply_outcome(TaskOutcome::Defer, 0);
            backoffs.push(task.backoff);
        }

        // `spec.md` §8 invariant 7: consecutive DEFERs yield a
        // non-decreasing backoff, clamped at BACKOFF_MAX.
        assert!(backoffs.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(*backoffs.last().unwrap(), BACKOFF_MAX);
    }

    #[test]
    fn success_resets_backoff() {
        let mut task = enforce_task();
        for _ in 0..5 {
            task.apply_outcome(TaskOutcome::Defer, 0);
        }
        assert!(task.backoff > BACKOFF_MIN);

        let next = task.apply_outcome(TaskOutcome::Success, 0);
        assert_eq!(next, None);
        assert_eq!(task.backoff, BACKOFF_MIN);
    }

    #[test]
    fn promptly_and_immediately_and_at_reschedule_as_specified() {
        let mut task = enforce_task();
        assert_eq!(task.apply_outcome(TaskOutcome::Promptly, 42), Some(42));
        assert_eq!(task.apply_outcome(TaskOutcome::Immediately, 42), Some(0));
        assert_eq!(task.apply_outcome(TaskOutcome::At(99), 42), Some(99));
    }

    #[test]
    fn whatever_type_matches_any_type_in_lookups() {
        let specific = Triple::new("example.com.", TaskClass::Enforcer, TaskType::Enforce);
        let wildcard = Triple::new("example.com.", TaskClass::Enforcer, TaskType::Whatever);
        assert!(specific.matches(&wildcard));
        assert!(wildcard.matches(&specific));

        let other_owner = Triple::new("other.", TaskClass::Enforcer, TaskType::Whatever);
        assert!(!specific.matches(&other_owner));
    }
}
