//! The ordered container of tasks and the coordination around it. See
//! `spec.md` §3.2/§4.3.
//!
//! Grounded on `examples/original_source/enforcer-ng/src/scheduler/schedule.c`
//! (a red-black tree keyed by due-time-then-triple, plus a triple-keyed
//! hash map for uniqueness/lookup); `BTreeMap`/`HashMap` stand in for the
//! `ldns_rbtree`, and `tokio::sync::{Mutex, Notify}` stand in for the
//! original's pthread mutex + condvar, matching the `tokio::sync` idiom
//! used throughout the teacher crate's `src/units/*.rs`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use foldhash::{HashMap, HashMapExt};
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use crate::clock::Clock;
use crate::scheduler::task::{LockKey, Task, TaskLock, TaskType, Triple};

/// Result of [`Schedule::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// A task with this triple is already scheduled.
    Duplicate,
}

struct Inner {
    /// Dispatch order: due-time, then triple (`spec.md` §3.2).
    by_due: BTreeMap<(i64, Triple), ()>,
    /// Uniqueness and lookup by triple.
    by_triple: HashMap<Triple, Task>,
    /// Lock table: `(owner, class) -> shared mutex` (`spec.md` §3.2).
    locks: HashMap<LockKey, TaskLock>,
}

/// An ordered set of tasks with time-ordered dispatch, per-triple
/// exclusion, and flush/cancel under operator control (`spec.md` §3.2).
pub struct Schedule {
    inner: Mutex<Inner>,
    /// Woken whenever the soonest due-time might have changed: a push,
    /// reschedule, flush, or cancellation.
    dispatch: Notify,
    /// Number of workers currently parked in [`Schedule::pop_due`], used by
    /// tests (and the `queue` operator command) to detect idle
    /// (`spec.md` §3.2 "Worker-wait state").
    waiting_workers: AtomicUsize,
    /// Set on shutdown; every wait returns `None` promptly once true.
    shutting_down: std::sync::atomic::AtomicBool,
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                by_due: BTreeMap::new(),
                by_triple: HashMap::new(),
                locks: HashMap::new(),
            }),
            dispatch: Notify::new(),
            waiting_workers: AtomicUsize::new(0),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn waiting_workers(&self) -> usize {
        self.waiting_workers.load(Ordering::SeqCst)
    }

    /// Insert a task. Fails with [`PushError::Duplicate`] if a task with
    /// the same triple is already scheduled (`spec.md` §4.3).
    pub async fn push(&self, task: Task) -> Result<(), PushError> {
        let mut inner = self.inner.lock().await;
        if inner.by_triple.contains_key(&task.triple) {
            return Err(PushError::Duplicate);
        }
        let was_soonest = inner
            .by_due
            .keys()
            .next()
            .map(|(due, _)| *due > task.due_date)
            .unwrap_or(true);
        inner.by_due.insert((task.due_date, task.triple.clone()), ());
        inner.by_triple.insert(task.triple.clone(), task);
        drop(inner);
        if was_soonest {
            self.dispatch.notify_waiters();
        }
        Ok(())
    }

    /// Look up a task by triple (exact, not wildcard).
    pub async fn lookup(&self, triple: &Triple) -> Option<Task> {
        self.inner.lock().await.by_triple.get(triple).cloned()
    }

    /// The shared lock for this triple's `(owner, class)` pair, created on
    /// first use and reused by every task sharing the key (`spec.md` §3.2).
    pub async fn lock_for(&self, triple: &Triple) -> TaskLock {
        let key = LockKey::for_triple(triple);
        let mut inner = self.inner.lock().await;
        inner
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Remove and return the earliest task with `due_date <= now()`. If
    /// none is due, wait on the dispatch notification until the earliest
    /// future due-time, `deadline`, or cancellation, whichever comes
    /// first, re-sampling `clock` each time around so a real wall-clock
    /// tick always reveals the newly-due task. Returns `None` on timeout,
    /// cancellation, or shutdown (`spec.md` §4.3).
    pub async fn pop_due(&self, clock: &dyn Clock, deadline: Option<Duration>) -> Option<Task> {
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                return None;
            }
            let now = clock.now();
            let wait_for = {
                let mut inner = self.inner.lock().await;
                if let Some((&(due, ref triple), _)) = inner.by_due.iter().next() {
                    if due <= now {
                        let triple = triple.clone();
                        inner.by_due.remove(&(due, triple.clone()));
                        return inner.by_triple.remove(&triple);
                    }
                    Some(Duration::from_secs((due - now).max(0) as u64))
                } else {
                    None
                }
            };

            let wait_for = match (wait_for, deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (None, None) => None,
            };

            self.waiting_workers.fetch_add(1, Ordering::SeqCst);
            let notified = self.dispatch.notified();
            let woke = match wait_for {
                Some(d) => timeout(d, notified).await.is_ok(),
                None => {
                    notified.await;
                    true
                }
            };
            self.waiting_workers.fetch_sub(1, Ordering::SeqCst);

            if !woke && deadline.is_some() {
                return None;
            }
            // Either we were woken, or a finite wait expired because a
            // task became due (or `deadline` is None and we must recheck
            // a real-time tick); loop back around with a fresh `now`.
        }
    }

    /// Unschedule all tasks matching `triple` (honoring the `Whatever` type
    /// wildcard).
    pub async fn cancel(&self, triple: &Triple) {
        let mut inner = self.inner.lock().await;
        let matches: Vec<Triple> = inner
            .by_triple
            .keys()
            .filter(|t| t.matches(triple))
            .cloned()
            .collect();
        for t in matches {
            if let Some(task) = inner.by_triple.remove(&t) {
                inner.by_due.remove(&(task.due_date, t));
            }
        }
    }

    /// Unschedule every task for a given owner, regardless of class/type.
    pub async fn cancel_all(&self, owner: &str) {
        let mut inner = self.inner.lock().await;
        let matches: Vec<Triple> = inner
            .by_triple
            .keys()
            .filter(|t| &*t.owner == owner)
            .cloned()
            .collect();
        for t in matches {
            if let Some(task) = inner.by_triple.remove(&t) {
                inner.by_due.remove(&(task.due_date, t));
            }
        }
    }

    /// Set every matching task's `due_date` to 0 (so it sorts first) and
    /// wake dispatch. `ty = None` flushes every type (`spec.md` §4.3).
    pub async fn flush(&self, ty: Option<TaskType>) {
        let mut inner = self.inner.lock().await;
        let to_move: Vec<(i64, Triple)> = inner
            .by_due
            .keys()
            .filter(|(_, t)| ty.is_none_or(|ty| t.ty == ty))
            .cloned()
            .collect();
        for key @ (due, triple) in &to_move {
            inner.by_due.remove(key);
            inner.by_due.insert((0, triple.clone()), ());
            if let Some(task) = inner.by_triple.get_mut(triple) {
                task.due_date = 0;
                task.flush = true;
            }
            let _ = due;
        }
        drop(inner);
        if !to_move.is_empty() {
            self.dispatch.notify_waiters();
        }
    }

    /// Reschedule an already-running task to a new due time (used by
    /// [`crate::scheduler::worker_pool`] after a task's callback returns).
    /// If `due_date` is `None` the task is dropped (`SUCCESS`).
    pub async fn reschedule(&self, task: Task, due_date: Option<i64>) {
        match due_date {
            Some(due) => {
                let mut task = task;
                task.due_date = due;
                task.flush = false;
                let _ = self.push(task).await;
            }
            None => {
                // Task is complete; nothing to reinsert.
            }
        }
    }

    /// Wake every waiter unconditionally, used on shutdown so no worker is
    /// left stranded (`spec.md` §4.3 `release_all`).
    pub fn release_all(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.dispatch.notify_waiters();
    }

    /// Enumerate all scheduled tasks in dispatch order, for the read-only
    /// `queue` operator command (`spec.md` §6.3).
    pub async fn queue(&self) -> Vec<Task> {
        let inner = self.inner.lock().await;
        inner
            .by_due
            .keys()
            .filter_map(|(_, triple)| inner.by_triple.get(triple).cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_triple.len()
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::scheduler::task::TaskKind;

    fn task(owner: &str, due: i64) -> Task {
        Task::new(owner, TaskKind::Enforce, due)
    }

    #[tokio::test]
    async fn push_then_lookup_roundtrips() {
        let s = Schedule::new();
        let t = task("example.com.", 10);
        let triple = t.triple.clone();
        s.push(t).await.unwrap();
        let found = s.lookup(&triple).await.unwrap();
        assert_eq!(found.triple, triple);
    }

    #[tokio::test]
    async fn duplicate_triple_is_rejected() {
        let s = Schedule::new();
        s.push(task("example.com.", 10)).await.unwrap();
        let err = s.push(task("example.com.", 20)).await.unwrap_err();
        assert_eq!(err, PushError::Duplicate);
        assert_eq!(s.len().await, 1);
    }

    #[tokio::test]
    async fn pop_due_respects_time_order() {
        let s = Schedule::new();
        let clock = FakeClock::new(100);
        s.push(task("b.example.", 20)).await.unwrap();
        s.push(task("a.example.", 10)).await.unwrap();
        s.push(task("c.example.", 30)).await.unwrap();

        let first = s.pop_due(&clock, None).await.unwrap();
        assert_eq!(&*first.triple.owner, "a.example.");
        let second = s.pop_due(&clock, None).await.unwrap();
        assert_eq!(&*second.triple.owner, "b.example.");
        let third = s.pop_due(&clock, None).await.unwrap();
        assert_eq!(&*third.triple.owner, "c.example.");
    }

    #[tokio::test]
    async fn flush_sets_due_to_zero() {
        let s = Schedule::new();
        let clock = FakeClock::new(0);
        for name in ["a.", "b.", "c.", "d.", "e."] {
            s.push(task(name, 1_000_000)).await.unwrap();
        }
        s.flush(None).await;
        for _ in 0..5 {
            let t = s
                .pop_due(&clock, Some(Duration::from_millis(1)))
                .await
                .unwrap();
            assert_eq!(t.due_date, 0);
            assert!(t.flush);
        }
    }

    #[tokio::test]
    async fn cancel_removes_task() {
        let s = Schedule::new();
        let t = task("example.com.", 10);
        let triple = t.triple.clone();
        s.push(t).await.unwrap();
        s.cancel(&triple).await;
        assert_eq!(s.len().await, 0);
    }

    #[tokio::test]
    async fn pop_due_times_out_with_no_tasks() {
        let s = Schedule::new();
        let clock = FakeClock::new(0);
        let res = s.pop_due(&clock, Some(Duration::from_millis(5))).await;
        assert!(res.is_none());
    }
}
