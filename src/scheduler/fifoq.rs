//! Bounded FIFO work queue for signing subtasks. See `spec.md` §3.3/§4.4.
//!
//! Grounded line-for-line (in behavior, not in raw pthread mechanics) on
//! `examples/original_source/common/scheduler/fifoq.c`: the capacity,
//! the 10% `not_full` hysteresis, and the `FIFOQ_TRIES_COUNT`
//! re-broadcast-on-starvation behavior are all kept per the Open Question
//! decision in `DESIGN.md` (a correct `Notify` discipline should make the
//! re-broadcast unnecessary, but this rewrite cannot prove it safe to drop
//! without the original's production history). `tokio::sync::{Mutex,
//! Notify}` stand in for the two condition variables, per REDESIGN FLAGS.

use std::collections::VecDeque;
use std::sync::Arc;

use foldhash::{HashMap, HashMapExt};
use tokio::sync::{Mutex, Notify};

/// Queue capacity (`spec.md` §3.3: "currently 1000 slots").
pub const FIFOQ_MAX_COUNT: usize = 1000;
/// Number of starved `push` attempts before a defensive `not_empty`
/// re-broadcast (`spec.md` §4.4).
pub const FIFOQ_TRIES_COUNT: u32 = 10;

/// A submitter-side identity: one per zone task that has pushed subtasks
/// and is waiting on them (`spec.md` §3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmitterId(pub u64);

/// Per-submitter accounting: how many subtasks are still outstanding, how
/// many failed, and the notify used to wake the submitter when
/// `outstanding` reaches zero (`spec.md` §3.3). Held behind an `Arc` so a
/// waiter can clone out its own handle and await the `Notify` without
/// holding the queue's main lock.
struct SubmitterState {
    outstanding: std::sync::atomic::AtomicU64,
    failed: std::sync::atomic::AtomicU64,
    notify: Notify,
}

/// Outcome of [`FifoQueue::push`] (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// The queue was full and the caller has now tried more than
    /// [`FIFOQ_TRIES_COUNT`] times; `not_empty` was re-broadcast as a
    /// defensive kick and the caller's try counter should reset to 0.
    Unchanged,
}

/// Status a worker reports for one popped subtask (`spec.md` §4.4 `report`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtaskStatus {
    Ok,
    Failed,
}

struct Inner<T> {
    items: VecDeque<(T, SubmitterId)>,
    submitters: HashMap<SubmitterId, Arc<SubmitterState>>,
}

/// A fixed-capacity FIFO of `(item, submitter)` pairs with producer/
/// consumer condition variables and per-submitter subtask accounting.
pub struct FifoQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Notify,
    not_full: Notify,
    need_to_exit: std::sync::atomic::AtomicBool,
}

impl<T> FifoQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                submitters: HashMap::new(),
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            need_to_exit: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    /// Push `item` on behalf of `submitter`. If the queue is full and
    /// `*tries` exceeds [`FIFOQ_TRIES_COUNT`], gives up, broadcasts
    /// `not_empty` to kick any worker that may have missed a signal, and
    /// resets `*tries` to 0 (`spec.md` §4.4).
    pub async fn push(&self, item: T, submitter: SubmitterId, tries: &mut u32) -> PushOutcome {
        loop {
            let mut inner = self.inner.lock().await;
            if inner.items.len() < FIFOQ_MAX_COUNT {
                inner.items.push_back((item, submitter));
                let became_nonempty = inner.items.len() == 1;
                drop(inner);
                *tries = 0;
                if became_nonempty {
                    self.not_empty.notify_waiters();
                }
                return PushOutcome::Pushed;
            }
            drop(inner);

            *tries += 1;
            if *tries > FIFOQ_TRIES_COUNT {
                self.not_empty.notify_waiters();
                *tries = 0;
                return PushOutcome::Unchanged;
            }
            self.not_full.notified().await;
            // `item` was moved in the failed branch above is impossible
            // since we never consumed it; loop and retry the push.
        }
    }

    /// Declare that `submitter` just pushed `n` subtasks, then block until
    /// `outstanding` reaches zero or [`FifoQueue::notify_exit`] has been
    /// called. Returns the accumulated failure count, resetting it
    /// (`spec.md` §4.4 `wait_for`).
    pub async fn wait_for(&self, submitter: SubmitterId, n: u64) -> u64 {
        use std::sync::atomic::Ordering;

        let state = Arc::new(SubmitterState {
            outstanding: std::sync::atomic::AtomicU64::new(n),
            failed: std::sync::atomic::AtomicU64::new(0),
            notify: Notify::new(),
        });
        {
            let mut inner = self.inner.lock().await;
            inner.submitters.insert(submitter, state.clone());
        }

        while state.outstanding.load(Ordering::SeqCst) != 0
            && !self.need_to_exit.load(Ordering::SeqCst)
        {
            let notified = state.notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
            }
        }

        // On shutdown, every subtask still outstanding counts as failed
        // (`spec.md` §8 Scenario F: "failed == outstanding").
        if self.need_to_exit.load(Ordering::SeqCst) {
            let outstanding = state.outstanding.swap(0, Ordering::SeqCst);
            state.failed.fetch_add(outstanding, Ordering::SeqCst);
        }

        let mut inner = self.inner.lock().await;
        inner.submitters.remove(&submitter);
        state.failed.load(Ordering::SeqCst)
    }

    /// Called by a worker after processing one popped subtask. Decrements
    /// `outstanding` for `submitter`; signals it once it reaches zero
    /// (`spec.md` §4.4 `report`).
    pub async fn report(&self, submitter: SubmitterId, status: SubtaskStatus) {
        use std::sync::atomic::Ordering;

        let state = {
            let inner = self.inner.lock().await;
            inner.submitters.get(&submitter).cloned()
        };
        let Some(state) = state else { return };
        if status == SubtaskStatus::Failed {
            state.failed.fetch_add(1, Ordering::SeqCst);
        }
        let prev = state.outstanding.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            state.notify.notify_waiters();
        }
    }

    /// Dequeue one item. If the post-pop count is at or below 10% of
    /// capacity, broadcast `not_full` (`spec.md` §3.3/§4.4).
    pub async fn pop(&self) -> Option<(T, SubmitterId)> {
        let mut inner = self.inner.lock().await;
        let item = inner.items.pop_front();
        let len = inner.items.len();
        drop(inner);
        if item.is_some() && len <= FIFOQ_MAX_COUNT / 10 {
            self.not_full.notify_waiters();
        }
        item
    }

    /// Block until an item is available or [`FifoQueue::notify_exit`] has
    /// been called.
    pub async fn pop_wait(&self) -> Option<(T, SubmitterId)> {
        loop {
            if let Some(item) = self.pop().await {
                return Some(item);
            }
            if self.need_to_exit.load(std::sync::atomic::Ordering::SeqCst) {
                return None;
            }
            tokio::select! {
                _ = self.not_empty.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
            }
        }
    }

    /// Break every blocked `push`/`pop_wait`/`wait_for` call promptly
    /// (`spec.md` §4.5 "Cancellation").
    pub fn notify_exit(&self) {
        self.need_to_exit.store(true, std::sync::atomic::Ordering::SeqCst);
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_pop_preserves_set() {
        let q: FifoQueue<u32> = FifoQueue::new();
        let mut tries = 0;
        for i in 0..50 {
            assert_eq!(q.push(i, SubmitterId(1), &mut tries).await, PushOutcome::Pushed);
        }
        assert_eq!(q.len().await, 50);
        let mut popped = vec![];
        for _ in 0..50 {
            popped.push(q.pop().await.unwrap().0);
        }
        assert_eq!(q.len().await, 0);
        popped.sort();
        assert_eq!(popped, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn wait_for_returns_only_after_n_reports() {
        let q: std::sync::Arc<FifoQueue<u32>> = std::sync::Arc::new(FifoQueue::new());
        let submitter = SubmitterId(7);
        let mut tries = 0;
        for i in 0..5 {
            q.push(i, submitter, &mut tries).await;
        }

        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.wait_for(submitter, 5).await });

        // Give the waiter a chance to register before we start reporting.
        tokio::task::yield_now().await;

        for _ in 0..4 {
            q.report(submitter, SubtaskStatus::Ok).await;
        }
        assert!(!waiter.is_finished());
        q.report(submitter, SubtaskStatus::Failed).await;

        let failed = waiter.await.unwrap();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn wait_for_zero_subtasks_returns_immediately() {
        let q: FifoQueue<u32> = FifoQueue::new();
        let failed = q.wait_for(SubmitterId(1), 0).await;
        assert_eq!(failed, 0);
    }

    #[tokio::test]
    async fn push_over_capacity_returns_unchanged_after_tries() {
        let q: FifoQueue<u32> = FifoQueue::new();
        let mut tries = 0;
        for i in 0..FIFOQ_MAX_COUNT {
            assert_eq!(
                q.push(i as u32, SubmitterId(1), &mut tries).await,
                PushOutcome::Pushed
            );
        }
        // Queue is full; spawn a task that will race a pop in shortly, but
        // force the immediate-unchanged path by priming `tries` already
        // past the threshold.
        let mut tries = FIFOQ_TRIES_COUNT + 1;
        let outcome = q.push(12345, SubmitterId(1), &mut tries).await;
        assert_eq!(outcome, PushOutcome::Unchanged);
        assert_eq!(tries, 0);
    }

    #[tokio::test]
    async fn notify_exit_wakes_pop_wait() {
        let q: std::sync::Arc<FifoQueue<u32>> = std::sync::Arc::new(FifoQueue::new());
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.pop_wait().await });
        tokio::task::yield_now().await;
        q.notify_exit();
        let result = tokio::time::timeout(std::time::Duration::from_millis(100), waiter)
            .await
            .expect("pop_wait should return promptly after notify_exit")
            .unwrap();
        assert!(result.is_none());
    }
}
