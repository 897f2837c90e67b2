//! N worker tasks consuming from the [`Schedule`] (zone tasks) and from
//! the [`FifoQueue`] (signing subtasks). See `spec.md` §4.5.
//!
//! Grounded on the teacher's `src/manager.rs` spawn-a-tokio-task-per-unit
//! pattern (`tokio::spawn`, oneshot ready signals), generalized to spawn
//! `N` identical workers rather than `N` distinct pipeline units. Workers
//! are tokio tasks rather than OS threads (REDESIGN FLAGS, `spec.md` §9
//! "Condition-variable idioms"): this is the natural translation of "N
//! worker threads" onto the teacher's own concurrency model, where every
//! unit is itself a spawned tokio task.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::center::Center;
use crate::clock::Clock;
use crate::scheduler::fifoq::{SubtaskStatus, SubmitterId};
use crate::scheduler::schedule::Schedule;
use crate::scheduler::task::{Task, TaskOutcome};

/// A single subtask pushed onto the FIFO by the signer driver: "sign this
/// RRset with this zone's current keys" (`spec.md` §4.7).
#[derive(Debug, Clone)]
pub struct SignJob {
    pub zone: Box<str>,
    pub rrset_owner: Box<str>,
}

/// Runs the N-worker pool: each worker alternates between popping due
/// tasks off the schedule and, while blocked in a submitter's `wait_for`,
/// being "reassigned" to drain the FIFO queue as a drudger (`spec.md`
/// §4.5). Since every worker here is backed by the same `tokio::spawn`
/// executor, drudging and task-popping happen naturally on the same pool
/// without a separate thread class.
pub async fn run(center: Arc<Center>, worker_id: usize) {
    debug!(worker_id, "worker started");
    loop {
        if center.shutting_down() {
            break;
        }

        tokio::select! {
            task = center.schedule.pop_due(center.clock.as_ref(), None) => {
                let Some(task) = task else { break };
                run_one_task(&center, task).await;
            }
            job = center.fifoq.pop_wait() => {
                let Some((job, submitter)) = job else { break };
                run_one_subtask(&center, job, submitter).await;
            }
        }
    }
    debug!(worker_id, "worker exiting");
}

async fn run_one_task(center: &Arc<Center>, task: Task) {
    let triple = task.triple.clone();
    let lock = center.schedule.lock_for(&triple).await;

    // `spec.md` §4.2: callbacks run under the task's own lock, and under a
    // process-wide enforcer lock when `class == "enforcer"` (database
    // serialization workaround) -- modeled here as
    // `Persistence::requires_global_lock()`, per `SPEC_FULL.md` §5.
    let _guard = lock.lock().await;
    let _global_guard = if triple.class == crate::scheduler::task::TaskClass::Enforcer
        && center.persistence.requires_global_lock()
    {
        Some(center.enforcer_work_lock.lock().await)
    } else {
        None
    };

    let now = center.clock.now();
    let outcome = crate::enforcer::run_task(center, &task)
        .await
        .unwrap_or_else(|err| {
            warn!(owner = %triple.owner, class = %triple.class, ty = %triple.ty, %err, "task failed, deferring");
            TaskOutcome::Defer
        });

    let mut task = task;
    let next_due = task.apply_outcome(outcome, now);
    if outcome == TaskOutcome::Defer {
        warn!(owner = %triple.owner, ty = %triple.ty, backoff = task.backoff, "rescheduling on failure");
    }
    center.schedule.reschedule(task, next_due).await;
}

async fn run_one_subtask(center: &Arc<Center>, job: SignJob, submitter: SubmitterId) {
    let status = match crate::signer::sign_one(center, &job).await {
        Ok(()) => SubtaskStatus::Ok,
        Err(err) => {
            error!(zone = %job.zone, rrset = %job.rrset_owner, %err, "subtask sign failed");
            SubtaskStatus::Failed
        }
    };
    center.fifoq.report(submitter, status).await;
}

/// Spawn `n` worker tasks, returning their join handles so callers can
/// await clean shutdown.
pub fn spawn_pool(center: Arc<Center>, n: usize) -> Vec<tokio::task::JoinHandle<()>> {
    (0..n)
        .map(|i| {
            let center = center.clone();
            tokio::spawn(run(center, i))
        })
        .collect()
}

/// Unblock every worker and submitter, used on shutdown
/// (`spec.md` §5 "Cancellation and shutdown").
pub fn shutdown(schedule: &Schedule, fifoq: &crate::scheduler::fifoq::FifoQueue<SignJob>) {
    schedule.release_all();
    fifoq.notify_exit();
}
