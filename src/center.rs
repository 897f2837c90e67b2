//! The daemon's central command: every shared collaborator a worker or
//! the control API needs, held behind one `Arc` so cloning a handle to
//! "the whole process" is cheap.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use domain::zonetree::StoredRecord;
use tokio::sync::Mutex as AsyncMutex;

use crate::clock::Clock;
use crate::config::Config;
use crate::contracts::dshook::DsHook;
use crate::contracts::keystore::Keystore;
use crate::contracts::persistence::Persistence;
use crate::scheduler::fifoq::{FifoQueue, SubmitterId};
use crate::scheduler::schedule::Schedule;
use crate::scheduler::worker_pool::SignJob;

/// Every external collaborator and shared data structure a worker needs
/// to run a task to completion, plus the one process-wide lock that
/// exists only because some `Persistence` backends cannot run two
/// enforcer passes concurrently without it.
pub struct Center {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub persistence: Arc<dyn Persistence>,
    pub keystore: Arc<dyn Keystore>,
    pub ds_hook: Arc<dyn DsHook>,
    pub schedule: Arc<Schedule>,
    pub fifoq: Arc<FifoQueue<SignJob>>,
    /// Held for the duration of an enforcer task's callback when
    /// `persistence.requires_global_lock()` is true, serializing all
    /// enforcer work against a backend that cannot.
    pub enforcer_work_lock: AsyncMutex<()>,
    /// Unsigned RRsets most recently read in per zone, staged between the
    /// signer driver's `read` and `sign` steps. Stands in for the
    /// teacher's `unsigned_zones`/`signed_zones` `ArcSwap<ZoneTree>`
    /// pair, simplified to a plain locked map since this crate does not
    /// need the teacher's full zone-tree lookup structure.
    pub unsigned: StdMutex<foldhash::HashMap<Box<str>, (Vec<StoredRecord>, u32)>>,
    /// Fully-signed RRsets staged between `sign` and `write`.
    pub signed: StdMutex<foldhash::HashMap<Box<str>, (Vec<StoredRecord>, u32)>>,
    submitter_seq: AtomicU64,
    shutting_down: AtomicBool,
}

impl Center {
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        persistence: Arc<dyn Persistence>,
        keystore: Arc<dyn Keystore>,
        ds_hook: Arc<dyn DsHook>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            clock,
            persistence,
            keystore,
            ds_hook,
            schedule: Arc::new(Schedule::new()),
            fifoq: Arc::new(FifoQueue::new()),
            enforcer_work_lock: AsyncMutex::new(()),
            unsigned: StdMutex::new(foldhash::HashMap::default()),
            signed: StdMutex::new(foldhash::HashMap::default()),
            submitter_seq: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        })
    }

    #[cfg(any(test, feature = "test-fakes"))]
    pub fn for_tests(
        clock: Arc<dyn Clock>,
        persistence: Arc<dyn Persistence>,
        keystore: Arc<dyn Keystore>,
        ds_hook: Arc<dyn DsHook>,
        schedule: Arc<Schedule>,
        fifoq: Arc<FifoQueue<SignJob>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Config::for_tests(),
            clock,
            persistence,
            keystore,
            ds_hook,
            schedule,
            fifoq,
            enforcer_work_lock: AsyncMutex::new(()),
            unsigned: StdMutex::new(foldhash::HashMap::default()),
            signed: StdMutex::new(foldhash::HashMap::default()),
            submitter_seq: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// A fresh, process-unique submitter identity for a zone task about to
    /// fan subtasks out onto the FIFO queue.
    pub fn next_submitter(&self) -> SubmitterId {
        SubmitterId(self.submitter_seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Wakes every worker blocked in the schedule or the FIFO queue and
    /// marks the process as shutting down, so the next loop iteration of
    /// every worker exits instead of popping more work.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        crate::scheduler::worker_pool::shutdown(&self.schedule, &self.fifoq);
    }
}
