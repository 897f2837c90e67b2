//! The task scheduler, FIFO work queue, and worker pool: components B-E
//! of `spec.md` §2.

pub mod fifoq;
pub mod schedule;
pub mod task;
pub mod worker_pool;
