//! Bookkeeping for work that happens off the coordinator's single logical
//! thread: debounce timers and any background task a scheduled job spawns.
//!
//! `ConcurrentJob` is a handle for some long-running computation off the main
//! thread. It can be used, indirectly, to wait for the completion of that
//! computation.
//!
//! All `ConcurrentJob`s must eventually be stored in a `Jobs` table. All
//! concurrent activity -- spawning a thread, pushing a debounce timer --
//! should be covered by a `ConcurrentJob`. This way the `Jobs` table gives a
//! complete overview of concurrency in the system, and it is possible to wait
//! for everything to finish, which is what makes tests deterministic despite
//! the debounce delay.
//!
//! `JobToken` is the worker-side counterpart of `ConcurrentJob`. Dropping a
//! `JobToken` signals that the corresponding job has finished.

use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Select, Sender};

#[must_use]
pub struct ConcurrentJob {
    chan: Receiver<Never>,
}

pub struct JobToken {
    _chan: Sender<Never>,
}

#[derive(Default)]
pub struct Jobs {
    jobs: Vec<ConcurrentJob>,
}

impl Jobs {
    pub fn add(&mut self, job: ConcurrentJob) {
        self.gc();
        self.jobs.push(job);
    }

    /// Blocks the current thread until all pending jobs are finished.
    ///
    /// Only sound when no other thread ever adds a job concurrently -- see
    /// [`snapshot_receivers`](Jobs::snapshot_receivers) for the version used
    /// by the debounce scheduler, where a running job may itself schedule
    /// (and thus register) a follow-up job while this is waiting.
    pub fn wait_for_all(&mut self) {
        while !self.jobs.is_empty() {
            let done: usize = {
                let mut select = Select::new();
                for job in &self.jobs {
                    select.recv(&job.chan);
                }

                let oper = select.select();
                let oper_index = oper.index();
                let chan = &self.jobs[oper_index].chan;
                assert!(oper.recv(chan).is_err());
                oper_index
            };
            drop(self.jobs.swap_remove(done));
        }
    }

    /// Garbage-collects finished jobs, then returns cloned receivers for
    /// everything still outstanding. Cloning (rather than holding the table
    /// locked across a blocking select) lets a job that reschedules itself
    /// register its replacement without deadlocking against a concurrent
    /// `wait_for_all`-style caller.
    pub fn snapshot_receivers(&mut self) -> Vec<Receiver<Never>> {
        self.gc();
        self.jobs.iter().map(|job| job.chan.clone()).collect()
    }

    fn gc(&mut self) {
        self.jobs.retain(|job| !job.is_completed())
    }
}

impl ConcurrentJob {
    pub fn new() -> (ConcurrentJob, JobToken) {
        let (tx, rx) = bounded(0);
        let job = ConcurrentJob { chan: rx };
        let token = JobToken { _chan: tx };
        (job, token)
    }

    fn is_completed(&self) -> bool {
        is_closed(&self.chan)
    }
}

impl Drop for ConcurrentJob {
    fn drop(&mut self) {
        if self.is_completed() || thread::panicking() {
            return;
        }
        panic!("orphaned concurrent job");
    }
}

// We don't actually send messages through the channels, and instead just
// check if the channel is closed, so we use an uninhabited enum as a message
// type.
pub enum Never {}

/// Non-blocking.
fn is_closed(chan: &Receiver<Never>) -> bool {
    select! {
        recv(chan) -> msg => match msg {
            Err(_) => true,
            Ok(never) => match never {}
        },
        default => false,
    }
}
