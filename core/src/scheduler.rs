//! Fixed-interval trigger for reconciliation passes.
//!
//! The job runs once at start, then every `interval` until stopped. A pass
//! that is still running when another trigger arrives is never doubled up:
//! the second trigger is skipped and logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Job = Box<dyn Fn() + Send + Sync>;

struct Shared {
    running: AtomicBool,
    job:     Job,
}

/// Clears the running flag even if the job panics.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    fn run_once(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("scheduler: previous pass still running, skipping trigger");
            return false;
        }
        let _guard = RunningGuard(&self.running);
        (self.job)();
        true
    }
}

pub struct ReconcileScheduler {
    shared: Arc<Shared>,
    stop:   Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ReconcileScheduler {
    pub fn start<F>(interval: Duration, job: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            running: AtomicBool::new(false),
            job:     Box::new(job),
        });
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("reconcile-scheduler".into())
            .spawn(move || loop {
                worker.run_once();
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .ok();
        if handle.is_none() {
            log::error!("scheduler: cannot spawn worker thread; only manual triggers will run");
        }

        log::info!("scheduler: reconciliation every {}s", interval.as_secs());
        Self { shared, stop: Some(stop_tx), handle }
    }

    /// Run the job now on the calling thread.
    /// Returns false when a pass was already in progress.
    pub fn trigger(&self) -> bool {
        self.shared.run_once()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Signal the worker and wait for it to exit after any in-flight pass.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("scheduler: worker thread panicked");
            }
        }
    }
}

impl Drop for ReconcileScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
