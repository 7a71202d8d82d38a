//! Periodic auto-commit worker.
//!
//! Spawned only when the write transaction was opened with a time-based
//! auto-commit interval. Each tick takes the same re-entrant lock as the
//! public transaction methods and commits; shutdown joins the worker with
//! a bounded deadline.

use std::cell::RefCell;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, ReentrantMutex};

use xylem_error::{Result, XylemError};

use crate::wtx::WtxInner;

pub(crate) struct AutoCommit {
    gate: Arc<(Mutex<bool>, Condvar)>,
    done: mpsc::Receiver<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl AutoCommit {
    pub(crate) fn spawn(
        period: Duration,
        inner: Arc<ReentrantMutex<RefCell<WtxInner>>>,
    ) -> Self {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let worker_gate = Arc::clone(&gate);
        let (done_tx, done) = mpsc::channel();
        let handle = thread::spawn(move || {
            // Dropping the sender signals completion to `stop`.
            let _done_tx = done_tx;
            loop {
                {
                    let (lock, cvar) = &*worker_gate;
                    let mut stop = lock.lock();
                    if !*stop {
                        cvar.wait_for(&mut stop, period);
                    }
                    if *stop {
                        break;
                    }
                }
                let guard = inner.lock();
                let mut wtx = guard.borrow_mut();
                if wtx.is_closed() {
                    break;
                }
                match wtx.commit(None) {
                    Ok(revision) => {
                        tracing::debug!(revision = revision.get(), "scheduled auto-commit");
                    }
                    Err(error) => {
                        tracing::warn!(%error, "scheduled auto-commit failed");
                    }
                }
            }
        });
        Self {
            gate,
            done,
            handle: Some(handle),
        }
    }

    /// Signal shutdown and wait up to `timeout` for the worker to finish.
    pub(crate) fn stop(mut self, timeout: Duration) -> Result<()> {
        {
            let (lock, cvar) = &*self.gate;
            let mut stop = lock.lock();
            *stop = true;
            cvar.notify_all();
        }
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                Ok(())
            }
            Err(mpsc::RecvTimeoutError::Timeout) => Err(XylemError::SchedulerShutdown {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
