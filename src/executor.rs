//! Bounded worker pool that runs operations against device sessions.
//!
//! Callers block in [`DeviceExecutor::run`] until their operation finishes.
//! UI-affecting operations hold the session's UI lock for their whole
//! duration, so they are strictly serialized per device; everything else
//! runs in parallel up to the pool size.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{LaneError, LaneResult};
use crate::session::DeviceSession;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of OS threads.
pub struct DeviceExecutor {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl DeviceExecutor {
    /// Start a pool with `max_workers` threads (at least one)
    pub fn new(max_workers: usize) -> std::io::Result<Self> {
        let size = max_workers.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("lane-worker-{}", index))
                .spawn(move || worker_loop(index, receiver))?;
            workers.push(handle);
        }
        debug!(workers = size, "executor started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
        })
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `operation` against `session` on a pool thread and wait for it.
    ///
    /// With `requires_ui_lock` the worker holds the session's UI lock while
    /// the operation runs and releases it on every exit path, panics
    /// included. Errors from the operation come back unchanged.
    pub fn run<T, F>(
        &self,
        session: &Arc<DeviceSession>,
        operation: F,
        requires_ui_lock: bool,
    ) -> LaneResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&DeviceSession) -> LaneResult<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let session = Arc::clone(session);

        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let _ui_guard = requires_ui_lock.then(|| session.lock_ui());
                operation(session.as_ref())
            }));
            let result = outcome.unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                warn!(serial = %session.serial(), panic = %message, "operation panicked");
                Err(LaneError::OperationPanicked(message))
            });
            let _ = reply_tx.send(result);
        });

        {
            let sender = self.sender.lock();
            let sender = sender.as_ref().ok_or(LaneError::ExecutorClosed)?;
            sender.send(job).map_err(|_| LaneError::ExecutorClosed)?;
        }

        reply_rx.recv().map_err(|_| LaneError::ExecutorClosed)?
    }

    /// Stop accepting work, let queued jobs finish, and join the workers.
    pub fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);

        let current = thread::current().id();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread exited abnormally");
            }
        }
        debug!("executor stopped");
    }
}

impl Drop for DeviceExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, receiver: Receiver<Job>) {
    for job in receiver.iter() {
        job();
    }
    debug!(worker = index, "worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
