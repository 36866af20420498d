//! A dedicated thread for blocking communication.
//!
//! Transport calls block the calling thread and cannot be cancelled. Code
//! that must not block (an event loop, a scheduler thread) submits them to a
//! [`Worker`] instead and picks up the outcome through the returned
//! [`Completion`].

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single worker thread, optionally pinned to a CPU core. Jobs run one at
/// a time in submission order, which keeps the transport calls they make
/// serialized.
pub struct Worker {
    handle: Option<thread::JoinHandle<()>>,
    sender: Option<Sender<Job>>,
}

/// The eventual result of a job submitted to a [`Worker`].
pub struct Completion<R> {
    receiver: Receiver<thread::Result<R>>,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let core = config.core;
        let handle = thread::spawn(move || {
            Self::pin(core);
            for job in receiver {
                job()
            }
        });
        Self {
            handle: Some(handle),
            sender: Some(sender),
        }
    }

    /// Queue a job on the worker thread. A panic inside the job is caught
    /// and re-raised by [`Completion::wait`], so the worker survives it.
    pub fn submit<F, R>(&self, job: F) -> Completion<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result_s, result_r) = crossbeam_channel::bounded(1);
        let job: Job = Box::new(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
            result_s.send(result).ok();
        });

        let queued = self.sender.as_ref().map_or(false, |s| s.send(job).is_ok());

        if !queued {
            tracing::error!("worker thread has exited, job dropped");
        }
        Completion { receiver: result_r }
    }

    #[cfg(feature = "core_affinity")]
    fn pin(core: Option<usize>) {
        let core_id = core.and_then(|index| {
            core_affinity::get_core_ids().and_then(|ids| ids.into_iter().find(|id| id.id == index))
        });
        match (core, core_id) {
            (Some(_), Some(core_id)) => {
                core_affinity::set_for_current(core_id);
            }
            (Some(index), None) => tracing::warn!(core = index, "no such core, worker not pinned"),
            _ => {}
        }
    }

    #[cfg(not(feature = "core_affinity"))]
    fn pin(core: Option<usize>) {
        if let Some(index) = core {
            tracing::debug!(core = index, "core_affinity feature disabled, worker not pinned");
        }
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new(WorkerConfig::default())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.sender.take();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl<R> Completion<R> {
    /// Block until the job has finished and return its result. Panics if the
    /// job panicked, and fails with [`Error::WorkerStopped`] if the job was
    /// dropped without running.
    pub fn wait(self) -> Result<R> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => std::panic::resume_unwind(payload),
            Err(_) => Err(Error::WorkerStopped),
        }
    }

    /// Return the outcome if the job is done (as [`Completion::wait`] would),
    /// or give the completion back if it is still queued or running.
    pub fn try_wait(self) -> std::result::Result<Result<R>, Self> {
        match self.receiver.try_recv() {
            Ok(Ok(value)) => Ok(Ok(value)),
            Ok(Err(payload)) => std::panic::resume_unwind(payload),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Disconnected) => Ok(Err(Error::WorkerStopped)),
        }
    }

    /// The receiving end of the completion, for use with
    /// `crossbeam_channel::select!`.
    pub fn receiver(&self) -> &Receiver<thread::Result<R>> {
        &self.receiver
    }
}
