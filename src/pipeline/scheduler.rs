//! Fixed-size worker pools fed by bounded FIFO queues.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::error::{PipelineError, Result};

/// A unit of work run on a pool thread
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded worker pool.
///
/// Jobs wait in a FIFO queue of fixed capacity while all workers are busy.
/// When the queue itself is full, [`Scheduler::submit`] blocks the calling
/// thread until a worker frees a place.
pub struct Scheduler {
    name: &'static str,
    sender: Option<Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn `workers` threads sharing a queue of `queue_capacity` jobs.
    pub fn new(name: &'static str, workers: usize, queue_capacity: usize) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<Job>(queue_capacity.max(1));

        let handles = (0..workers.max(1))
            .map(|index| {
                let rx = rx.clone();
                thread::Builder::new()
                    .name(format!("{name}-{index}"))
                    .spawn(move || worker_loop(name, &rx))
                    .map_err(|source| PipelineError::Spawn { pool: name, source })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(pool = name, workers = handles.len(), queue = queue_capacity, "Scheduler started");

        Ok(Self {
            name,
            sender: Some(tx),
            workers: handles,
        })
    }

    /// Queue a job, blocking while the queue is full.
    ///
    /// A job whose task was cancelled keeps its place until a worker dequeues
    /// and discards it, so cancelled work still counts against the capacity
    /// until then.
    ///
    /// Returns `false` if the scheduler has shut down and the job was dropped.
    pub fn submit(&self, job: Job) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        if sender.is_full() {
            tracing::debug!(pool = self.name, "Queue full, waiting for a free place");
        }
        sender.send(job).is_ok()
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Pool name used for thread names and logs
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Closing the queue lets every worker fall out of its loop once the
        // remaining jobs are done.
        self.sender.take();

        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!(pool = self.name, "Worker thread panicked during shutdown");
            }
        }
        tracing::debug!(pool = self.name, "Scheduler stopped");
    }
}

fn worker_loop(name: &'static str, rx: &Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(pool = name, "Job panicked: {message}");
        }
    }
}
