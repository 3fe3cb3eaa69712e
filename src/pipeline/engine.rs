//! Worker-side half of the pipeline.
//!
//! [`Engine`] is shared by every worker thread. It owns the schedulers, the
//! memory cache, the task pool and the payload loader, runs download and
//! decode jobs, and forwards every state change to the consumer context as
//! an [`Event`].

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::pool::TaskPool;
use super::scheduler::Scheduler;
use super::task::{Task, TaskHandle};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::images::{self, Fetcher, MemoryCache, Payload, PayloadLoader, PixelBuffer, Provenance};
use crate::models::Status;

/// Message from a worker to the consumer context.
#[derive(Debug)]
pub(crate) enum Event {
    /// Intermediate state change
    Status { handle: TaskHandle, status: Status },
    /// The task reached a terminal state and is handed over
    Finished(Task),
}

/// One edge of the state machine together with the data it produces.
pub(crate) enum Transition {
    DownloadStarted,
    Downloaded(Payload, Provenance),
    DecodeStarted,
    Decoded(PixelBuffer),
    Failed(PipelineError),
}

impl Transition {
    const fn status(&self) -> Status {
        match self {
            Self::DownloadStarted => Status::DownloadStarted,
            Self::Downloaded(..) => Status::DownloadComplete,
            Self::DecodeStarted => Status::DecodeStarted,
            Self::Decoded(_) => Status::TaskComplete,
            Self::Failed(_) => Status::DownloadFailed,
        }
    }
}

pub(crate) struct Engine {
    pub(crate) cache: MemoryCache,
    pub(crate) pool: TaskPool,
    pub(crate) loader: PayloadLoader,
    downloads: Scheduler,
    pub(crate) decodes: Scheduler,
    events: mpsc::UnboundedSender<Event>,
}

impl Engine {
    pub(crate) fn new(
        config: &Config,
        disk_cache_dir: PathBuf,
        fetcher: Arc<dyn Fetcher>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Result<Self> {
        let downloads = Scheduler::new("download", config.download_workers, config.download_queue)?;
        let decodes = Scheduler::new("decode", config.decode_parallelism(), config.decode_queue)?;
        let loader = PayloadLoader::new(
            config.asset_root.clone(),
            disk_cache_dir,
            fetcher,
            config.max_payload_bytes,
        );

        Ok(Self {
            cache: MemoryCache::new(config.memory_cache_bytes),
            pool: TaskPool::with_capacity(config.task_pool_size),
            loader,
            downloads,
            decodes,
            events,
        })
    }

    /// Queue a download job for `task`. Blocks while the queue is full.
    pub(crate) fn schedule_download(self: &Arc<Self>, task: Task) {
        let engine = Arc::clone(self);
        if !self.downloads.submit(Box::new(move || engine.run_download(task))) {
            tracing::warn!("Download pool is shut down, dropping task");
        }
    }

    /// Queue a decode job for `task`. Blocks while the queue is full.
    pub(crate) fn schedule_decode(self: &Arc<Self>, task: Task) {
        let engine = Arc::clone(self);
        if !self.decodes.submit(Box::new(move || engine.run_decode(task))) {
            tracing::warn!("Decode pool is shut down, dropping task");
        }
    }

    /// Apply `transition` to `task`.
    ///
    /// Intermediate states hand the task back to the caller. On download
    /// completion the task moves into the decode queue; on a terminal state
    /// the decoded payload is cached and the task moves to the consumer
    /// context. Either way the requester is notified exactly once.
    ///
    /// Freshly downloaded payloads reach the disk cache only after they
    /// decode, so a bad response is never served again.
    pub(crate) fn advance(self: &Arc<Self>, mut task: Task, transition: Transition) -> Option<Task> {
        let next = transition.status();
        if let Err(e) = task.advance(next) {
            tracing::error!(slot = task.handle().slot, "{e}");
            task.abort(e);
            self.finish(task);
            return None;
        }

        match transition {
            Transition::DownloadStarted | Transition::DecodeStarted => {
                self.notify(task.handle(), next);
                Some(task)
            }
            Transition::Downloaded(payload, provenance) => {
                task.set_payload(payload, provenance);
                self.notify(task.handle(), next);
                self.schedule_decode(task);
                None
            }
            Transition::Decoded(pixels) => {
                if let Some(payload) = task.take_payload() {
                    if task.provenance() == Some(Provenance::Network) {
                        self.persist(&task, &payload);
                    }
                    self.cache.insert(&task.identity().cache_key(), payload);
                }
                task.set_pixels(pixels);
                self.finish(task);
                None
            }
            Transition::Failed(error) => {
                if task.provenance() == Some(Provenance::DiskCache) {
                    self.evict(&task);
                }
                task.set_failure(error);
                self.finish(task);
                None
            }
        }
    }

    fn run_download(self: &Arc<Self>, task: Task) {
        if task.is_cancelled() {
            self.discard(task);
            return;
        }
        let Some(task) = self.advance(task, Transition::DownloadStarted) else {
            return;
        };

        match guarded("download", || self.loader.load(task.identity(), task.cancel_token())) {
            Ok(loaded) => {
                tracing::debug!(
                    source = %task.identity().source,
                    bytes = loaded.bytes.len(),
                    provenance = ?loaded.provenance,
                    "Download complete"
                );
                let payload = Arc::new(loaded.bytes);
                self.advance(task, Transition::Downloaded(payload, loaded.provenance));
            }
            Err(PipelineError::Cancelled) => self.discard(task),
            Err(e) => {
                tracing::warn!("Failed to load image {}: {e}", task.identity().source);
                self.advance(task, Transition::Failed(e));
            }
        }
    }

    fn run_decode(self: &Arc<Self>, task: Task) {
        if task.is_cancelled() {
            self.discard(task);
            return;
        }
        let Some(task) = self.advance(task, Transition::DecodeStarted) else {
            return;
        };

        let payload = task.payload().map_or(&[][..], |p| p.as_slice());
        match guarded("decode", || {
            images::decode(payload, task.identity().target, task.cancel_token())
        }) {
            Ok(pixels) => {
                self.advance(task, Transition::Decoded(pixels));
            }
            Err(PipelineError::Cancelled) => self.discard(task),
            Err(e) => {
                tracing::warn!("Failed to decode image {}: {e}", task.identity().source);
                self.advance(task, Transition::Failed(e));
            }
        }
    }

    fn persist(&self, task: &Task, payload: &[u8]) {
        let location = &task.identity().source.location;
        if let Err(e) = self.loader.persist(location, payload) {
            tracing::warn!(url = %location, "Failed to persist payload: {e}");
        }
    }

    /// Drop a disk cache entry that did not decode so the next request
    /// downloads it again.
    fn evict(&self, task: &Task) {
        let location = &task.identity().source.location;
        match self.loader.evict(location) {
            Ok(()) => tracing::debug!(url = %location, "Evicted undecodable disk cache entry"),
            Err(e) => tracing::warn!(url = %location, "Failed to evict disk cache entry: {e}"),
        }
    }

    /// Recycle a cancelled task without telling anyone.
    fn discard(&self, task: Task) {
        tracing::debug!(
            slot = task.handle().slot,
            source = %task.identity().source,
            "Task cancelled"
        );
        self.pool.recycle(task);
    }

    fn notify(&self, handle: TaskHandle, status: Status) {
        let _ = self.events.send(Event::Status { handle, status });
    }

    fn finish(&self, task: Task) {
        if let Err(mpsc::error::SendError(Event::Finished(task))) =
            self.events.send(Event::Finished(task))
        {
            // Consumer is gone; keep the task for reuse
            self.pool.recycle(task);
        }
    }

    pub(crate) fn queued_downloads(&self) -> usize {
        self.downloads.queued()
    }

    pub(crate) fn queued_decodes(&self) -> usize {
        self.decodes.queued()
    }
}

/// Run one fallible step, turning a panic into an ordinary failure so the
/// task still reaches a terminal state.
fn guarded<T>(stage: &'static str, step: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(step)).unwrap_or(Err(PipelineError::Panicked { stage }))
}
