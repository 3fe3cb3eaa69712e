//! Consumer-side entry point of the pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;

use super::collaborators::{Requester, ResourceManager};
use super::engine::{Engine, Event};
use super::pool::PoolStats;
use super::task::{Task, TaskHandle};
use crate::config::Config;
use crate::error::Result;
use crate::images::{CacheStats, Fetcher, HttpFetcher};
use crate::models::{ImageSource, RequestIdentity, Status, Target};

/// Which requester a pool slot is currently serving.
struct Binding<R> {
    generation: u64,
    source: ImageSource,
    requester: std::rc::Weak<dyn Requester<R>>,
}

/// Orchestrates image acquisition for one consumer context.
///
/// The manager lives on the thread that owns the graphics resources. Worker
/// threads never touch requesters or the [`ResourceManager`]; they report
/// progress through a channel that the owner drains with
/// [`Manager::dispatch_pending`] or [`Manager::dispatch_next`].
///
/// ```no_run
/// # use photoflow::{Config, Manager};
/// # fn run() -> photoflow::Result<()> {
/// let mut slot: Option<Manager<u32>> = None;
/// let manager = Manager::initialize(&mut slot, &Config::default())?;
/// # let _ = manager;
/// # Ok(())
/// # }
/// ```
pub struct Manager<R> {
    engine: Arc<Engine>,
    events: mpsc::UnboundedReceiver<Event>,
    bindings: HashMap<usize, Binding<R>>,
}

/// Cancels tasks from any thread.
#[derive(Clone)]
pub struct Canceller {
    engine: Weak<Engine>,
}

impl Canceller {
    /// Signal every active task. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        self.engine.upgrade().map_or(0, |engine| engine.pool.cancel_all())
    }
}

impl<R> Manager<R> {
    /// Build a manager that downloads over HTTP.
    pub fn new(config: &Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(
            config.http_timeout(),
            &config.user_agent,
            config.max_payload_bytes,
        );
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Build a manager with a custom network fetcher.
    pub fn with_fetcher(config: &Config, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let disk_cache_dir = config.resolved_disk_cache_dir().unwrap_or_else(|e| {
            tracing::warn!("Falling back to a temporary disk cache: {e}");
            std::env::temp_dir().join("photoflow").join("network_cache")
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Engine::new(config, disk_cache_dir, fetcher, tx)?;

        tracing::info!(
            memory_cache_bytes = config.memory_cache_bytes,
            download_workers = config.download_workers,
            decode_workers = config.decode_parallelism(),
            "Image pipeline initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            events: rx,
            bindings: HashMap::new(),
        })
    }

    /// Create the manager in `slot` unless one already exists.
    pub fn initialize<'a>(slot: &'a mut Option<Self>, config: &Config) -> Result<&'a mut Self> {
        let manager = match slot.take() {
            Some(existing) => existing,
            None => Self::new(config)?,
        };
        Ok(slot.insert(manager))
    }

    /// Replace whatever manager is in `slot` with a fresh one.
    ///
    /// The previous manager's tasks are cancelled and its cache and pools
    /// are dropped. A running job holds the old engine alive, so this never
    /// waits on a blocked download; the old pools shut down on the worker
    /// that finishes last.
    pub fn initialize_new<'a>(slot: &'a mut Option<Self>, config: &Config) -> Result<&'a mut Self> {
        if let Some(previous) = slot.take() {
            tracing::info!("Replacing image pipeline");
            drop(previous);
        }
        Ok(slot.insert(Self::new(config)?))
    }

    /// Start acquiring the image `requester` currently wants.
    ///
    /// Returns `None` when no asynchronous work was needed: either the
    /// requester wants nothing, or `resources` already holds the image, in
    /// which case it is handed over before this returns.
    pub fn request<M, Q>(
        &mut self,
        resources: &mut M,
        requester: &Rc<Q>,
        cache_enabled: bool,
        width: u32,
        height: u32,
        rotation: i32,
    ) -> Option<TaskHandle>
    where
        M: ResourceManager<Resource = R>,
        Q: Requester<R> + 'static,
    {
        let Some(source) = requester.desired() else {
            tracing::debug!("Requester has nothing to load");
            return None;
        };
        let identity = RequestIdentity::new(source, Target::new(width, height, rotation), cache_enabled);

        if let Some(resource) = resources.lookup_existing(&identity) {
            tracing::trace!(source = %identity.source, "Resource already live");
            requester.on_resource_ready(resource);
            return None;
        }

        let cached = if cache_enabled {
            self.engine.cache.get(&identity.cache_key())
        } else {
            None
        };

        let mut task = self.engine.pool.acquire(identity);
        let handle = task.handle();

        let started = match cached {
            Some(payload) => task.begin_cached(payload),
            None => task.begin_queued(),
        };
        if let Err(e) = started {
            tracing::error!(slot = handle.slot, "{e}");
            self.engine.pool.recycle(task);
            return None;
        }

        let requester: std::rc::Weak<Q> = Rc::downgrade(requester);
        let requester: std::rc::Weak<dyn Requester<R>> = requester;
        self.supersede(&requester);
        self.bindings.insert(
            handle.slot,
            Binding {
                generation: handle.generation,
                source: task.identity().source.clone(),
                requester,
            },
        );

        if task.status() == Status::DownloadComplete {
            tracing::debug!(source = %task.identity().source, "Memory cache hit");
            self.engine.schedule_decode(task);
        } else {
            tracing::debug!(source = %task.identity().source, "Queued for download");
            self.notify_requester(handle, Status::TaskQueued);
            self.engine.schedule_download(task);
        }

        Some(handle)
    }

    /// Cancel the task behind `handle` if it is still loading `source`.
    ///
    /// No further notification for that task reaches its requester. A queued
    /// job is not pulled out of its scheduler; a worker discards it when it
    /// comes up.
    pub fn cancel(&mut self, handle: TaskHandle, source: &ImageSource) -> bool {
        let cancelled = self.engine.pool.cancel(handle, source);
        if cancelled {
            tracing::debug!(slot = handle.slot, %source, "Cancelled request");
            self.release_binding(handle);
        }
        cancelled
    }

    /// Cancel every active task, whatever stage it is in.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.engine.pool.cancel_all();
        self.bindings.clear();
        tracing::debug!(count, "Cancelled all requests");
        count
    }

    /// A handle that can cancel tasks from other threads.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            engine: Arc::downgrade(&self.engine),
        }
    }

    /// Apply every event already waiting. Never blocks.
    pub fn dispatch_pending<M>(&mut self, resources: &mut M) -> usize
    where
        M: ResourceManager<Resource = R>,
    {
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply(event, resources);
            count += 1;
        }
        count
    }

    /// Wait for the next event and apply it.
    pub async fn dispatch_next<M>(&mut self, resources: &mut M) -> bool
    where
        M: ResourceManager<Resource = R>,
    {
        match self.events.recv().await {
            Some(event) => {
                self.apply(event, resources);
                true
            }
            None => false,
        }
    }

    /// Disk cache file for a source location.
    pub fn cache_path_for(&self, location: &str) -> PathBuf {
        self.engine.loader.cache_path_for(location)
    }

    /// Memory cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.engine.cache.stats()
    }

    /// Whether the memory cache holds a payload for `location`.
    pub fn is_cached(&self, location: &str) -> bool {
        self.engine.cache.contains(&crate::key::generate(location))
    }

    /// Task pool occupancy.
    pub fn pool_stats(&self) -> PoolStats {
        self.engine.pool.stats()
    }

    /// Jobs waiting in the download and decode queues.
    pub fn queued_jobs(&self) -> (usize, usize) {
        (self.engine.queued_downloads(), self.engine.queued_decodes())
    }

    /// Number of requesters still waiting on a live task.
    ///
    /// Tasks cancelled through a [`Canceller`] stop counting once their
    /// worker has given them back to the pool.
    pub fn pending_requests(&self) -> usize {
        self.bindings
            .iter()
            .filter(|(slot, binding)| {
                self.engine.pool.is_current(TaskHandle {
                    slot: **slot,
                    generation: binding.generation,
                })
            })
            .count()
    }

    #[cfg(test)]
    pub(crate) const fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn apply<M>(&mut self, event: Event, resources: &mut M)
    where
        M: ResourceManager<Resource = R>,
    {
        match event {
            Event::Status { handle, status } => self.notify_requester(handle, status),
            Event::Finished(task) => self.finish(task, resources),
        }
    }

    fn finish<M>(&mut self, mut task: Task, resources: &mut M)
    where
        M: ResourceManager<Resource = R>,
    {
        let handle = task.handle();

        if task.is_cancelled() {
            tracing::debug!(slot = handle.slot, "Dropping result of cancelled task");
        } else if let Some(requester) = self.live_requester(handle) {
            match task.status() {
                Status::TaskComplete => {
                    let pixels = task.take_pixels();
                    let identity = task.identity();
                    let resource = match resources.lookup_existing(identity) {
                        Some(resource) => Ok(resource),
                        None => match pixels {
                            Some(pixels) => resources.create(pixels, identity),
                            None => Err(anyhow::anyhow!("task completed without pixels")),
                        },
                    };
                    match resource {
                        Ok(resource) => {
                            requester.on_status(Status::TaskComplete);
                            requester.on_resource_ready(resource);
                        }
                        Err(e) => {
                            tracing::warn!(source = %identity.source, "Failed to create resource: {e}");
                            requester.on_status(Status::DownloadFailed);
                        }
                    }
                }
                status => {
                    requester.on_status(status);
                    if let Some(error) = task.failure() {
                        requester.on_failure(error);
                    }
                }
            }
        }

        self.release_binding(handle);
        self.engine.pool.recycle(task);
    }

    fn notify_requester(&mut self, handle: TaskHandle, status: Status) {
        if let Some(requester) = self.live_requester(handle) {
            requester.on_status(status);
        }
    }

    /// The requester bound to `handle`, if it still exists and still wants
    /// what the task is loading.
    fn live_requester(&mut self, handle: TaskHandle) -> Option<Rc<dyn Requester<R>>> {
        let binding = self.bindings.get(&handle.slot)?;
        if binding.generation != handle.generation {
            return None;
        }
        let Some(requester) = binding.requester.upgrade() else {
            tracing::trace!(slot = handle.slot, "Requester dropped");
            self.bindings.remove(&handle.slot);
            return None;
        };
        if requester.desired().as_ref() != Some(&binding.source) {
            tracing::trace!(slot = handle.slot, "Requester repurposed, dropping notification");
            return None;
        }
        Some(requester)
    }

    /// A requester waits on one task at a time. Cancel whatever it asked for
    /// before.
    fn supersede(&mut self, requester: &std::rc::Weak<dyn Requester<R>>) {
        let engine = &self.engine;
        self.bindings.retain(|slot, binding| {
            if !std::rc::Weak::ptr_eq(&binding.requester, requester) {
                return true;
            }
            let handle = TaskHandle {
                slot: *slot,
                generation: binding.generation,
            };
            if engine.pool.cancel(handle, &binding.source) {
                tracing::debug!(slot = *slot, source = %binding.source, "Superseded by a newer request");
            }
            false
        });
    }

    fn release_binding(&mut self, handle: TaskHandle) {
        if self
            .bindings
            .get(&handle.slot)
            .is_some_and(|b| b.generation == handle.generation)
        {
            self.bindings.remove(&handle.slot);
        }
    }
}

impl<R> Drop for Manager<R> {
    fn drop(&mut self) {
        // Let queued and running jobs wind down instead of finishing work
        // nobody will receive.
        self.engine.pool.cancel_all();
    }
}
