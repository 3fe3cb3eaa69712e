//! End-to-end behaviour of the manager, driven from a single-threaded
//! consumer context with fake collaborators.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use super::{Manager, Requester, ResourceManager};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::images::{Fetcher, PixelBuffer, test_png};
use crate::models::{ImageSource, RequestIdentity, Status};

const WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Texture {
    id: usize,
    width: u32,
    height: u32,
}

/// Texture registry keyed by source location.
#[derive(Default)]
struct TextureStore {
    live: HashMap<String, Texture>,
    created: usize,
}

impl ResourceManager for TextureStore {
    type Resource = Texture;

    fn lookup_existing(&self, identity: &RequestIdentity) -> Option<Texture> {
        self.live.get(&identity.source.location).cloned()
    }

    fn create(&mut self, pixels: PixelBuffer, identity: &RequestIdentity) -> anyhow::Result<Texture> {
        self.created += 1;
        let texture = Texture {
            id: self.created,
            width: pixels.width,
            height: pixels.height,
        };
        self.live.insert(identity.source.location.clone(), texture.clone());
        Ok(texture)
    }
}

/// A view that records everything it is told.
struct View {
    desired: RefCell<Option<ImageSource>>,
    statuses: RefCell<Vec<Status>>,
    texture: RefCell<Option<Texture>>,
    decode_failures: Cell<usize>,
    failures: Cell<usize>,
}

impl View {
    fn showing(source: ImageSource) -> Rc<Self> {
        Rc::new(Self {
            desired: RefCell::new(Some(source)),
            statuses: RefCell::new(Vec::new()),
            texture: RefCell::new(None),
            decode_failures: Cell::new(0),
            failures: Cell::new(0),
        })
    }

    fn statuses(&self) -> Vec<Status> {
        self.statuses.borrow().clone()
    }

    fn is_settled(&self) -> bool {
        self.statuses.borrow().last().is_some_and(Status::is_terminal)
    }
}

impl Requester<Texture> for View {
    fn desired(&self) -> Option<ImageSource> {
        self.desired.borrow().clone()
    }

    fn on_status(&self, status: Status) {
        self.statuses.borrow_mut().push(status);
    }

    fn on_resource_ready(&self, resource: Texture) {
        *self.texture.borrow_mut() = Some(resource);
    }

    fn on_failure(&self, error: &PipelineError) {
        self.failures.set(self.failures.get() + 1);
        if error.is_decode() {
            self.decode_failures.set(self.decode_failures.get() + 1);
        }
    }
}

/// Serves the same body for every URL.
struct MemoryFetcher {
    body: Mutex<Vec<u8>>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    fn new(body: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(body),
            calls: AtomicUsize::new(0),
        })
    }

    fn serve(&self, body: Vec<u8>) {
        *self.body.lock() = body;
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, _url: &str, _cancel: &CancellationToken) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.lock().clone())
    }
}

/// Blocks until released, whatever the cancellation token says.
struct DeafFetcher {
    started: mpsc::SyncSender<()>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl Fetcher for DeafFetcher {
    fn fetch(&self, _url: &str, _cancel: &CancellationToken) -> Result<Vec<u8>> {
        let _ = self.started.send(());
        let _ = self.release.lock().recv_timeout(WAIT);
        Ok(test_png(2, 2))
    }
}

/// Never finishes on its own; returns once the task is cancelled.
#[derive(Default)]
struct StallingFetcher {
    started: AtomicUsize,
    interrupted: AtomicUsize,
}

impl Fetcher for StallingFetcher {
    fn fetch(&self, _url: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if cancel.is_cancelled() {
                self.interrupted.fetch_add(1, Ordering::SeqCst);
                return Err(PipelineError::Cancelled);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(test_png(2, 2))
    }
}

fn test_config(dir: &Path) -> Config {
    Config {
        download_workers: 4,
        download_queue: 8,
        decode_workers: 2,
        decode_queue: 8,
        task_pool_size: 2,
        disk_cache_dir: Some(dir.join("network_cache")),
        asset_root: dir.join("assets"),
        ..Config::default()
    }
}

/// Dispatch events until `done` holds.
async fn run_until(
    manager: &mut Manager<Texture>,
    store: &mut TextureStore,
    done: impl Fn() -> bool,
) {
    while !done() {
        let got = tokio::time::timeout(WAIT, manager.dispatch_next(store))
            .await
            .expect("timed out waiting for pipeline event");
        assert!(got, "event channel closed");
    }
}

/// Dispatch whatever arrives until every task is back in the pool.
async fn settle(manager: &mut Manager<Texture>, store: &mut TextureStore) {
    let deadline = Instant::now() + WAIT;
    loop {
        manager.dispatch_pending(store);
        if manager.pool_stats().active == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "tasks never returned to the pool");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    manager.dispatch_pending(store);
}

#[tokio::test]
async fn test_network_request_reports_every_stage() {
    let dir = tempdir().unwrap();
    let fetcher = MemoryFetcher::new(test_png(8, 6));
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher.clone()).unwrap();
    let mut store = TextureStore::default();

    let view = View::showing(ImageSource::network("http://x/a.png"));
    let handle = manager.request(&mut store, &view, false, 0, 0, 0);
    assert!(handle.is_some());

    run_until(&mut manager, &mut store, || view.is_settled()).await;

    assert_eq!(
        view.statuses(),
        vec![
            Status::TaskQueued,
            Status::DownloadStarted,
            Status::DownloadComplete,
            Status::DecodeStarted,
            Status::TaskComplete,
        ]
    );
    let texture = view.texture.borrow().clone().unwrap();
    assert_eq!((texture.width, texture.height), (8, 6));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    assert!(manager.cache_path_for("http://x/a.png").is_file());

    settle(&mut manager, &mut store).await;
    assert_eq!(manager.pending_requests(), 0);
}

#[tokio::test]
async fn test_cached_payload_skips_download() {
    let dir = tempdir().unwrap();
    let fetcher = MemoryFetcher::new(test_png(4, 4));
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher.clone()).unwrap();
    let mut store = TextureStore::default();

    let first = View::showing(ImageSource::network("http://x/a.png"));
    manager.request(&mut store, &first, false, 0, 0, 0);
    run_until(&mut manager, &mut store, || first.is_settled()).await;
    assert!(manager.is_cached("http://x/a.png"));

    // Forget the texture so the request has to go through the pipeline
    store.live.clear();

    let second = View::showing(ImageSource::network("http://x/a.png"));
    assert!(manager.request(&mut store, &second, true, 0, 0, 0).is_some());
    run_until(&mut manager, &mut store, || second.is_settled()).await;

    assert_eq!(second.statuses(), vec![Status::DecodeStarted, Status::TaskComplete]);
    assert!(second.texture.borrow().is_some());
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_live_resource_is_attached_synchronously() {
    let dir = tempdir().unwrap();
    let fetcher = MemoryFetcher::new(test_png(4, 4));
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher.clone()).unwrap();
    let mut store = TextureStore::default();
    let texture = Texture {
        id: 99,
        width: 1,
        height: 1,
    };
    store.live.insert("http://x/a.png".to_string(), texture.clone());

    let view = View::showing(ImageSource::network("http://x/a.png"));
    assert!(manager.request(&mut store, &view, true, 0, 0, 0).is_none());

    assert_eq!(view.texture.borrow().as_ref(), Some(&texture));
    assert!(view.statuses().is_empty());
    assert_eq!(manager.pool_stats().active, 0);
    assert_eq!(manager.queued_jobs(), (0, 0));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_local_file_fails_once() {
    let dir = tempdir().unwrap();
    let mut manager =
        Manager::with_fetcher(&test_config(dir.path()), MemoryFetcher::new(Vec::new())).unwrap();
    let mut store = TextureStore::default();
    let before = manager.cache_stats();

    let missing = dir.path().join("missing.png");
    let view = View::showing(ImageSource::file(missing.to_string_lossy()));
    manager.request(&mut store, &view, true, 0, 0, 0);
    run_until(&mut manager, &mut store, || view.is_settled()).await;
    settle(&mut manager, &mut store).await;

    let statuses = view.statuses();
    assert_eq!(statuses.iter().filter(|s| **s == Status::DownloadFailed).count(), 1);
    assert_eq!(statuses.last(), Some(&Status::DownloadFailed));
    assert!(!statuses.contains(&Status::TaskComplete));
    assert_eq!(view.failures.get(), 1);
    assert_eq!(view.decode_failures.get(), 0);

    let after = manager.cache_stats();
    assert_eq!(after.entry_count, before.entry_count);
    assert_eq!(after.size_bytes, before.size_bytes);
    assert_eq!(manager.pool_stats().active, 0);
}

#[tokio::test]
async fn test_corrupt_payload_reports_decode_failure() {
    let dir = tempdir().unwrap();
    let fetcher = MemoryFetcher::new(b"not an image".to_vec());
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher).unwrap();
    let mut store = TextureStore::default();

    let view = View::showing(ImageSource::network("http://x/broken.png"));
    manager.request(&mut store, &view, true, 0, 0, 0);
    run_until(&mut manager, &mut store, || view.is_settled()).await;

    assert_eq!(
        view.statuses(),
        vec![
            Status::TaskQueued,
            Status::DownloadStarted,
            Status::DownloadComplete,
            Status::DecodeStarted,
            Status::DownloadFailed,
        ]
    );
    assert_eq!(view.decode_failures.get(), 1);
    assert!(!manager.is_cached("http://x/broken.png"));
}

#[tokio::test]
async fn test_local_file_and_asset_requests() {
    let dir = tempdir().unwrap();
    let local = dir.path().join("photo.png");
    std::fs::write(&local, test_png(10, 20)).unwrap();
    std::fs::create_dir_all(dir.path().join("assets")).unwrap();
    std::fs::write(dir.path().join("assets").join("logo.png"), test_png(3, 3)).unwrap();

    let mut manager =
        Manager::with_fetcher(&test_config(dir.path()), MemoryFetcher::new(Vec::new())).unwrap();
    let mut store = TextureStore::default();

    let photo = View::showing(ImageSource::file(local.to_string_lossy()));
    let logo = View::showing(ImageSource::parse("asset://logo.png"));
    manager.request(&mut store, &photo, true, 10, 10, 90);
    manager.request(&mut store, &logo, true, 0, 0, 0);
    run_until(&mut manager, &mut store, || photo.is_settled() && logo.is_settled()).await;

    // 10x20 fits into 5x10, then a quarter turn
    let texture = photo.texture.borrow().clone().unwrap();
    assert_eq!((texture.width, texture.height), (10, 5));
    assert_eq!(logo.texture.borrow().as_ref().map(|t| t.width), Some(3));
    assert_eq!(store.created, 2);
}

#[tokio::test]
async fn test_cancel_all_interrupts_in_flight_downloads() {
    let dir = tempdir().unwrap();
    let fetcher = Arc::new(StallingFetcher::default());
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher.clone()).unwrap();
    let mut store = TextureStore::default();

    let views: Vec<_> = (0..3)
        .map(|i| View::showing(ImageSource::network(format!("http://x/{i}.png"))))
        .collect();
    for view in &views {
        assert!(manager.request(&mut store, view, false, 0, 0, 0).is_some());
    }

    let deadline = Instant::now() + WAIT;
    while fetcher.started.load(Ordering::SeqCst) < 3 {
        assert!(Instant::now() < deadline, "downloads never started");
        manager.dispatch_pending(&mut store);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert_eq!(manager.cancel_all(), 3);
    settle(&mut manager, &mut store).await;

    assert_eq!(fetcher.interrupted.load(Ordering::SeqCst), 3);
    for view in &views {
        assert!(!view.statuses().contains(&Status::TaskComplete));
        assert!(view.texture.borrow().is_none());
    }
}

#[tokio::test]
async fn test_cancel_single_request() {
    let dir = tempdir().unwrap();
    let fetcher = Arc::new(StallingFetcher::default());
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher.clone()).unwrap();
    let mut store = TextureStore::default();

    let source = ImageSource::network("http://x/slow.png");
    let view = View::showing(source.clone());
    let handle = manager.request(&mut store, &view, false, 0, 0, 0).unwrap();

    let deadline = Instant::now() + WAIT;
    while fetcher.started.load(Ordering::SeqCst) < 1 {
        assert!(Instant::now() < deadline, "download never started");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // A different identity does not match the handle
    assert!(!manager.cancel(handle, &ImageSource::network("http://x/other.png")));
    assert!(manager.cancel(handle, &source));
    settle(&mut manager, &mut store).await;

    assert_eq!(fetcher.interrupted.load(Ordering::SeqCst), 1);
    assert!(!view.statuses().contains(&Status::TaskComplete));
    // The slot may be reused now, so the old handle is inert
    assert!(!manager.cancel(handle, &source));
}

#[tokio::test]
async fn test_repurposed_requester_ignores_stale_completion() {
    let dir = tempdir().unwrap();
    let fetcher = MemoryFetcher::new(test_png(4, 4));
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher).unwrap();
    let mut store = TextureStore::default();

    let view = View::showing(ImageSource::network("http://x/a.png"));
    manager.request(&mut store, &view, false, 0, 0, 0);
    assert_eq!(view.statuses(), vec![Status::TaskQueued]);

    // The view scrolls to another image before the first one lands
    *view.desired.borrow_mut() = Some(ImageSource::network("http://x/b.png"));
    settle(&mut manager, &mut store).await;

    assert_eq!(view.statuses(), vec![Status::TaskQueued]);
    assert!(view.texture.borrow().is_none());
    assert_eq!(store.created, 0);
}

#[tokio::test]
async fn test_dropped_requester_is_not_kept_alive() {
    let dir = tempdir().unwrap();
    let fetcher = MemoryFetcher::new(test_png(4, 4));
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher).unwrap();
    let mut store = TextureStore::default();

    let view = View::showing(ImageSource::network("http://x/a.png"));
    manager.request(&mut store, &view, false, 0, 0, 0);
    let weak = Rc::downgrade(&view);
    drop(view);
    assert!(weak.upgrade().is_none());

    settle(&mut manager, &mut store).await;
    assert_eq!(manager.pending_requests(), 0);
    assert_eq!(store.created, 0);
}

#[tokio::test]
async fn test_requester_without_source_creates_no_task() {
    let dir = tempdir().unwrap();
    let mut manager =
        Manager::with_fetcher(&test_config(dir.path()), MemoryFetcher::new(Vec::new())).unwrap();
    let mut store = TextureStore::default();

    let view = View::showing(ImageSource::network("http://x/a.png"));
    *view.desired.borrow_mut() = None;
    assert!(manager.request(&mut store, &view, true, 0, 0, 0).is_none());
    assert_eq!(manager.pool_stats().active, 0);
}

#[tokio::test]
async fn test_initialize_is_idempotent_and_initialize_new_resets() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let mut slot = Some(Manager::with_fetcher(&config, MemoryFetcher::new(test_png(2, 2))).unwrap());
    let mut store = TextureStore::default();

    {
        let manager = Manager::initialize(&mut slot, &config).unwrap();
        let view = View::showing(ImageSource::network("http://x/a.png"));
        manager.request(&mut store, &view, true, 0, 0, 0);
        run_until(manager, &mut store, || view.is_settled()).await;
        assert!(manager.is_cached("http://x/a.png"));
    }

    let manager = Manager::initialize(&mut slot, &config).unwrap();
    assert!(manager.is_cached("http://x/a.png"));

    let manager = Manager::initialize_new(&mut slot, &config).unwrap();
    assert!(!manager.is_cached("http://x/a.png"));
    assert!(manager.cache_stats().entry_count == 0);
}

#[tokio::test]
async fn test_canceller_works_from_another_thread() {
    let dir = tempdir().unwrap();
    let fetcher = Arc::new(StallingFetcher::default());
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher.clone()).unwrap();
    let mut store = TextureStore::default();

    let view = View::showing(ImageSource::network("http://x/slow.png"));
    manager.request(&mut store, &view, false, 0, 0, 0);

    let canceller = manager.canceller();
    let signalled = std::thread::spawn(move || canceller.cancel_all()).join().unwrap();
    assert_eq!(signalled, 1);

    settle(&mut manager, &mut store).await;
    assert!(!view.statuses().contains(&Status::TaskComplete));
    assert_eq!(manager.pending_requests(), 0);
}

#[test]
fn test_dispatch_next_waits_while_idle() {
    let dir = tempdir().unwrap();
    let mut manager: Manager<Texture> =
        Manager::with_fetcher(&test_config(dir.path()), MemoryFetcher::new(Vec::new())).unwrap();
    let mut store = TextureStore::default();

    let mut next = tokio_test::task::spawn(manager.dispatch_next(&mut store));
    tokio_test::assert_pending!(next.poll());
    drop(next);

    assert_eq!(manager.dispatch_pending(&mut store), 0);
}

#[tokio::test]
async fn test_undecodable_response_is_not_kept_on_disk() {
    let dir = tempdir().unwrap();
    let fetcher = MemoryFetcher::new(b"<html>502</html>".to_vec());
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher.clone()).unwrap();
    let mut store = TextureStore::default();
    let url = "http://x/flaky.png";

    let first = View::showing(ImageSource::network(url));
    manager.request(&mut store, &first, true, 0, 0, 0);
    run_until(&mut manager, &mut store, || first.is_settled()).await;
    assert_eq!(first.statuses().last(), Some(&Status::DownloadFailed));
    assert!(!manager.cache_path_for(url).exists());

    // The server recovers; asking again downloads the good body
    fetcher.serve(test_png(4, 4));
    let retry = View::showing(ImageSource::network(url));
    manager.request(&mut store, &retry, true, 0, 0, 0);
    run_until(&mut manager, &mut store, || retry.is_settled()).await;

    assert_eq!(retry.statuses().last(), Some(&Status::TaskComplete));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    assert!(manager.cache_path_for(url).is_file());
}

#[tokio::test]
async fn test_corrupt_disk_entry_is_evicted_and_refetched() {
    let dir = tempdir().unwrap();
    let fetcher = MemoryFetcher::new(test_png(4, 4));
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher.clone()).unwrap();
    let mut store = TextureStore::default();
    let url = "http://x/a.png";

    let path = manager.cache_path_for(url);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"truncated").unwrap();

    let first = View::showing(ImageSource::network(url));
    manager.request(&mut store, &first, true, 0, 0, 0);
    run_until(&mut manager, &mut store, || first.is_settled()).await;
    assert_eq!(first.statuses().last(), Some(&Status::DownloadFailed));
    assert_eq!(first.decode_failures.get(), 1);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert!(!path.exists());

    let retry = View::showing(ImageSource::network(url));
    manager.request(&mut store, &retry, true, 0, 0, 0);
    run_until(&mut manager, &mut store, || retry.is_settled()).await;
    assert_eq!(retry.statuses().last(), Some(&Status::TaskComplete));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_all_reaches_tasks_waiting_for_decode() {
    let dir = tempdir().unwrap();
    let config = Config {
        decode_workers: 1,
        ..test_config(dir.path())
    };
    let url = "http://x/a.png";
    let mut manager = Manager::with_fetcher(&config, MemoryFetcher::new(test_png(4, 4))).unwrap();
    let mut store = TextureStore::default();

    // Keep the only decode worker busy
    let (busy_tx, busy_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    assert!(manager.engine().decodes.submit(Box::new(move || {
        let _ = busy_tx.send(());
        let _ = release_rx.recv_timeout(WAIT);
    })));
    busy_rx.recv_timeout(WAIT).unwrap();

    let view = View::showing(ImageSource::network(url));
    manager.request(&mut store, &view, false, 0, 0, 0);
    run_until(&mut manager, &mut store, || {
        view.statuses().contains(&Status::DownloadComplete)
    })
    .await;

    assert_eq!(manager.cancel_all(), 1);
    release_tx.send(()).unwrap();
    settle(&mut manager, &mut store).await;

    assert!(!view.statuses().contains(&Status::DecodeStarted));
    assert!(!view.statuses().contains(&Status::TaskComplete));
    assert!(view.texture.borrow().is_none());
    assert_eq!(manager.queued_jobs(), (0, 0));
    assert_eq!(manager.cache_stats().entry_count, 0);
    assert!(!manager.cache_path_for(url).exists());
}

#[tokio::test]
async fn test_cancelled_queued_downloads_are_skipped() {
    let dir = tempdir().unwrap();
    let config = Config {
        download_workers: 1,
        ..test_config(dir.path())
    };
    let fetcher = Arc::new(StallingFetcher::default());
    let mut manager = Manager::with_fetcher(&config, fetcher.clone()).unwrap();
    let mut store = TextureStore::default();

    let views: Vec<_> = (0..4)
        .map(|i| View::showing(ImageSource::network(format!("http://x/{i}.png"))))
        .collect();
    for view in &views {
        manager.request(&mut store, view, false, 0, 0, 0);
    }

    let deadline = Instant::now() + WAIT;
    while fetcher.started.load(Ordering::SeqCst) < 1 {
        assert!(Instant::now() < deadline, "download never started");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    // Cancelled jobs hold their queue places until a worker drops them
    assert_eq!(manager.queued_jobs().0, 3);

    assert_eq!(manager.cancel_all(), 4);
    settle(&mut manager, &mut store).await;

    assert_eq!(manager.queued_jobs(), (0, 0));
    assert_eq!(fetcher.started.load(Ordering::SeqCst), 1);
    assert_eq!(fetcher.interrupted.load(Ordering::SeqCst), 1);
    assert_eq!(manager.pending_requests(), 0);
}

#[tokio::test]
async fn test_initialize_new_does_not_wait_for_blocked_download() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let (started_tx, started_rx) = mpsc::sync_channel(1);
    let (release_tx, release_rx) = mpsc::channel();
    let fetcher = Arc::new(DeafFetcher {
        started: started_tx,
        release: Mutex::new(release_rx),
    });
    let mut slot: Option<Manager<Texture>> = Some(Manager::with_fetcher(&config, fetcher).unwrap());
    let mut store = TextureStore::default();

    let view = View::showing(ImageSource::network("http://x/slow.png"));
    if let Some(manager) = slot.as_mut() {
        manager.request(&mut store, &view, false, 0, 0, 0);
    }
    started_rx.recv_timeout(WAIT).unwrap();

    let replaced_at = Instant::now();
    let manager = Manager::initialize_new(&mut slot, &config).unwrap();
    assert!(replaced_at.elapsed() < Duration::from_secs(2));
    assert_eq!(manager.pending_requests(), 0);

    release_tx.send(()).unwrap();
}

#[tokio::test]
async fn test_new_request_supersedes_previous_one_from_same_requester() {
    let dir = tempdir().unwrap();
    let fetcher = MemoryFetcher::new(test_png(4, 4));
    let mut manager = Manager::with_fetcher(&test_config(dir.path()), fetcher).unwrap();
    let mut store = TextureStore::default();

    let view = View::showing(ImageSource::network("http://x/a.png"));
    let first = manager.request(&mut store, &view, false, 0, 0, 0).unwrap();
    let second = manager.request(&mut store, &view, false, 0, 0, 0).unwrap();
    assert_ne!(first, second);
    assert_eq!(manager.pending_requests(), 1);

    run_until(&mut manager, &mut store, || view.is_settled()).await;
    settle(&mut manager, &mut store).await;

    let completions = view
        .statuses()
        .iter()
        .filter(|s| **s == Status::TaskComplete)
        .count();
    assert_eq!(completions, 1);
    assert_eq!(store.created, 1);
}
