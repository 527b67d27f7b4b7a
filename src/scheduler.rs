//! Background scheduling of the discovery and extraction workers.
//!
//! Each worker runs in its own tokio task as a loop of *cycle, then wait*.
//! The loop is guarded by a small state machine:
//!
//! ```text
//!          start (CAS)            stop
//!   Idle ─────────────► Running ───────► Stopping
//!    ▲                                      │
//!    └──────────── task exits ◄─────────────┘
//! ```
//!
//! `start` only spawns a task when it wins the Idle → Running transition,
//! so a worker never runs two cycles at once. `stop` cancels the worker's
//! token: the wait between cycles ends immediately, while a cycle already
//! in flight finishes first (its fetches are bounded by their timeout).
//!
//! The two workers share nothing but the work store.

use crate::crawler::{ContentExtraction, LinkDiscovery};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// One unit of repeatable background work.
#[async_trait]
pub trait Cycle: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run_cycle(&self);
}

#[async_trait]
impl Cycle for LinkDiscovery {
    fn name(&self) -> &'static str {
        "discovery"
    }

    async fn run_cycle(&self) {
        let queued = self.run_discovery_cycle().await;
        debug!(queued = queued.len(), "Discovery cycle finished");
    }
}

#[async_trait]
impl Cycle for ContentExtraction {
    fn name(&self) -> &'static str {
        "extraction"
    }

    async fn run_cycle(&self) {
        let report = self.run_extraction_cycle().await;
        debug!(?report, "Extraction cycle finished");
    }
}

/// Lifecycle state of a [`BotWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Idle,
        }
    }
}

#[derive(Default)]
struct Running {
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// A [`Cycle`] run repeatedly in the background.
pub struct BotWorker {
    cycle: Arc<dyn Cycle>,
    interval: Duration,
    state: Arc<AtomicU8>,
    running: Mutex<Running>,
}

impl BotWorker {
    pub fn new(cycle: Arc<dyn Cycle>, interval: Duration) -> Self {
        Self {
            cycle,
            interval,
            state: Arc::new(AtomicU8::new(WorkerState::Idle as u8)),
            running: Mutex::new(Running::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.cycle.name()
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    // A panicking cycle is caught inside the task, so poisoning only
    // follows a panic in this module itself.
    fn running(&self) -> MutexGuard<'_, Running> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the worker loop. Returns `false`, doing nothing, unless the
    /// worker was idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running();
        if self
            .state
            .compare_exchange(
                WorkerState::Idle as u8,
                WorkerState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!(worker = self.name(), state = ?self.state(), "Worker already active");
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.cycle.clone(),
            self.interval,
            self.state.clone(),
            token.clone(),
        ));
        running.token = Some(token);
        running.handle = Some(handle);
        info!(worker = self.name(), interval_secs = self.interval.as_secs(), "Worker started");
        true
    }

    /// Ask a running worker to stop. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let running = self.running();
        if self
            .state
            .compare_exchange(
                WorkerState::Running as u8,
                WorkerState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        if let Some(token) = &running.token {
            token.cancel();
        }
        info!(worker = self.name(), "Worker stopping");
        true
    }

    /// Wait for the worker's task, if any, to finish.
    pub async fn join(&self) {
        let handle = self.running().handle.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(worker = self.name(), error = %e, "Worker task failed");
                self.state.store(WorkerState::Idle as u8, Ordering::Release);
            }
        }
    }
}

#[instrument(level = "info", skip_all, fields(worker = cycle.name()))]
async fn run_loop(
    cycle: Arc<dyn Cycle>,
    interval: Duration,
    state: Arc<AtomicU8>,
    token: CancellationToken,
) {
    while !token.is_cancelled() {
        if let Err(panic) = AssertUnwindSafe(cycle.run_cycle()).catch_unwind().await {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(%reason, "Cycle panicked; restarting after the interval");
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    state.store(WorkerState::Idle as u8, Ordering::Release);
    info!("Worker stopped");
}

/// Owns the discovery and extraction workers.
pub struct BotScheduler {
    discovery: BotWorker,
    extraction: BotWorker,
}

impl BotScheduler {
    pub fn new(
        discovery: Arc<LinkDiscovery>,
        extraction: Arc<ContentExtraction>,
        interval: Duration,
    ) -> Self {
        Self {
            discovery: BotWorker::new(discovery, interval),
            extraction: BotWorker::new(extraction, interval),
        }
    }

    pub fn discovery(&self) -> &BotWorker {
        &self.discovery
    }

    pub fn extraction(&self) -> &BotWorker {
        &self.extraction
    }

    /// Start both workers. Workers that are already active are left alone.
    pub fn start_background_workers(&self) {
        self.discovery.start();
        self.extraction.start();
    }

    /// Stop both workers and wait for their tasks to exit.
    pub async fn shutdown(&self) {
        self.discovery.stop();
        self.extraction.stop();
        tokio::join!(self.discovery.join(), self.extraction.join());
        info!("All workers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlerSettings;
    use crate::crawler::testing::{listing, StubFetcher};
    use crate::models::{PostStatus, Source};
    use crate::store::{MemoryWorkStore, StaticSourceRegistry, WorkStore};
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, timeout};

    #[derive(Default)]
    struct Counting {
        runs: AtomicUsize,
        panic_first: bool,
    }

    #[async_trait]
    impl Cycle for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_cycle(&self) {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if self.panic_first && run == 0 {
                panic!("first cycle blows up");
            }
        }
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_start_is_guarded() {
        let cycle = Arc::new(Counting::default());
        let worker = BotWorker::new(cycle.clone(), Duration::from_secs(3600));

        assert_eq!(worker.state(), WorkerState::Idle);
        assert!(worker.start());
        assert!(!worker.start());
        assert_eq!(worker.state(), WorkerState::Running);

        wait_for(|| cycle.runs.load(Ordering::SeqCst) == 1).await;
        assert!(worker.stop());
        assert!(!worker.stop());
        worker.join().await;

        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(cycle.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_interrupts_wait_and_restart_works() {
        let cycle = Arc::new(Counting::default());
        let worker = BotWorker::new(cycle.clone(), Duration::from_secs(3600));

        assert!(worker.start());
        wait_for(|| cycle.runs.load(Ordering::SeqCst) == 1).await;

        // The hour-long wait must not delay shutdown.
        worker.stop();
        timeout(Duration::from_secs(1), worker.join())
            .await
            .expect("stop should end the wait immediately");

        assert!(worker.start());
        wait_for(|| cycle.runs.load(Ordering::SeqCst) == 2).await;
        worker.stop();
        worker.join().await;
    }

    #[tokio::test]
    async fn test_cycles_repeat_after_interval() {
        let cycle = Arc::new(Counting::default());
        let worker = BotWorker::new(cycle.clone(), Duration::from_millis(10));

        worker.start();
        wait_for(|| cycle.runs.load(Ordering::SeqCst) >= 3).await;
        worker.stop();
        worker.join().await;
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_panicking_cycle_restarts() {
        let cycle = Arc::new(Counting {
            panic_first: true,
            ..Counting::default()
        });
        let worker = BotWorker::new(cycle.clone(), Duration::from_millis(10));

        worker.start();
        wait_for(|| cycle.runs.load(Ordering::SeqCst) >= 2).await;
        assert_eq!(worker.state(), WorkerState::Running);
        worker.stop();
        worker.join().await;
    }

    #[tokio::test]
    async fn test_scheduler_runs_pipeline() {
        let site = "https://vnexpress.net";
        let listing_url = format!("{site}/thoi-su");
        let fetcher = Arc::new(
            StubFetcher::new()
                .with_page(&listing_url, &listing(site, "story", 2))
                .with_page(&format!("{site}/story-1.html"), "<h1>One</h1>")
                .with_page(&format!("{site}/story-2.html"), "<h1>Two</h1>"),
        );
        let store = Arc::new(MemoryWorkStore::new());
        let registry = Arc::new(StaticSourceRegistry::new(vec![Source::new(1, 1, listing_url)]));
        let settings = CrawlerSettings::default();

        let scheduler = BotScheduler::new(
            Arc::new(LinkDiscovery::new(
                registry.clone(),
                store.clone(),
                fetcher.clone(),
                &settings,
            )),
            Arc::new(ContentExtraction::new(registry, store.clone(), fetcher, &settings)),
            Duration::from_millis(10),
        );

        scheduler.start_background_workers();
        assert_eq!(scheduler.discovery().state(), WorkerState::Running);
        assert_eq!(scheduler.extraction().state(), WorkerState::Running);

        timeout(Duration::from_secs(5), async {
            while store.count_by_status(PostStatus::Crawled).await.unwrap() < 2 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both posts should be crawled");

        scheduler.shutdown().await;
        assert_eq!(scheduler.discovery().state(), WorkerState::Idle);
        assert_eq!(scheduler.extraction().state(), WorkerState::Idle);
        assert_eq!(store.count_by_status(PostStatus::Uncrawl).await.unwrap(), 0);
    }
}
