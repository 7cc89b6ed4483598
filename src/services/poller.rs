//! Interval-driven refresh of one piece of live data.
//!
//! A poller runs one `Initial` refresh when started, then a `Background`
//! refresh on every tick. Initial refreshes raise the loading flag and
//! surface errors. Background refreshes do neither: a failed tick leaves the
//! last good data in place. Ticks never wait for each other, so responses
//! may overlap; a response is only applied if nothing newer has been applied.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::services::upstream::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Mount and manual refresh.
    Initial,
    /// Timer tick.
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    Failed,
    /// A newer refresh started while this one was in flight.
    Stale,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedState<T> {
    pub data: T,
    pub loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Generation of the refresh whose data is shown.
    pub generation: u64,
    pub auto_refresh: bool,
    /// Newest generation whose response was applied, data or error.
    #[serde(skip)]
    resolved: u64,
    /// Newest generation started in `Initial` mode.
    #[serde(skip)]
    pending_initial: u64,
}

type LoadFuture<T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send>>;
type Loader<T> = Box<dyn Fn() -> LoadFuture<T> + Send + Sync>;

pub struct Poller<T> {
    name: String,
    interval: Duration,
    load: Loader<T>,
    state: watch::Sender<FeedState<T>>,
    toggle: watch::Sender<bool>,
    started: AtomicU64,
    stopped: AtomicBool,
}

impl<T> Poller<T> {
    /// Discard every response still in flight, now and later.
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl<T> Poller<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(name: impl Into<String>, interval: Duration, initial: T, load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let (state, _) = watch::channel(FeedState {
            data: initial,
            loading: false,
            error: None,
            last_updated: None,
            generation: 0,
            auto_refresh: true,
            resolved: 0,
            pending_initial: 0,
        });
        let (toggle, _) = watch::channel(true);

        Self {
            name: name.into(),
            interval,
            load: Box::new(move || Box::pin(load())),
            state,
            toggle,
            started: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> FeedState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState<T>> {
        self.state.subscribe()
    }

    pub async fn refresh(&self, mode: PollMode) -> RefreshOutcome {
        let generation = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        if mode == PollMode::Initial {
            self.state.send_modify(|s| {
                s.pending_initial = s.pending_initial.max(generation);
                s.loading = true;
            });
        }

        let outcome = (self.load)().await;

        let mut result = RefreshOutcome::Stale;
        self.state.send_if_modified(|s| {
            if self.stopped.load(Ordering::SeqCst) || s.resolved >= generation {
                return false;
            }
            match outcome {
                Ok(data) => {
                    s.data = data;
                    s.error = None;
                    s.last_updated = Some(Utc::now());
                    s.generation = generation;
                    result = RefreshOutcome::Applied;
                }
                Err(e) if mode == PollMode::Initial => {
                    tracing::error!(feed = %self.name, error = %e, "refresh failed");
                    s.error = Some(e.to_string());
                    result = RefreshOutcome::Failed;
                }
                Err(e) => {
                    tracing::warn!(feed = %self.name, error = %e, "background refresh failed, keeping last data");
                    result = RefreshOutcome::Failed;
                    return false;
                }
            }
            s.resolved = generation;
            s.loading = s.resolved < s.pending_initial;
            true
        });

        if result == RefreshOutcome::Stale {
            tracing::debug!(feed = %self.name, generation, "discarding stale response");
        }
        result
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.toggle.send_replace(enabled);
        self.state.send_if_modified(|s| std::mem::replace(&mut s.auto_refresh, enabled) != enabled);
        tracing::info!(feed = %self.name, enabled, "auto-refresh toggled");
    }

    pub fn spawn(self) -> PollerHandle<T> {
        let poller = Arc::new(self);
        let task = tokio::spawn(Arc::clone(&poller).run());
        PollerHandle { poller, task }
    }

    async fn run(self: Arc<Self>) {
        tracing::info!(feed = %self.name, interval_s = self.interval.as_secs(), "poller starting");
        self.refresh(PollMode::Initial).await;

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut toggle = self.toggle.subscribe();

        loop {
            if !*toggle.borrow_and_update() {
                if toggle.changed().await.is_err() {
                    break;
                }
                ticker.reset();
                continue;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let poller = Arc::clone(&self);
                    tokio::spawn(async move {
                        poller.refresh(PollMode::Background).await;
                    });
                }
                changed = toggle.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Owner of a running poller. Dropping it stops the timer and discards any
/// response still in flight.
pub struct PollerHandle<T> {
    poller: Arc<Poller<T>>,
    task: JoinHandle<()>,
}

impl<T> PollerHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn snapshot(&self) -> FeedState<T> {
        self.poller.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState<T>> {
        self.poller.subscribe()
    }

    /// Manual refresh: behaves like the initial load.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        self.poller.refresh(PollMode::Initial).await
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.poller.set_auto_refresh(enabled);
    }

    pub fn name(&self) -> &str {
        self.poller.name()
    }
}

impl<T> Drop for PollerHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
        self.poller.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn shape_error() -> FetchError {
        FetchError::Shape {
            url: "http://upstream/test".to_string(),
            reason: "boom".to_string(),
        }
    }

    fn counting_poller(interval: Duration) -> (Poller<usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let poller = Poller::new("test", interval, 0usize, move || {
            let counter = Arc::clone(&counter);
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
        });
        (poller, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_run_background_refreshes() {
        let (poller, calls) = counting_poller(Duration::from_secs(15));
        let handle = poller.spawn();

        tokio::time::sleep(Duration::from_secs(46)).await;
        // mount + ticks at 15s, 30s, 45s
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let state = handle.snapshot();
        assert_eq!(state.data, 4);
        assert!(!state.loading);
        assert!(state.last_updated.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_discarded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Arc::new(Poller::new("test", Duration::from_secs(60), String::new(), move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok("slow".to_string())
                } else {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok("fast".to_string())
                }
            }
        }));

        let slow = tokio::spawn({
            let poller = Arc::clone(&poller);
            async move { poller.refresh(PollMode::Background).await }
        });
        tokio::task::yield_now().await;

        assert_eq!(poller.refresh(PollMode::Background).await, RefreshOutcome::Applied);
        assert_eq!(slow.await.unwrap(), RefreshOutcome::Stale);
        assert_eq!(poller.snapshot().data, "fast");
        assert_eq!(poller.snapshot().generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_response_finishing_first_is_applied_then_replaced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Arc::new(Poller::new("test", Duration::from_secs(60), String::new(), move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok("older".to_string())
                } else {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok("newer".to_string())
                }
            }
        }));

        let older = tokio::spawn({
            let poller = Arc::clone(&poller);
            async move { poller.refresh(PollMode::Background).await }
        });
        tokio::task::yield_now().await;
        let newer = tokio::spawn({
            let poller = Arc::clone(&poller);
            async move { poller.refresh(PollMode::Background).await }
        });

        assert_eq!(older.await.unwrap(), RefreshOutcome::Applied);
        assert_eq!(poller.snapshot().data, "older");
        assert_eq!(newer.await.unwrap(), RefreshOutcome::Applied);
        assert_eq!(poller.snapshot().data, "newer");
        assert_eq!(poller.snapshot().generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_loads_still_advance_the_feed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        // Every load outlives the poll interval.
        let poller = Poller::new("test", Duration::from_secs(15), 0usize, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(Duration::from_secs(20)).await;
                Ok(n)
            }
        });
        let handle = poller.spawn();

        tokio::time::sleep(Duration::from_secs(300)).await;
        let state = handle.snapshot();
        assert!(calls.load(Ordering::SeqCst) > 10);
        assert!(state.data > 10, "feed stuck at {}", state.data);
        assert!(state.generation > 10);
        assert!(!state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_error_survives_overlapping_tick() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Arc::new(Poller::new("test", Duration::from_secs(60), 0u32, move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let delay = if n == 0 { 10 } else { 5 };
                tokio::time::sleep(Duration::from_secs(delay)).await;
                Err::<u32, _>(shape_error())
            }
        }));

        let tick = tokio::spawn({
            let poller = Arc::clone(&poller);
            async move { poller.refresh(PollMode::Background).await }
        });
        tokio::task::yield_now().await;

        assert_eq!(poller.refresh(PollMode::Initial).await, RefreshOutcome::Failed);
        assert!(poller.snapshot().error.unwrap().contains("boom"));
        assert!(!poller.snapshot().loading);

        assert_eq!(tick.await.unwrap(), RefreshOutcome::Stale);
        assert!(poller.snapshot().error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_stays_up_until_manual_refresh_resolves() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Arc::new(Poller::new("test", Duration::from_secs(60), 0u32, move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let delay = if n == 0 { 1 } else { 10 };
                tokio::time::sleep(Duration::from_secs(delay)).await;
                Ok(n as u32)
            }
        }));

        let tick = tokio::spawn({
            let poller = Arc::clone(&poller);
            async move { poller.refresh(PollMode::Background).await }
        });
        tokio::task::yield_now().await;
        let manual = tokio::spawn({
            let poller = Arc::clone(&poller);
            async move { poller.refresh(PollMode::Initial).await }
        });
        tokio::task::yield_now().await;

        assert_eq!(tick.await.unwrap(), RefreshOutcome::Applied);
        assert!(poller.snapshot().loading);
        assert_eq!(manual.await.unwrap(), RefreshOutcome::Applied);
        assert!(!poller.snapshot().loading);
        assert_eq!(poller.snapshot().data, 1);
    }

    #[tokio::test]
    async fn test_initial_error_is_surfaced() {
        let poller: Poller<Vec<u32>> =
            Poller::new("test", Duration::from_secs(15), vec![7], || async { Err(shape_error()) });

        assert_eq!(poller.refresh(PollMode::Initial).await, RefreshOutcome::Failed);
        let state = poller.snapshot();
        assert!(!state.loading);
        assert_eq!(state.data, vec![7]);
        assert!(state.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_background_error_keeps_last_good_data() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::new("test", Duration::from_secs(15), 0u32, move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Ok(42)
                } else {
                    Err(shape_error())
                }
            }
        });

        assert_eq!(poller.refresh(PollMode::Initial).await, RefreshOutcome::Applied);
        assert_eq!(poller.refresh(PollMode::Background).await, RefreshOutcome::Failed);

        let state = poller.snapshot();
        assert_eq!(state.data, 42);
        assert_eq!(state.error, None);
        assert_eq!(state.generation, 1);
    }

    #[tokio::test]
    async fn test_success_clears_previous_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::new("test", Duration::from_secs(15), 0u32, move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(shape_error())
                } else {
                    Ok(1)
                }
            }
        });

        poller.refresh(PollMode::Initial).await;
        assert!(poller.snapshot().error.is_some());
        poller.refresh(PollMode::Initial).await;
        assert_eq!(poller.snapshot().error, None);
        assert_eq!(poller.snapshot().data, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_toggle_stops_ticks() {
        let (poller, calls) = counting_poller(Duration::from_secs(15));
        let handle = poller.spawn();
        handle.set_auto_refresh(false);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!handle.snapshot().auto_refresh);

        handle.set_auto_refresh(true);
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let (poller, calls) = counting_poller(Duration::from_secs(15));
        let handle = poller.spawn();
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let (poller, _) = counting_poller(Duration::from_secs(15));
        let mut rx = poller.subscribe();
        poller.refresh(PollMode::Background).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().data, 1);
    }
}
