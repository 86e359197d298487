//! Monitoring Loop
//!
//! Single-flight background task that periodically fetches every watched
//! deployment, compares it with the cached baseline and forwards detected
//! transitions to the dispatcher.
//!
//! The first scan runs as soon as the loop starts; later scans run on each
//! interval boundary. Each id is fetched in its own task with a bounded
//! timeout, so one slow or failing deployment only affects its own slot.
//!
//! Stopping interrupts only the wait between cycles and fetches still in
//! flight. Once a fetch has returned, the baseline swap and the resulting
//! notifications always complete before the loop exits.

use super::detector::detect;
use super::dispatcher::NotificationDispatcher;
use super::registry::SubscriptionRegistry;
use crate::api::{ApiError, ResourceApi};
use crate::models::ResourceKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default time between scan cycles
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Default upper bound on a single deployment fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Shortest interval the loop accepts; shorter requests are raised to it
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// What happened to one id during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observation {
    Updated { events: usize },
    Failed,
    /// Fetched, but the id was unsubscribed meanwhile
    Discarded,
    /// Fetch interrupted by stop; nothing was recorded
    Cancelled,
}

/// Counters for one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: usize,
    pub updated: usize,
    pub failed: usize,
    pub discarded: usize,
    pub events: usize,
    pub cancelled: bool,
}

impl ScanSummary {
    fn record(&mut self, observation: Observation) {
        match observation {
            Observation::Updated { events } => {
                self.updated += 1;
                self.events += events;
            }
            Observation::Failed => self.failed += 1,
            Observation::Discarded => self.discarded += 1,
            Observation::Cancelled => {
                self.cancelled = true;
                return;
            }
        }
        self.scanned += 1;
    }
}

/// Everything a scan needs; cloned into each per-id task.
#[derive(Clone)]
struct Scanner {
    registry: SubscriptionRegistry,
    api: Arc<dyn ResourceApi>,
    dispatcher: NotificationDispatcher,
    fetch_timeout: Duration,
}

impl Scanner {
    async fn scan(&self, cancel: &CancellationToken) -> ScanSummary {
        let mut tasks = JoinSet::new();
        for id in self.registry.list() {
            let scanner = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { scanner.observe(id, cancel).await });
        }

        // Tasks are drained, never aborted: a task past its fetch finishes
        // its update and notifications even when the scan is cancelled.
        let mut summary = ScanSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(observation) => summary.record(observation),
                Err(e) if e.is_panic() => {
                    log::error!("Deployment scan task panicked: {}", e);
                    summary.record(Observation::Failed);
                }
                Err(_) => {}
            }
        }
        summary.cancelled |= cancel.is_cancelled();
        summary
    }

    async fn observe(&self, id: String, cancel: CancellationToken) -> Observation {
        let fetch = tokio::time::timeout(
            self.fetch_timeout,
            self.api.fetch(ResourceKind::Deployment, &id),
        );
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Observation::Cancelled,
            result = fetch => {
                result.unwrap_or_else(|_| Err(ApiError::Timeout(self.fetch_timeout.as_secs())))
            }
        };

        let state = match fetched {
            Ok(state) => state,
            Err(e) => {
                log::warn!("Failed to fetch deployment {}: {}", id, e);
                return Observation::Failed;
            }
        };

        let Some(previous) = self.registry.replace_state(&id, state.clone()) else {
            log::debug!("Deployment {} unsubscribed during scan, result discarded", id);
            return Observation::Discarded;
        };

        let events = detect(&id, previous.as_ref(), &state);
        for event in &events {
            log::info!("{}", event.summary());
            self.dispatcher.notify_change(event).await;
        }
        Observation::Updated {
            events: events.len(),
        }
    }
}

struct RunningMonitor {
    interval: Duration,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Handle to the (at most one) background scanner.
#[derive(Clone)]
pub struct MonitoringLoop {
    scanner: Scanner,
    running: Arc<Mutex<Option<RunningMonitor>>>,
}

impl MonitoringLoop {
    pub fn new(
        registry: SubscriptionRegistry,
        api: Arc<dyn ResourceApi>,
        dispatcher: NotificationDispatcher,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            scanner: Scanner {
                registry,
                api,
                dispatcher,
                fetch_timeout,
            },
            running: Arc::new(Mutex::new(None)),
        }
    }

    /// Start scanning every `interval`. Returns `false` if already running.
    pub async fn start(&self, interval: Duration) -> bool {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                return false;
            }
        }

        let interval = interval.max(MIN_INTERVAL);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(self.scanner.clone(), interval, cancel.clone()));
        *running = Some(RunningMonitor {
            interval,
            cancel,
            handle,
        });
        true
    }

    /// Stop the loop and wait for it to finish. Returns `false` if it was not
    /// running.
    ///
    /// Fetches in flight are abandoned; an update already past its fetch is
    /// applied and its notifications delivered before this returns. Once it
    /// returns, no further registry updates or notifications come from the
    /// loop.
    pub async fn stop(&self) -> bool {
        let mut running = self.running.lock().await;
        let Some(current) = running.take() else {
            return false;
        };

        current.cancel.cancel();
        if let Err(e) = current.handle.await {
            if e.is_panic() {
                log::error!("Monitoring loop panicked: {}", e);
            }
        }
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .map_or(false, |current| !current.handle.is_finished())
    }

    /// Interval of the running loop, if any.
    pub async fn interval(&self) -> Option<Duration> {
        self.running
            .lock()
            .await
            .as_ref()
            .filter(|current| !current.handle.is_finished())
            .map(|current| current.interval)
    }

    /// Run a single scan cycle on the caller's task.
    pub async fn scan_once(&self) -> ScanSummary {
        self.scanner.scan(&CancellationToken::new()).await
    }
}

async fn run_loop(scanner: Scanner, interval: Duration, cancel: CancellationToken) {
    log::info!("Deployment monitoring started (interval {}s)", interval.as_secs());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let summary = scanner.scan(&cancel).await;
        if summary.cancelled {
            break;
        }
        log::debug!(
            "Scan cycle: {} scanned, {} updated, {} failed, {} discarded, {} events",
            summary.scanned,
            summary.updated,
            summary.failed,
            summary.discarded,
            summary.events
        );
    }

    log::info!("Deployment monitoring stopped");
}
