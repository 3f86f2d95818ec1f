//! Scheduler: runs the link checker on a fixed period and drains update
//! events into the notifier.
//!
//! Lifecycle: `Idle → Running → Stopping → Stopped`. The scheduler is an
//! explicit value owned by whoever starts it. An unstarted [`Scheduler`] is
//! `Idle`; `start` consumes it and hands back a [`SchedulerHandle`], which
//! reports the remaining states.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use linktracker_core::config::SchedulerConfig;
use linktracker_core::error::Result;
use linktracker_core::types::UpdateEvent;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::link_checker::{LinkChecker, ScanStats};
use crate::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

pub struct Scheduler {
    checker: Arc<LinkChecker>,
    notifier: Arc<Notifier>,
    period: Duration,
    queue_capacity: usize,
}

impl Scheduler {
    pub fn new(checker: LinkChecker, notifier: Notifier, config: &SchedulerConfig) -> Self {
        Self {
            checker: Arc::new(checker),
            notifier: Arc::new(notifier),
            period: config.interval(),
            queue_capacity: config.event_queue_capacity.max(1),
        }
    }

    /// Override the configured period (and cycle deadline).
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// One scan cycle outside the timer, with its notifications delivered
    /// before returning. Bounded by the same deadline as a scheduled cycle.
    pub async fn run_once(&self) -> Result<ScanStats> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let drain = drain_events(self.notifier.clone(), rx);
        let scan = async move {
            let result = run_with_deadline(&self.checker, &tx, self.period).await;
            drop(tx);
            result
        };
        let (result, delivered) = tokio::join!(scan, drain);
        tracing::debug!("Single scan delivered {delivered} update(s)");
        result
    }

    /// Start ticking. The first cycle runs immediately.
    pub fn start(self) -> SchedulerHandle {
        let state = Arc::new(Mutex::new(SchedulerState::Running));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::channel::<UpdateEvent>(self.queue_capacity);

        tracing::info!("⏰ Scheduler started (scan every {}s)", self.period.as_secs_f64());

        let checker = self.checker.clone();
        let period = self.period;
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // Shutdown is only observed between cycles, so a running
                // cycle finishes emitting before the queue closes.
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {}
                }
                run_with_deadline(&checker, &events_tx, period).await.ok();
            }

            // Last sender: the drain loop sees the queue close after the
            // final event.
            drop(events_tx);
            tracing::debug!("Scan loop stopped");
        });

        let drainer = tokio::spawn(drain_events(self.notifier.clone(), events_rx));

        SchedulerHandle {
            state,
            shutdown: shutdown_tx,
            ticker,
            drainer,
            notifier: self.notifier,
        }
    }
}

/// Run one cycle under a deadline; an overrun is cancelled and progress
/// already persisted stands.
async fn run_with_deadline(
    checker: &LinkChecker,
    events: &mpsc::Sender<UpdateEvent>,
    deadline: Duration,
) -> Result<ScanStats> {
    match tokio::time::timeout(deadline, checker.run_cycle(events)).await {
        Ok(Ok(stats)) => Ok(stats),
        Ok(Err(e)) => {
            tracing::warn!("⚠️ Scan cycle aborted: {e}");
            Err(e)
        }
        Err(_) => {
            tracing::warn!("⚠️ Scan cycle exceeded {}s and was cancelled", deadline.as_secs_f64());
            Err(linktracker_core::LinkTrackerError::SourceUnavailable(
                "scan cycle deadline exceeded".into(),
            ))
        }
    }
}

/// Deliver events until the queue closes. Returns how many were delivered.
async fn drain_events(notifier: Arc<Notifier>, mut events: mpsc::Receiver<UpdateEvent>) -> usize {
    let mut delivered = 0;
    while let Some(event) = events.recv().await {
        // Failures are logged by the notifier and dropped.
        if notifier.notify(&event).await.is_ok() {
            delivered += 1;
        }
    }
    delivered
}

/// Running scheduler. Dropping it without `stop` leaves the tasks running.
pub struct SchedulerHandle {
    state: Arc<Mutex<SchedulerState>>,
    shutdown: watch::Sender<bool>,
    ticker: JoinHandle<()>,
    drainer: JoinHandle<usize>,
    notifier: Arc<Notifier>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        self.state.lock().map(|s| *s).unwrap_or(SchedulerState::Stopped)
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    fn set_state(&self, next: SchedulerState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Stop scheduling, let the current cycle finish, deliver every queued
    /// event, then return.
    pub async fn stop(self) {
        self.set_state(SchedulerState::Stopping);
        tracing::info!("⏹️ Scheduler stopping");
        self.shutdown.send(true).ok();

        let SchedulerHandle {
            state,
            ticker,
            drainer,
            ..
        } = self;
        if let Err(e) = ticker.await {
            tracing::error!("❌ Scan loop panicked: {e}");
        }
        match drainer.await {
            Ok(delivered) => tracing::info!("⏹️ Scheduler stopped ({delivered} update(s) delivered)"),
            Err(e) => tracing::error!("❌ Notification loop panicked: {e}"),
        }
        if let Ok(mut state) = state.lock() {
            *state = SchedulerState::Stopped;
        }
    }
}
