//! Refresh scheduler - turns debounced resource changes into subscriber calls
//!
//! The [`RefreshScheduler`] sits between the [`FileWatcher`](super::watcher::FileWatcher)
//! (or any other producer of [`ResourceChange`] values) and a
//! [`Subscriber`]. It feeds incoming changes through a
//! [`DebouncedChangeQueue`] and, once they settle, recomputes local state and
//! refreshes the affected resources.
//!
//! ## Flow
//!
//! ```text
//! FileWatcher ──→ mpsc::Receiver ──→ RefreshScheduler ──→ Subscriber
//!                                         │            local_changes()
//!                                  DebouncedChangeQueue  refresh(One)
//! ```
//!
//! Removals and moves of subscriber roots are forwarded immediately, so a
//! merge subscriber whose roots vanish cancels itself without waiting for
//! the debounce window. Coalesced or spurious notifications are harmless
//! because refresh is idempotent.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use triad_core::domain::{Depth, ResourceId};

use crate::subscriber::{RefreshOutcome, RefreshStatus, Subscriber};
use crate::watcher::{DebouncedChangeQueue, ResourceChange};

// ============================================================================
// RefreshScheduler
// ============================================================================

/// Schedules subscriber refreshes from resource change notifications
///
/// ## "Refresh now"
///
/// Setting the shared flag returned by [`new`](RefreshScheduler::new) (or
/// calling [`request_refresh`](RefreshScheduler::request_refresh)) makes the
/// next poll refresh every root at infinite depth, bypassing the debounce.
pub struct RefreshScheduler {
    change_rx: mpsc::Receiver<ResourceChange>,
    queue: DebouncedChangeQueue,
    subscriber: Arc<dyn Subscriber>,
    refresh_requested: Arc<AtomicBool>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl RefreshScheduler {
    /// Creates a scheduler driving `subscriber`
    ///
    /// Returns the scheduler and the "refresh now" flag.
    pub fn new(
        change_rx: mpsc::Receiver<ResourceChange>,
        subscriber: Arc<dyn Subscriber>,
        debounce_delay: Duration,
        poll_interval: Duration,
    ) -> (Self, Arc<AtomicBool>) {
        let refresh_requested = Arc::new(AtomicBool::new(false));
        let flag = refresh_requested.clone();

        info!(
            subscriber = %subscriber.name(),
            debounce_ms = debounce_delay.as_millis() as u64,
            poll_ms = poll_interval.as_millis() as u64,
            "Creating refresh scheduler"
        );

        let scheduler = Self {
            change_rx,
            queue: DebouncedChangeQueue::new(debounce_delay),
            subscriber,
            refresh_requested,
            poll_interval,
            cancel: CancellationToken::new(),
        };

        (scheduler, flag)
    }

    /// Token that stops [`run`](RefreshScheduler::run) and aborts the refresh in flight
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Adds a change to the debounced queue
    pub fn enqueue(&mut self, change: ResourceChange) {
        debug!(change = ?change, "Enqueuing change in scheduler");
        self.queue.push(change);
    }

    /// Requests a full refresh on the next poll, bypassing the debounce
    pub fn request_refresh(&self) {
        info!("Refresh requested (bypassing debounce)");
        self.refresh_requested.store(true, Ordering::Release);
    }

    pub fn is_refresh_requested(&self) -> bool {
        self.refresh_requested.load(Ordering::Acquire)
    }

    /// Main loop
    ///
    /// Receives changes, polls the debounce queue on every tick and drives
    /// the subscriber. Terminates when the change channel closes (after
    /// processing whatever is still pending), when the token is cancelled,
    /// or when the subscriber becomes inactive.
    pub async fn run(&mut self) {
        info!(subscriber = %self.subscriber.name(), "Refresh scheduler starting");

        let mut poll_timer = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                // Drain incoming changes before polling the queue.
                biased;

                _ = self.cancel.cancelled() => {
                    info!("Refresh scheduler cancelled");
                    break;
                }

                change = self.change_rx.recv() => {
                    match change {
                        Some(change) => self.accept(change).await,
                        None => {
                            info!("Change channel closed, scheduler shutting down");
                            let remaining = self.queue.drain();
                            if !remaining.is_empty() {
                                info!(count = remaining.len(), "Flushing pending changes before shutdown");
                                self.process(remaining).await;
                            }
                            break;
                        }
                    }
                }

                _ = poll_timer.tick() => {
                    if self.refresh_requested.swap(false, Ordering::AcqRel) {
                        self.refresh_all().await;
                    }
                    let settled = self.queue.poll();
                    if !settled.is_empty() {
                        self.process(settled).await;
                    }
                }
            }

            if !self.subscriber.is_active() {
                info!(subscriber = %self.subscriber.name(), "Subscriber inactive, scheduler stopping");
                break;
            }
        }

        info!("Refresh scheduler stopped");
    }

    async fn accept(&mut self, change: ResourceChange) {
        debug!(change = ?change, "Scheduler received change");
        if change.vacated().is_some() {
            self.subscriber
                .handle_root_changes(std::slice::from_ref(&change))
                .await;
        }
        self.queue.push(change);
    }

    async fn process(&mut self, settled: Vec<ResourceChange>) {
        let mut resources: Vec<ResourceId> =
            settled.iter().flat_map(ResourceChange::affected).collect();
        resources.sort();
        resources.dedup();

        info!(count = resources.len(), "Settled changes ready for refresh");

        let local = self.subscriber.local_changes(&resources).await;
        debug!(outcome = ?local.outcome, changed = local.changed.len(), "Local changes applied");

        let status = self
            .subscriber
            .refresh(&resources, Depth::One, &self.cancel)
            .await;
        self.report(&status);
    }

    async fn refresh_all(&mut self) {
        let roots = self.subscriber.roots();
        let status = self
            .subscriber
            .refresh(&roots, Depth::Infinite, &self.cancel)
            .await;
        self.report(&status);
    }

    fn report(&self, status: &RefreshStatus) {
        match status.outcome {
            RefreshOutcome::Changed | RefreshOutcome::NoChanges => {
                for error in &status.errors {
                    warn!(error = %error, "Refresh reported an error");
                }
                debug!(
                    outcome = ?status.outcome,
                    changed = status.changed.len(),
                    "Scheduled refresh finished"
                );
            }
            RefreshOutcome::Cancelled | RefreshOutcome::Inactive => {
                debug!(outcome = ?status.outcome, "Scheduled refresh skipped");
            }
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================
