//! Background event handler
//!
//! Serializes every model update through a single tokio task, the only
//! writer of the provider's tree and index. Producers (the sync set, busy
//! notifications, marker notifications, UI queries) talk to it through an
//! [`EventHandlerHandle`].
//!
//! ```text
//! SyncInfoSet ── SyncSetEvent ──┐
//!                               ▼
//! ┌──────────────┐ Command ┌────────────────────────┐  node_added / removed
//! │   handle(s)  │ ──────► │ BackgroundEventHandler │ ───────────────────► Presentation
//! └──────────────┘         │  queue → provider      │  labels_invalidated
//!       ▲                  └────────────────────────┘  (batched, delayed)
//!       └──── oneshot replies (inspect / flush / shutdown)
//! ```
//!
//! Structural changes reach the presentation immediately, bracketed by a
//! [`RedrawGuard`]. Label invalidations are collected in a set and
//! dispatched after `early_dispatch` while anything is busy, after
//! `dispatch_delay` otherwise, and right away when a node becomes busy.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};
use triad_core::config::EventsConfig;
use triad_core::domain::{ResourceId, SyncInfo};
use triad_sync::{Subscriber, SyncError, SyncSetEvent};

use crate::event::Event;
use crate::node::{ModelNode, NodeKey};
use crate::presentation::{Presentation, RedrawGuard};
use crate::provider::{ModelChanges, ModelProvider};
use crate::{ModelError, Result};

type Inspector<P> = Box<dyn FnOnce(&P) + Send>;

// ============================================================================
// Command enum
// ============================================================================

/// Messages accepted by the handler task
enum Command<P> {
    /// Apply an event to the model
    Queue { event: Event, at_front: bool },
    /// Run a read-only closure against the provider
    Inspect(Inspector<P>),
    /// Dispatch pending labels once everything queued before is applied
    Flush(oneshot::Sender<()>),
    /// Apply everything queued before, then hand the provider back
    Shutdown(oneshot::Sender<P>),
}

// ============================================================================
// EventHandlerHandle
// ============================================================================

/// Cloneable handle to a running [`BackgroundEventHandler`]
pub struct EventHandlerHandle<P> {
    tx: mpsc::UnboundedSender<Command<P>>,
}

impl<P> Clone for EventHandlerHandle<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<P: ModelProvider> EventHandlerHandle<P> {
    fn send(&self, command: Command<P>) -> Result<()> {
        self.tx.send(command).map_err(|_| ModelError::Stopped)
    }

    /// Queues an event without waiting for it to be applied
    ///
    /// Front-queued events run before anything already waiting.
    pub fn queue_event(&self, event: Event, at_front: bool) -> Result<()> {
        self.send(Command::Queue { event, at_front })
    }

    pub fn set_busy(&self, resource: ResourceId, busy: bool) -> Result<()> {
        self.queue_event(Event::BusyStateChanged { resource, busy }, false)
    }

    pub fn markers_changed(&self, resources: Vec<ResourceId>) -> Result<()> {
        self.queue_event(Event::MarkersChanged(resources), false)
    }

    /// Runs `f` against the provider after every earlier command
    pub async fn inspect<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&P) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let inspector: Inspector<P> = Box::new(move |provider| {
            let _ = tx.send(f(provider));
        });
        self.send(Command::Inspect(inspector))?;
        rx.await.map_err(|_| ModelError::Stopped)
    }

    /// Waits until earlier events are applied and their labels dispatched
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx))?;
        rx.await.map_err(|_| ModelError::Stopped)
    }

    /// Stops the handler and returns its provider
    pub async fn shutdown(&self) -> Result<P> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx))?;
        rx.await.map_err(|_| ModelError::Stopped)
    }
}

// ============================================================================
// BackgroundEventHandler
// ============================================================================

/// Single consumer of model events
pub struct BackgroundEventHandler<P: ModelProvider> {
    provider: P,
    subscriber: Arc<dyn Subscriber>,
    presentation: Arc<dyn Presentation>,
    commands: mpsc::UnboundedReceiver<Command<P>>,
    set_events: Option<mpsc::UnboundedReceiver<SyncSetEvent>>,
    queue: VecDeque<Command<P>>,
    /// Contents delivered by the set on connect, consumed by the next reset
    snapshot: Option<Vec<SyncInfo>>,
    pending_labels: BTreeSet<NodeKey>,
    dispatch_at: Option<Instant>,
    early_dispatch: Duration,
    dispatch_delay: Duration,
}

impl<P: ModelProvider> BackgroundEventHandler<P> {
    /// Creates a handler listening to `subscriber`'s sync set
    ///
    /// The caller drives it with [`run`](Self::run). A handler created for
    /// an inactive subscriber fails on its first reset.
    pub fn new(
        provider: P,
        subscriber: Arc<dyn Subscriber>,
        presentation: Arc<dyn Presentation>,
        config: &EventsConfig,
    ) -> (Self, EventHandlerHandle<P>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut queue = VecDeque::new();
        let set_events = if subscriber.is_active() {
            Some(subscriber.sync_set().connect())
        } else {
            queue.push_back(Command::Queue {
                event: Event::Reset,
                at_front: true,
            });
            None
        };

        let handler = Self {
            provider,
            subscriber,
            presentation,
            commands: rx,
            set_events,
            queue,
            snapshot: None,
            pending_labels: BTreeSet::new(),
            dispatch_at: None,
            early_dispatch: config.early_dispatch(),
            dispatch_delay: config.dispatch_delay(),
        };
        (handler, EventHandlerHandle { tx })
    }

    /// Creates a handler and spawns it on the current runtime
    pub fn spawn(
        provider: P,
        subscriber: Arc<dyn Subscriber>,
        presentation: Arc<dyn Presentation>,
        config: &EventsConfig,
    ) -> (EventHandlerHandle<P>, JoinHandle<Result<()>>) {
        let (handler, handle) = Self::new(provider, subscriber, presentation, config);
        (handle, tokio::spawn(handler.run()))
    }

    /// Main loop
    ///
    /// Runs until shut down, until every handle is dropped, or until a
    /// reset cannot obtain a snapshot. The last case is returned as an
    /// error.
    pub async fn run(mut self) -> Result<()> {
        info!(subscriber = %self.subscriber.name(), "Background event handler started");

        loop {
            while let Some(command) = self.queue.pop_front() {
                match command {
                    Command::Queue { event, .. } => {
                        if let Err(e) = self.process(event) {
                            error!(error = %e, "Background event handler failed");
                            return Err(e);
                        }
                    }
                    Command::Inspect(inspector) => inspector(&self.provider),
                    Command::Flush(reply) => {
                        self.dispatch();
                        let _ = reply.send(());
                    }
                    Command::Shutdown(reply) => {
                        self.dispatch();
                        info!("Background event handler shut down");
                        let _ = reply.send(self.provider);
                        return Ok(());
                    }
                }
            }

            if self.dispatch_at.is_some_and(|at| at <= Instant::now()) {
                self.dispatch();
            }

            let deadline = self.dispatch_at;
            tokio::select! {
                // Commands first so that busy flags and flushes are never
                // starved by a chatty sync set.
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => {
                        // A command must observe every delta published
                        // before it was sent.
                        self.drain_set_events();
                        self.accept(command);
                        while let Ok(command) = self.commands.try_recv() {
                            self.accept(command);
                        }
                    }
                    None => {
                        self.dispatch();
                        info!("All handles dropped, background event handler stopping");
                        return Ok(());
                    }
                },

                event = next_set_event(&mut self.set_events), if self.set_events.is_some() => {
                    match event {
                        Some(event) => self.accept_set_event(event),
                        None => {
                            info!("Sync set disconnected");
                            self.set_events = None;
                        }
                    }
                }

                _ = wait_until(deadline), if deadline.is_some() => self.dispatch(),
            }
        }
    }

    fn accept(&mut self, command: Command<P>) {
        match command {
            Command::Queue {
                event,
                at_front: true,
            } => self.queue.push_front(Command::Queue {
                event,
                at_front: true,
            }),
            other => self.queue.push_back(other),
        }
    }

    fn drain_set_events(&mut self) {
        let mut events = Vec::new();
        let mut closed = false;
        if let Some(rx) = self.set_events.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
        }
        for event in events {
            self.accept_set_event(event);
        }
        if closed {
            info!("Sync set disconnected");
            self.set_events = None;
        }
    }

    fn accept_set_event(&mut self, event: SyncSetEvent) {
        match event {
            SyncSetEvent::Reset(infos) => {
                debug!(infos = infos.len(), "Sync set snapshot received");
                self.snapshot = Some(infos);
                self.queue.push_front(Command::Queue {
                    event: Event::Reset,
                    at_front: true,
                });
            }
            SyncSetEvent::Changed(delta) => {
                trace!(resources = delta.len(), "Sync set delta received");
                self.queue.push_back(Command::Queue {
                    event: Event::SyncInfoSetChanged(delta),
                    at_front: false,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Event processing
    // ------------------------------------------------------------------

    fn process(&mut self, event: Event) -> Result<()> {
        trace!(event = event.name(), "Processing event");
        let mut changes = ModelChanges::default();
        let mut immediate = false;

        match event {
            Event::Reset => {
                self.pending_labels.clear();
                self.dispatch_at = None;
                let infos = match self.snapshot.take() {
                    Some(infos) => infos,
                    None => self.fresh_snapshot()?,
                };
                self.provider.reset(&infos, &mut changes);
            }
            Event::SyncInfoSetChanged(delta) => {
                self.provider.handle_delta(&delta, &mut changes);
            }
            Event::BusyStateChanged { resource, busy } => {
                let changed = self.provider.set_busy(&resource, busy, &mut changes);
                immediate = changed && busy;
            }
            Event::MarkersChanged(resources) => {
                self.provider.refresh_markers(&resources, &mut changes);
            }
        }

        self.apply(changes);
        self.schedule(immediate);
        Ok(())
    }

    fn fresh_snapshot(&self) -> Result<Vec<SyncInfo>> {
        if !self.subscriber.is_active() {
            return Err(SyncError::Snapshot(format!(
                "subscriber {} is no longer active",
                self.subscriber.name()
            ))
            .into());
        }
        Ok(self.subscriber.sync_set().snapshot())
    }

    fn apply(&mut self, changes: ModelChanges) {
        if !changes.added.is_empty() || !changes.removed.is_empty() {
            let presentation = self.presentation.clone();
            let _guard = RedrawGuard::new(presentation.as_ref());
            for key in &changes.removed {
                presentation.node_removed(key);
                self.pending_labels.retain(|pending| !key.covers(pending));
            }
            for node in &changes.added {
                presentation.node_added(node);
            }
            debug!(
                added = changes.added.len(),
                removed = changes.removed.len(),
                nodes = self.provider.node_count(),
                "Model structure updated"
            );
        }
        self.pending_labels.extend(changes.touched);
    }

    fn schedule(&mut self, immediate: bool) {
        if self.pending_labels.is_empty() {
            return;
        }
        let delay = if immediate {
            Duration::ZERO
        } else if self.provider.has_busy() {
            self.early_dispatch
        } else {
            self.dispatch_delay
        };
        let at = Instant::now() + delay;
        self.dispatch_at = Some(self.dispatch_at.map_or(at, |current| current.min(at)));
    }

    fn dispatch(&mut self) {
        self.dispatch_at = None;
        if self.pending_labels.is_empty() {
            return;
        }
        let keys = std::mem::take(&mut self.pending_labels);
        let nodes: Vec<ModelNode> = keys
            .iter()
            .filter_map(|key| self.provider.node(key))
            .collect();
        trace!(pending = keys.len(), live = nodes.len(), "Dispatching label updates");
        if !nodes.is_empty() {
            self.presentation.labels_invalidated(&nodes);
        }
    }
}

async fn next_set_event(
    rx: &mut Option<mpsc::UnboundedReceiver<SyncSetEvent>>,
) -> Option<SyncSetEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
