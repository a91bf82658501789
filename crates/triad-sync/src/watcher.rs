//! Resource change notifications and debounced change queue
//!
//! [`FileWatcher`] wraps the `notify` crate to monitor a working copy and
//! converts raw OS events under its root into [`ResourceChange`] values,
//! expressed as workspace-relative [`ResourceId`]s.
//!
//! The [`DebouncedChangeQueue`] collects rapid-fire changes and coalesces
//! them so that the refresh scheduler only sees a resource once it has been
//! quiet for the configured window.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue
//!       │
//!       ▼
//!  FileWatcher  ──→  mpsc::channel  ──→  DebouncedChangeQueue  ──→  RefreshScheduler
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use triad_core::domain::ResourceId;

// ============================================================================
// ResourceChange
// ============================================================================

/// A change reported for a resource of the working copy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceChange {
    /// The resource was created or its content/metadata changed
    Changed(ResourceId),
    /// The resource was deleted
    Removed(ResourceId),
    /// The resource was moved or renamed
    Moved {
        /// Identity before the move
        from: ResourceId,
        /// Identity after the move
        to: ResourceId,
    },
}

impl ResourceChange {
    /// The primary resource; the destination for moves
    pub fn resource(&self) -> &ResourceId {
        match self {
            ResourceChange::Changed(r) | ResourceChange::Removed(r) => r,
            ResourceChange::Moved { to, .. } => to,
        }
    }

    /// Every resource whose state may differ after this change
    pub fn affected(&self) -> Vec<ResourceId> {
        match self {
            ResourceChange::Changed(r) | ResourceChange::Removed(r) => vec![r.clone()],
            ResourceChange::Moved { from, to } => vec![from.clone(), to.clone()],
        }
    }

    /// The resource that no longer exists at its old identity, if any
    pub fn vacated(&self) -> Option<&ResourceId> {
        match self {
            ResourceChange::Changed(_) => None,
            ResourceChange::Removed(r) => Some(r),
            ResourceChange::Moved { from, .. } => Some(from),
        }
    }
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Watches a working copy directory using the OS-native mechanism
///
/// ## Usage
///
/// ```ignore
/// let (mut watcher, rx) = FileWatcher::new("/home/user/project")?;
/// watcher.start()?;
/// // rx.recv().await yields ResourceChange values
/// ```
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Creates a watcher for the working copy at `root`
    ///
    /// Returns the watcher and the receiver of converted changes. Watching
    /// begins with [`start`](FileWatcher::start).
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created
    pub fn new(root: impl Into<PathBuf>) -> Result<(Self, mpsc::Receiver<ResourceChange>)> {
        let root = root.into();
        let (event_tx, event_rx) = mpsc::channel::<ResourceChange>(1024);

        info!(root = %root.display(), "Initializing file watcher");

        let event_root = root.clone();
        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(change) = map_notify_event(&event_root, &event) {
                        if let Err(e) = event_tx.blocking_send(change) {
                            warn!(error = %e, "Failed to send resource change (receiver dropped)");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok((Self { watcher, root }, event_rx))
    }

    /// The watched working copy root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts watching the root recursively
    ///
    /// # Errors
    /// Returns an error if the root cannot be watched (missing, permissions,
    /// inotify watch limit)
    pub fn start(&mut self) -> Result<()> {
        info!(root = %self.root.display(), "Starting recursive watch");
        self.watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", self.root.display()))
    }

    /// Stops watching the root
    ///
    /// # Errors
    /// Returns an error if the root was not being watched
    pub fn stop(&mut self) -> Result<()> {
        info!(root = %self.root.display(), "Stopping watch");
        self.watcher
            .unwatch(&self.root)
            .with_context(|| format!("Failed to unwatch path: {}", self.root.display()))
    }
}

// ============================================================================
// Event mapping - notify::Event → ResourceChange
// ============================================================================

/// Converts an absolute path under `root` into a resource identity
///
/// Returns `None` for paths outside `root` or that are not valid identities.
pub fn resource_for_path(root: &Path, path: &Path) -> Option<ResourceId> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    ResourceId::new(segments.join("/")).ok()
}

/// Converts a `notify::Event` into a [`ResourceChange`]
///
/// - `Create(*)` and `Modify(*)` map to `Changed`
/// - `Modify(Name(Both))` with two paths maps to `Moved`
/// - `Remove(*)` maps to `Removed`
///
/// Access events, events without paths and paths outside `root` yield `None`.
fn map_notify_event(root: &Path, event: &notify::Event) -> Option<ResourceChange> {
    let paths = &event.paths;
    let first = || resource_for_path(root, paths.first()?);

    match &event.kind {
        EventKind::Create(_) => first().map(ResourceChange::Changed),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            let from = resource_for_path(root, &paths[0]);
            let to = resource_for_path(root, &paths[1]);
            match (from, to) {
                (Some(from), Some(to)) => {
                    debug!(from = %from, to = %to, "Mapped rename event");
                    Some(ResourceChange::Moved { from, to })
                }
                // Moved out of the working copy
                (Some(from), None) => Some(ResourceChange::Removed(from)),
                // Moved into the working copy
                (None, Some(to)) => Some(ResourceChange::Changed(to)),
                (None, None) => None,
            }
        }

        EventKind::Remove(_) => first().map(ResourceChange::Removed),

        EventKind::Modify(_) => first().map(ResourceChange::Changed),

        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            None
        }
    }
}

// ============================================================================
// DebouncedChangeQueue
// ============================================================================

/// Queue that coalesces rapid resource changes into debounced ones
///
/// When several changes arrive for the same resource, only the latest is
/// kept and its timestamp is reset. Changes are emitted by
/// [`poll`](DebouncedChangeQueue::poll) once they have been quiet for the
/// debounce delay.
pub struct DebouncedChangeQueue {
    pending: HashMap<ResourceId, (ResourceChange, Instant)>,
    debounce_delay: Duration,
}

impl DebouncedChangeQueue {
    pub fn new(debounce_delay: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            debounce_delay,
        }
    }

    /// Inserts or replaces the pending change of a resource
    pub fn push(&mut self, change: ResourceChange) {
        let resource = change.resource().clone();
        debug!(resource = %resource, change = ?change, "Enqueuing resource change");
        self.pending.insert(resource, (change, Instant::now()));
    }

    /// Removes and returns every change older than the debounce delay
    pub fn poll(&mut self) -> Vec<ResourceChange> {
        let now = Instant::now();
        let delay = self.debounce_delay;
        let mut settled = Vec::new();

        self.pending.retain(|_, (change, timestamp)| {
            if now.duration_since(*timestamp) >= delay {
                settled.push(change.clone());
                false
            } else {
                true
            }
        });

        if !settled.is_empty() {
            debug!(count = settled.len(), "Polled settled resource changes");
        }
        settled
    }

    /// Removes and returns every pending change regardless of age
    pub fn drain(&mut self) -> Vec<ResourceChange> {
        self.pending.drain().map(|(_, (change, _))| change).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ============================================================================
// Unit tests
// ============================================================================
