//! Change-tracking collection of out-of-sync resources
//!
//! A [`SyncInfoSet`] maps resources to their [`SyncInfo`]. Mutations made
//! between [`begin_input`](SyncInfoSet::begin_input) and
//! [`end_input`](SyncInfoSet::end_input) are folded into a single
//! [`SyncSetDelta`] that every connected listener receives exactly once.
//! Mutations outside a batch form a batch of their own.
//!
//! Listeners are unbounded channel senders. [`connect`](SyncInfoSet::connect)
//! hands out a receiver whose first message is a [`SyncSetEvent::Reset`]
//! carrying the current contents.
//!
//! Queries and `connect` read the published contents: while a batch is
//! open they see the set as it was before the batch started.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};
use triad_core::domain::{Depth, ResourceId, SyncInfo};

use crate::SyncError;

/// One consolidated batch of changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSetDelta {
    /// Infos for resources that were not in the set before the batch
    pub added: Vec<SyncInfo>,
    /// Infos for resources whose info differs from the one before the batch
    pub changed: Vec<SyncInfo>,
    /// Every resource whose info was removed, in tree order
    pub removed: Vec<ResourceId>,
    /// Highest removed resources with nothing left in the set below them
    ///
    /// Removed descendants of a subtree root are not listed again here.
    /// Resources removed while members remain below them appear only in
    /// `removed`.
    pub removed_subtree_roots: Vec<ResourceId>,
}

impl SyncSetDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Number of resources the delta mentions
    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }

    /// Whether `resource` lies in a removed subtree root's subtree
    pub fn is_in_removed_subtree(&self, resource: &ResourceId) -> bool {
        self.removed_subtree_roots
            .iter()
            .any(|root| root == resource || root.is_ancestor_of(resource))
    }

    /// Every resource the delta mentions
    pub fn resources(&self) -> impl Iterator<Item = &ResourceId> {
        self.added
            .iter()
            .chain(self.changed.iter())
            .map(SyncInfo::resource)
            .chain(self.removed.iter())
    }
}

/// Message delivered to set listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSetEvent {
    /// Full contents; replaces anything the listener knew
    Reset(Vec<SyncInfo>),
    /// An incremental batch
    Changed(SyncSetDelta),
}

#[derive(Default)]
struct Inner {
    infos: BTreeMap<ResourceId, SyncInfo>,
    errors: Vec<SyncError>,
    batch_depth: usize,
    /// Value each touched resource had when the batch started
    originals: BTreeMap<ResourceId, Option<SyncInfo>>,
    listeners: Vec<mpsc::UnboundedSender<SyncSetEvent>>,
}

impl Inner {
    fn touch(&mut self, resource: &ResourceId) {
        if !self.originals.contains_key(resource) {
            let original = self.infos.get(resource).cloned();
            self.originals.insert(resource.clone(), original);
        }
    }

    fn put(&mut self, info: SyncInfo) {
        if self.infos.get(info.resource()) == Some(&info) {
            return;
        }
        self.touch(info.resource());
        self.infos.insert(info.resource().clone(), info);
    }

    fn take(&mut self, resource: &ResourceId) {
        if self.infos.contains_key(resource) {
            self.touch(resource);
            self.infos.remove(resource);
        }
    }

    fn has_members_below(&self, resource: &ResourceId) -> bool {
        self.infos
            .range((Bound::Excluded(resource), Bound::Unbounded))
            .next()
            .is_some_and(|(next, _)| resource.is_ancestor_of(next))
    }

    fn within(&self, root: &ResourceId, depth: Depth) -> Vec<ResourceId> {
        within(&self.infos, root, depth)
    }

    /// Contents as of the last completed batch
    fn published(&self) -> Cow<'_, BTreeMap<ResourceId, SyncInfo>> {
        if self.originals.is_empty() {
            return Cow::Borrowed(&self.infos);
        }
        let mut view = self.infos.clone();
        for (resource, original) in &self.originals {
            match original {
                Some(info) => view.insert(resource.clone(), info.clone()),
                None => view.remove(resource),
            };
        }
        Cow::Owned(view)
    }

    fn published_get(&self, resource: &ResourceId) -> Option<&SyncInfo> {
        match self.originals.get(resource) {
            Some(original) => original.as_ref(),
            None => self.infos.get(resource),
        }
    }

    fn consolidate(&mut self) -> SyncSetDelta {
        let originals = std::mem::take(&mut self.originals);
        let mut delta = SyncSetDelta::default();
        let mut removed = Vec::new();

        for (resource, original) in originals {
            match (original, self.infos.get(&resource)) {
                (None, Some(now)) => delta.added.push(now.clone()),
                (Some(before), Some(now)) if &before != now => delta.changed.push(now.clone()),
                (Some(_), None) => removed.push(resource),
                _ => {}
            }
        }

        // `removed` is in tree order, so an ancestor precedes its descendants.
        let mut roots: Vec<ResourceId> = Vec::new();
        for resource in &removed {
            if self.has_members_below(resource) {
                continue;
            }
            if !roots.iter().any(|root| root.is_ancestor_of(resource)) {
                roots.push(resource.clone());
            }
        }
        delta.removed = removed;
        delta.removed_subtree_roots = roots;
        delta
    }

    fn notify(&mut self, event: SyncSetEvent) {
        self.listeners
            .retain(|listener| listener.send(event.clone()).is_ok());
    }
}

fn within(
    infos: &BTreeMap<ResourceId, SyncInfo>,
    root: &ResourceId,
    depth: Depth,
) -> Vec<ResourceId> {
    infos
        .range(root..)
        .map(|(id, _)| id)
        .take_while(|id| *id == root || root.is_ancestor_of(id))
        .filter(|id| depth.contains(root, id))
        .cloned()
        .collect()
}

/// Thread-safe resource → [`SyncInfo`] collection with batched notifications
#[derive(Default)]
pub struct SyncInfoSet {
    inner: Mutex<Inner>,
}

impl SyncInfoSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<F: FnOnce(&mut Inner)>(&self, f: F) {
        self.begin_input();
        f(&mut self.lock());
        self.end_input();
    }

    // ------------------------------------------------------------------
    // Batching
    // ------------------------------------------------------------------

    /// Opens a batch; batches nest
    pub fn begin_input(&self) {
        self.lock().batch_depth += 1;
    }

    /// Closes a batch
    ///
    /// When the outermost batch closes, the consolidated delta is sent to
    /// every listener (unless empty) and returned. Inner batches return an
    /// empty delta.
    pub fn end_input(&self) -> SyncSetDelta {
        let mut inner = self.lock();
        inner.batch_depth = inner.batch_depth.saturating_sub(1);
        if inner.batch_depth > 0 {
            return SyncSetDelta::default();
        }

        let delta = inner.consolidate();
        if !delta.is_empty() {
            debug!(
                added = delta.added.len(),
                changed = delta.changed.len(),
                removed = delta.removed.len(),
                listeners = inner.listeners.len(),
                "Sync set changed"
            );
            inner.notify(SyncSetEvent::Changed(delta.clone()));
        }
        delta
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Adds an info, replacing any previous one for the same resource
    pub fn add(&self, info: SyncInfo) {
        trace!(resource = %info.resource(), kind = %info.kind(), "Adding sync info");
        self.mutate(|inner| inner.put(info));
    }

    /// Replaces the info of a resource; identical infos are not recorded
    pub fn change(&self, info: SyncInfo) {
        self.mutate(|inner| inner.put(info));
    }

    /// Removes a single resource
    pub fn remove(&self, resource: &ResourceId) {
        self.mutate(|inner| inner.take(resource));
    }

    /// Removes a resource and everything recorded below it
    pub fn remove_subtree(&self, root: &ResourceId) {
        self.mutate(|inner| {
            for resource in inner.within(root, Depth::Infinite) {
                inner.take(&resource);
            }
        });
    }

    /// Removes every info and every recorded error
    pub fn clear(&self) {
        self.mutate(|inner| {
            inner.errors.clear();
            let all: Vec<ResourceId> = inner.infos.keys().cloned().collect();
            for resource in all {
                inner.take(&resource);
            }
        });
    }

    /// Records a per-resource error
    pub fn add_error(&self, error: SyncError) {
        debug!(error = %error, "Recording sync error");
        self.lock().errors.push(error);
    }

    /// Drops the recorded errors matching `stale` and records `fresh`
    pub fn replace_errors<F>(&self, stale: F, fresh: &[SyncError])
    where
        F: Fn(&SyncError) -> bool,
    {
        let mut inner = self.lock();
        let before = inner.errors.len();
        inner.errors.retain(|error| !stale(error));
        let dropped = before - inner.errors.len();
        inner.errors.extend(fresh.iter().cloned());
        if dropped > 0 || !fresh.is_empty() {
            debug!(dropped, recorded = fresh.len(), "Replacing sync errors");
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get(&self, resource: &ResourceId) -> Option<SyncInfo> {
        self.lock().published_get(resource).cloned()
    }

    pub fn contains(&self, resource: &ResourceId) -> bool {
        self.lock().published_get(resource).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().published().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().published().is_empty()
    }

    /// All infos in tree order
    pub fn snapshot(&self) -> Vec<SyncInfo> {
        self.lock().published().values().cloned().collect()
    }

    /// Recorded resources within `root` at `depth`, in tree order
    pub fn members_within(&self, root: &ResourceId, depth: Depth) -> Vec<ResourceId> {
        within(&self.lock().published(), root, depth)
    }

    /// Errors recorded so far
    pub fn errors(&self) -> Vec<SyncError> {
        self.lock().errors.clone()
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Registers a listener; the first message received is a snapshot
    pub fn connect(&self) -> mpsc::UnboundedReceiver<SyncSetEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let snapshot: Vec<SyncInfo> = inner.published().values().cloned().collect();
        if tx.send(SyncSetEvent::Reset(snapshot)).is_ok() {
            inner.listeners.push(tx);
        }
        rx
    }

    /// Drops every listener; their receivers observe a closed channel
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        debug!(listeners = inner.listeners.len(), "Disconnecting sync set listeners");
        inner.listeners.clear();
    }

    pub fn listener_count(&self) -> usize {
        let mut inner = self.lock();
        inner.listeners.retain(|listener| !listener.is_closed());
        inner.listeners.len()
    }
}

impl std::fmt::Debug for SyncInfoSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SyncInfoSet")
            .field("len", &inner.infos.len())
            .field("errors", &inner.errors.len())
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}
