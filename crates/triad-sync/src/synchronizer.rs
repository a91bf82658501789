//! Resource synchronizers
//!
//! A [`ResourceSynchronizer`] mirrors one side of the three-way comparison
//! (base or remote) into a [`DescriptorCache`]. Refreshing happens in two
//! phases:
//!
//! 1. [`fetch`](ResourceSynchronizer::fetch) walks the revision source and
//!    stages every descriptor it finds. The cache is not touched, so a
//!    cancelled fetch has no visible effect.
//! 2. [`commit`](ResourceSynchronizer::commit) applies a staged fetch and
//!    reports exactly the resources whose cached descriptor was added,
//!    changed or removed.
//!
//! Resources below a folder whose listing failed are never treated as
//! removed: the staged refresh remembers the failed subtree roots.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use triad_core::domain::{Depth, ResourceId, RevisionDescriptor};
use triad_core::ports::{ByteStore, RevisionSource};

use crate::SyncError;

// ============================================================================
// DescriptorCache
// ============================================================================

/// In-memory descriptor map with write-through persistence
///
/// Every value is also written to the byte store under `qualifier`. Reads
/// that miss memory fall back to the store; a failing store is logged and
/// treated as a miss.
pub struct DescriptorCache {
    qualifier: String,
    store: Arc<dyn ByteStore>,
    entries: DashMap<ResourceId, RevisionDescriptor>,
}

impl DescriptorCache {
    pub fn new(qualifier: impl Into<String>, store: Arc<dyn ByteStore>) -> Self {
        Self {
            qualifier: qualifier.into(),
            store,
            entries: DashMap::new(),
        }
    }

    /// The qualified name values are persisted under
    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// Number of descriptors held in memory
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a descriptor, loading it from the store on a miss
    pub async fn get(&self, resource: &ResourceId) -> Option<RevisionDescriptor> {
        let cached = self.entries.get(resource).map(|entry| entry.clone());
        if cached.is_some() {
            return cached;
        }

        match self.store.get_bytes(&self.qualifier, resource).await {
            Ok(Some(bytes)) => match RevisionDescriptor::from_bytes(&bytes) {
                Ok(descriptor) => {
                    self.entries.insert(resource.clone(), descriptor.clone());
                    Some(descriptor)
                }
                Err(e) => {
                    warn!(
                        qualifier = %self.qualifier,
                        resource = %resource,
                        error = %e,
                        "Discarding undecodable persisted descriptor"
                    );
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(
                    qualifier = %self.qualifier,
                    resource = %resource,
                    error = %e,
                    "Descriptor lookup failed, treating as cache miss"
                );
                None
            }
        }
    }

    /// Stores a descriptor in memory and in the byte store
    ///
    /// The in-memory value is updated even when persisting fails.
    pub async fn set(
        &self,
        resource: &ResourceId,
        descriptor: &RevisionDescriptor,
    ) -> Result<(), SyncError> {
        self.entries.insert(resource.clone(), descriptor.clone());
        self.store
            .set_bytes(&self.qualifier, resource, &descriptor.to_bytes())
            .await
            .map_err(|e| SyncError::persistence(resource, &e))
    }

    /// Removes `resource` and everything below it within `depth`
    ///
    /// Returns the in-memory entries that were dropped.
    pub async fn remove(
        &self,
        resource: &ResourceId,
        depth: Depth,
    ) -> Result<Vec<ResourceId>, SyncError> {
        let dropped = self.cached_within(resource, depth);
        for id in &dropped {
            self.entries.remove(id);
        }
        self.store
            .remove_bytes(&self.qualifier, resource, depth)
            .await
            .map_err(|e| SyncError::persistence(resource, &e))?;
        Ok(dropped)
    }

    /// In-memory entries within `root` at `depth`, in tree order
    pub fn cached_within(&self, root: &ResourceId, depth: Depth) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self
            .entries
            .iter()
            .filter(|entry| depth.contains(root, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drops every value, in memory and persisted
    pub async fn dispose(&self) {
        self.entries.clear();
        if let Err(e) = self
            .store
            .remove_bytes(&self.qualifier, &ResourceId::root(), Depth::Infinite)
            .await
        {
            warn!(qualifier = %self.qualifier, error = %e, "Failed to dispose persisted descriptors");
        }
    }
}

// ============================================================================
// Staged refresh and commit report
// ============================================================================

/// Descriptors gathered by a fetch, not yet applied to the cache
#[derive(Debug, Clone)]
pub struct StagedRefresh {
    root: ResourceId,
    depth: Depth,
    descriptors: BTreeMap<ResourceId, Option<RevisionDescriptor>>,
    failed: Vec<ResourceId>,
    errors: Vec<SyncError>,
}

impl StagedRefresh {
    fn new(root: ResourceId, depth: Depth) -> Self {
        Self {
            root,
            depth,
            descriptors: BTreeMap::new(),
            failed: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, resource: &ResourceId, error: SyncError) {
        self.failed.push(resource.clone());
        self.errors.push(error);
    }

    pub fn root(&self) -> &ResourceId {
        &self.root
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    /// Number of resources visited, present or absent
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Errors raised while fetching
    pub fn errors(&self) -> &[SyncError] {
        &self.errors
    }

    /// Whether `resource` lies in a subtree whose fetch failed
    pub fn is_failed(&self, resource: &ResourceId) -> bool {
        self.failed
            .iter()
            .any(|root| root == resource || root.is_ancestor_of(resource))
    }
}

/// Result of applying a staged refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Resources whose cached descriptor was added, changed or removed
    pub changed: BTreeSet<ResourceId>,
    /// Fetch and persistence errors, per resource
    pub errors: Vec<SyncError>,
}

impl CommitReport {
    pub fn merge(&mut self, other: CommitReport) {
        self.changed.extend(other.changed);
        self.errors.extend(other.errors);
    }
}

// ============================================================================
// ResourceSynchronizer
// ============================================================================

/// Keeps one side of the comparison in sync with its revision source
pub struct ResourceSynchronizer {
    source: Arc<dyn RevisionSource>,
    cache: DescriptorCache,
}

impl ResourceSynchronizer {
    pub fn new(source: Arc<dyn RevisionSource>, cache: DescriptorCache) -> Self {
        Self { source, cache }
    }

    /// Label of the revision source, used in logs
    pub fn label(&self) -> String {
        self.source.label()
    }

    pub fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    /// Cached descriptor of `resource`
    pub async fn get(&self, resource: &ResourceId) -> Option<RevisionDescriptor> {
        self.cache.get(resource).await
    }

    /// Whether the cache holds a descriptor for `resource`
    pub async fn has_remote(&self, resource: &ResourceId) -> bool {
        self.cache.get(resource).await.is_some()
    }

    /// Fetches and commits in one step
    ///
    /// # Errors
    /// Returns [`SyncError::Cancelled`] when `cancel` fires during the fetch;
    /// the cache is then untouched.
    pub async fn refresh(
        &self,
        root: &ResourceId,
        depth: Depth,
        cancel: &CancellationToken,
    ) -> Result<CommitReport, SyncError> {
        let staged = self.fetch(root, depth, cancel).await?;
        Ok(self.commit(staged).await)
    }

    /// Walks the revision source below `root` and stages the descriptors
    ///
    /// Only cancellation is returned as an error; per-resource failures are
    /// recorded in the staged refresh.
    pub async fn fetch(
        &self,
        root: &ResourceId,
        depth: Depth,
        cancel: &CancellationToken,
    ) -> Result<StagedRefresh, SyncError> {
        let label = self.source.label();
        debug!(source = %label, root = %root, ?depth, "Fetching descriptors");

        let mut staged = StagedRefresh::new(root.clone(), depth);
        let mut stack = vec![(root.clone(), depth)];

        while let Some((resource, remaining)) = stack.pop() {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                result = self.source.fetch_revision(&resource) => result,
            };

            let descriptor = match fetched {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(source = %label, resource = %resource, error = %e, "Failed to fetch descriptor");
                    staged.fail(&resource, SyncError::refresh(&resource, &e));
                    continue;
                }
            };

            let descend = remaining != Depth::Zero
                && descriptor.as_ref().is_some_and(RevisionDescriptor::is_folder);
            staged.descriptors.insert(resource.clone(), descriptor);
            if !descend {
                continue;
            }

            let members = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                result = self.source.fetch_members(&resource) => result,
            };

            match members {
                Ok(members) => {
                    // Reverse so members are visited in listing order.
                    for member in members.into_iter().rev() {
                        stack.push((member, remaining.below()));
                    }
                }
                Err(e) => {
                    warn!(source = %label, folder = %resource, error = %e, "Failed to list folder members");
                    staged.fail(&resource, SyncError::refresh(&resource, &e));
                }
            }
        }

        debug!(
            source = %label,
            root = %root,
            visited = staged.len(),
            failed = staged.failed.len(),
            "Fetch complete"
        );
        Ok(staged)
    }

    /// Applies a staged fetch to the cache
    pub async fn commit(&self, staged: StagedRefresh) -> CommitReport {
        let label = self.source.label();
        let previous = self.cache.cached_within(&staged.root, staged.depth);
        let mut report = CommitReport {
            changed: BTreeSet::new(),
            errors: staged.errors.clone(),
        };

        for (resource, descriptor) in &staged.descriptors {
            match descriptor {
                Some(descriptor) => {
                    if self.cache.get(resource).await.as_ref() != Some(descriptor) {
                        debug!(source = %label, resource = %resource, "Descriptor changed");
                        report.changed.insert(resource.clone());
                        if let Err(e) = self.cache.set(resource, descriptor).await {
                            report.errors.push(e);
                        }
                    }
                    if !descriptor.is_folder() {
                        // A file has no members; drop anything cached below it.
                        for stale in self.cache.cached_within(resource, Depth::Infinite) {
                            if &stale != resource {
                                self.remove_subtree(&stale, &mut report).await;
                            }
                        }
                    }
                }
                None => {
                    if self.cache.get(resource).await.is_some() {
                        self.remove_subtree(resource, &mut report).await;
                    }
                }
            }
        }

        for resource in previous {
            if staged.descriptors.contains_key(&resource)
                || staged.is_failed(&resource)
                || report.changed.contains(&resource)
            {
                continue;
            }
            self.remove_subtree(&resource, &mut report).await;
        }

        if !report.changed.is_empty() {
            info!(
                source = %label,
                root = %staged.root,
                changed = report.changed.len(),
                "Committed descriptor changes"
            );
        }
        report
    }

    async fn remove_subtree(&self, resource: &ResourceId, report: &mut CommitReport) {
        let label = self.source.label();
        match self.cache.remove(resource, Depth::Infinite).await {
            Ok(dropped) => {
                for id in dropped {
                    debug!(source = %label, resource = %id, "Descriptor removed");
                    report.changed.insert(id);
                }
            }
            Err(e) => {
                // Memory is already updated; only the store is stale.
                report.changed.insert(resource.clone());
                report.errors.push(e);
            }
        }
    }

    /// Drops every cached and persisted descriptor
    pub async fn dispose(&self) {
        debug!(source = %self.source.label(), "Disposing resource synchronizer");
        self.cache.dispose().await;
    }
}

// ============================================================================
// Unit tests
// ============================================================================
