//! Subscribers
//!
//! A subscriber owns a base and a remote [`ResourceSynchronizer`], a
//! [`SyncInfoSet`] and the comparison criteria for a set of root resources.
//! It refreshes both synchronizers, recomputes the [`SyncInfo`] of every
//! resource whose descriptors changed and publishes the out-of-sync ones in
//! one batched transaction.
//!
//! ## Lifecycle
//!
//! ```text
//! Active ──cancel() / last root removed──→ Cancelled
//! ```
//!
//! Cancellation is irreversible: listeners are disconnected, the descriptor
//! caches are disposed and every later refresh reports
//! [`RefreshOutcome::Inactive`].
//!
//! ## Variants
//!
//! - [`WorkspaceSubscriber`] compares the working copy with HEAD or a branch
//! - [`MergeSubscriber`] compares two tags and tracks merged resources

mod merge;
mod workspace;

pub use merge::MergeSubscriber;
pub use workspace::WorkspaceSubscriber;

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use triad_core::domain::{
    ChangeKind, Depth, LocalState, ResourceId, RevisionDescriptor, SubscriberId, SyncInfo,
    SyncKind,
};
use triad_core::ports::RevisionSource;
use triad_core::resolver::{
    classify_conflict, ComparisonCriterion, CriteriaRegistry, Mergeability, SyncStateResolver,
};
use triad_core::tree::{walk, Walk};
use triad_core::Workspace;

use crate::synchronizer::{CommitReport, DescriptorCache, ResourceSynchronizer, StagedRefresh};
use crate::sync_info_set::{SyncInfoSet, SyncSetDelta};
use crate::watcher::ResourceChange;
use crate::SyncError;

// ============================================================================
// Refresh status
// ============================================================================

/// How a refresh ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// At least one resource changed
    Changed,
    /// The refresh completed without changes
    NoChanges,
    /// The refresh was cancelled; caches and set are unchanged
    Cancelled,
    /// The subscriber was already cancelled
    Inactive,
}

/// Aggregated result of a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshStatus {
    pub outcome: RefreshOutcome,
    /// Resources whose descriptors or sync infos changed
    pub changed: BTreeSet<ResourceId>,
    /// Per-resource errors; they never abort the refresh
    pub errors: Vec<SyncError>,
}

impl RefreshStatus {
    fn empty(outcome: RefreshOutcome) -> Self {
        Self {
            outcome,
            changed: BTreeSet::new(),
            errors: Vec::new(),
        }
    }

    pub fn inactive() -> Self {
        Self::empty(RefreshOutcome::Inactive)
    }

    pub fn cancelled() -> Self {
        Self::empty(RefreshOutcome::Cancelled)
    }

    fn completed(changed: BTreeSet<ResourceId>, errors: Vec<SyncError>) -> Self {
        let outcome = if changed.is_empty() {
            RefreshOutcome::NoChanges
        } else {
            RefreshOutcome::Changed
        };
        Self {
            outcome,
            changed,
            errors,
        }
    }

    /// True when the refresh completed without per-resource errors
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
            && matches!(
                self.outcome,
                RefreshOutcome::Changed | RefreshOutcome::NoChanges
            )
    }
}

// ============================================================================
// Subscriber trait
// ============================================================================

/// Common interface of workspace and merge subscribers
///
/// Every operation is provided on top of [`SubscriberCore`]; implementors
/// only expose their core.
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync {
    /// The shared refresh engine
    fn core(&self) -> &SubscriberCore;

    fn id(&self) -> SubscriberId {
        self.core().id()
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn roots(&self) -> Vec<ResourceId> {
        self.core().roots()
    }

    fn sync_set(&self) -> Arc<SyncInfoSet> {
        self.core().sync_set()
    }

    fn is_active(&self) -> bool {
        self.core().is_active()
    }

    /// Selects the comparison criterion; returns whether it changed
    fn set_criterion(&self, id: &str) -> bool {
        self.core().set_criterion(id)
    }

    async fn is_supervised(&self, resource: &ResourceId) -> bool {
        self.core().is_supervised(resource).await
    }

    async fn sync_info(&self, resource: &ResourceId) -> Result<Option<SyncInfo>, SyncError> {
        self.core().sync_info(resource).await
    }

    async fn refresh(
        &self,
        resources: &[ResourceId],
        depth: Depth,
        cancel: &CancellationToken,
    ) -> RefreshStatus {
        self.core().refresh(resources, depth, cancel).await
    }

    async fn local_changes(&self, resources: &[ResourceId]) -> RefreshStatus {
        self.core().local_changes(resources).await
    }

    async fn mergeability(
        &self,
        resource: &ResourceId,
        cancel: &CancellationToken,
    ) -> Result<Option<Mergeability>, SyncError> {
        self.core().mergeability(resource, cancel).await
    }

    /// Drops roots that were deleted or moved; returns whether any was
    async fn handle_root_changes(&self, changes: &[ResourceChange]) -> bool {
        self.core().handle_root_changes(changes).await
    }

    async fn cancel(&self) {
        self.core().cancel().await
    }
}

// ============================================================================
// SubscriberCore
// ============================================================================

/// Construction parameters of a [`SubscriberCore`]
pub(crate) struct CoreParts {
    pub name: String,
    pub workspace: Workspace,
    pub roots: Vec<ResourceId>,
    pub base: (Arc<dyn RevisionSource>, String),
    pub remote: (Arc<dyn RevisionSource>, String),
    pub merged: Option<String>,
    pub cancel_when_rootless: bool,
}

/// Refresh engine shared by every subscriber variant
pub struct SubscriberCore {
    id: SubscriberId,
    name: String,
    workspace: Workspace,
    roots: RwLock<Vec<ResourceId>>,
    base: ResourceSynchronizer,
    remote: ResourceSynchronizer,
    merged: Option<DescriptorCache>,
    set: Arc<SyncInfoSet>,
    criteria: RwLock<CriteriaRegistry>,
    lifecycle: CancellationToken,
    cancel_when_rootless: bool,
}

impl SubscriberCore {
    pub(crate) fn new(id: SubscriberId, parts: CoreParts) -> Self {
        let CoreParts {
            name,
            workspace,
            roots,
            base,
            remote,
            merged,
            cancel_when_rootless,
        } = parts;

        let mut criteria = CriteriaRegistry::new();
        criteria.select(&workspace.config.sync.comparison_criterion);

        let store = workspace.store.clone();
        info!(
            subscriber = %name,
            roots = roots.len(),
            base = %base.0.label(),
            remote = %remote.0.label(),
            criterion = criteria.current().id(),
            "Creating subscriber"
        );

        Self {
            id,
            base: ResourceSynchronizer::new(base.0, DescriptorCache::new(base.1, store.clone())),
            remote: ResourceSynchronizer::new(
                remote.0,
                DescriptorCache::new(remote.1, store.clone()),
            ),
            merged: merged.map(|qualifier| DescriptorCache::new(qualifier, store)),
            name,
            workspace,
            roots: RwLock::new(roots),
            set: Arc::new(SyncInfoSet::new()),
            criteria: RwLock::new(criteria),
            lifecycle: CancellationToken::new(),
            cancel_when_rootless,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn roots(&self) -> Vec<ResourceId> {
        self.roots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sync_set(&self) -> Arc<SyncInfoSet> {
        self.set.clone()
    }

    pub fn base(&self) -> &ResourceSynchronizer {
        &self.base
    }

    pub fn remote(&self) -> &ResourceSynchronizer {
        &self.remote
    }

    pub(crate) fn merged_cache(&self) -> Option<&DescriptorCache> {
        self.merged.as_ref()
    }

    pub fn is_active(&self) -> bool {
        !self.lifecycle.is_cancelled()
    }

    /// Token cancelled when the subscriber is cancelled
    pub fn lifecycle(&self) -> CancellationToken {
        self.lifecycle.clone()
    }

    pub fn set_criterion(&self, id: &str) -> bool {
        let changed = self
            .criteria
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .select(id);
        if changed {
            info!(subscriber = %self.name, criterion = id, "Comparison criterion changed");
        }
        changed
    }

    pub fn criterion(&self) -> Arc<dyn ComparisonCriterion> {
        self.criteria
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current()
    }

    fn within_roots(&self, resource: &ResourceId) -> bool {
        self.roots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|root| Depth::Infinite.contains(root, resource))
    }

    /// Whether the subscriber tracks `resource`
    ///
    /// Ignored resources are still supervised when the remote side has them,
    /// so incoming additions of ignored names stay visible.
    pub async fn is_supervised(&self, resource: &ResourceId) -> bool {
        if !self.within_roots(resource) {
            return false;
        }
        if self.workspace.local.is_ignored(resource) {
            return self.remote.has_remote(resource).await;
        }
        true
    }

    /// Computes the current sync info of a resource without any VCS I/O
    /// beyond content comparison
    ///
    /// # Errors
    /// Returns [`SyncError::Inactive`] once the subscriber is cancelled.
    pub async fn sync_info(&self, resource: &ResourceId) -> Result<Option<SyncInfo>, SyncError> {
        if !self.is_active() {
            return Err(SyncError::Inactive);
        }
        let mut errors = Vec::new();
        let info = self.compute(resource, &self.lifecycle, &mut errors).await;
        for error in errors {
            debug!(resource = %resource, error = %error, "Sync info computed with error");
        }
        Ok(info)
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Resources to hand to the synchronizers for a refresh request
    ///
    /// Requests above a root are narrowed to the roots below them; requests
    /// unrelated to every root are dropped.
    fn refresh_targets(&self, resources: &[ResourceId]) -> Vec<ResourceId> {
        let roots = self.roots();
        let mut targets = BTreeSet::new();
        for resource in resources {
            if roots
                .iter()
                .any(|root| Depth::Infinite.contains(root, resource))
            {
                targets.insert(resource.clone());
            } else {
                targets.extend(
                    roots
                        .iter()
                        .filter(|root| resource.is_ancestor_of(root))
                        .cloned(),
                );
            }
        }
        targets.into_iter().collect()
    }

    async fn fetch_all(
        &self,
        targets: &[ResourceId],
        depth: Depth,
        cancel: &CancellationToken,
    ) -> Result<(Vec<StagedRefresh>, Vec<StagedRefresh>), SyncError> {
        let mut base = Vec::with_capacity(targets.len());
        for target in targets {
            base.push(self.base.fetch(target, depth, cancel).await?);
        }
        let mut remote = Vec::with_capacity(targets.len());
        for target in targets {
            remote.push(self.remote.fetch(target, depth, cancel).await?);
        }
        Ok((base, remote))
    }

    /// Refreshes base and remote below `resources` and republishes changes
    pub async fn refresh(
        &self,
        resources: &[ResourceId],
        depth: Depth,
        cancel: &CancellationToken,
    ) -> RefreshStatus {
        if !self.is_active() {
            debug!(subscriber = %self.name, "Refresh requested on inactive subscriber");
            return RefreshStatus::inactive();
        }

        let targets = self.refresh_targets(resources);
        info!(
            subscriber = %self.name,
            targets = targets.len(),
            ?depth,
            "Refreshing"
        );

        let fetched = tokio::select! {
            biased;
            _ = self.lifecycle.cancelled() => Err(SyncError::Cancelled),
            fetched = self.fetch_all(&targets, depth, cancel) => fetched,
        };
        let (base_staged, remote_staged) = match fetched {
            Ok(staged) => staged,
            Err(_) => {
                info!(subscriber = %self.name, "Refresh cancelled during fetch");
                return RefreshStatus::cancelled();
            }
        };
        if cancel.is_cancelled() || !self.is_active() {
            info!(subscriber = %self.name, "Refresh cancelled before commit");
            return RefreshStatus::cancelled();
        }

        let mut report = CommitReport::default();
        for staged in base_staged {
            report.merge(self.base.commit(staged).await);
        }
        for staged in remote_staged {
            report.merge(self.remote.commit(staged).await);
        }

        let CommitReport { changed, mut errors } = report;
        // Fetch errors of the refreshed scope and resolver errors of the
        // recomputed resources are replaced.
        let stale = |error: &SyncError| match error {
            SyncError::Refresh { resource, .. } | SyncError::Persistence { resource, .. } => {
                targets.iter().any(|target| depth.contains(target, resource))
            }
            SyncError::Resolver { resource, .. } => changed.contains(resource),
            _ => false,
        };
        let delta = self.publish(&changed, cancel, &mut errors, stale).await;

        info!(
            subscriber = %self.name,
            changed = changed.len(),
            published = delta.len(),
            errors = errors.len(),
            "Refresh complete"
        );
        RefreshStatus::completed(changed, errors)
    }

    /// Recomputes sync infos after local modifications, without VCS fetches
    ///
    /// A notification covers the whole subtree of each given resource: set
    /// members, cached base and remote descriptors and the current local
    /// members below it are all recomputed, so edits, deletions and moves
    /// reported only at folder level still surface.
    pub async fn local_changes(&self, resources: &[ResourceId]) -> RefreshStatus {
        if !self.is_active() {
            return RefreshStatus::inactive();
        }

        let mut targets = BTreeSet::new();
        for resource in resources {
            targets.extend(self.set.members_within(resource, Depth::Infinite));
            targets.extend(self.base.cache().cached_within(resource, Depth::Infinite));
            targets.extend(self.remote.cache().cached_within(resource, Depth::Infinite));
            self.collect_local(resource, &mut targets);
        }

        let mut errors = Vec::new();
        let stale = |error: &SyncError| {
            matches!(error, SyncError::Resolver { resource, .. } if targets.contains(resource))
        };
        let delta = self
            .publish(&targets, &self.lifecycle, &mut errors, stale)
            .await;
        debug!(
            subscriber = %self.name,
            recomputed = targets.len(),
            published = delta.len(),
            "Local changes applied"
        );
        let changed = delta.resources().cloned().collect();
        RefreshStatus::completed(changed, errors)
    }

    /// Adds `resource` and every local member below it
    fn collect_local(&self, resource: &ResourceId, targets: &mut BTreeSet<ResourceId>) {
        let local = &self.workspace.local;
        walk(
            resource.clone(),
            Depth::Infinite,
            |folder| local.members(folder),
            |member, _| {
                targets.insert(member.clone());
                Walk::Continue
            },
        );
    }

    /// Computes infos for `resources` and applies them in one transaction
    ///
    /// Recorded errors matching `stale` are replaced by the ones collected
    /// in `errors`.
    async fn publish<F>(
        &self,
        resources: &BTreeSet<ResourceId>,
        cancel: &CancellationToken,
        errors: &mut Vec<SyncError>,
        stale: F,
    ) -> SyncSetDelta
    where
        F: Fn(&SyncError) -> bool + Send,
    {
        let mut computed = Vec::with_capacity(resources.len());
        for resource in resources {
            let info = self.compute(resource, cancel, errors).await;
            computed.push((resource, info));
        }

        self.set.begin_input();
        for (resource, info) in computed {
            match info {
                Some(info) if !info.kind().is_in_sync() => self.set.add(info),
                _ => self.set.remove(resource),
            }
        }
        self.set.replace_errors(stale, errors);
        self.set.end_input()
    }

    // ------------------------------------------------------------------
    // Sync info computation
    // ------------------------------------------------------------------

    async fn compute(
        &self,
        resource: &ResourceId,
        cancel: &CancellationToken,
        errors: &mut Vec<SyncError>,
    ) -> Option<SyncInfo> {
        if !self.is_supervised(resource).await {
            return None;
        }

        let local = self.workspace.local.local_state(resource);
        let mut base = self.base.get(resource).await;
        let remote = self.remote.get(resource).await;
        if local.is_none() && base.is_none() && remote.is_none() {
            return None;
        }

        if let (Some(merged), Some(remote)) = (&self.merged, &remote) {
            if merged.get(resource).await.as_ref() == Some(remote) {
                base = Some(remote.clone());
            }
        }

        if let Some(message) =
            SyncStateResolver::shape_issue(local.as_ref(), base.as_ref(), remote.as_ref())
        {
            warn!(resource = %resource, %message, "Inconsistent resource shape");
            errors.push(SyncError::Resolver {
                resource: resource.clone(),
                message,
            });
        }

        let criterion = self.criterion();
        let mut kind = SyncStateResolver::resolve(
            local.as_ref(),
            base.as_ref(),
            remote.as_ref(),
            criterion.as_ref(),
        );
        let effective =
            SyncStateResolver::effective_base(local.as_ref(), base.as_ref(), remote.as_ref())
                .cloned();

        if criterion.is_content_based() && !kind.is_in_sync() {
            if let Some(same) = self
                .compare_content(resource, effective.as_ref(), remote.as_ref(), criterion.as_ref(), cancel)
                .await
            {
                kind = SyncStateResolver::resolve_with(
                    local.as_ref(),
                    base.as_ref(),
                    remote.as_ref(),
                    |_, _| same,
                );
            }
        }

        if kind == SyncKind::conflicting(ChangeKind::Change)
            && self.workspace.config.sync.classify_conflicts
        {
            kind = self
                .refine_conflict(resource, kind, local.as_ref(), effective.as_ref(), remote.as_ref(), cancel)
                .await;
        }

        debug!(resource = %resource, %kind, "Resolved sync kind");
        Some(SyncInfo::new(resource.clone(), local, effective, remote, kind))
    }

    /// Content verdict for a base/remote file pair the cheap check found
    /// different; `None` keeps the cheap verdict
    async fn compare_content(
        &self,
        resource: &ResourceId,
        base: Option<&RevisionDescriptor>,
        remote: Option<&RevisionDescriptor>,
        criterion: &dyn ComparisonCriterion,
        cancel: &CancellationToken,
    ) -> Option<bool> {
        let (base, remote) = (base?, remote?);
        if base.is_folder() || remote.is_folder() || criterion.same_revision(base, remote) {
            return None;
        }
        let base_bytes = self.fetch_content(resource, base, cancel).await.ok()?;
        let remote_bytes = self.fetch_content(resource, remote, cancel).await.ok()?;
        let same = criterion.same_content(&base_bytes, &remote_bytes);
        debug!(resource = %resource, criterion = criterion.id(), same, "Compared content");
        Some(same)
    }

    async fn fetch_content(
        &self,
        resource: &ResourceId,
        descriptor: &RevisionDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SyncError> {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            _ = self.lifecycle.cancelled() => return Err(SyncError::Cancelled),
            fetched = self.workspace.vcs.fetch_content(resource, descriptor) => fetched,
        };
        fetched.map_err(|e| {
            warn!(resource = %resource, error = %e, "Failed to fetch content");
            SyncError::refresh(resource, &e)
        })
    }

    async fn refine_conflict(
        &self,
        resource: &ResourceId,
        kind: SyncKind,
        local: Option<&LocalState>,
        base: Option<&RevisionDescriptor>,
        remote: Option<&RevisionDescriptor>,
        cancel: &CancellationToken,
    ) -> SyncKind {
        match self.classify(resource, local, base, remote, cancel).await {
            Ok(Some(Mergeability::Manual)) => kind.with_change(ChangeKind::ManualMerge),
            Ok(_) => kind,
            Err(e) => {
                debug!(resource = %resource, error = %e, "Mergeability unknown, keeping change kind");
                kind
            }
        }
    }

    async fn classify(
        &self,
        resource: &ResourceId,
        local: Option<&LocalState>,
        base: Option<&RevisionDescriptor>,
        remote: Option<&RevisionDescriptor>,
        cancel: &CancellationToken,
    ) -> Result<Option<Mergeability>, SyncError> {
        let (Some(local), Some(base), Some(remote)) = (local, base, remote) else {
            return Ok(None);
        };
        if local.is_folder || base.is_folder() || remote.is_folder() {
            return Ok(None);
        }

        let base_bytes = self.fetch_content(resource, base, cancel).await?;
        let remote_bytes = self.fetch_content(resource, remote, cancel).await?;
        let local_bytes = self
            .workspace
            .local
            .read_content(resource)
            .map_err(|e| SyncError::refresh(resource, &e))?;
        Ok(Some(classify_conflict(
            &base_bytes,
            &local_bytes,
            &remote_bytes,
        )))
    }

    /// Classifies a conflicting file as auto-mergeable or manual
    ///
    /// Returns `Ok(None)` for resources that are not conflicting files.
    pub async fn mergeability(
        &self,
        resource: &ResourceId,
        cancel: &CancellationToken,
    ) -> Result<Option<Mergeability>, SyncError> {
        let Some(info) = self.sync_info(resource).await? else {
            return Ok(None);
        };
        if !info.kind().is_conflicting() {
            return Ok(None);
        }
        self.classify(resource, info.local(), info.base(), info.remote(), cancel)
            .await
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn handle_root_changes(&self, changes: &[ResourceChange]) -> bool {
        let vacated: Vec<&ResourceId> = changes.iter().filter_map(ResourceChange::vacated).collect();
        if vacated.is_empty() {
            return false;
        }

        let (removed, remaining) = {
            let mut roots = self.roots.write().unwrap_or_else(PoisonError::into_inner);
            let mut removed = Vec::new();
            roots.retain(|root| {
                let gone = vacated
                    .iter()
                    .any(|v| Depth::Infinite.contains(v, root));
                if gone {
                    removed.push(root.clone());
                }
                !gone
            });
            (removed, roots.len())
        };
        if removed.is_empty() {
            return false;
        }

        info!(
            subscriber = %self.name,
            removed = removed.len(),
            remaining,
            "Roots deleted or moved"
        );
        self.set.begin_input();
        for root in &removed {
            self.set.remove_subtree(root);
        }
        self.set.end_input();

        if remaining == 0 && self.cancel_when_rootless {
            self.cancel().await;
        }
        true
    }

    /// Cancels the subscriber; later calls are no-ops
    pub async fn cancel(&self) {
        if self.lifecycle.is_cancelled() {
            return;
        }
        self.lifecycle.cancel();
        info!(subscriber = %self.name, "Subscriber cancelled");

        self.set.disconnect();
        self.base.dispose().await;
        self.remote.dispose().await;
        if let Some(merged) = &self.merged {
            merged.dispose().await;
        }
    }
}
