//! Merge subscriber: incoming changes between two tags
//!
//! The start tag plays the base role and the end tag the remote role. A
//! third descriptor cache records, per resource, the remote descriptor that
//! was current when the user marked the resource as merged. While that
//! record still equals the remote descriptor the resource is resolved with
//! base := remote, so it stops surfacing as incoming or conflicting.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};
use triad_core::domain::{Depth, ResourceId, SubscriberId, Tag};
use triad_core::ports::TagSource;
use triad_core::Workspace;

use super::{CoreParts, RefreshStatus, Subscriber, SubscriberCore};

/// Compares the working copy against a range of history
///
/// Cancels itself once every root has been deleted or moved away.
pub struct MergeSubscriber {
    core: SubscriberCore,
    start: Tag,
    end: Tag,
}

impl MergeSubscriber {
    pub fn new(workspace: Workspace, roots: Vec<ResourceId>, start: Tag, end: Tag) -> Self {
        let id = SubscriberId::new();
        let qualifier = |role: &str| workspace.qualifier(&format!("merge-{id}-{role}"));
        let (start_qualifier, end_qualifier, merged_qualifier) =
            (qualifier("start"), qualifier("end"), qualifier("merged"));

        let parts = CoreParts {
            name: format!("merge:{start}..{end}"),
            base: (
                Arc::new(TagSource::new(workspace.vcs.clone(), start.clone())),
                start_qualifier,
            ),
            remote: (
                Arc::new(TagSource::new(workspace.vcs.clone(), end.clone())),
                end_qualifier,
            ),
            merged: Some(merged_qualifier),
            cancel_when_rootless: true,
            workspace,
            roots,
        };

        Self {
            core: SubscriberCore::new(id, parts),
            start,
            end,
        }
    }

    pub fn start(&self) -> &Tag {
        &self.start
    }

    pub fn end(&self) -> &Tag {
        &self.end
    }

    /// Marks resources as merged at their current remote descriptor
    ///
    /// Resources without a remote descriptor lose any merged record. The
    /// affected infos are recomputed and published.
    pub async fn merged(&self, resources: &[ResourceId]) -> RefreshStatus {
        if !self.core.is_active() {
            return RefreshStatus::inactive();
        }
        let Some(cache) = self.core.merged_cache() else {
            return RefreshStatus::inactive();
        };

        let mut errors = Vec::new();
        let mut touched = BTreeSet::new();
        for resource in resources {
            let result = match self.core.remote().get(resource).await {
                Some(remote) => cache.set(resource, &remote).await,
                None => cache.remove(resource, Depth::Zero).await.map(|_| ()),
            };
            if let Err(e) = result {
                warn!(resource = %resource, error = %e, "Failed to persist merged record");
                errors.push(e);
            }
            touched.insert(resource.clone());
        }
        info!(
            subscriber = %self.core.name(),
            merged = touched.len(),
            "Marked resources as merged"
        );

        let touched: Vec<ResourceId> = touched.into_iter().collect();
        let mut status = self.core.local_changes(&touched).await;
        status.errors.extend(errors);
        status
    }

    /// Whether `resource` is recorded as merged at its current remote state
    pub async fn is_merged(&self, resource: &ResourceId) -> bool {
        let Some(cache) = self.core.merged_cache() else {
            return false;
        };
        match (cache.get(resource).await, self.core.remote().get(resource).await) {
            (Some(merged), Some(remote)) => merged == remote,
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl Subscriber for MergeSubscriber {
    fn core(&self) -> &SubscriberCore {
        &self.core
    }
}
