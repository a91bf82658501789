//! VCS provider port (driven/secondary port)
//!
//! This module defines the interface to the version-control collaborator.
//! The engine never speaks a wire protocol itself; it asks the provider for
//! revision descriptors, folder listings and content bytes.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because failures at this boundary are
//!   adapter-specific (network, authentication, server errors). Callers map
//!   them into per-resource `SyncError::Refresh` values.
//! - Uses `#[async_trait]` since every call may perform network I/O.

use std::sync::Arc;

use crate::domain::{ResourceId, RevisionDescriptor, Tag};

/// Port trait for version-control operations
#[async_trait::async_trait]
pub trait VcsProvider: Send + Sync {
    /// Fetches the descriptor of `resource` at `tag`
    ///
    /// Returns `Ok(None)` when the resource does not exist at that tag.
    async fn fetch_revision(
        &self,
        resource: &ResourceId,
        tag: &Tag,
    ) -> anyhow::Result<Option<RevisionDescriptor>>;

    /// Lists the direct members of `folder` at `tag`
    async fn fetch_members(&self, folder: &ResourceId, tag: &Tag)
        -> anyhow::Result<Vec<ResourceId>>;

    /// Fetches the content bytes a descriptor refers to
    async fn fetch_content(
        &self,
        resource: &ResourceId,
        descriptor: &RevisionDescriptor,
    ) -> anyhow::Result<Vec<u8>>;
}

/// Source of revision descriptors for one side of the comparison
///
/// A resource synchronizer refreshes itself from exactly one source. The
/// usual source is a [`TagSource`], i.e. the VCS provider pinned to a tag.
#[async_trait::async_trait]
pub trait RevisionSource: Send + Sync {
    /// Human-readable label used in logs and persistence qualifiers
    fn label(&self) -> String;

    /// Fetches the descriptor of a single resource
    async fn fetch_revision(&self, resource: &ResourceId)
        -> anyhow::Result<Option<RevisionDescriptor>>;

    /// Lists the direct members of a folder
    async fn fetch_members(&self, folder: &ResourceId) -> anyhow::Result<Vec<ResourceId>>;
}

/// A [`VcsProvider`] pinned to a single tag
#[derive(Clone)]
pub struct TagSource {
    vcs: Arc<dyn VcsProvider>,
    tag: Tag,
}

impl TagSource {
    /// Pins `vcs` to `tag`
    pub fn new(vcs: Arc<dyn VcsProvider>, tag: Tag) -> Self {
        Self { vcs, tag }
    }

    /// Returns the pinned tag
    pub fn tag(&self) -> &Tag {
        &self.tag
    }
}

#[async_trait::async_trait]
impl RevisionSource for TagSource {
    fn label(&self) -> String {
        self.tag.qualifier()
    }

    async fn fetch_revision(
        &self,
        resource: &ResourceId,
    ) -> anyhow::Result<Option<RevisionDescriptor>> {
        self.vcs.fetch_revision(resource, &self.tag).await
    }

    async fn fetch_members(&self, folder: &ResourceId) -> anyhow::Result<Vec<ResourceId>> {
        self.vcs.fetch_members(folder, &self.tag).await
    }
}
