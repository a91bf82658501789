//! Triad Sync - Three-way refresh and change tracking
//!
//! Provides:
//! - Base / remote resource synchronizers with persisted descriptor caches
//! - The [`SyncInfoSet`] change-tracking collection
//! - Workspace and merge subscribers orchestrating refresh
//! - A filesystem watcher and debounced refresh scheduler
//!
//! ## Modules
//!
//! - [`synchronizer`] - Two-phase (fetch, commit) descriptor cache refresh
//! - [`sync_info_set`] - Batched resource → SyncInfo collection with listeners
//! - [`subscriber`] - Refresh orchestration and sync-info computation
//! - [`scheduler`] - Debounced resource changes into refresh calls
//! - [`watcher`] - notify-based resource change source
//! - [`memory_store`] - In-memory byte store

pub mod memory_store;
pub mod scheduler;
pub mod subscriber;
pub mod sync_info_set;
pub mod synchronizer;
pub mod watcher;

pub use memory_store::MemoryByteStore;
pub use scheduler::RefreshScheduler;
pub use subscriber::{
    MergeSubscriber, RefreshOutcome, RefreshStatus, Subscriber, WorkspaceSubscriber,
};
pub use sync_info_set::{SyncInfoSet, SyncSetDelta, SyncSetEvent};
pub use synchronizer::{CommitReport, DescriptorCache, ResourceSynchronizer, StagedRefresh};
pub use watcher::{DebouncedChangeQueue, FileWatcher, ResourceChange};

use thiserror::Error;
use triad_core::domain::{DomainError, ResourceId};

/// Errors that can occur during synchronization operations
///
/// Per-resource variants are collected rather than returned, so the type is
/// `Clone` and comparable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Fetching descriptors or members from the VCS failed
    #[error("Refresh failed for {resource}: {message}")]
    Refresh {
        resource: ResourceId,
        message: String,
    },

    /// The three variants of a resource have inconsistent shapes
    #[error("Cannot resolve sync state of {resource}: {message}")]
    Resolver {
        resource: ResourceId,
        message: String,
    },

    /// The byte store rejected a read or write
    #[error("Persistence error for {resource}: {message}")]
    Persistence {
        resource: ResourceId,
        message: String,
    },

    /// The operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// A sync set snapshot could not be produced
    #[error("Snapshot failed: {0}")]
    Snapshot(String),

    /// The subscriber has been cancelled
    #[error("Subscriber is no longer active")]
    Inactive,

    /// A domain-level error propagated from triad-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SyncError {
    pub(crate) fn refresh(resource: &ResourceId, err: &anyhow::Error) -> Self {
        SyncError::Refresh {
            resource: resource.clone(),
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn persistence(resource: &ResourceId, err: &anyhow::Error) -> Self {
        SyncError::Persistence {
            resource: resource.clone(),
            message: format!("{err:#}"),
        }
    }

    /// The resource a per-resource error refers to
    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            SyncError::Refresh { resource, .. }
            | SyncError::Resolver { resource, .. }
            | SyncError::Persistence { resource, .. } => Some(resource),
            _ => None,
        }
    }
}
