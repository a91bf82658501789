//! Triad Model - Incremental display model for out-of-sync resources
//!
//! This crate turns the change stream of a
//! [`SyncInfoSet`](triad_sync::SyncInfoSet) into a tree of display nodes
//! and keeps a presentation informed about it:
//! - **Node** - the arena-backed [`NodeTree`] and its read-only [`ModelNode`] views
//! - **Provider** - hierarchical and composite [`ModelProvider`]s
//! - **Handler** - the [`BackgroundEventHandler`] task that owns a provider
//!   and serializes every update
//! - **Presentation** - the port the model reports to
//!
//! # Example
//!
//! ```ignore
//! let provider = HierarchicalProvider::new(workspace.markers.clone());
//! let (handle, task) = BackgroundEventHandler::spawn(
//!     provider,
//!     subscriber.clone(),
//!     Arc::new(NullPresentation),
//!     &workspace.config.events,
//! );
//! handle.set_busy(resource, true)?;
//! let nodes = handle.inspect(|p| p.node_count()).await?;
//! ```

pub mod event;
pub mod handler;
pub mod node;
pub mod presentation;
pub mod provider;

pub use event::Event;
pub use handler::{BackgroundEventHandler, EventHandlerHandle};
pub use node::{Marker, ModelNode, NodeKey, NodeTree};
pub use presentation::{NullPresentation, Presentation, RedrawGuard};
pub use provider::{
    by_direction, CompositeProvider, HierarchicalProvider, ModelChanges, ModelProvider, Partition,
};

use thiserror::Error;
use triad_sync::SyncError;

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors surfaced by the model crate
#[derive(Debug, Error)]
pub enum ModelError {
    /// The handler task is gone, or dropped a reply
    #[error("Background event handler has stopped")]
    Stopped,

    /// A sync-layer failure, such as a snapshot that could not be taken
    #[error(transparent)]
    Sync(#[from] SyncError),
}
