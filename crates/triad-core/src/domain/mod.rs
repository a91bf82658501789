//! Domain entities
//!
//! This module contains the core domain types for Triad:
//! - Resource identities, depths and tags
//! - Revision descriptors and local working-copy state
//! - Sync kinds and the per-resource sync information record
//! - Domain-specific error types

pub mod errors;
pub mod resource;
pub mod revision;
pub mod sync_info;

// Re-export commonly used types
pub use errors::DomainError;
pub use resource::{Depth, ResourceId, SubscriberId, Tag};
pub use revision::{LocalState, RevisionDescriptor};
pub use sync_info::{ChangeKind, Direction, SyncInfo, SyncKind};
