//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces the engine depends on, but whose implementations
//! live in adapter crates or in the embedding application.
//!
//! ## Ports Overview
//!
//! - [`VcsProvider`] / [`RevisionSource`] - repository descriptors and content
//! - [`LocalWorkspace`] - the user's working copy
//! - [`ByteStore`] - per-resource byte properties for descriptor caches
//! - [`MarkerSource`] - problem markers for error/warning propagation

pub mod local;
pub mod markers;
pub mod persistence;
pub mod vcs;

pub use local::LocalWorkspace;
pub use markers::{MarkerSource, NoMarkers, Problem, Severity};
pub use persistence::ByteStore;
pub use vcs::{RevisionSource, TagSource, VcsProvider};
