//! Triad Core - Domain types and three-way sync-state resolution
//!
//! This crate contains the pieces of the engine that do not depend on a
//! runtime or on any particular collaborator:
//! - **Domain** - `ResourceId`, `RevisionDescriptor`, `SyncKind`, `SyncInfo`
//! - **Resolver** - the pure local/base/remote → kind function and the
//!   pluggable comparison criteria
//! - **Ports** - traits for the VCS, local working copy, persistence and marker
//!   collaborators
//! - **Logging** - tracing subscriber initialisation
//! - **Workspace** - the bundle of configuration and port implementations
//! - **Config** - YAML configuration with defaults, validation and a builder
//!
//! # Architecture
//!
//! Like the rest of the workspace this crate follows a ports & adapters
//! layout. Adapters (in-memory stores, filesystem watchers, UI bridges) live
//! in other crates or in the embedding application.

pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;
pub mod resolver;
pub mod tree;
pub mod workspace;

pub use workspace::Workspace;
