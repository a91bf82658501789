//! Marker port
//!
//! Problem markers (compiler errors, lint warnings, ...) attached to
//! resources by the host. The model propagates the worst severity found
//! under a node up to its ancestors.

use serde::{Deserialize, Serialize};

use crate::domain::{Depth, ResourceId};

/// Severity of a problem marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational, never propagated
    Info,
    /// A warning
    Warning,
    /// An error
    Error,
}

/// A single problem reported by the marker capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Resource the problem is attached to
    pub resource: ResourceId,
    /// How severe the problem is
    pub severity: Severity,
}

/// Port trait for querying problem markers
pub trait MarkerSource: Send + Sync {
    /// Returns the problems attached to `resource` (and members, per `depth`)
    fn find_problems(&self, resource: &ResourceId, depth: Depth) -> Vec<Problem>;
}

/// A marker source that never reports anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMarkers;

impl MarkerSource for NoMarkers {
    fn find_problems(&self, _resource: &ResourceId, _depth: Depth) -> Vec<Problem> {
        Vec::new()
    }
}
