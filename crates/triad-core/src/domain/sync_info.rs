//! Sync kinds and the per-resource sync information record

use std::fmt;

use serde::{Deserialize, Serialize};

use super::resource::ResourceId;
use super::revision::{LocalState, RevisionDescriptor};

// ============================================================================
// Direction and ChangeKind
// ============================================================================

/// Which side(s) of the three-way comparison moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local, base and remote agree
    #[default]
    InSync,
    /// Only the local side changed
    Outgoing,
    /// Only the remote side changed
    Incoming,
    /// Both sides changed
    Conflicting,
}

/// What kind of content change was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The resource appeared
    Addition,
    /// The resource disappeared
    Deletion,
    /// The resource content changed
    Change,
    /// Conflicting change whose regions overlap; needs a manual merge
    ManualMerge,
}

// ============================================================================
// SyncKind
// ============================================================================

/// Result of a three-way comparison: a direction plus an optional change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SyncKind {
    direction: Direction,
    change: Option<ChangeKind>,
}

impl SyncKind {
    /// The in-sync kind
    pub const IN_SYNC: SyncKind = SyncKind {
        direction: Direction::InSync,
        change: None,
    };

    /// Builds an out-of-sync kind
    pub const fn new(direction: Direction, change: ChangeKind) -> Self {
        Self {
            direction,
            change: Some(change),
        }
    }

    /// Shorthand for an outgoing kind
    pub const fn outgoing(change: ChangeKind) -> Self {
        Self::new(Direction::Outgoing, change)
    }

    /// Shorthand for an incoming kind
    pub const fn incoming(change: ChangeKind) -> Self {
        Self::new(Direction::Incoming, change)
    }

    /// Shorthand for a conflicting kind
    pub const fn conflicting(change: ChangeKind) -> Self {
        Self::new(Direction::Conflicting, change)
    }

    /// Returns the direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the change sub-state, `None` when in sync
    pub fn change(&self) -> Option<ChangeKind> {
        self.change
    }

    /// Returns true when local, base and remote agree
    pub fn is_in_sync(&self) -> bool {
        self.direction == Direction::InSync
    }

    /// Returns true for conflicting kinds
    pub fn is_conflicting(&self) -> bool {
        self.direction == Direction::Conflicting
    }

    /// Returns the same direction with a different change sub-state
    pub fn with_change(self, change: ChangeKind) -> Self {
        if self.is_in_sync() {
            return self;
        }
        Self {
            direction: self.direction,
            change: Some(change),
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::InSync => return write!(f, "in-sync"),
            Direction::Outgoing => "outgoing",
            Direction::Incoming => "incoming",
            Direction::Conflicting => "conflicting",
        };
        let change = match self.change {
            Some(ChangeKind::Addition) => "addition",
            Some(ChangeKind::Deletion) => "deletion",
            Some(ChangeKind::Change) => "change",
            Some(ChangeKind::ManualMerge) => "manual-merge",
            None => return write!(f, "{direction}"),
        };
        write!(f, "{direction}/{change}")
    }
}

// ============================================================================
// SyncInfo
// ============================================================================

/// The resolved three-way state of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInfo {
    resource: ResourceId,
    local: Option<LocalState>,
    base: Option<RevisionDescriptor>,
    remote: Option<RevisionDescriptor>,
    kind: SyncKind,
}

impl SyncInfo {
    /// Creates a new SyncInfo from already-resolved parts
    pub fn new(
        resource: ResourceId,
        local: Option<LocalState>,
        base: Option<RevisionDescriptor>,
        remote: Option<RevisionDescriptor>,
        kind: SyncKind,
    ) -> Self {
        Self {
            resource,
            local,
            base,
            remote,
            kind,
        }
    }

    /// Returns the resource identity
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Returns the local state, `None` when the local resource is absent
    pub fn local(&self) -> Option<&LocalState> {
        self.local.as_ref()
    }

    /// Returns the base descriptor
    pub fn base(&self) -> Option<&RevisionDescriptor> {
        self.base.as_ref()
    }

    /// Returns the remote descriptor
    pub fn remote(&self) -> Option<&RevisionDescriptor> {
        self.remote.as_ref()
    }

    /// Returns the resolved kind
    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    /// Returns true when the resource is a folder on any side
    pub fn is_folder(&self) -> bool {
        self.local.as_ref().map(|l| l.is_folder).unwrap_or(false)
            || self.remote.as_ref().map(|r| r.is_folder()).unwrap_or(false)
            || self.base.as_ref().map(|b| b.is_folder()).unwrap_or(false)
    }

    /// Replaces the kind, used when a lazy refinement changes the verdict
    pub fn with_kind(mut self, kind: SyncKind) -> Self {
        self.kind = kind;
        self
    }
}
