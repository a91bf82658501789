//! Model providers
//!
//! A provider mirrors a [`SyncInfoSet`](triad_sync::SyncInfoSet) as a tree
//! of display nodes: one node per out-of-sync resource plus the ancestors
//! needed to reach it. Providers are fed deltas and resets by the
//! background event handler, which owns them exclusively.
//!
//! - [`HierarchicalProvider`] mirrors the folder hierarchy
//! - [`CompositeProvider`] routes resources to per-group hierarchical
//!   sub-providers

mod composite;
mod hierarchical;

pub use composite::{by_direction, CompositeProvider, Partition};
pub use hierarchical::HierarchicalProvider;

use std::collections::BTreeSet;

use triad_core::domain::{ResourceId, SyncInfo};
use triad_sync::SyncSetDelta;

use crate::node::{ModelNode, NodeKey};

// ============================================================================
// ModelChanges
// ============================================================================

/// Structural and label changes produced while applying one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelChanges {
    /// New nodes, parents before children
    pub added: Vec<ModelNode>,
    /// Detached subtree roots
    pub removed: Vec<NodeKey>,
    /// Nodes whose label may have changed
    pub touched: BTreeSet<NodeKey>,
}

impl ModelChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.touched.is_empty()
    }

    pub(crate) fn node_added(&mut self, node: ModelNode) {
        self.added.push(node);
    }

    /// Records a detached subtree
    ///
    /// Nodes added earlier in the same batch below `key` are forgotten; a
    /// subtree that was itself added in this batch is not reported at all.
    /// Earlier removals below `key` fold into it.
    pub(crate) fn node_removed(&mut self, key: NodeKey) {
        let was_added = self.added.iter().any(|node| node.key() == &key);
        self.added.retain(|node| !key.covers(node.key()));
        self.touched.retain(|touched| !key.covers(touched));
        if !was_added {
            self.removed.retain(|removed| !key.covers(removed));
            self.removed.push(key);
        }
    }

    pub(crate) fn touch(&mut self, key: NodeKey) {
        self.touched.insert(key);
    }
}

// ============================================================================
// ModelProvider trait
// ============================================================================

/// Common contract of hierarchical and composite providers
pub trait ModelProvider: Send + 'static {
    /// Top-level nodes: the synthetic root, or one root per group
    fn roots(&self) -> Vec<ModelNode>;

    /// Children of a node in resource order; empty for unknown nodes
    fn build_children(&self, parent: &NodeKey) -> Vec<ModelNode>;

    fn node(&self, key: &NodeKey) -> Option<ModelNode>;

    /// The node of `resource` or of its closest ancestor, per tree
    fn closest_existing_parents(&self, resource: &ResourceId) -> Vec<NodeKey>;

    /// Discards the tree and rebuilds it from a full snapshot
    fn reset(&mut self, infos: &[SyncInfo], changes: &mut ModelChanges);

    /// Applies one consolidated set delta
    fn handle_delta(&mut self, delta: &SyncSetDelta, changes: &mut ModelChanges);

    /// Flags the node of `resource` as busy; returns whether any flag changed
    fn set_busy(&mut self, resource: &ResourceId, busy: bool, changes: &mut ModelChanges)
        -> bool;

    fn has_busy(&self) -> bool;

    /// Recomputes problem markers for the nodes closest to `resources`
    fn refresh_markers(&mut self, resources: &[ResourceId], changes: &mut ModelChanges);

    /// Number of nodes, roots included
    fn node_count(&self) -> usize;

    /// Verifies the tree and index invariants
    ///
    /// # Errors
    /// Returns a description of the first inconsistency found
    fn check_consistency(&self) -> Result<(), String>;
}
