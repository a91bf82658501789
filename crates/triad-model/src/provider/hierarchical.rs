//! Hierarchical provider: one node per path segment

use std::sync::Arc;

use tracing::{debug, trace};
use triad_core::domain::{Depth, ResourceId, SyncInfo};
use triad_core::ports::MarkerSource;
use triad_sync::SyncSetDelta;

use super::{ModelChanges, ModelProvider};
use crate::node::{Marker, ModelNode, NodeId, NodeKey, NodeTree};

/// Mirrors the folder hierarchy of the out-of-sync resources
pub struct HierarchicalProvider {
    tree: NodeTree,
    markers: Arc<dyn MarkerSource>,
}

impl HierarchicalProvider {
    pub fn new(markers: Arc<dyn MarkerSource>) -> Self {
        Self {
            tree: NodeTree::new(None),
            markers,
        }
    }

    /// A provider whose nodes are tagged with `group`
    pub fn with_group(group: impl Into<String>, markers: Arc<dyn MarkerSource>) -> Self {
        Self {
            tree: NodeTree::new(Some(group.into())),
            markers,
        }
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    fn touch(&self, id: NodeId, changes: &mut ModelChanges) {
        if let Some(key) = self.tree.key(id) {
            changes.touch(key);
        }
    }

    fn owns(&self, key: &NodeKey) -> bool {
        key.group.as_deref() == self.tree.group()
    }

    // ------------------------------------------------------------------
    // Incremental updates
    // ------------------------------------------------------------------

    /// Records an info, creating the path to it when needed
    ///
    /// In-sync infos demote or prune the node instead.
    pub(crate) fn upsert(&mut self, info: &SyncInfo, changes: &mut ModelChanges) {
        let resource = info.resource();
        if info.kind().is_in_sync() {
            self.remove(resource, changes);
            return;
        }

        let attach_point = self.tree.closest(resource);
        let (id, created) = self.tree.ensure_path(resource);
        let info_changed = self.tree.set_info(id, Some(info.clone()));

        for node in &created {
            let marker = self.compute_marker(*node);
            self.tree.set_marker(*node, marker);
        }
        if !created.is_empty() {
            // The attach point may just have stopped being a leaf.
            self.update_markers_from(attach_point, changes);
        }

        let flipped = self.tree.propagate_conflict(id);
        for node in &created {
            if let Some(view) = self.tree.view(*node) {
                changes.node_added(view);
            }
        }
        if info_changed && created.is_empty() {
            self.touch(id, changes);
        }
        for node in flipped {
            if !created.contains(&node) {
                self.touch(node, changes);
            }
        }
        trace!(resource = %resource, created = created.len(), "Node updated");
    }

    /// Drops the info of one resource
    ///
    /// A node that still leads to out-of-sync descendants is demoted to a
    /// plain ancestor; otherwise it is pruned together with every ancestor
    /// left without purpose.
    pub(crate) fn remove(&mut self, resource: &ResourceId, changes: &mut ModelChanges) {
        let Some(id) = self.tree.lookup(resource) else {
            return;
        };
        if !self.tree.set_info(id, None) {
            return;
        }

        if self.tree.should_exist(id) {
            debug!(resource = %resource, "Demoting node to plain ancestor");
            self.touch(id, changes);
            for node in self.tree.propagate_conflict(id) {
                self.touch(node, changes);
            }
            return;
        }
        self.prune_from(id, changes);
    }

    /// Removes a resource together with everything below it
    pub(crate) fn remove_subtree(&mut self, resource: &ResourceId, changes: &mut ModelChanges) {
        let Some(id) = self.tree.lookup(resource) else {
            return;
        };
        if id == self.tree.root() {
            self.tree.set_info(id, None);
            for child in self.tree.children(id) {
                if let Some(key) = self.tree.key(child) {
                    self.tree.detach(child);
                    changes.node_removed(key);
                }
            }
            self.settle(id, changes);
            return;
        }

        let Some(parent) = self.tree.parent(id) else {
            return;
        };
        if let Some(key) = self.tree.key(id) {
            let removed = self.tree.detach(id);
            debug!(resource = %resource, nodes = removed.len(), "Detached subtree");
            changes.node_removed(key);
        }
        self.prune_from(parent, changes);
    }

    fn prune_from(&mut self, id: NodeId, changes: &mut ModelChanges) {
        let (pruned, kept) = self.tree.prune(id);
        for resource in pruned {
            changes.node_removed(NodeKey::new(self.tree.group(), resource));
        }
        self.settle(kept, changes);
    }

    /// Refreshes the properties of a node that lost descendants
    fn settle(&mut self, id: NodeId, changes: &mut ModelChanges) {
        self.touch(id, changes);
        for node in self.tree.propagate_conflict(id) {
            self.touch(node, changes);
        }
        self.update_markers_from(id, changes);
    }

    // ------------------------------------------------------------------
    // Markers
    // ------------------------------------------------------------------

    fn compute_marker(&self, id: NodeId) -> Marker {
        let Some(resource) = self.tree.resource(id) else {
            return Marker::None;
        };
        let depth = if self.tree.has_children(id) {
            Depth::Infinite
        } else {
            Depth::Zero
        };
        self.markers
            .find_problems(resource, depth)
            .iter()
            .map(|problem| Marker::from(problem.severity))
            .max()
            .unwrap_or_default()
    }

    /// Recomputes markers from `id` upwards until one does not change
    fn update_markers_from(&mut self, id: NodeId, changes: &mut ModelChanges) {
        let mut current = Some(id);
        while let Some(node) = current {
            let marker = self.compute_marker(node);
            if !self.tree.set_marker(node, marker) {
                break;
            }
            self.touch(node, changes);
            current = self.tree.parent(node);
        }
    }
}

impl ModelProvider for HierarchicalProvider {
    fn roots(&self) -> Vec<ModelNode> {
        self.tree.view(self.tree.root()).into_iter().collect()
    }

    fn build_children(&self, parent: &NodeKey) -> Vec<ModelNode> {
        if !self.owns(parent) {
            return Vec::new();
        }
        let Some(id) = self.tree.lookup(&parent.resource) else {
            return Vec::new();
        };
        self.tree
            .children(id)
            .into_iter()
            .filter_map(|child| self.tree.view(child))
            .collect()
    }

    fn node(&self, key: &NodeKey) -> Option<ModelNode> {
        if !self.owns(key) {
            return None;
        }
        self.tree.lookup(&key.resource).and_then(|id| self.tree.view(id))
    }

    fn closest_existing_parents(&self, resource: &ResourceId) -> Vec<NodeKey> {
        self.tree
            .key(self.tree.closest(resource))
            .into_iter()
            .collect()
    }

    fn reset(&mut self, infos: &[SyncInfo], changes: &mut ModelChanges) {
        for child in self.tree.children(self.tree.root()) {
            if let Some(key) = self.tree.key(child) {
                changes.node_removed(key);
            }
        }
        self.tree = NodeTree::new(self.tree.group().map(str::to_string));

        for info in infos {
            self.upsert(info, changes);
        }
        let root = self.tree.root();
        self.update_markers_from(root, changes);
        debug!(
            group = ?self.tree.group(),
            infos = infos.len(),
            nodes = self.tree.len(),
            "Model rebuilt"
        );
    }

    fn handle_delta(&mut self, delta: &SyncSetDelta, changes: &mut ModelChanges) {
        for resource in &delta.removed {
            if delta.removed_subtree_roots.contains(resource) {
                self.remove_subtree(resource, changes);
            } else if !delta.is_in_removed_subtree(resource) {
                self.remove(resource, changes);
            }
        }
        for info in delta.added.iter().chain(delta.changed.iter()) {
            self.upsert(info, changes);
        }
        debug!(
            group = ?self.tree.group(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            touched = changes.touched.len(),
            "Delta applied"
        );
    }

    fn set_busy(
        &mut self,
        resource: &ResourceId,
        busy: bool,
        changes: &mut ModelChanges,
    ) -> bool {
        let Some(id) = self.tree.lookup(resource) else {
            return false;
        };
        let changed = self.tree.set_busy(id, busy);
        if changed {
            self.touch(id, changes);
        }
        changed
    }

    fn has_busy(&self) -> bool {
        self.tree.busy_count() > 0
    }

    fn refresh_markers(&mut self, resources: &[ResourceId], changes: &mut ModelChanges) {
        for resource in resources {
            let id = self.tree.closest(resource);
            self.update_markers_from(id, changes);
        }
    }

    fn node_count(&self) -> usize {
        self.tree.len()
    }

    fn check_consistency(&self) -> Result<(), String> {
        self.tree.check_consistency()
    }
}
