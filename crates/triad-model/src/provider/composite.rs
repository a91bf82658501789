//! Composite provider: per-group hierarchical sub-providers

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;
use triad_core::domain::{Direction, ResourceId, SyncInfo};
use triad_core::ports::MarkerSource;
use triad_sync::SyncSetDelta;

use super::hierarchical::HierarchicalProvider;
use super::{ModelChanges, ModelProvider};
use crate::node::{ModelNode, NodeKey};

/// Maps an out-of-sync info to the name of its group
pub type Partition = Box<dyn Fn(&SyncInfo) -> String + Send>;

/// Groups resources by sync direction
pub fn by_direction() -> Partition {
    Box::new(|info: &SyncInfo| {
        match info.kind().direction() {
            Direction::InSync => "in-sync",
            Direction::Outgoing => "outgoing",
            Direction::Incoming => "incoming",
            Direction::Conflicting => "conflicting",
        }
        .to_string()
    })
}

/// Routes every info to one hierarchical sub-provider per group
///
/// Groups are created on first use and dropped once empty. The fan-out
/// index records the group holding each out-of-sync resource and is
/// updated in the same step as the sub-provider's nodes.
pub struct CompositeProvider {
    partition: Partition,
    markers: Arc<dyn MarkerSource>,
    groups: BTreeMap<String, HierarchicalProvider>,
    fan_out: HashMap<ResourceId, String>,
}

impl CompositeProvider {
    pub fn new(partition: Partition, markers: Arc<dyn MarkerSource>) -> Self {
        Self {
            partition,
            markers,
            groups: BTreeMap::new(),
            fan_out: HashMap::new(),
        }
    }

    /// Names of the live groups, sorted
    pub fn groups(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    /// The group currently holding `resource`
    pub fn group_of(&self, resource: &ResourceId) -> Option<&str> {
        self.fan_out.get(resource).map(String::as_str)
    }

    fn group_mut(&mut self, group: &str, changes: &mut ModelChanges) -> &mut HierarchicalProvider {
        let markers = &self.markers;
        self.groups.entry(group.to_string()).or_insert_with(|| {
            let provider = HierarchicalProvider::with_group(group, markers.clone());
            for root in provider.roots() {
                changes.node_added(root);
            }
            debug!(group, "Group created");
            provider
        })
    }

    fn route(&mut self, info: &SyncInfo, changes: &mut ModelChanges) {
        let resource = info.resource();
        if info.kind().is_in_sync() {
            self.route_removal(resource, changes);
            return;
        }

        let group = (self.partition)(info);
        if let Some(previous) = self.fan_out.get(resource).cloned() {
            if previous != group {
                debug!(resource = %resource, from = %previous, to = %group, "Moving between groups");
                if let Some(provider) = self.groups.get_mut(&previous) {
                    provider.remove(resource, changes);
                }
            }
        }
        self.group_mut(&group, changes).upsert(info, changes);
        self.fan_out.insert(resource.clone(), group);
    }

    fn route_removal(&mut self, resource: &ResourceId, changes: &mut ModelChanges) {
        if let Some(group) = self.fan_out.remove(resource) {
            if let Some(provider) = self.groups.get_mut(&group) {
                provider.remove(resource, changes);
            }
        }
    }

    fn remove_subtree(&mut self, root: &ResourceId, changes: &mut ModelChanges) {
        for provider in self.groups.values_mut() {
            provider.remove_subtree(root, changes);
        }
        self.fan_out
            .retain(|resource, _| resource != root && !root.is_ancestor_of(resource));
    }

    fn drop_empty_groups(&mut self, changes: &mut ModelChanges) {
        self.groups.retain(|name, provider| {
            if !provider.tree().is_empty() {
                return true;
            }
            debug!(group = %name, "Group emptied");
            changes.node_removed(NodeKey::new(Some(name), ResourceId::root()));
            false
        });
    }
}

impl ModelProvider for CompositeProvider {
    fn roots(&self) -> Vec<ModelNode> {
        self.groups.values().flat_map(|p| p.roots()).collect()
    }

    fn build_children(&self, parent: &NodeKey) -> Vec<ModelNode> {
        parent
            .group
            .as_ref()
            .and_then(|group| self.groups.get(group))
            .map(|provider| provider.build_children(parent))
            .unwrap_or_default()
    }

    fn node(&self, key: &NodeKey) -> Option<ModelNode> {
        let group = key.group.as_ref()?;
        self.groups.get(group)?.node(key)
    }

    fn closest_existing_parents(&self, resource: &ResourceId) -> Vec<NodeKey> {
        self.groups
            .values()
            .flat_map(|provider| provider.closest_existing_parents(resource))
            .collect()
    }

    fn reset(&mut self, infos: &[SyncInfo], changes: &mut ModelChanges) {
        for name in self.groups.keys() {
            changes.node_removed(NodeKey::new(Some(name), ResourceId::root()));
        }
        self.groups.clear();
        self.fan_out.clear();

        for info in infos {
            self.route(info, changes);
        }
        self.drop_empty_groups(changes);
        debug!(groups = self.groups.len(), infos = infos.len(), "Composite model rebuilt");
    }

    fn handle_delta(&mut self, delta: &SyncSetDelta, changes: &mut ModelChanges) {
        for resource in &delta.removed {
            if delta.removed_subtree_roots.contains(resource) {
                self.remove_subtree(resource, changes);
            } else if !delta.is_in_removed_subtree(resource) {
                self.route_removal(resource, changes);
            }
        }
        for info in delta.added.iter().chain(delta.changed.iter()) {
            self.route(info, changes);
        }
        self.drop_empty_groups(changes);
    }

    fn set_busy(
        &mut self,
        resource: &ResourceId,
        busy: bool,
        changes: &mut ModelChanges,
    ) -> bool {
        let mut changed = false;
        for provider in self.groups.values_mut() {
            changed |= provider.set_busy(resource, busy, changes);
        }
        changed
    }

    fn has_busy(&self) -> bool {
        self.groups.values().any(HierarchicalProvider::has_busy)
    }

    fn refresh_markers(&mut self, resources: &[ResourceId], changes: &mut ModelChanges) {
        for provider in self.groups.values_mut() {
            provider.refresh_markers(resources, changes);
        }
    }

    fn node_count(&self) -> usize {
        self.groups.values().map(HierarchicalProvider::node_count).sum()
    }

    fn check_consistency(&self) -> Result<(), String> {
        let mut members = 0;
        for (name, provider) in &self.groups {
            provider
                .check_consistency()
                .map_err(|e| format!("group {name}: {e}"))?;
            if provider.tree().is_empty() {
                return Err(format!("group {name} is empty but still listed"));
            }
            for resource in provider.tree().members() {
                if self.fan_out.get(&resource) != Some(name) {
                    return Err(format!("{resource} lives in {name} but fan-out disagrees"));
                }
                members += 1;
            }
        }
        if members != self.fan_out.len() {
            return Err(format!(
                "fan-out lists {} resources but groups hold {members}",
                self.fan_out.len()
            ));
        }
        Ok(())
    }
}
