//! Display tree nodes
//!
//! [`NodeTree`] is an arena. Parents own their children through an ordered
//! map of child ids, children refer to their parent by id, and a
//! resource → id index gives constant-time lookup. Every structural change
//! goes through the tree so that the index and the links never disagree.
//!
//! A node exists iff it is the root, its resource is out of sync, or it is
//! an ancestor of an out-of-sync resource.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use triad_core::domain::{Depth, ResourceId, SyncInfo, SyncKind};
use triad_core::ports::Severity;
use triad_core::tree::{walk, Walk};

// ============================================================================
// Marker
// ============================================================================

/// Worst problem severity found at or below a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Marker {
    #[default]
    None,
    Warning,
    Error,
}

impl From<Severity> for Marker {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Info => Marker::None,
            Severity::Warning => Marker::Warning,
            Severity::Error => Marker::Error,
        }
    }
}

// ============================================================================
// NodeKey
// ============================================================================

/// Identity of a node across providers
///
/// Hierarchical providers leave `group` empty; the sub-providers of a
/// composite provider tag every node with their group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    pub group: Option<String>,
    pub resource: ResourceId,
}

impl NodeKey {
    pub fn new(group: Option<&str>, resource: ResourceId) -> Self {
        Self {
            group: group.map(str::to_string),
            resource,
        }
    }

    /// True when `other` is this node or lies below it in the same group
    pub fn covers(&self, other: &NodeKey) -> bool {
        self.group == other.group
            && (self.resource == other.resource || self.resource.is_ancestor_of(&other.resource))
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{group}:{}", self.resource),
            None => write!(f, "{}", self.resource),
        }
    }
}

// ============================================================================
// ModelNode
// ============================================================================

/// Read-only snapshot of a display node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNode {
    key: NodeKey,
    info: Option<SyncInfo>,
    conflict: bool,
    marker: Marker,
    busy: bool,
    children: usize,
}

impl ModelNode {
    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    pub fn resource(&self) -> &ResourceId {
        &self.key.resource
    }

    pub fn group(&self) -> Option<&str> {
        self.key.group.as_deref()
    }

    /// The recorded info; `None` for plain ancestors
    pub fn info(&self) -> Option<&SyncInfo> {
        self.info.as_ref()
    }

    /// Cached sync kind; in sync for plain ancestors
    pub fn kind(&self) -> SyncKind {
        self.info.as_ref().map_or(SyncKind::IN_SYNC, SyncInfo::kind)
    }

    pub fn is_out_of_sync(&self) -> bool {
        !self.kind().is_in_sync()
    }

    /// True when this node or any descendant is conflicting
    pub fn has_conflict(&self) -> bool {
        self.conflict
    }

    pub fn marker(&self) -> Marker {
        self.marker
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn child_count(&self) -> usize {
        self.children
    }
}

// ============================================================================
// NodeTree
// ============================================================================

/// Index of a node in its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

const ROOT: NodeId = NodeId(0);

#[derive(Debug)]
struct Slot {
    resource: ResourceId,
    parent: Option<NodeId>,
    children: BTreeMap<ResourceId, NodeId>,
    info: Option<SyncInfo>,
    conflict: bool,
    marker: Marker,
    busy: bool,
}

impl Slot {
    fn new(resource: ResourceId, parent: Option<NodeId>) -> Self {
        Self {
            resource,
            parent,
            children: BTreeMap::new(),
            info: None,
            conflict: false,
            marker: Marker::None,
            busy: false,
        }
    }

    fn is_out_of_sync(&self) -> bool {
        self.info.as_ref().is_some_and(|info| !info.kind().is_in_sync())
    }

    fn is_conflicting(&self) -> bool {
        self.info.as_ref().is_some_and(|info| info.kind().is_conflicting())
    }
}

/// Arena-backed display tree with a synthetic root
#[derive(Debug)]
pub struct NodeTree {
    group: Option<String>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<ResourceId, NodeId>,
    busy: usize,
}

impl NodeTree {
    pub fn new(group: Option<String>) -> Self {
        let root = ResourceId::root();
        let mut index = HashMap::new();
        index.insert(root.clone(), ROOT);
        Self {
            group,
            slots: vec![Some(Slot::new(root, None))],
            free: Vec::new(),
            index,
            busy: 0,
        }
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when only the root is left
    pub fn is_empty(&self) -> bool {
        self.index.len() == 1
    }

    pub fn busy_count(&self) -> usize {
        self.busy
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn lookup(&self, resource: &ResourceId) -> Option<NodeId> {
        self.index.get(resource).copied()
    }

    pub fn resource(&self, id: NodeId) -> Option<&ResourceId> {
        self.slot(id).map(|slot| &slot.resource)
    }

    pub fn key(&self, id: NodeId) -> Option<NodeKey> {
        self.slot(id).map(|slot| NodeKey {
            group: self.group.clone(),
            resource: slot.resource.clone(),
        })
    }

    pub fn view(&self, id: NodeId) -> Option<ModelNode> {
        let slot = self.slot(id)?;
        Some(ModelNode {
            key: NodeKey {
                group: self.group.clone(),
                resource: slot.resource.clone(),
            },
            info: slot.info.clone(),
            conflict: slot.conflict,
            marker: slot.marker,
            busy: slot.busy,
            children: slot.children.len(),
        })
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id)?.parent
    }

    /// Children of a node in resource order
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.slot(id)
            .map(|slot| slot.children.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.slot(id).is_some_and(|slot| !slot.children.is_empty())
    }

    /// Every resource with a node, in tree order
    pub fn resources(&self) -> Vec<ResourceId> {
        let mut resources: Vec<ResourceId> = self.index.keys().cloned().collect();
        resources.sort();
        resources
    }

    /// Resources whose node carries an out-of-sync info, in tree order
    pub fn members(&self) -> Vec<ResourceId> {
        let mut members: Vec<ResourceId> = self
            .slots
            .iter()
            .flatten()
            .filter(|slot| slot.is_out_of_sync())
            .map(|slot| slot.resource.clone())
            .collect();
        members.sort();
        members
    }

    /// The node of `resource`, or of its closest ancestor that has one
    pub fn closest(&self, resource: &ResourceId) -> NodeId {
        self.lookup(resource)
            .or_else(|| resource.ancestors().find_map(|a| self.lookup(&a)))
            .unwrap_or(ROOT)
    }

    /// Whether a node still meets the existence rule
    pub fn should_exist(&self, id: NodeId) -> bool {
        id == ROOT
            || self
                .slot(id)
                .is_some_and(|slot| slot.is_out_of_sync() || !slot.children.is_empty())
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    fn attach(&mut self, parent: NodeId, resource: ResourceId) -> NodeId {
        let slot = Slot::new(resource.clone(), Some(parent));
        let id = match self.free.pop() {
            Some(free) => {
                self.slots[free] = Some(slot);
                NodeId(free)
            }
            None => {
                self.slots.push(Some(slot));
                NodeId(self.slots.len() - 1)
            }
        };
        if let Some(parent) = self.slot_mut(parent) {
            parent.children.insert(resource.clone(), id);
        }
        self.index.insert(resource, id);
        id
    }

    /// Creates the missing nodes on the path to `resource`
    ///
    /// Returns the node of `resource` and the ids created, top-down.
    pub fn ensure_path(&mut self, resource: &ResourceId) -> (NodeId, Vec<NodeId>) {
        if let Some(id) = self.lookup(resource) {
            return (id, Vec::new());
        }

        let mut missing = vec![resource.clone()];
        let mut parent = ROOT;
        for ancestor in resource.ancestors() {
            if let Some(id) = self.lookup(&ancestor) {
                parent = id;
                break;
            }
            missing.push(ancestor);
        }

        let mut created = Vec::with_capacity(missing.len());
        for resource in missing.into_iter().rev() {
            parent = self.attach(parent, resource);
            created.push(parent);
        }
        (parent, created)
    }

    /// Removes a node and its whole subtree
    ///
    /// Returns the removed resources in pre-order. The root cannot be
    /// detached.
    pub fn detach(&mut self, id: NodeId) -> Vec<ResourceId> {
        if id == ROOT {
            return Vec::new();
        }
        let Some((resource, parent)) = self.slot(id).map(|s| (s.resource.clone(), s.parent)) else {
            return Vec::new();
        };

        let mut doomed = Vec::new();
        walk(
            id,
            Depth::Infinite,
            |node| self.children(*node),
            |node, _| {
                doomed.push(*node);
                Walk::Continue
            },
        );

        if let Some(parent) = parent.and_then(|p| self.slot_mut(p)) {
            parent.children.remove(&resource);
        }

        let mut removed = Vec::with_capacity(doomed.len());
        for node in doomed {
            if let Some(slot) = self.slots.get_mut(node.0).and_then(Option::take) {
                if slot.busy {
                    self.busy = self.busy.saturating_sub(1);
                }
                self.index.remove(&slot.resource);
                self.free.push(node.0);
                removed.push(slot.resource);
            }
        }
        removed
    }

    /// Detaches `id`, then each ancestor, while they fail the existence rule
    ///
    /// Returns the pruned resources bottom-up and the first node kept.
    pub fn prune(&mut self, mut id: NodeId) -> (Vec<ResourceId>, NodeId) {
        let mut pruned = Vec::new();
        while !self.should_exist(id) {
            let Some(parent) = self.parent(id) else {
                break;
            };
            pruned.extend(self.detach(id));
            id = parent;
        }
        (pruned, id)
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Replaces the cached info; returns whether it changed
    pub fn set_info(&mut self, id: NodeId, info: Option<SyncInfo>) -> bool {
        match self.slot_mut(id) {
            Some(slot) if slot.info != info => {
                slot.info = info;
                true
            }
            _ => false,
        }
    }

    pub fn set_marker(&mut self, id: NodeId, marker: Marker) -> bool {
        match self.slot_mut(id) {
            Some(slot) if slot.marker != marker => {
                slot.marker = marker;
                true
            }
            _ => false,
        }
    }

    pub fn set_busy(&mut self, id: NodeId, busy: bool) -> bool {
        let changed = match self.slot_mut(id) {
            Some(slot) if slot.busy != busy => {
                slot.busy = busy;
                true
            }
            _ => false,
        };
        if changed {
            if busy {
                self.busy += 1;
            } else {
                self.busy = self.busy.saturating_sub(1);
            }
        }
        changed
    }

    fn compute_conflict(&self, id: NodeId) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        slot.is_conflicting()
            || slot
                .children
                .values()
                .any(|child| self.slot(*child).is_some_and(|c| c.conflict))
    }

    /// Recomputes the propagated conflict flag from `from` upwards
    ///
    /// Stops at the first node whose flag does not flip and returns the
    /// nodes that flipped.
    pub fn propagate_conflict(&mut self, from: NodeId) -> Vec<NodeId> {
        let mut flipped = Vec::new();
        let mut current = Some(from);
        while let Some(id) = current {
            let value = self.compute_conflict(id);
            let Some(slot) = self.slot_mut(id) else {
                break;
            };
            if slot.conflict == value {
                break;
            }
            slot.conflict = value;
            flipped.push(id);
            current = slot.parent;
        }
        flipped
    }

    /// Checks index, links, existence rule and conflict flags
    ///
    /// # Errors
    /// Returns a description of the first inconsistency found
    pub fn check_consistency(&self) -> Result<(), String> {
        let live = self.slots.iter().flatten().count();
        if live != self.index.len() {
            return Err(format!("{live} live nodes but {} indexed", self.index.len()));
        }

        for (resource, id) in &self.index {
            let slot = self
                .slot(*id)
                .ok_or_else(|| format!("{resource} is indexed to a free slot"))?;
            if &slot.resource != resource {
                return Err(format!("{resource} is indexed to {}", slot.resource));
            }

            for (name, child) in &slot.children {
                let child_slot = self
                    .slot(*child)
                    .ok_or_else(|| format!("{resource} lists a freed child {name}"))?;
                if child_slot.parent != Some(*id) || &child_slot.resource != name {
                    return Err(format!("{name} does not link back to {resource}"));
                }
            }

            let mut current = *id;
            let mut hops = 0;
            while current != ROOT {
                let parent = self
                    .parent(current)
                    .ok_or_else(|| format!("{resource} is not reachable from the root"))?;
                let name = self
                    .resource(current)
                    .ok_or_else(|| format!("{resource} has a freed ancestor"))?;
                let listed = self
                    .slot(parent)
                    .is_some_and(|p| p.children.get(name) == Some(&current));
                if !listed {
                    return Err(format!("{name} is missing from its parent's children"));
                }
                current = parent;
                hops += 1;
                if hops > self.index.len() {
                    return Err(format!("cycle above {resource}"));
                }
            }

            if !self.should_exist(*id) {
                return Err(format!("{resource} should have been pruned"));
            }
            if slot.conflict != self.compute_conflict(*id) {
                return Err(format!("{resource} has a stale conflict flag"));
            }
        }

        let busy = self.slots.iter().flatten().filter(|s| s.busy).count();
        if busy != self.busy {
            return Err(format!("{busy} busy nodes but counter says {}", self.busy));
        }
        Ok(())
    }
}
