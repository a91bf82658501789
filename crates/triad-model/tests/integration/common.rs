//! Shared test doubles for model integration tests
//!
//! - [`FakeVcs`] keeps one descriptor tree per tag
//! - [`FakeLocal`] is a working copy described by explicit local states
//! - [`Recorder`] is a presentation that records every call

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use triad_core::config::{ConfigBuilder, EventsConfig};
use triad_core::domain::{Depth, LocalState, ResourceId, RevisionDescriptor, Tag};
use triad_core::ports::{LocalWorkspace, VcsProvider};
use triad_core::Workspace;
use triad_model::{ModelNode, NodeKey, Presentation};
use triad_sync::{MemoryByteStore, RefreshStatus, Subscriber, WorkspaceSubscriber};

pub fn id(path: &str) -> ResourceId {
    ResourceId::new(path).unwrap()
}

pub fn key(path: &str) -> NodeKey {
    NodeKey::new(None, id(path))
}

pub fn group_key(group: &str, path: &str) -> NodeKey {
    NodeKey::new(Some(group), id(path))
}

/// Short delays so paused-clock tests stay readable
pub fn events_config() -> EventsConfig {
    ConfigBuilder::new()
        .events_early_dispatch_ms(20)
        .events_dispatch_delay_ms(100)
        .build()
        .events
}

// ============================================================================
// FakeVcs
// ============================================================================

#[derive(Default)]
pub struct FakeVcs {
    trees: Mutex<HashMap<Tag, BTreeMap<ResourceId, RevisionDescriptor>>>,
}

impl FakeVcs {
    /// Adds a file at `tag`, creating missing parent folders
    pub fn file(&self, tag: &Tag, path: &str, content_id: &str) {
        let resource = id(path);
        let mut trees = self.trees.lock().unwrap();
        let tree = trees.entry(tag.clone()).or_default();
        for ancestor in resource.ancestors().filter(|a| !a.is_root()) {
            tree.entry(ancestor)
                .or_insert_with(|| RevisionDescriptor::folder(Some(tag.clone())));
        }
        tree.insert(resource, RevisionDescriptor::file(content_id));
    }

    /// Removes a resource and its subtree at `tag`
    pub fn delete(&self, tag: &Tag, path: &str) {
        let resource = id(path);
        if let Some(tree) = self.trees.lock().unwrap().get_mut(tag) {
            tree.retain(|r, _| !Depth::Infinite.contains(&resource, r));
        }
    }
}

#[async_trait::async_trait]
impl VcsProvider for FakeVcs {
    async fn fetch_revision(
        &self,
        resource: &ResourceId,
        tag: &Tag,
    ) -> anyhow::Result<Option<RevisionDescriptor>> {
        if resource.is_root() {
            return Ok(Some(RevisionDescriptor::folder(Some(tag.clone()))));
        }
        Ok(self
            .trees
            .lock()
            .unwrap()
            .get(tag)
            .and_then(|tree| tree.get(resource).cloned()))
    }

    async fn fetch_members(
        &self,
        folder: &ResourceId,
        tag: &Tag,
    ) -> anyhow::Result<Vec<ResourceId>> {
        Ok(self
            .trees
            .lock()
            .unwrap()
            .get(tag)
            .map(|tree| {
                tree.keys()
                    .filter(|r| r.parent().as_ref() == Some(folder))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_content(
        &self,
        resource: &ResourceId,
        _descriptor: &RevisionDescriptor,
    ) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("no content for {resource}")
    }
}

// ============================================================================
// FakeLocal
// ============================================================================

#[derive(Default)]
pub struct FakeLocal {
    states: Mutex<BTreeMap<ResourceId, LocalState>>,
}

impl FakeLocal {
    fn stamp() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    pub fn clean(&self, path: &str) {
        self.states
            .lock()
            .unwrap()
            .insert(id(path), LocalState::clean_file(Self::stamp()));
    }

    pub fn dirty(&self, path: &str) {
        self.states
            .lock()
            .unwrap()
            .insert(id(path), LocalState::dirty_file(Self::stamp()));
    }

    pub fn folder(&self, path: &str) {
        self.states
            .lock()
            .unwrap()
            .insert(id(path), LocalState::folder(Self::stamp()));
    }
}

impl LocalWorkspace for FakeLocal {
    fn local_state(&self, resource: &ResourceId) -> Option<LocalState> {
        if resource.is_root() {
            return Some(LocalState::folder(Self::stamp()));
        }
        self.states.lock().unwrap().get(resource).cloned()
    }

    fn is_ignored(&self, _resource: &ResourceId) -> bool {
        false
    }

    fn members(&self, folder: &ResourceId) -> Vec<ResourceId> {
        self.states
            .lock()
            .unwrap()
            .keys()
            .filter(|r| r.parent().as_ref() == Some(folder))
            .cloned()
            .collect()
    }

    fn read_content(&self, resource: &ResourceId) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("{resource} is not readable")
    }
}

// ============================================================================
// Recorder
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Suspend,
    Resume,
    Added(NodeKey),
    Removed(NodeKey),
    Labels(Vec<ModelNode>),
}

/// Presentation that remembers every notification in order
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn added(&self) -> Vec<NodeKey> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Added(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<NodeKey> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Removed(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn label_batches(&self) -> Vec<Vec<ModelNode>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Labels(nodes) => Some(nodes),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Presentation for Recorder {
    fn suspend_redraw(&self) {
        self.push(Call::Suspend);
    }

    fn resume_redraw(&self) {
        self.push(Call::Resume);
    }

    fn node_added(&self, node: &ModelNode) {
        self.push(Call::Added(node.key().clone()));
    }

    fn node_removed(&self, key: &NodeKey) {
        self.push(Call::Removed(key.clone()));
    }

    fn labels_invalidated(&self, nodes: &[ModelNode]) {
        self.push(Call::Labels(nodes.to_vec()));
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub struct Fixture {
    pub vcs: Arc<FakeVcs>,
    pub local: Arc<FakeLocal>,
    pub workspace: Workspace,
    pub recorder: Arc<Recorder>,
}

impl Fixture {
    pub fn new() -> Self {
        let vcs = Arc::new(FakeVcs::default());
        let local = Arc::new(FakeLocal::default());
        let workspace = Workspace::new(
            ConfigBuilder::new().build(),
            vcs.clone(),
            local.clone(),
            Arc::new(MemoryByteStore::new()),
        );
        Self {
            vcs,
            local,
            workspace,
            recorder: Arc::new(Recorder::default()),
        }
    }

    /// A file present in base, HEAD and the working copy with the same revision
    pub fn in_sync_file(&self, path: &str, content_id: &str) {
        self.vcs.file(&Tag::Base, path, content_id);
        self.vcs.file(&Tag::Head, path, content_id);
        self.local.clean(path);
        for ancestor in id(path).ancestors().filter(|a| !a.is_root()) {
            self.local.folder(ancestor.as_str());
        }
    }

    pub fn subscriber(&self) -> Arc<WorkspaceSubscriber> {
        Arc::new(
            WorkspaceSubscriber::new(self.workspace.clone(), vec![ResourceId::root()], Tag::Head)
                .unwrap(),
        )
    }
}

pub async fn refresh_all(sub: &WorkspaceSubscriber) -> RefreshStatus {
    sub.refresh(&[ResourceId::root()], Depth::Infinite, &CancellationToken::new())
        .await
}
