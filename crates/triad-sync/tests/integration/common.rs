//! Shared test doubles for subscriber integration tests
//!
//! - [`FakeVcs`] keeps one descriptor tree per tag plus a content table
//! - [`FakeLocal`] is a working copy described by explicit local states
//! - [`FailingStore`] rejects every persistence call

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use triad_core::config::Config;
use triad_core::domain::{Depth, LocalState, ResourceId, RevisionDescriptor, Tag};
use triad_core::ports::{ByteStore, LocalWorkspace, VcsProvider};
use triad_core::Workspace;
use triad_sync::{MemoryByteStore, SyncSetDelta, SyncSetEvent};

pub fn id(path: &str) -> ResourceId {
    ResourceId::new(path).unwrap()
}

// ============================================================================
// FakeVcs
// ============================================================================

#[derive(Default)]
pub struct FakeVcs {
    trees: Mutex<HashMap<Tag, BTreeMap<ResourceId, RevisionDescriptor>>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    broken_folders: Mutex<HashSet<ResourceId>>,
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

    /// Adds a file together with the bytes its content id refers to
    pub fn file_with_content(&self, tag: &Tag, path: &str, content_id: &str, bytes: &[u8]) {
        self.file(tag, path, content_id);
        self.contents
            .lock()
            .unwrap()
            .insert(content_id.to_string(), bytes.to_vec());
    }

    /// Removes a resource and its subtree at `tag`
    pub fn delete(&self, tag: &Tag, path: &str) {
        let resource = id(path);
        if let Some(tree) = self.trees.lock().unwrap().get_mut(tag) {
            tree.retain(|r, _| !Depth::Infinite.contains(&resource, r));
        }
    }

    /// Makes member listings of `path` fail
    pub fn break_folder(&self, path: &str) {
        self.broken_folders.lock().unwrap().insert(id(path));
    }

    /// Lets member listings of `path` succeed again
    pub fn repair_folder(&self, path: &str) {
        self.broken_folders.lock().unwrap().remove(&id(path));
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
        if self.broken_folders.lock().unwrap().contains(folder) {
            anyhow::bail!("server refused to list {folder}");
        }
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
        descriptor: &RevisionDescriptor,
    ) -> anyhow::Result<Vec<u8>> {
        self.contents
            .lock()
            .unwrap()
            .get(descriptor.content_id())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no content for {resource}"))
    }
}

// ============================================================================
// FakeLocal
// ============================================================================

#[derive(Default)]
pub struct FakeLocal {
    states: Mutex<BTreeMap<ResourceId, LocalState>>,
    ignored: Mutex<HashSet<ResourceId>>,
    contents: Mutex<HashMap<ResourceId, Vec<u8>>>,
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

    pub fn remove(&self, path: &str) {
        let resource = id(path);
        self.states
            .lock()
            .unwrap()
            .retain(|r, _| !Depth::Infinite.contains(&resource, r));
    }

    pub fn ignore(&self, path: &str) {
        self.ignored.lock().unwrap().insert(id(path));
    }

    pub fn write(&self, path: &str, bytes: &[u8]) {
        self.contents
            .lock()
            .unwrap()
            .insert(id(path), bytes.to_vec());
    }
}

impl LocalWorkspace for FakeLocal {
    fn local_state(&self, resource: &ResourceId) -> Option<LocalState> {
        if resource.is_root() {
            return Some(LocalState::folder(Self::stamp()));
        }
        self.states.lock().unwrap().get(resource).cloned()
    }

    fn is_ignored(&self, resource: &ResourceId) -> bool {
        self.ignored.lock().unwrap().contains(resource)
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
        self.contents
            .lock()
            .unwrap()
            .get(resource)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{resource} is not readable"))
    }
}

// ============================================================================
// FailingStore
// ============================================================================

#[derive(Default)]
pub struct FailingStore;

#[async_trait::async_trait]
impl ByteStore for FailingStore {
    async fn get_bytes(&self, _: &str, _: &ResourceId) -> anyhow::Result<Option<Vec<u8>>> {
        anyhow::bail!("store offline")
    }

    async fn set_bytes(&self, _: &str, _: &ResourceId, _: &[u8]) -> anyhow::Result<()> {
        anyhow::bail!("store offline")
    }

    async fn remove_bytes(&self, _: &str, _: &ResourceId, _: Depth) -> anyhow::Result<()> {
        anyhow::bail!("store offline")
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub struct Fixture {
    pub vcs: Arc<FakeVcs>,
    pub local: Arc<FakeLocal>,
    pub store: Arc<MemoryByteStore>,
    pub workspace: Workspace,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let vcs = Arc::new(FakeVcs::default());
        let local = Arc::new(FakeLocal::default());
        let store = Arc::new(MemoryByteStore::new());
        let workspace = Workspace::new(config, vcs.clone(), local.clone(), store.clone());
        Self {
            vcs,
            local,
            store,
            workspace,
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
}

/// Drains every delta currently queued on a listener, skipping resets
pub fn drain_deltas(rx: &mut mpsc::UnboundedReceiver<SyncSetEvent>) -> Vec<SyncSetDelta> {
    let mut deltas = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SyncSetEvent::Changed(delta) = event {
            deltas.push(delta);
        }
    }
    deltas
}
