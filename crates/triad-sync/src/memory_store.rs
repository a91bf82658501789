//! In-memory byte store
//!
//! A [`ByteStore`] backed by a [`DashMap`], for tests and for hosts that do
//! not persist sync metadata between sessions.

use dashmap::DashMap;
use tracing::trace;
use triad_core::domain::{Depth, ResourceId};
use triad_core::ports::ByteStore;

/// Byte properties keyed by (qualifier, resource)
#[derive(Debug, Default)]
pub struct MemoryByteStore {
    entries: DashMap<(String, ResourceId), Vec<u8>>,
}

impl MemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values across all qualifiers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of stored values under one qualifier
    pub fn count(&self, qualifier: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.key().0 == qualifier)
            .count()
    }
}

#[async_trait::async_trait]
impl ByteStore for MemoryByteStore {
    async fn get_bytes(
        &self,
        qualifier: &str,
        resource: &ResourceId,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let key = (qualifier.to_string(), resource.clone());
        Ok(self.entries.get(&key).map(|value| value.clone()))
    }

    async fn set_bytes(
        &self,
        qualifier: &str,
        resource: &ResourceId,
        bytes: &[u8],
    ) -> anyhow::Result<()> {
        trace!(qualifier, resource = %resource, len = bytes.len(), "Storing bytes");
        self.entries
            .insert((qualifier.to_string(), resource.clone()), bytes.to_vec());
        Ok(())
    }

    async fn remove_bytes(
        &self,
        qualifier: &str,
        resource: &ResourceId,
        depth: Depth,
    ) -> anyhow::Result<()> {
        self.entries
            .retain(|(q, r), _| !(q == qualifier && depth.contains(resource, r)));
        Ok(())
    }
}
