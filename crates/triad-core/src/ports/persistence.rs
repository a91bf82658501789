//! Persistence port (driven/secondary port)
//!
//! A per-resource opaque byte-property store. Resource synchronizers use it
//! to keep revision descriptors across process restarts, each under its own
//! qualified name (for example `triad:remote-head`). The storage format is
//! entirely the adapter's concern.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result`; callers log failures and treat them as cache
//!   misses, which forces a re-fetch on the next refresh.

use crate::domain::{Depth, ResourceId};

/// Port trait for the byte-property store
#[async_trait::async_trait]
pub trait ByteStore: Send + Sync {
    /// Reads the bytes stored for `resource` under `qualifier`
    async fn get_bytes(
        &self,
        qualifier: &str,
        resource: &ResourceId,
    ) -> anyhow::Result<Option<Vec<u8>>>;

    /// Stores `bytes` for `resource` under `qualifier`, replacing any value
    async fn set_bytes(
        &self,
        qualifier: &str,
        resource: &ResourceId,
        bytes: &[u8],
    ) -> anyhow::Result<()>;

    /// Removes the bytes of `resource` (and members, per `depth`)
    async fn remove_bytes(
        &self,
        qualifier: &str,
        resource: &ResourceId,
        depth: Depth,
    ) -> anyhow::Result<()>;
}
