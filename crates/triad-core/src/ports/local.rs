//! Local working-copy port
//!
//! Describes what the engine needs to know about the user's working copy:
//! whether a resource exists, whether it differs from its recorded base,
//! whether it is ignored, and (lazily, for mergeability checks) its bytes.

use crate::domain::{LocalState, ResourceId};

/// Port trait for the local working copy
pub trait LocalWorkspace: Send + Sync {
    /// Returns the local state, `None` when the resource does not exist locally
    fn local_state(&self, resource: &ResourceId) -> Option<LocalState>;

    /// Returns true when the resource is explicitly ignored by the user
    fn is_ignored(&self, resource: &ResourceId) -> bool;

    /// Lists the direct local members of a folder
    ///
    /// Empty for files and for resources that do not exist locally.
    fn members(&self, folder: &ResourceId) -> Vec<ResourceId>;

    /// Reads the local content of a file
    fn read_content(&self, resource: &ResourceId) -> anyhow::Result<Vec<u8>>;
}
