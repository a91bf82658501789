//! Revision descriptors and local working-copy state
//!
//! A [`RevisionDescriptor`] is the opaque handle the VCS collaborator hands
//! out for a resource at a point in history. The engine only ever compares
//! descriptors through a comparison criterion; it never looks inside the
//! content identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::resource::Tag;

/// Handle to a resource's content at a point in history
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionDescriptor {
    /// Content identifier (revision number, hash, ...), opaque to the engine
    content_id: String,
    /// Whether this descriptor describes a folder
    is_folder: bool,
    /// Tag or branch marker carried by folders
    tag: Option<Tag>,
}

impl RevisionDescriptor {
    /// Creates a file descriptor
    pub fn file(content_id: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            is_folder: false,
            tag: None,
        }
    }

    /// Creates a folder descriptor carrying an optional tag marker
    pub fn folder(tag: Option<Tag>) -> Self {
        Self {
            content_id: String::new(),
            is_folder: true,
            tag,
        }
    }

    /// Returns the opaque content identifier
    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// Returns true for folder descriptors
    pub fn is_folder(&self) -> bool {
        self.is_folder
    }

    /// Returns the folder tag marker if any
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Encodes the descriptor for the persistence capability
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing a struct of strings and enums cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decodes bytes previously produced by [`to_bytes`](Self::to_bytes)
    ///
    /// # Errors
    /// Returns error if the bytes are not a valid descriptor
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DomainError> {
        serde_json::from_slice(bytes).map_err(|e| DomainError::InvalidDescriptor(e.to_string()))
    }
}

/// State of a resource in the local working copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    /// Whether the local resource is a folder
    pub is_folder: bool,
    /// Last local modification time
    pub modified_at: DateTime<Utc>,
    /// Whether the local content differs from the recorded base
    pub dirty: bool,
}

impl LocalState {
    /// A clean local file
    pub fn clean_file(modified_at: DateTime<Utc>) -> Self {
        Self {
            is_folder: false,
            modified_at,
            dirty: false,
        }
    }

    /// A locally modified file
    pub fn dirty_file(modified_at: DateTime<Utc>) -> Self {
        Self {
            is_folder: false,
            modified_at,
            dirty: true,
        }
    }

    /// A local folder (folders are never dirty)
    pub fn folder(modified_at: DateTime<Utc>) -> Self {
        Self {
            is_folder: true,
            modified_at,
            dirty: false,
        }
    }
}
