//! Resource identity newtypes with validation
//!
//! A [`ResourceId`] is a workspace-relative, `/`-separated path. The empty
//! path is the synthetic workspace root. Identities are stable across
//! refreshes and order depth-first, so sorting a set of identities always
//! places an ancestor before its descendants.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// ResourceId
// ============================================================================

/// Hierarchical identity of a tracked file or folder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a new ResourceId from a relative path
    ///
    /// Leading and trailing slashes are trimmed.
    ///
    /// # Errors
    /// Returns error if the path contains empty segments or traversal
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();
        let trimmed = path.trim_matches('/');

        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(DomainError::InvalidPath(format!(
                    "Resource path contains an empty segment: {path}"
                )));
            }
            if segment == "." || segment == ".." {
                return Err(DomainError::InvalidPath(format!(
                    "Resource path contains invalid traversal: {path}"
                )));
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The synthetic workspace root
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the workspace root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments (the root has depth 0)
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.split('/').count()
        }
    }

    /// Iterates the path segments from the top
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, `None` for the root
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Get the parent identity, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Join a single child segment
    ///
    /// # Errors
    /// Returns error if `name` is empty or contains a separator
    pub fn child(&self, name: &str) -> Result<Self, DomainError> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(DomainError::InvalidPath(format!(
                "Invalid path component: {name}"
            )));
        }

        if self.is_root() {
            Ok(Self(name.to_string()))
        } else {
            Ok(Self(format!("{}/{name}", self.0)))
        }
    }

    /// True when `self` is a strict ancestor of `other`
    #[must_use]
    pub fn is_ancestor_of(&self, other: &ResourceId) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// Every strict ancestor from the direct parent up to the root
    pub fn ancestors(&self) -> impl Iterator<Item = ResourceId> {
        let mut current = self.parent();
        std::iter::from_fn(move || {
            let next = current.take()?;
            current = next.parent();
            Some(next)
        })
    }
}

impl Ord for ResourceId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments().cmp(other.segments())
    }
}

impl PartialOrd for ResourceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for ResourceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

// ============================================================================
// Depth
// ============================================================================

/// How far below a resource an operation reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    /// Only the resource itself
    Zero,
    /// The resource and its direct members
    One,
    /// The resource and its whole subtree
    Infinite,
}

impl Depth {
    /// Whether `candidate` lies within `root` at this depth
    #[must_use]
    pub fn contains(self, root: &ResourceId, candidate: &ResourceId) -> bool {
        if root == candidate {
            return true;
        }
        match self {
            Depth::Zero => false,
            Depth::One => candidate.parent().as_ref() == Some(root),
            Depth::Infinite => root.is_ancestor_of(candidate),
        }
    }

    /// The depth used for members one level further down
    #[must_use]
    pub fn below(self) -> Depth {
        match self {
            Depth::Zero | Depth::One => Depth::Zero,
            Depth::Infinite => Depth::Infinite,
        }
    }
}

// ============================================================================
// Tag
// ============================================================================

/// A named pointer into repository history
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    /// The revision recorded in the working copy
    Base,
    /// The main line of development
    Head,
    /// The tip of a named branch
    Branch(String),
    /// A fixed version tag
    Version(String),
}

impl Tag {
    /// Creates a branch tag
    ///
    /// # Errors
    /// Returns error if the name is empty or contains whitespace
    pub fn branch(name: impl Into<String>) -> Result<Self, DomainError> {
        Ok(Tag::Branch(validate_tag_name(name.into())?))
    }

    /// Creates a version tag
    ///
    /// # Errors
    /// Returns error if the name is empty or contains whitespace
    pub fn version(name: impl Into<String>) -> Result<Self, DomainError> {
        Ok(Tag::Version(validate_tag_name(name.into())?))
    }

    /// Short identifier used in persistence qualifiers and logs
    #[must_use]
    pub fn qualifier(&self) -> String {
        match self {
            Tag::Base => "base".to_string(),
            Tag::Head => "head".to_string(),
            Tag::Branch(name) => format!("branch-{name}"),
            Tag::Version(name) => format!("version-{name}"),
        }
    }
}

fn validate_tag_name(name: String) -> Result<String, DomainError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(DomainError::InvalidTag(name));
    }
    Ok(name)
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Base => write!(f, "BASE"),
            Tag::Head => write!(f, "HEAD"),
            Tag::Branch(name) | Tag::Version(name) => write!(f, "{name}"),
        }
    }
}

// ============================================================================
// SubscriberId
// ============================================================================

/// Identifier for a subscriber instance, used in log spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Create a new random SubscriberId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubscriberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriberId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid SubscriberId: {e}")))
    }
}
