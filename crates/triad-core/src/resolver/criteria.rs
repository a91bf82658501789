//! Comparison criteria
//!
//! A criterion decides whether two revision descriptors denote the same
//! content. The cheap [`RevisionNumberCriterion`] only looks at the content
//! identifiers. Content-based criteria additionally compare fetched bytes,
//! but only after the cheap check already flagged the pair as different;
//! fetching is the subscriber's job, the criterion just judges the bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::RevisionDescriptor;

/// Identifier of the always-present default criterion
pub const DEFAULT_CRITERION: &str = "revision-number";

/// Pluggable equality between two revision descriptors
pub trait ComparisonCriterion: Send + Sync {
    /// Stable identifier used in configuration
    fn id(&self) -> &'static str;

    /// Whether this criterion needs content bytes to decide
    fn is_content_based(&self) -> bool {
        false
    }

    /// Cheap, I/O-free comparison of two descriptors
    ///
    /// Folders compare equal to folders; a file never equals a folder.
    fn same_revision(&self, a: &RevisionDescriptor, b: &RevisionDescriptor) -> bool {
        match (a.is_folder(), b.is_folder()) {
            (true, true) => true,
            (false, false) => a.content_id() == b.content_id(),
            _ => false,
        }
    }

    /// Compares fetched content; only consulted by content-based criteria
    fn same_content(&self, a: &[u8], b: &[u8]) -> bool {
        a == b
    }
}

/// Compares revision identifiers only
#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionNumberCriterion;

impl ComparisonCriterion for RevisionNumberCriterion {
    fn id(&self) -> &'static str {
        DEFAULT_CRITERION
    }
}

/// Compares content bytes, optionally ignoring ASCII whitespace
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentCriterion {
    ignore_whitespace: bool,
}

impl ContentCriterion {
    /// Byte-exact content comparison
    pub fn exact() -> Self {
        Self {
            ignore_whitespace: false,
        }
    }

    /// Content comparison that ignores whitespace differences
    pub fn ignoring_whitespace() -> Self {
        Self {
            ignore_whitespace: true,
        }
    }
}

impl ComparisonCriterion for ContentCriterion {
    fn id(&self) -> &'static str {
        if self.ignore_whitespace {
            "content-ignore-whitespace"
        } else {
            "content"
        }
    }

    fn is_content_based(&self) -> bool {
        true
    }

    fn same_content(&self, a: &[u8], b: &[u8]) -> bool {
        if !self.ignore_whitespace {
            return a == b;
        }
        let strip = |bytes: &[u8]| -> Vec<u8> {
            bytes
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect()
        };
        strip(a) == strip(b)
    }
}

/// The set of available criteria plus the current selection
///
/// Invariant: the registry is never empty and always contains
/// [`DEFAULT_CRITERION`], which cannot be removed.
#[derive(Clone)]
pub struct CriteriaRegistry {
    criteria: BTreeMap<&'static str, Arc<dyn ComparisonCriterion>>,
    current: &'static str,
}

impl CriteriaRegistry {
    /// Registry holding the built-in criteria, with the cheap default selected
    pub fn new() -> Self {
        let mut registry = Self {
            criteria: BTreeMap::new(),
            current: DEFAULT_CRITERION,
        };
        registry.register(Arc::new(RevisionNumberCriterion));
        registry.register(Arc::new(ContentCriterion::exact()));
        registry.register(Arc::new(ContentCriterion::ignoring_whitespace()));
        registry
    }

    /// Adds or replaces a criterion
    pub fn register(&mut self, criterion: Arc<dyn ComparisonCriterion>) {
        debug!(criterion = criterion.id(), "Registering comparison criterion");
        self.criteria.insert(criterion.id(), criterion);
    }

    /// Removes a criterion; the default cannot be removed
    ///
    /// If the removed criterion was selected, the default becomes current.
    pub fn unregister(&mut self, id: &str) -> bool {
        if id == DEFAULT_CRITERION {
            return false;
        }
        let removed = self.criteria.remove(id).is_some();
        if removed && self.current == id {
            self.current = DEFAULT_CRITERION;
        }
        removed
    }

    /// Selects the current criterion; unknown ids select the default
    ///
    /// Returns true when the selection changed.
    pub fn select(&mut self, id: &str) -> bool {
        let next = match self.criteria.get_key_value(id) {
            Some((key, _)) => *key,
            None => {
                warn!(criterion = id, "Unknown comparison criterion, using default");
                DEFAULT_CRITERION
            }
        };
        let changed = next != self.current;
        self.current = next;
        changed
    }

    /// Returns the currently selected criterion
    pub fn current(&self) -> Arc<dyn ComparisonCriterion> {
        self.criteria
            .get(self.current)
            .or_else(|| self.criteria.get(DEFAULT_CRITERION))
            .cloned()
            .unwrap_or_else(|| Arc::new(RevisionNumberCriterion))
    }

    /// Returns the cheap default criterion
    pub fn default_criterion(&self) -> Arc<dyn ComparisonCriterion> {
        self.criteria
            .get(DEFAULT_CRITERION)
            .cloned()
            .unwrap_or_else(|| Arc::new(RevisionNumberCriterion))
    }

    /// Identifiers of every registered criterion
    pub fn ids(&self) -> Vec<&'static str> {
        self.criteria.keys().copied().collect()
    }
}

impl Default for CriteriaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
