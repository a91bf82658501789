//! Presentation port
//!
//! The model never renders. It tells the presentation which nodes appeared
//! or disappeared and, in batches, which labels went stale. Structural
//! updates for one event are bracketed by a [`RedrawGuard`].

use crate::node::{ModelNode, NodeKey};

/// Port trait implemented by whatever displays the model
pub trait Presentation: Send + Sync {
    /// Stop repainting until [`resume_redraw`](Presentation::resume_redraw)
    fn suspend_redraw(&self);

    fn resume_redraw(&self);

    fn node_added(&self, node: &ModelNode);

    /// The node and its whole subtree are gone
    fn node_removed(&self, key: &NodeKey);

    /// Labels of these nodes must be recomputed
    fn labels_invalidated(&self, nodes: &[ModelNode]);
}

/// Suspends redraw for its lifetime
pub struct RedrawGuard<'a> {
    presentation: &'a dyn Presentation,
}

impl<'a> RedrawGuard<'a> {
    pub fn new(presentation: &'a dyn Presentation) -> Self {
        presentation.suspend_redraw();
        Self { presentation }
    }
}

impl Drop for RedrawGuard<'_> {
    fn drop(&mut self) {
        self.presentation.resume_redraw();
    }
}

/// Presentation that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPresentation;

impl Presentation for NullPresentation {
    fn suspend_redraw(&self) {}

    fn resume_redraw(&self) {}

    fn node_added(&self, _node: &ModelNode) {}

    fn node_removed(&self, _key: &NodeKey) {}

    fn labels_invalidated(&self, _nodes: &[ModelNode]) {}
}
