//! Generic depth-limited tree walk
//!
//! In-memory hierarchical traversals go through [`walk`], which takes the
//! child lookup and the per-node action as closures. Async listings against
//! a revision source keep their own stack so they can be cancelled between
//! calls.

use crate::domain::Depth;

/// What the walk should do after visiting a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// Descend into the node's children
    Continue,
    /// Do not descend below this node
    SkipChildren,
    /// Abort the whole walk
    Stop,
}

/// Pre-order walk from `root`, limited by `depth`
///
/// `children` returns the members of a node; `visit` receives each node
/// together with its distance from `root`. Returns false when the walk was
/// stopped early.
pub fn walk<N, C, I, V>(root: N, depth: Depth, mut children: C, mut visit: V) -> bool
where
    C: FnMut(&N) -> I,
    I: IntoIterator<Item = N>,
    V: FnMut(&N, usize) -> Walk,
{
    let mut stack = vec![(root, 0usize)];

    while let Some((node, level)) = stack.pop() {
        match visit(&node, level) {
            Walk::Stop => return false,
            Walk::SkipChildren => continue,
            Walk::Continue => {}
        }

        let descend = match depth {
            Depth::Zero => false,
            Depth::One => level == 0,
            Depth::Infinite => true,
        };
        if !descend {
            continue;
        }

        let mut members: Vec<N> = children(&node).into_iter().collect();
        // Reverse so the first member is visited first.
        members.reverse();
        stack.extend(members.into_iter().map(|child| (child, level + 1)));
    }

    true
}
