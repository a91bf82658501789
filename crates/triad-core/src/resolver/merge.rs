//! Conflict mergeability classification
//!
//! Decides whether a conflicting change could be merged automatically. Both
//! sides are diffed line by line against the base; every non-equal diff op
//! becomes a hunk over base lines. A manual merge is needed as soon as a
//! local hunk overlaps or touches a remote hunk.

use std::ops::Range;

use similar::{capture_diff_slices, Algorithm, DiffTag};
use tracing::debug;

/// Whether a conflict needs human attention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mergeability {
    /// The local and remote edits touch disjoint regions
    AutoMergeable,
    /// The edits overlap; the user must merge by hand
    Manual,
}

/// Classifies a conflict from the three contents
pub fn classify_conflict(base: &[u8], local: &[u8], remote: &[u8]) -> Mergeability {
    if local == base || remote == base || local == remote {
        return Mergeability::AutoMergeable;
    }

    let base_lines = lines(base);
    let local_hunks = hunks(&base_lines, &lines(local));
    let remote_hunks = hunks(&base_lines, &lines(remote));

    let clash = local_hunks
        .iter()
        .find_map(|l| remote_hunks.iter().find(|r| touches(l, r)).map(|r| (l, r)));

    debug!(
        local_hunks = local_hunks.len(),
        remote_hunks = remote_hunks.len(),
        ?clash,
        "Classified conflicting change"
    );

    match clash {
        Some(_) => Mergeability::Manual,
        None => Mergeability::AutoMergeable,
    }
}

fn lines(content: &[u8]) -> Vec<&[u8]> {
    content.split(|b| *b == b'\n').collect()
}

/// Base line ranges replaced by `side`, adjacent ops merged
///
/// Pure insertions yield an empty range at their insertion point.
fn hunks(base: &[&[u8]], side: &[&[u8]]) -> Vec<Range<usize>> {
    let mut hunks: Vec<Range<usize>> = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, base, side) {
        if op.tag() == DiffTag::Equal {
            continue;
        }
        let range = op.old_range();
        match hunks.last_mut() {
            Some(last) if last.end == range.start => last.end = range.end,
            _ => hunks.push(range),
        }
    }
    hunks
}

/// Overlapping or adjacent hunks cannot be applied independently
fn touches(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start <= b.end && b.start <= a.end
}
