//! Three-way sync-state resolution
//!
//! [`SyncStateResolver::resolve`] is a pure, total function from (local,
//! base, remote, criterion) to a [`SyncKind`]. It never fails: inputs that
//! make no sense (a folder on one side and a file on another) resolve to a
//! conflict so every tracked resource always has a defined state.
//!
//! ## Resolution table
//!
//! | local  | base    | remote                 | kind                  |
//! |--------|---------|------------------------|-----------------------|
//! | exists | absent  | absent                 | outgoing/addition     |
//! | absent | absent  | present                | incoming/addition     |
//! | exists | absent  | present                | conflicting/addition  |
//! | absent | present | absent                 | outgoing/deletion     |
//! | exists | present | absent                 | conflicting/deletion  |
//! | absent | present | present, base = remote | outgoing/deletion     |
//! | absent | present | present, base ≠ remote | conflicting/change    |
//! | clean  | present | base = remote          | in-sync               |
//! | dirty  | present | base = remote          | outgoing/change       |
//! | clean  | present | base ≠ remote          | incoming/change       |
//! | dirty  | present | base ≠ remote          | conflicting/change    |
//!
//! Folders carry no independent base: when the local folder exists its base
//! is the remote descriptor.

pub mod criteria;
pub mod merge;

pub use criteria::{
    ComparisonCriterion, ContentCriterion, CriteriaRegistry, RevisionNumberCriterion,
    DEFAULT_CRITERION,
};
pub use merge::{classify_conflict, Mergeability};

use crate::domain::{ChangeKind, LocalState, RevisionDescriptor, SyncKind};

/// Computes sync kinds from the three variants of a resource
pub struct SyncStateResolver;

impl SyncStateResolver {
    /// Resolves a kind using the criterion's cheap revision comparison
    pub fn resolve(
        local: Option<&LocalState>,
        base: Option<&RevisionDescriptor>,
        remote: Option<&RevisionDescriptor>,
        criterion: &dyn ComparisonCriterion,
    ) -> SyncKind {
        Self::resolve_with(local, base, remote, |b, r| criterion.same_revision(b, r))
    }

    /// Resolves a kind with an explicit base/remote equality verdict
    ///
    /// Used after a content-based criterion has compared fetched bytes.
    pub fn resolve_with<F>(
        local: Option<&LocalState>,
        base: Option<&RevisionDescriptor>,
        remote: Option<&RevisionDescriptor>,
        same: F,
    ) -> SyncKind
    where
        F: Fn(&RevisionDescriptor, &RevisionDescriptor) -> bool,
    {
        if Self::shape_issue(local, base, remote).is_some() {
            return SyncKind::conflicting(ChangeKind::Change);
        }

        let base = Self::effective_base(local, base, remote);

        match (local, base, remote) {
            (None, None, None) => SyncKind::IN_SYNC,
            (Some(_), None, None) => SyncKind::outgoing(ChangeKind::Addition),
            (None, None, Some(_)) => SyncKind::incoming(ChangeKind::Addition),
            (Some(_), None, Some(_)) => SyncKind::conflicting(ChangeKind::Addition),
            (None, Some(_), None) => SyncKind::outgoing(ChangeKind::Deletion),
            (Some(_), Some(_), None) => SyncKind::conflicting(ChangeKind::Deletion),
            (None, Some(base), Some(remote)) => {
                if same(base, remote) {
                    SyncKind::outgoing(ChangeKind::Deletion)
                } else {
                    SyncKind::conflicting(ChangeKind::Change)
                }
            }
            (Some(local), Some(base), Some(remote)) => {
                match (same(base, remote), local.dirty) {
                    (true, false) => SyncKind::IN_SYNC,
                    (true, true) => SyncKind::outgoing(ChangeKind::Change),
                    (false, false) => SyncKind::incoming(ChangeKind::Change),
                    (false, true) => SyncKind::conflicting(ChangeKind::Change),
                }
            }
        }
    }

    /// The base actually used for comparison
    ///
    /// An existing local folder takes the remote descriptor as its base.
    pub fn effective_base<'a>(
        local: Option<&LocalState>,
        base: Option<&'a RevisionDescriptor>,
        remote: Option<&'a RevisionDescriptor>,
    ) -> Option<&'a RevisionDescriptor> {
        match local {
            Some(local) if local.is_folder => remote,
            _ => base,
        }
    }

    /// Describes inconsistent descriptor shapes, `None` when consistent
    ///
    /// A resource must be a folder on every side where it exists, or a file
    /// on every side.
    pub fn shape_issue(
        local: Option<&LocalState>,
        base: Option<&RevisionDescriptor>,
        remote: Option<&RevisionDescriptor>,
    ) -> Option<String> {
        let sides = [
            ("local", local.map(|l| l.is_folder)),
            ("base", base.map(RevisionDescriptor::is_folder)),
            ("remote", remote.map(RevisionDescriptor::is_folder)),
        ];
        let mut present = sides
            .iter()
            .filter_map(|(name, folder)| folder.map(|f| (*name, f)));
        let (first_name, first_folder) = present.next()?;
        present
            .find(|(_, folder)| *folder != first_folder)
            .map(|(name, folder)| {
                let shape = |f: bool| if f { "folder" } else { "file" };
                format!(
                    "{first_name} is a {} but {name} is a {}",
                    shape(first_folder),
                    shape(folder)
                )
            })
    }
}
