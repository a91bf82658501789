//! Workspace subscriber: working copy against HEAD or a branch

use std::sync::Arc;

use triad_core::domain::{DomainError, ResourceId, SubscriberId, Tag};
use triad_core::ports::TagSource;
use triad_core::Workspace;

use super::{CoreParts, Subscriber, SubscriberCore};
use crate::SyncError;

/// Compares the working copy with the repository
///
/// The base side is the revision recorded in the working copy
/// ([`Tag::Base`]); the remote side is HEAD or a branch.
pub struct WorkspaceSubscriber {
    core: SubscriberCore,
    remote_tag: Tag,
}

impl WorkspaceSubscriber {
    /// Creates a subscriber for `roots`
    ///
    /// # Errors
    /// Returns [`SyncError::Domain`] when `remote` is neither HEAD nor a branch
    pub fn new(
        workspace: Workspace,
        roots: Vec<ResourceId>,
        remote: Tag,
    ) -> Result<Self, SyncError> {
        if !matches!(remote, Tag::Head | Tag::Branch(_)) {
            return Err(DomainError::InvalidTag(format!(
                "{remote} cannot be the remote side of a workspace subscriber"
            ))
            .into());
        }

        let base_qualifier = workspace.qualifier("base");
        let remote_qualifier = workspace.qualifier(&format!("remote-{}", remote.qualifier()));
        let parts = CoreParts {
            name: format!("workspace:{remote}"),
            base: (
                Arc::new(TagSource::new(workspace.vcs.clone(), Tag::Base)),
                base_qualifier,
            ),
            remote: (
                Arc::new(TagSource::new(workspace.vcs.clone(), remote.clone())),
                remote_qualifier,
            ),
            merged: None,
            cancel_when_rootless: false,
            workspace,
            roots,
        };

        Ok(Self {
            core: SubscriberCore::new(SubscriberId::new(), parts),
            remote_tag: remote,
        })
    }

    /// The tag the working copy is compared against
    pub fn remote_tag(&self) -> &Tag {
        &self.remote_tag
    }
}

#[async_trait::async_trait]
impl Subscriber for WorkspaceSubscriber {
    fn core(&self) -> &SubscriberCore {
        &self.core
    }
}
