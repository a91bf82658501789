//! Collaborator bundle handed to subscribers
//!
//! A [`Workspace`] groups the configuration with every port implementation
//! the engine talks to, so constructors take one value instead of five.

use std::sync::Arc;

use crate::config::Config;
use crate::ports::{ByteStore, LocalWorkspace, MarkerSource, NoMarkers, VcsProvider};

/// Shared context of one synchronized working copy
#[derive(Clone)]
pub struct Workspace {
    pub config: Config,
    pub vcs: Arc<dyn VcsProvider>,
    pub local: Arc<dyn LocalWorkspace>,
    pub store: Arc<dyn ByteStore>,
    pub markers: Arc<dyn MarkerSource>,
}

impl Workspace {
    /// Creates a workspace without a marker source
    pub fn new(
        config: Config,
        vcs: Arc<dyn VcsProvider>,
        local: Arc<dyn LocalWorkspace>,
        store: Arc<dyn ByteStore>,
    ) -> Self {
        Self {
            config,
            vcs,
            local,
            store,
            markers: Arc::new(NoMarkers),
        }
    }

    /// Replaces the marker source
    pub fn with_markers(mut self, markers: Arc<dyn MarkerSource>) -> Self {
        self.markers = markers;
        self
    }

    /// Qualified persistence name for a cache, e.g. `triad:remote-head`
    pub fn qualifier(&self, name: &str) -> String {
        format!("{}:{}", self.config.persistence.qualifier_prefix, name)
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
