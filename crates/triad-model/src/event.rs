//! Events consumed by the background event handler

use triad_core::domain::ResourceId;
use triad_sync::SyncSetDelta;

/// One unit of work for the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Problem markers changed on these resources
    MarkersChanged(Vec<ResourceId>),
    /// A long-running operation started or finished on a resource
    BusyStateChanged { resource: ResourceId, busy: bool },
    /// Discard the model and rebuild it from the sync set
    Reset,
    /// One consolidated sync set batch
    SyncInfoSetChanged(SyncSetDelta),
}

impl Event {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::MarkersChanged(_) => "markers_changed",
            Event::BusyStateChanged { .. } => "busy_state_changed",
            Event::Reset => "reset",
            Event::SyncInfoSetChanged(_) => "sync_info_set_changed",
        }
    }
}
