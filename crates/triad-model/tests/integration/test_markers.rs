//! Integration tests for problem marker propagation

use std::sync::{Arc, Mutex};

use triad_core::domain::{Depth, ResourceId, Tag};
use triad_core::ports::{MarkerSource, Problem, Severity};
use triad_model::{BackgroundEventHandler, HierarchicalProvider, Marker, ModelProvider};

use crate::common::{events_config, id, key, refresh_all, Fixture};

/// Marker source backed by a mutable problem list
#[derive(Default)]
struct ProblemTable(Mutex<Vec<Problem>>);

impl ProblemTable {
    fn report(&self, path: &str, severity: Severity) {
        self.0.lock().unwrap().push(Problem {
            resource: id(path),
            severity,
        });
    }

    fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl MarkerSource for ProblemTable {
    fn find_problems(&self, resource: &ResourceId, depth: Depth) -> Vec<Problem> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|p| depth.contains(resource, &p.resource))
            .cloned()
            .collect()
    }
}

#[tokio::test]
async fn test_markers_propagate_to_ancestors() {
    let fx = Fixture::new();
    let problems = Arc::new(ProblemTable::default());
    problems.report("src/lib.rs", Severity::Error);
    fx.vcs.file(&Tag::Head, "src/lib.rs", "1");
    let sub = fx.subscriber();
    refresh_all(&sub).await;

    let (handle, _task) = BackgroundEventHandler::spawn(
        HierarchicalProvider::new(problems.clone()),
        sub.clone(),
        fx.recorder.clone(),
        &events_config(),
    );
    handle.flush().await.unwrap();

    let marker = |path: &'static str| {
        let handle = handle.clone();
        async move {
            handle
                .inspect(move |p| p.node(&key(path)).map(|n| n.marker()))
                .await
                .unwrap()
        }
    };
    assert_eq!(marker("src/lib.rs").await, Some(Marker::Error));
    assert_eq!(marker("src").await, Some(Marker::Error));
    assert_eq!(marker("").await, Some(Marker::Error));

    problems.clear();
    problems.report("src/lib.rs", Severity::Warning);
    fx.recorder.clear();
    handle.markers_changed(vec![id("src/lib.rs")]).unwrap();
    handle.flush().await.unwrap();

    assert_eq!(marker("src/lib.rs").await, Some(Marker::Warning));
    assert_eq!(marker("src").await, Some(Marker::Warning));
    assert_eq!(marker("").await, Some(Marker::Warning));
    let batches = fx.recorder.label_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
}
