//! Integration tests for the composite provider behind a real handler
//!
//! - Routing by sync direction
//! - Moving a resource between groups when its direction changes
//! - Fan-out index consistency

use triad_core::domain::Tag;
use triad_model::{
    by_direction, BackgroundEventHandler, CompositeProvider, ModelProvider,
};
use triad_sync::Subscriber;

use crate::common::{events_config, group_key, id, refresh_all, Fixture};

fn composite(fx: &Fixture) -> CompositeProvider {
    CompositeProvider::new(by_direction(), fx.workspace.markers.clone())
}

#[tokio::test]
async fn test_resources_are_routed_by_direction() {
    let fx = Fixture::new();
    fx.vcs.file(&Tag::Head, "docs/new.md", "1");
    fx.in_sync_file("src/main.rs", "1");
    fx.local.dirty("src/main.rs");
    let sub = fx.subscriber();
    refresh_all(&sub).await;

    let (handle, _task) = BackgroundEventHandler::spawn(
        composite(&fx),
        sub.clone(),
        fx.recorder.clone(),
        &events_config(),
    );
    handle.flush().await.unwrap();

    assert_eq!(
        handle.inspect(|p| p.groups()).await.unwrap(),
        vec!["incoming", "outgoing"]
    );
    let added = fx.recorder.added();
    assert!(added.contains(&group_key("incoming", "")));
    assert!(added.contains(&group_key("incoming", "docs/new.md")));
    assert!(added.contains(&group_key("outgoing", "src/main.rs")));
    assert!(!added.contains(&group_key("outgoing", "docs")));

    let roots = handle.inspect(|p| p.roots().len()).await.unwrap();
    assert_eq!(roots, 2);
    handle.inspect(|p| p.check_consistency()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_direction_change_moves_between_groups() {
    let fx = Fixture::new();
    fx.in_sync_file("lib/c.rs", "1");
    fx.vcs.file(&Tag::Head, "lib/c.rs", "2");
    let sub = fx.subscriber();
    refresh_all(&sub).await;

    let (handle, _task) = BackgroundEventHandler::spawn(
        composite(&fx),
        sub.clone(),
        fx.recorder.clone(),
        &events_config(),
    );
    handle.flush().await.unwrap();
    assert_eq!(
        handle.inspect(|p| p.group_of(&id("lib/c.rs")).map(str::to_string)).await.unwrap(),
        Some("incoming".to_string())
    );
    fx.recorder.clear();

    fx.local.dirty("lib/c.rs");
    sub.local_changes(&[id("lib/c.rs")]).await;
    handle.flush().await.unwrap();

    assert_eq!(
        handle.inspect(|p| p.groups()).await.unwrap(),
        vec!["conflicting"]
    );
    assert_eq!(fx.recorder.removed(), vec![group_key("incoming", "")]);
    assert!(fx.recorder.added().contains(&group_key("conflicting", "lib/c.rs")));

    let lib = handle
        .inspect(|p| p.node(&group_key("conflicting", "lib")))
        .await
        .unwrap()
        .unwrap();
    assert!(lib.has_conflict());
    handle.inspect(|p| p.check_consistency()).await.unwrap().unwrap();

    // Back in sync: the last group disappears.
    fx.local.clean("lib/c.rs");
    fx.vcs.file(&Tag::Base, "lib/c.rs", "2");
    refresh_all(&sub).await;
    handle.flush().await.unwrap();

    assert!(handle.inspect(|p| p.groups()).await.unwrap().is_empty());
    assert_eq!(handle.inspect(|p| p.node_count()).await.unwrap(), 0);
    handle.inspect(|p| p.check_consistency()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shared_folders_exist_per_group() {
    let fx = Fixture::new();
    fx.vcs.file(&Tag::Head, "pkg/incoming.rs", "1");
    fx.in_sync_file("pkg/edited.rs", "1");
    fx.local.dirty("pkg/edited.rs");
    let sub = fx.subscriber();
    refresh_all(&sub).await;

    let (handle, _task) = BackgroundEventHandler::spawn(
        composite(&fx),
        sub.clone(),
        fx.recorder.clone(),
        &events_config(),
    );
    handle.flush().await.unwrap();

    let parents = handle
        .inspect(|p| p.closest_existing_parents(&id("pkg/unknown.rs")))
        .await
        .unwrap();
    assert_eq!(
        parents,
        vec![group_key("incoming", "pkg"), group_key("outgoing", "pkg")]
    );
    handle.inspect(|p| p.check_consistency()).await.unwrap().unwrap();
}
