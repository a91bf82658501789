//! Integration tests for descriptor persistence

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use triad_core::config::{Config, ConfigBuilder};
use triad_core::domain::{ChangeKind, Depth, ResourceId, SyncKind, Tag};
use triad_core::Workspace;
use triad_sync::{RefreshOutcome, Subscriber, SyncError, WorkspaceSubscriber};

use crate::common::{id, FailingStore, Fixture};

async fn refresh_all(sub: &WorkspaceSubscriber) -> triad_sync::RefreshStatus {
    sub.refresh(&[ResourceId::root()], Depth::Infinite, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_store_failures_do_not_block_refresh() {
    let fx = Fixture::new();
    fx.vcs.file(&Tag::Head, "a.txt", "1");
    let workspace = Workspace::new(
        Config::default(),
        fx.vcs.clone(),
        fx.local.clone(),
        Arc::new(FailingStore),
    );

    let sub = WorkspaceSubscriber::new(workspace, vec![ResourceId::root()], Tag::Head).unwrap();
    let status = refresh_all(&sub).await;

    assert_eq!(status.outcome, RefreshOutcome::Changed);
    assert!(status
        .errors
        .iter()
        .any(|e| matches!(e, SyncError::Persistence { .. })));
    assert_eq!(
        sub.sync_set().get(&id("a.txt")).unwrap().kind(),
        SyncKind::incoming(ChangeKind::Addition)
    );
}

#[tokio::test]
async fn test_descriptors_survive_a_new_subscriber() {
    let fx = Fixture::new();
    fx.in_sync_file("kept.txt", "1");
    fx.vcs.file(&Tag::Head, "new.txt", "1");

    let first =
        WorkspaceSubscriber::new(fx.workspace.clone(), vec![ResourceId::root()], Tag::Head)
            .unwrap();
    refresh_all(&first).await;
    assert!(fx.store.count("triad:base") > 0);
    assert!(fx.store.count("triad:remote-head") > 0);

    let second =
        WorkspaceSubscriber::new(fx.workspace.clone(), vec![ResourceId::root()], Tag::Head)
            .unwrap();
    assert!(second.core().remote().cache().is_empty());

    let info = second.sync_info(&id("new.txt")).await.unwrap().unwrap();
    assert_eq!(info.kind(), SyncKind::incoming(ChangeKind::Addition));
    let kept = second.sync_info(&id("kept.txt")).await.unwrap().unwrap();
    assert!(kept.kind().is_in_sync());
}

#[tokio::test]
async fn test_qualifier_prefix_is_configurable() {
    let config = ConfigBuilder::new()
        .persistence_qualifier_prefix("ide")
        .build();
    let fx = Fixture::with_config(config);
    fx.vcs.file(&Tag::Head, "a.txt", "1");

    let sub = WorkspaceSubscriber::new(fx.workspace.clone(), vec![ResourceId::root()], Tag::Head)
        .unwrap();
    refresh_all(&sub).await;

    assert!(fx.store.count("ide:remote-head") > 0);
    assert_eq!(fx.store.count("triad:remote-head"), 0);
}

#[tokio::test]
async fn test_removed_resources_are_purged_from_the_store() {
    let fx = Fixture::new();
    fx.vcs.file(&Tag::Head, "dir/a.txt", "1");
    fx.vcs.file(&Tag::Head, "dir/b.txt", "1");

    let sub = WorkspaceSubscriber::new(fx.workspace.clone(), vec![ResourceId::root()], Tag::Head)
        .unwrap();
    refresh_all(&sub).await;
    let before = fx.store.count("triad:remote-head");

    fx.vcs.delete(&Tag::Head, "dir");
    let status = refresh_all(&sub).await;
    assert!(status.is_ok());
    assert_eq!(fx.store.count("triad:remote-head"), before - 3);
    assert!(sub.sync_set().is_empty());
}
