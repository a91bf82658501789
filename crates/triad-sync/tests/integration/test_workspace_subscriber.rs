//! Integration tests for the workspace subscriber
//!
//! - Incoming additions, outgoing and conflicting changes
//! - Idempotent refresh and batched notification
//! - Cancellation before commit and subscriber cancellation
//! - Supervision rules (roots, ignored resources)
//! - Content criteria and conflict classification

use tokio_util::sync::CancellationToken;
use triad_core::config::ConfigBuilder;
use triad_core::domain::{ChangeKind, Depth, ResourceId, SyncKind, Tag};
use triad_core::resolver::Mergeability;
use triad_sync::{
    RefreshOutcome, Subscriber, SyncError, SyncSetEvent, WorkspaceSubscriber,
};

use crate::common::{drain_deltas, id, Fixture};

fn subscriber(fx: &Fixture) -> WorkspaceSubscriber {
    WorkspaceSubscriber::new(fx.workspace.clone(), vec![ResourceId::root()], Tag::Head).unwrap()
}

async fn refresh_all(sub: &WorkspaceSubscriber) -> triad_sync::RefreshStatus {
    sub.refresh(&[ResourceId::root()], Depth::Infinite, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_new_incoming_file_is_published_once() {
    let fx = Fixture::new();
    fx.in_sync_file("README", "1");
    fx.vcs.file(&Tag::Head, "src/new.rs", "1");

    let sub = subscriber(&fx);
    let set = sub.sync_set();
    let mut rx = set.connect();
    assert_eq!(rx.try_recv().unwrap(), SyncSetEvent::Reset(Vec::new()));

    let status = refresh_all(&sub).await;
    assert_eq!(status.outcome, RefreshOutcome::Changed);
    assert!(status.is_ok(), "unexpected errors: {:?}", status.errors);

    let incoming = SyncKind::incoming(ChangeKind::Addition);
    assert_eq!(set.get(&id("src/new.rs")).unwrap().kind(), incoming);
    assert_eq!(set.get(&id("src")).unwrap().kind(), incoming);
    assert!(set.get(&id("README")).is_none());
    assert_eq!(set.len(), 2);

    let deltas = drain_deltas(&mut rx);
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].added.len(), 2);
}

#[tokio::test]
async fn test_refresh_is_idempotent() {
    let fx = Fixture::new();
    fx.vcs.file(&Tag::Head, "a.txt", "1");
    let sub = subscriber(&fx);
    refresh_all(&sub).await;

    let set = sub.sync_set();
    let before = set.snapshot();
    let mut rx = set.connect();
    let _ = rx.try_recv();

    let status = refresh_all(&sub).await;
    assert_eq!(status.outcome, RefreshOutcome::NoChanges);
    assert!(status.changed.is_empty());
    assert_eq!(set.snapshot(), before);
    assert!(drain_deltas(&mut rx).is_empty());
}

#[tokio::test]
async fn test_local_modification_goes_outgoing_and_back() {
    let fx = Fixture::new();
    fx.in_sync_file("a.rs", "1");
    let sub = subscriber(&fx);
    refresh_all(&sub).await;
    let set = sub.sync_set();
    assert!(set.is_empty());

    fx.local.dirty("a.rs");
    let status = sub.local_changes(&[id("a.rs")]).await;
    assert_eq!(status.outcome, RefreshOutcome::Changed);
    assert_eq!(
        set.get(&id("a.rs")).unwrap().kind(),
        SyncKind::outgoing(ChangeKind::Change)
    );

    fx.local.clean("a.rs");
    let mut rx = set.connect();
    let _ = rx.try_recv();
    sub.local_changes(&[id("a.rs")]).await;
    assert!(set.is_empty());
    let deltas = drain_deltas(&mut rx);
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].removed_subtree_roots, vec![id("a.rs")]);
}

#[tokio::test]
async fn test_unchanged_local_state_publishes_nothing() {
    let fx = Fixture::new();
    fx.in_sync_file("a.rs", "1");
    fx.local.dirty("a.rs");
    let sub = subscriber(&fx);
    refresh_all(&sub).await;

    let status = sub.local_changes(&[id("a.rs")]).await;
    assert_eq!(status.outcome, RefreshOutcome::NoChanges);
}

#[tokio::test]
async fn test_three_way_conflicts() {
    let fx = Fixture::new();
    fx.in_sync_file("changed.rs", "1");
    fx.vcs.file(&Tag::Head, "changed.rs", "2");
    fx.local.dirty("changed.rs");

    fx.in_sync_file("deleted.rs", "1");
    fx.vcs.delete(&Tag::Head, "deleted.rs");

    fx.in_sync_file("updated.rs", "1");
    fx.vcs.file(&Tag::Head, "updated.rs", "2");

    let sub = subscriber(&fx);
    refresh_all(&sub).await;
    let set = sub.sync_set();

    assert_eq!(
        set.get(&id("changed.rs")).unwrap().kind(),
        SyncKind::conflicting(ChangeKind::Change)
    );
    assert_eq!(
        set.get(&id("deleted.rs")).unwrap().kind(),
        SyncKind::conflicting(ChangeKind::Deletion)
    );
    assert_eq!(
        set.get(&id("updated.rs")).unwrap().kind(),
        SyncKind::incoming(ChangeKind::Change)
    );
}

#[tokio::test]
async fn test_cancelled_refresh_changes_nothing() {
    let fx = Fixture::new();
    fx.vcs.file(&Tag::Head, "a.txt", "1");
    let sub = subscriber(&fx);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let status = sub
        .refresh(&[ResourceId::root()], Depth::Infinite, &cancel)
        .await;

    assert_eq!(status.outcome, RefreshOutcome::Cancelled);
    assert!(sub.sync_set().is_empty());
    assert!(sub.core().base().cache().is_empty());
    assert!(sub.core().remote().cache().is_empty());
    assert!(fx.store.is_empty());
    assert!(sub.is_active());
}

#[tokio::test]
async fn test_cancel_deactivates_and_disposes() {
    let fx = Fixture::new();
    fx.vcs.file(&Tag::Head, "a.txt", "1");
    let sub = subscriber(&fx);
    refresh_all(&sub).await;
    assert!(!fx.store.is_empty());

    let mut rx = sub.sync_set().connect();
    let _ = rx.try_recv();

    sub.cancel().await;
    assert!(!sub.is_active());
    assert!(fx.store.is_empty());
    assert_eq!(refresh_all(&sub).await.outcome, RefreshOutcome::Inactive);
    assert_eq!(
        sub.local_changes(&[id("a.txt")]).await.outcome,
        RefreshOutcome::Inactive
    );
    assert_eq!(sub.sync_info(&id("a.txt")).await, Err(SyncError::Inactive));
    assert!(rx.recv().await.is_none());

    // Cancelling twice is harmless.
    sub.cancel().await;
}

#[tokio::test]
async fn test_supervision_rules() {
    let fx = Fixture::new();
    fx.local.clean("build.log");
    fx.local.ignore("build.log");
    fx.local.ignore("generated.rs");
    fx.vcs.file(&Tag::Head, "generated.rs", "1");
    fx.local.clean("docs/guide.md");

    let sub = WorkspaceSubscriber::new(
        fx.workspace.clone(),
        vec![id("build.log"), id("generated.rs")],
        Tag::Head,
    )
    .unwrap();
    refresh_all(&sub).await;

    assert!(!sub.is_supervised(&id("build.log")).await);
    assert_eq!(sub.sync_info(&id("build.log")).await, Ok(None));

    assert!(sub.is_supervised(&id("generated.rs")).await);
    assert_eq!(
        sub.sync_set().get(&id("generated.rs")).unwrap().kind(),
        SyncKind::incoming(ChangeKind::Addition)
    );

    assert!(!sub.is_supervised(&id("docs/guide.md")).await);
    assert_eq!(sub.sync_info(&id("docs/guide.md")).await, Ok(None));
}

#[tokio::test]
async fn test_absent_everywhere_has_no_info() {
    let fx = Fixture::new();
    let sub = subscriber(&fx);
    refresh_all(&sub).await;
    assert_eq!(sub.sync_info(&id("nowhere.txt")).await, Ok(None));
}

#[tokio::test]
async fn test_shape_mismatch_is_reported() {
    let fx = Fixture::new();
    fx.local.folder("x");
    fx.vcs.file(&Tag::Head, "x", "1");
    let sub = subscriber(&fx);

    let status = refresh_all(&sub).await;
    assert!(status
        .errors
        .iter()
        .any(|e| matches!(e, SyncError::Resolver { resource, .. } if resource == &id("x"))));
    assert_eq!(
        sub.sync_set().get(&id("x")).unwrap().kind(),
        SyncKind::conflicting(ChangeKind::Change)
    );
    assert!(!sub.sync_set().errors().is_empty());
}

#[tokio::test]
async fn test_failed_listing_is_collected_not_fatal() {
    let fx = Fixture::new();
    fx.in_sync_file("src/a.rs", "1");
    fx.vcs.file(&Tag::Head, "top.txt", "1");
    fx.vcs.break_folder("src");
    let sub = subscriber(&fx);

    let status = refresh_all(&sub).await;
    assert_eq!(status.outcome, RefreshOutcome::Changed);
    assert!(status
        .errors
        .iter()
        .any(|e| matches!(e, SyncError::Refresh { resource, .. } if resource == &id("src"))));
    assert!(sub.sync_set().contains(&id("top.txt")));
}

#[tokio::test]
async fn test_repeated_listing_failures_are_recorded_once() {
    let fx = Fixture::new();
    fx.in_sync_file("src/a.rs", "1");
    fx.local.folder("x");
    fx.vcs.file(&Tag::Head, "x", "1");
    fx.vcs.break_folder("src");
    let sub = subscriber(&fx);
    let set = sub.sync_set();

    let listing = |errors: &[SyncError]| {
        errors
            .iter()
            .filter(|e| matches!(e, SyncError::Refresh { resource, .. } if resource == &id("src")))
            .count()
    };
    let status = refresh_all(&sub).await;
    let per_refresh = listing(&status.errors);
    assert!(per_refresh > 0);
    for _ in 0..3 {
        refresh_all(&sub).await;
    }
    assert_eq!(listing(&set.errors()), per_refresh);

    fx.vcs.repair_folder("src");
    refresh_all(&sub).await;
    assert_eq!(listing(&set.errors()), 0);
    // The shape mismatch on x is still there and still reported.
    assert!(set
        .errors()
        .iter()
        .any(|e| matches!(e, SyncError::Resolver { resource, .. } if resource == &id("x"))));
}

#[tokio::test]
async fn test_content_criterion_ignores_revision_noise() {
    let config = ConfigBuilder::new()
        .sync_comparison_criterion("content")
        .build();
    let fx = Fixture::with_config(config);
    fx.vcs
        .file_with_content(&Tag::Base, "a.txt", "rev-1", b"same bytes");
    fx.vcs
        .file_with_content(&Tag::Head, "a.txt", "rev-2", b"same bytes");
    fx.local.clean("a.txt");

    let sub = subscriber(&fx);
    refresh_all(&sub).await;
    assert!(sub.sync_set().get(&id("a.txt")).is_none());

    assert!(sub.set_criterion("revision-number"));
    assert!(!sub.set_criterion("revision-number"));
    sub.local_changes(&[id("a.txt")]).await;
    assert_eq!(
        sub.sync_set().get(&id("a.txt")).unwrap().kind(),
        SyncKind::incoming(ChangeKind::Change)
    );
}

#[tokio::test]
async fn test_content_fetch_failure_keeps_cheap_verdict() {
    let config = ConfigBuilder::new()
        .sync_comparison_criterion("content")
        .build();
    let fx = Fixture::with_config(config);
    fx.vcs.file(&Tag::Base, "a.txt", "rev-1");
    fx.vcs.file(&Tag::Head, "a.txt", "rev-2");
    fx.local.clean("a.txt");

    let sub = subscriber(&fx);
    refresh_all(&sub).await;
    assert_eq!(
        sub.sync_set().get(&id("a.txt")).unwrap().kind(),
        SyncKind::incoming(ChangeKind::Change)
    );
}

#[tokio::test]
async fn test_conflicts_are_classified_when_enabled() {
    let config = ConfigBuilder::new().sync_classify_conflicts(true).build();
    let fx = Fixture::with_config(config);
    let base = b"one\ntwo\nthree\nfour\nfive\n";

    fx.vcs.file_with_content(&Tag::Base, "overlap.txt", "o1", base);
    fx.vcs
        .file_with_content(&Tag::Head, "overlap.txt", "o2", b"one\nTWO\nthree\nfour\nfive\n");
    fx.local.dirty("overlap.txt");
    fx.local.write("overlap.txt", b"one\ntwo-local\nthree\nfour\nfive\n");

    fx.vcs.file_with_content(&Tag::Base, "disjoint.txt", "d1", base);
    fx.vcs
        .file_with_content(&Tag::Head, "disjoint.txt", "d2", b"one\ntwo\nthree\nfour\nFIVE\n");
    fx.local.dirty("disjoint.txt");
    fx.local.write("disjoint.txt", b"ONE\ntwo\nthree\nfour\nfive\n");

    let sub = subscriber(&fx);
    refresh_all(&sub).await;
    let set = sub.sync_set();

    assert_eq!(
        set.get(&id("overlap.txt")).unwrap().kind(),
        SyncKind::conflicting(ChangeKind::ManualMerge)
    );
    assert_eq!(
        set.get(&id("disjoint.txt")).unwrap().kind(),
        SyncKind::conflicting(ChangeKind::Change)
    );

    let cancel = CancellationToken::new();
    assert_eq!(
        sub.mergeability(&id("overlap.txt"), &cancel).await,
        Ok(Some(Mergeability::Manual))
    );
    assert_eq!(
        sub.mergeability(&id("disjoint.txt"), &cancel).await,
        Ok(Some(Mergeability::AutoMergeable))
    );
}

#[tokio::test]
async fn test_version_tag_is_not_a_workspace_remote() {
    let fx = Fixture::new();
    let result = WorkspaceSubscriber::new(
        fx.workspace.clone(),
        vec![ResourceId::root()],
        Tag::version("1.0").unwrap(),
    );
    assert!(matches!(result, Err(SyncError::Domain(_))));
}

#[tokio::test]
async fn test_folder_level_local_changes_reach_nested_files() {
    let fx = Fixture::new();
    fx.in_sync_file("d/sub/f.rs", "1");
    let sub = subscriber(&fx);
    refresh_all(&sub).await;
    let set = sub.sync_set();
    assert!(set.is_empty());

    // An edit reported only at folder level.
    fx.local.dirty("d/sub/f.rs");
    let status = sub.local_changes(&[id("d")]).await;
    assert_eq!(status.outcome, RefreshOutcome::Changed);
    assert_eq!(
        set.get(&id("d/sub/f.rs")).unwrap().kind(),
        SyncKind::outgoing(ChangeKind::Change)
    );

    // The folder moves away: everything cached below it is recomputed.
    fx.local.remove("d");
    sub.local_changes(&[id("d")]).await;
    assert_eq!(
        set.get(&id("d/sub/f.rs")).unwrap().kind(),
        SyncKind::outgoing(ChangeKind::Deletion)
    );

    // ... and lands elsewhere, unknown to both revisions.
    fx.local.folder("e");
    fx.local.folder("e/sub");
    fx.local.clean("e/sub/f.rs");
    sub.local_changes(&[id("e")]).await;
    let addition = SyncKind::outgoing(ChangeKind::Addition);
    assert_eq!(set.get(&id("e")).unwrap().kind(), addition);
    assert_eq!(set.get(&id("e/sub/f.rs")).unwrap().kind(), addition);
}
