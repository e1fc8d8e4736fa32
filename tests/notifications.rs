//! Notification engine integration tests over the in-memory stores

use std::collections::HashSet;
use std::sync::Arc;

use grapevine::content::StaticContentResolver;
use grapevine::db::schemas::{NotificationDoc, NotificationKind, TargetKind, UserDoc};
use grapevine::identity::{NewUser, StoreIdentityResolver};
use grapevine::notify::{NewNotification, NotificationEngine};
use grapevine::store::memory::MemoryStores;
use grapevine::store::{BlockStore, NotificationStore, UserStore};
use grapevine::GrapevineError;
use serde_json::json;

struct World {
    stores: MemoryStores,
    identity: Arc<StoreIdentityResolver>,
    engine: NotificationEngine,
}

fn world() -> World {
    let stores = MemoryStores::new();
    let identity = Arc::new(StoreIdentityResolver::new(stores.users.clone()));

    let content = StaticContentResolver::new().with_entity(
        TargetKind::Log,
        "log-1",
        json!({ "title": "Blade Runner", "year": 1982 }),
    );

    let engine = NotificationEngine::new(
        stores.notifications.clone(),
        stores.blocks.clone(),
        stores.users.clone(),
        identity.clone(),
        Arc::new(content),
    );

    World {
        stores,
        identity,
        engine,
    }
}

async fn register(world: &World, handle: &str) -> UserDoc {
    world
        .identity
        .register(NewUser {
            external_id: format!("idp|{}", handle),
            username: handle.to_string(),
            display_name: handle.to_string(),
            avatar_url: None,
        })
        .await
        .unwrap()
}

// =============================================================================
// Creation and suppression
// =============================================================================

#[tokio::test]
async fn test_create_then_list() {
    let w = world();
    let alice = register(&w, "alice").await;
    let bob = register(&w, "bob").await;

    let id = w
        .engine
        .create(NewNotification::new(
            bob.id(),
            alice.id(),
            NotificationKind::Follow,
        ))
        .await
        .unwrap();
    assert!(id.is_some());

    let page = w.engine.list(Some("idp|bob"), 10, false, None).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].kind, NotificationKind::Follow);
    assert_eq!(page.items[0].sender.username, "alice");
    assert!(!page.items[0].is_read);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn test_self_notification_skipped() {
    let w = world();
    let alice = register(&w, "alice").await;

    let id = w
        .engine
        .create(NewNotification::new(
            alice.id(),
            alice.id(),
            NotificationKind::Reaction,
        ))
        .await
        .unwrap();
    assert!(id.is_none());
    assert_eq!(w.engine.unread_count(Some("idp|alice")).await.unwrap(), 0);
}

#[tokio::test]
async fn test_blocked_sender_never_produces_a_record() {
    let w = world();
    let alice = register(&w, "alice").await;
    let bob = register(&w, "bob").await;

    w.stores
        .blocks
        .insert(&bob.id(), &alice.id())
        .await
        .unwrap();

    let id = w
        .engine
        .create(
            NewNotification::new(bob.id(), alice.id(), NotificationKind::Comment)
                .with_content("nice list"),
        )
        .await
        .unwrap();
    assert!(id.is_none());

    assert_eq!(w.engine.unread_count(Some("idp|bob")).await.unwrap(), 0);
    let page = w.engine.list(Some("idp|bob"), 10, false, None).await.unwrap();
    assert!(page.items.is_empty());
}

// =============================================================================
// Read state
// =============================================================================

#[tokio::test]
async fn test_unread_count_matches_unread_list() {
    let w = world();
    let alice = register(&w, "alice").await;
    let bob = register(&w, "bob").await;

    for _ in 0..3 {
        w.engine
            .create(NewNotification::new(
                bob.id(),
                alice.id(),
                NotificationKind::Reaction,
            ))
            .await
            .unwrap();
    }

    let first = w
        .engine
        .list(Some("idp|bob"), 10, true, None)
        .await
        .unwrap()
        .items
        .remove(0);
    w.engine
        .mark_read(Some("idp|bob"), &first.id)
        .await
        .unwrap();

    let count = w.engine.unread_count(Some("idp|bob")).await.unwrap();
    let unread_page = w.engine.list(Some("idp|bob"), 100, true, None).await.unwrap();
    assert_eq!(count, unread_page.items.len() as u64);
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_mark_read_is_owned_and_idempotent() {
    let w = world();
    let alice = register(&w, "alice").await;
    let bob = register(&w, "bob").await;
    register(&w, "carol").await;

    let id = w
        .engine
        .create(NewNotification::new(
            bob.id(),
            alice.id(),
            NotificationKind::Reply,
        ))
        .await
        .unwrap()
        .unwrap();

    let err = w
        .engine
        .mark_read(Some("idp|carol"), &id)
        .await
        .unwrap_err();
    assert!(matches!(err, GrapevineError::NotFound(_)));

    w.engine.mark_read(Some("idp|bob"), &id).await.unwrap();
    assert_eq!(w.engine.unread_count(Some("idp|bob")).await.unwrap(), 0);

    // Re-marking a read record still succeeds
    w.engine.mark_read(Some("idp|bob"), &id).await.unwrap();
}

#[tokio::test]
async fn test_mark_all_read_flips_everything_once() {
    let w = world();
    let alice = register(&w, "alice").await;
    let bob = register(&w, "bob").await;

    for _ in 0..3 {
        w.engine
            .create(NewNotification::new(
                bob.id(),
                alice.id(),
                NotificationKind::Quote,
            ))
            .await
            .unwrap();
    }

    assert_eq!(w.engine.mark_all_read(Some("idp|bob")).await.unwrap(), 3);
    assert_eq!(w.engine.unread_count(Some("idp|bob")).await.unwrap(), 0);
    assert_eq!(w.engine.mark_all_read(Some("idp|bob")).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_is_ownership_checked() {
    let w = world();
    let alice = register(&w, "alice").await;
    let bob = register(&w, "bob").await;
    register(&w, "carol").await;

    let id = w
        .engine
        .create(NewNotification::new(
            bob.id(),
            alice.id(),
            NotificationKind::Follow,
        ))
        .await
        .unwrap()
        .unwrap();

    let err = w.engine.delete(Some("idp|carol"), &id).await.unwrap_err();
    assert!(matches!(err, GrapevineError::NotFound(_)));

    w.engine.delete(Some("idp|bob"), &id).await.unwrap();
    let err = w.engine.delete(Some("idp|bob"), &id).await.unwrap_err();
    assert!(matches!(err, GrapevineError::NotFound(_)));
}

#[tokio::test]
async fn test_anonymous_callers_rejected() {
    let w = world();

    let err = w.engine.list(None, 10, false, None).await.unwrap_err();
    assert!(matches!(err, GrapevineError::Unauthenticated(_)));

    let err = w.engine.unread_count(Some("idp|nobody")).await.unwrap_err();
    assert!(matches!(err, GrapevineError::Unauthenticated(_)));
}

// =============================================================================
// Enrichment
// =============================================================================

#[tokio::test]
async fn test_target_entity_resolution() {
    let w = world();
    let alice = register(&w, "alice").await;
    let bob = register(&w, "bob").await;

    w.engine
        .create(
            NewNotification::new(bob.id(), alice.id(), NotificationKind::Reaction)
                .with_target(TargetKind::Log, "log-1"),
        )
        .await
        .unwrap();
    w.engine
        .create(
            NewNotification::new(bob.id(), alice.id(), NotificationKind::Comment)
                .with_target(TargetKind::Log, "log-gone"),
        )
        .await
        .unwrap();

    let page = w.engine.list(Some("idp|bob"), 10, false, None).await.unwrap();
    assert_eq!(page.items.len(), 2);

    let resolved = page
        .items
        .iter()
        .find(|n| n.kind == NotificationKind::Reaction)
        .unwrap();
    let target = resolved.target.as_ref().unwrap();
    assert_eq!(target.id, "log-1");
    assert_eq!(target.entity.as_ref().unwrap()["title"], "Blade Runner");

    // A vanished catalog entity keeps its record, just unresolved
    let unresolved = page
        .items
        .iter()
        .find(|n| n.kind == NotificationKind::Comment)
        .unwrap();
    let target = unresolved.target.as_ref().unwrap();
    assert_eq!(target.id, "log-gone");
    assert!(target.entity.is_none());
}

#[tokio::test]
async fn test_vanished_sender_drops_record_from_feed() {
    let w = world();
    let bob = register(&w, "bob").await;

    let mut orphan = NotificationDoc::default();
    orphan.recipient_id = bob.id();
    orphan.sender_id = bson::oid::ObjectId::new().to_hex();
    orphan.kind = NotificationKind::Follow;
    w.stores.notifications.insert(orphan).await.unwrap();

    // The stored record still counts as unread, but the feed drops it;
    // the one documented divergence between count and list.
    assert_eq!(w.engine.unread_count(Some("idp|bob")).await.unwrap(), 1);
    let page = w.engine.list(Some("idp|bob"), 10, false, None).await.unwrap();
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_deactivated_sender_drops_record_from_feed() {
    let w = world();
    let alice = register(&w, "alice").await;
    let bob = register(&w, "bob").await;

    w.engine
        .create(NewNotification::new(
            bob.id(),
            alice.id(),
            NotificationKind::Reaction,
        ))
        .await
        .unwrap();

    let page = w.engine.list(Some("idp|bob"), 10, false, None).await.unwrap();
    assert_eq!(page.items.len(), 1);

    assert!(w.stores.users.soft_delete(&alice.id()).await.unwrap());

    // Deactivation reads like a vanished sender: the record still counts
    // as unread, but the feed no longer resolves it
    assert_eq!(w.engine.unread_count(Some("idp|bob")).await.unwrap(), 1);
    let page = w.engine.list(Some("idp|bob"), 10, false, None).await.unwrap();
    assert!(page.items.is_empty());
}

// =============================================================================
// Pagination and retention
// =============================================================================

#[tokio::test]
async fn test_feed_pagination_walks_every_record_once() {
    let w = world();
    let alice = register(&w, "alice").await;
    let bob = register(&w, "bob").await;

    let mut created = HashSet::new();
    for _ in 0..5 {
        let id = w
            .engine
            .create(NewNotification::new(
                bob.id(),
                alice.id(),
                NotificationKind::Reaction,
            ))
            .await
            .unwrap()
            .unwrap();
        created.insert(id);
    }

    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = w
            .engine
            .list(Some("idp|bob"), 2, false, cursor.as_deref())
            .await
            .unwrap();
        for item in &page.items {
            assert!(seen.insert(item.id.clone()), "duplicate {} across pages", item.id);
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(seen, created);
}

#[tokio::test]
async fn test_same_instant_burst_pages_exactly_once() {
    let w = world();
    let alice = register(&w, "alice").await;
    let bob = register(&w, "bob").await;

    // A tight burst lands many records on the same millisecond, so the
    // id tie-break is what keeps the cursor advancing
    let mut created = HashSet::new();
    for _ in 0..23 {
        let id = w
            .engine
            .create(NewNotification::new(
                bob.id(),
                alice.id(),
                NotificationKind::Reaction,
            ))
            .await
            .unwrap()
            .unwrap();
        created.insert(id);
    }

    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let page = w
            .engine
            .list(Some("idp|bob"), 5, false, cursor.as_deref())
            .await
            .unwrap();
        pages += 1;
        assert!(pages <= 6, "cursor walk failed to terminate");
        for item in &page.items {
            assert!(seen.insert(item.id.clone()), "duplicate {} across pages", item.id);
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(seen, created);
}

#[tokio::test]
async fn test_retention_sweep_removes_old_records() {
    let w = world();
    let alice = register(&w, "alice").await;
    let bob = register(&w, "bob").await;

    for _ in 0..3 {
        w.engine
            .create(NewNotification::new(
                bob.id(),
                alice.id(),
                NotificationKind::Follow,
            ))
            .await
            .unwrap();
    }

    // A cutoff in the past removes nothing
    let past = chrono::Utc::now().timestamp_millis() - 60_000;
    assert_eq!(w.engine.cleanup_before(past).await, 0);
    assert_eq!(w.engine.unread_count(Some("idp|bob")).await.unwrap(), 3);

    // A cutoff in the future removes everything written so far
    let future = chrono::Utc::now().timestamp_millis() + 60_000;
    assert_eq!(w.engine.cleanup_before(future).await, 3);
    assert_eq!(w.engine.unread_count(Some("idp|bob")).await.unwrap(), 0);
}
