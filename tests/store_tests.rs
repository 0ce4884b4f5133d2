//! Integration tests for the sqlite-backed watch store.

use miharr::clients::nyaa::{NyaaCategory, NyaaFilter};
use miharr::db::Store;
use miharr::domain::OwnerId;
use miharr::models::watch::{Watch, WatchParams};

async fn temp_store() -> Store {
    let db_path = std::env::temp_dir().join(format!("miharr-store-test-{}.db", uuid::Uuid::new_v4()));
    Store::new(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("failed to create store")
}

fn sample_watch(owner: &str, query: &str) -> Watch {
    Watch::new(
        OwnerId::new(owner),
        WatchParams {
            query: query.to_string(),
            filter: Some(NyaaFilter::NoRemakes),
            category: Some(NyaaCategory::AnimeEnglishTranslated),
            uploader: None,
        },
    )
}

#[tokio::test]
async fn upsert_merges_into_existing_natural_key() {
    let store = temp_store().await;

    let first = sample_watch("alice", "frieren 1080p");
    store.add_or_update_watch(&first).await.unwrap();

    // A second logical save of the same search must merge, not duplicate,
    // even though the incoming record carries a fresh id.
    let mut second = sample_watch("alice", "frieren 1080p");
    second.seen_hashes.insert("hash-1".to_string());
    let merged = store.add_or_update_watch(&second).await.unwrap();

    assert_eq!(merged.id, first.id);
    assert_eq!(merged.created_at, first.created_at);
    assert!(merged.seen_hashes.contains("hash-1"));

    let page = store.list_watches(None, 0, 10).await.unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn different_parameters_create_separate_watches() {
    let store = temp_store().await;

    store
        .add_or_update_watch(&sample_watch("alice", "frieren"))
        .await
        .unwrap();

    let mut trusted = sample_watch("alice", "frieren");
    trusted.filter = Some(NyaaFilter::TrustedOnly);
    store.add_or_update_watch(&trusted).await.unwrap();

    let mut no_filter = sample_watch("alice", "frieren");
    no_filter.filter = None;
    store.add_or_update_watch(&no_filter).await.unwrap();

    let page = store.list_watches(None, 0, 10).await.unwrap();
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn seen_set_is_merged_never_replaced() {
    let store = temp_store().await;

    let mut watch = sample_watch("alice", "mushoku tensei");
    watch.seen_hashes.extend(["a".to_string(), "b".to_string()]);
    store.add_or_update_watch(&watch).await.unwrap();

    let mut later = sample_watch("alice", "mushoku tensei");
    later.seen_hashes.insert("c".to_string());
    let merged = store.add_or_update_watch(&later).await.unwrap();
    assert_eq!(merged.seen_hashes.len(), 3);

    // An upsert carrying an empty seen-set must not shrink the stored one.
    let bare = sample_watch("alice", "mushoku tensei");
    let still_merged = store.add_or_update_watch(&bare).await.unwrap();
    assert_eq!(still_merged.seen_hashes.len(), 3);
    assert!(still_merged.seen_hashes.contains("a"));
    assert!(still_merged.seen_hashes.contains("c"));
}

#[tokio::test]
async fn listing_pages_have_exact_boundaries() {
    let store = temp_store().await;

    for i in 0..5 {
        let mut watch = sample_watch("alice", &format!("query {i}"));
        // Deterministic ordering for the assertions below.
        watch.created_at = format!("2026-03-0{}T00:00:00+00:00", i + 1);
        watch.updated_at = watch.created_at.clone();
        store.add_or_update_watch(&watch).await.unwrap();
    }
    store
        .add_or_update_watch(&sample_watch("bob", "other"))
        .await
        .unwrap();

    let owner = OwnerId::new("alice");

    let first = store.list_watches(Some(&owner), 0, 2).await.unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(first.page_count, 3);
    assert_eq!(first.items.len(), 2);
    assert!(first.has_next);
    assert!(!first.has_previous);
    assert_eq!(first.items[0].query, "query 0");

    let last = store.list_watches(Some(&owner), 2, 2).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert!(!last.has_next);
    assert!(last.has_previous);
    assert_eq!(last.items[0].query, "query 4");

    let past_end = store.list_watches(Some(&owner), 7, 2).await.unwrap();
    assert!(past_end.items.is_empty());
    assert!(!past_end.has_next);
    assert!(past_end.has_previous);

    let everyone = store.list_watches(None, 0, 10).await.unwrap();
    assert_eq!(everyone.total, 6);
}

#[tokio::test]
async fn delete_is_scoped_to_the_owner() {
    let store = temp_store().await;

    let watch = sample_watch("alice", "spy x family");
    store.add_or_update_watch(&watch).await.unwrap();

    let wrong_owner = store
        .remove_watch(&OwnerId::new("mallory"), &watch.id)
        .await
        .unwrap();
    assert!(wrong_owner.is_none());

    let removed = store
        .remove_watch(&OwnerId::new("alice"), &watch.id)
        .await
        .unwrap()
        .expect("watch should be removed");
    assert_eq!(removed.query, "spy x family");

    let again = store
        .remove_watch(&OwnerId::new("alice"), &watch.id)
        .await
        .unwrap();
    assert!(again.is_none());

    assert_eq!(store.list_watches(None, 0, 10).await.unwrap().total, 0);
}

#[tokio::test]
async fn get_watch_round_trips_all_parameters() {
    let store = temp_store().await;

    let mut watch = sample_watch("alice", "one punch man");
    watch.uploader = Some("subsplease".to_string());
    watch.seen_hashes.insert("h0".to_string());
    store.add_or_update_watch(&watch).await.unwrap();

    let loaded = store.get_watch(&watch.id).await.unwrap().expect("stored");
    assert_eq!(loaded.query, "one punch man");
    assert_eq!(loaded.filter, Some(NyaaFilter::NoRemakes));
    assert_eq!(loaded.category, Some(NyaaCategory::AnimeEnglishTranslated));
    assert_eq!(loaded.uploader.as_deref(), Some("subsplease"));
    assert!(loaded.seen_hashes.contains("h0"));
}

#[tokio::test]
async fn user_registry_is_the_owner_directory() {
    let store = temp_store().await;

    store
        .add_or_update_user(&OwnerId::new("alice"), Some("Alice"))
        .await
        .unwrap();
    store
        .add_or_update_user(&OwnerId::new("bob"), None)
        .await
        .unwrap();
    // Re-registering must not duplicate the owner.
    let refreshed = store
        .add_or_update_user(&OwnerId::new("alice"), Some("Alice A."))
        .await
        .unwrap();
    assert_eq!(refreshed.display_name.as_deref(), Some("Alice A."));

    let ids = store.list_user_ids().await.unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&OwnerId::new("alice")));
    assert!(ids.contains(&OwnerId::new("bob")));
}
