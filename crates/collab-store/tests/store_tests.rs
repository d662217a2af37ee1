mod common;

use std::sync::Arc;

use collab_store::{CollabStore, StoreConfig, StoreError};
use common::{activity, ids, open_store, text};

#[tokio::test]
async fn two_messages_end_to_end() {
    let (_dir, store) = open_store(|_| {}).await;

    store.store_message(text("m1", "P1", "u1", 100, "hello")).await.unwrap();
    store.store_message(text("m2", "P1", "u2", 200, "world")).await.unwrap();

    let page = store.get_project_messages("P1", 10, 0, None).await.unwrap();
    assert_eq!(ids(&page), vec!["m2", "m1"]);

    let thread = store.get_thread("P1").await.unwrap().unwrap();
    assert_eq!(thread.id, "thread_P1");
    assert_eq!(thread.participants, vec!["u1", "u2"]);
    assert_eq!(thread.message_count, 2);
    assert_eq!(thread.last_message_id, "m2");
    assert_eq!(thread.last_message_timestamp, 200);
}

#[tokio::test]
async fn storing_same_id_twice_keeps_one_record() {
    let (_dir, store) = open_store(|_| {}).await;

    store.store_message(text("m1", "P1", "u1", 100, "first")).await.unwrap();
    store.store_message(text("m1", "P1", "u1", 100, "second")).await.unwrap();

    let page = store.get_project_messages("P1", 10, 0, None).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].content, "second");

    let stats = store.get_storage_stats().await.unwrap();
    assert_eq!(stats.total_messages, 1);

    let thread = store.get_thread("P1").await.unwrap().unwrap();
    assert_eq!(thread.message_count, 1);
}

#[tokio::test]
async fn messages_come_back_newest_first() {
    let (_dir, store) = open_store(|_| {}).await;
    for i in 0..30 {
        store
            .store_message(text(&format!("m{}", i), "P1", "u1", 1_000 + i * 10, "x"))
            .await
            .unwrap();
    }

    let page = store.get_project_messages("P1", 30, 0, None).await.unwrap();
    assert_eq!(page.len(), 30);
    assert!(page.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
}

#[tokio::test]
async fn offset_pages_concatenate() {
    let (_dir, store) = open_store(|_| {}).await;
    for i in 0..25 {
        store
            .store_message(text(&format!("m{:02}", i), "P1", "u1", i, "x"))
            .await
            .unwrap();
    }

    let first = store.get_project_messages("P1", 10, 0, None).await.unwrap();
    let second = store.get_project_messages("P1", 10, 10, None).await.unwrap();
    let both = store.get_project_messages("P1", 20, 0, None).await.unwrap();

    let mut joined = first.clone();
    joined.extend(second);
    assert_eq!(joined, both);
}

#[tokio::test]
async fn before_cursor_loads_older_messages() {
    let (_dir, store) = open_store(|_| {}).await;
    for i in 1..=6 {
        store
            .store_message(text(&format!("m{}", i), "P1", "u1", i * 100, "x"))
            .await
            .unwrap();
    }

    let newest = store.get_project_messages("P1", 3, 0, None).await.unwrap();
    assert_eq!(ids(&newest), vec!["m6", "m5", "m4"]);

    let cursor = newest.last().unwrap().timestamp;
    let older = store.get_project_messages("P1", 3, 0, Some(cursor)).await.unwrap();
    assert_eq!(ids(&older), vec!["m3", "m2", "m1"]);
}

#[tokio::test]
async fn partitions_do_not_mix() {
    let (_dir, store) = open_store(|_| {}).await;
    store.store_message(text("a", "P1", "u1", 1, "x")).await.unwrap();
    store.store_message(text("b", "P2", "u1", 2, "x")).await.unwrap();

    let p1 = store.get_project_messages("P1", 10, 0, None).await.unwrap();
    assert_eq!(ids(&p1), vec!["a"]);
    assert!(store.get_project_messages("nope", 10, 0, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn soft_delete_hides_but_keeps_the_row() {
    let (_dir, store) = open_store(|_| {}).await;
    store.store_message(text("m1", "P1", "u1", 100, "keep")).await.unwrap();
    store.store_message(text("m2", "P1", "u1", 200, "drop")).await.unwrap();
    let before = store.get_storage_stats().await.unwrap().total_messages;

    store.delete_message("m2").await.unwrap();

    let page = store.get_project_messages("P1", 10, 0, None).await.unwrap();
    assert_eq!(ids(&page), vec!["m1"]);
    assert_eq!(store.get_storage_stats().await.unwrap().total_messages, before);

    let deleted = store.get_message("m2").await.unwrap().unwrap();
    assert!(deleted.deleted);
    let deleted_at = deleted.deleted_at.unwrap();
    assert!(deleted_at >= 200);

    // Deleting again keeps the first marker.
    store.delete_message("m2").await.unwrap();
    let again = store.get_message("m2").await.unwrap().unwrap();
    assert_eq!(again.deleted_at, Some(deleted_at));

    let thread = store.get_thread("P1").await.unwrap().unwrap();
    assert_eq!(thread.message_count, 2);
}

#[tokio::test]
async fn edit_replaces_content_and_marks_edited() {
    let (_dir, store) = open_store(|_| {}).await;
    store.store_message(text("m1", "P1", "u1", 100, "typo")).await.unwrap();

    store.edit_message("m1", "fixed").await.unwrap();

    let msg = store.get_message("m1").await.unwrap().unwrap();
    assert_eq!(msg.content, "fixed");
    assert!(msg.edited);
    assert!(msg.edited_at.unwrap() >= msg.timestamp);

    let thread = store.get_thread("P1").await.unwrap().unwrap();
    assert_eq!(thread.message_count, 1);
    assert_eq!(thread.last_message_id, "m1");
}

#[tokio::test]
async fn mutating_unknown_messages_is_not_found() {
    let (_dir, store) = open_store(|_| {}).await;

    let err = store.edit_message("ghost", "x").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }), "got {:?}", err);

    let err = store.delete_message("ghost").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }), "got {:?}", err);

    store.store_message(text("m1", "P1", "u1", 100, "x")).await.unwrap();
    store.delete_message("m1").await.unwrap();
    let err = store.edit_message("m1", "revive").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }), "got {:?}", err);
}

#[tokio::test]
async fn message_ids_stay_in_their_partition() {
    let (_dir, store) = open_store(|_| {}).await;
    store.store_message(text("m1", "P1", "u1", 100, "first")).await.unwrap();
    store.store_message(text("m2", "P2", "u2", 200, "second")).await.unwrap();

    let err = store.store_message(text("m1", "P2", "u1", 300, "moved")).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidRecord(_)), "got {:?}", err);

    let p1 = store.get_thread("P1").await.unwrap().unwrap();
    assert_eq!((p1.message_count, p1.last_message_id.as_str(), p1.last_message_timestamp), (1, "m1", 100));
    let p2 = store.get_thread("P2").await.unwrap().unwrap();
    assert_eq!((p2.message_count, p2.last_message_id.as_str()), (1, "m2"));

    let stored = store.get_message("m1").await.unwrap().unwrap();
    assert_eq!((stored.partition_id.as_str(), stored.content.as_str()), ("P1", "first"));
    let p2_page = store.get_project_messages("P2", 10, 0, None).await.unwrap();
    assert_eq!(ids(&p2_page), vec!["m2"]);
}

#[tokio::test]
async fn invalid_records_are_rejected() {
    let (_dir, store) = open_store(|_| {}).await;

    let err = store.store_message(text("", "P1", "u1", 1, "x")).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidRecord(_)));

    let mut edited = text("m1", "P1", "u1", 100, "x");
    edited.edited = true;
    let err = store.store_message(edited).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidRecord(_)));

    let err = store.store_activity(activity("", "P1", 1)).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidRecord(_)));

    assert_eq!(store.get_storage_stats().await.unwrap().total_messages, 0);
}

#[tokio::test]
async fn thread_tracks_participants_and_last_message() {
    let (_dir, store) = open_store(|_| {}).await;
    store.store_message(text("1", "P", "A", 10, "x")).await.unwrap();
    store.store_message(text("2", "P", "B", 20, "x")).await.unwrap();
    store.store_message(text("3", "P", "A", 30, "x")).await.unwrap();

    let thread = store.get_thread("P").await.unwrap().unwrap();
    let mut participants = thread.participants.clone();
    participants.sort();
    assert_eq!(participants, vec!["A", "B"]);
    assert_eq!(thread.message_count, 3);
    assert_eq!(thread.last_message_id, "3");
}

#[tokio::test]
async fn unread_counts_and_mark_as_read() {
    let (_dir, store) = open_store(|_| {}).await;
    store.store_message(text("1", "P", "A", 10, "x")).await.unwrap();
    store.store_message(text("2", "P", "B", 20, "x")).await.unwrap();
    store.store_message(text("3", "P", "A", 30, "x")).await.unwrap();
    store.store_message(text("4", "P", "A", 40, "x")).await.unwrap();

    assert_eq!(store.get_unread_count("P", "B").await.unwrap(), 2);
    assert_eq!(store.get_unread_count("P", "A").await.unwrap(), 1);

    store.mark_messages_as_read("P", "B", None).await.unwrap();
    assert_eq!(store.get_unread_count("P", "B").await.unwrap(), 0);

    store.mark_messages_as_read("P", "B", Some(35)).await.unwrap();
    assert_eq!(store.get_unread_count("P", "B").await.unwrap(), 1);

    assert_eq!(store.get_unread_count("P", "nobody").await.unwrap(), 0);
    assert_eq!(store.get_unread_count("missing", "A").await.unwrap(), 0);
    store.mark_messages_as_read("missing", "A", None).await.unwrap();
}

#[tokio::test]
async fn list_threads_orders_by_last_update() {
    let (_dir, store) = open_store(|_| {}).await;
    store.store_message(text("a", "old", "u1", 10, "x")).await.unwrap();
    store.store_message(text("b", "new", "u1", 20, "x")).await.unwrap();

    let threads = store.list_threads(10).await.unwrap();
    let partitions: Vec<_> = threads.iter().map(|t| t.partition_id.as_str()).collect();
    assert_eq!(partitions, vec!["new", "old"]);
}

#[tokio::test]
async fn activities_page_newest_first() {
    let (_dir, store) = open_store(|_| {}).await;
    for i in 1..=5 {
        store.store_activity(activity(&format!("a{}", i), "P1", i)).await.unwrap();
    }
    store.store_activity(activity("other", "P2", 99)).await.unwrap();

    let page = store.get_project_activities("P1", 2, 1).await.unwrap();
    let got: Vec<_> = page.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(got, vec!["a4", "a3"]);

    let stats = store.get_storage_stats().await.unwrap();
    assert_eq!(stats.total_activities, 6);
}

#[tokio::test]
async fn storage_stats_reflect_contents() {
    let (_dir, store) = open_store(|_| {}).await;
    let empty = store.get_storage_stats().await.unwrap();
    assert_eq!(empty.total_messages, 0);
    assert_eq!(empty.oldest_message, None);
    assert_eq!(empty.last_cleanup, None);

    store.store_message(text("m1", "P1", "u1", 100, "x")).await.unwrap();
    store.store_message(text("m2", "P2", "u1", 300, "x")).await.unwrap();
    store.store_activity(activity("a1", "P1", 50)).await.unwrap();

    let stats = store.get_storage_stats().await.unwrap();
    assert_eq!(stats.total_messages, 2);
    assert_eq!(stats.total_activities, 1);
    assert_eq!(stats.storage_used, 2 * 1000 + 500);
    assert_eq!(stats.oldest_message, Some(100));
    assert_eq!(stats.newest_message, Some(300));
}

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::in_dir(dir.path());

    let store = CollabStore::open(config.clone()).await.unwrap();
    store.store_message(text("m1", "P1", "u1", 100, "persist me")).await.unwrap();
    store.store_message(text("m2", "P1", "u2", 200, "me too")).await.unwrap();
    store.shutdown().await;

    let reopened = CollabStore::open(config).await.unwrap();
    let page = reopened.get_project_messages("P1", 10, 0, None).await.unwrap();
    assert_eq!(ids(&page), vec!["m2", "m1"]);

    let thread = reopened.get_thread("P1").await.unwrap().unwrap();
    assert_eq!(thread.message_count, 2);
    assert_eq!(reopened.get_unread_count("P1", "u1").await.unwrap(), 1);

    // Edits work for records that were never in this session's cache.
    reopened.edit_message("m1", "edited later").await.unwrap();
    assert!(reopened.get_message("m1").await.unwrap().unwrap().edited);
}

#[tokio::test]
async fn operations_after_shutdown_fail() {
    let (_dir, store) = open_store(|_| {}).await;
    assert!(store.is_open());

    store.shutdown().await;
    store.shutdown().await;
    assert!(!store.is_open());

    let err = store.store_message(text("m1", "P1", "u1", 1, "x")).await.unwrap_err();
    assert!(matches!(err, StoreError::NotInitialized));

    let err = store.get_project_messages("P1", 10, 0, None).await.unwrap_err();
    assert!(matches!(err, StoreError::NotInitialized));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_to_one_partition_lose_nothing() {
    let (_dir, store) = open_store(|_| {}).await;
    let store = Arc::new(store);

    let mut tasks = Vec::new();
    for i in 0..40 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let sender = format!("u{}", i % 4);
            store
                .store_message(text(&format!("m{}", i), "P1", &sender, i, "x"))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let thread = store.get_thread("P1").await.unwrap().unwrap();
    assert_eq!(thread.message_count, 40);
    assert_eq!(thread.participants.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_edits_to_one_message_apply_one_at_a_time() {
    let (_dir, store) = open_store(|_| {}).await;
    store.store_message(text("m1", "P1", "u1", 100, "v0")).await.unwrap();

    let mut tasks = Vec::new();
    for i in 1..=20 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move { store.edit_message("m1", format!("v{}", i)).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let msg = store.get_message("m1").await.unwrap().unwrap();
    assert!(msg.content.starts_with('v'));
    assert!(msg.edited);

    let thread = store.get_thread("P1").await.unwrap().unwrap();
    assert_eq!(thread.message_count, 1);
}
