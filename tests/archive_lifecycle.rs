mod common;

use chat_delivery_service::models::{ContentType, ConversationKey};
use chat_delivery_service::services::{
    ActivityService, MessageService, PageRequest, ReadMerger, SendPipeline, SendRequest,
};
use chat_delivery_service::models::{ActivityEntry, ActivityKind};
use chat_delivery_service::store::Ledger;
use chat_delivery_service::workers::Archiver;
use chrono::{Duration, Utc};
use uuid::Uuid;

fn dm_key(a: Uuid, b: Uuid) -> ConversationKey {
    ConversationKey::direct(a, b).unwrap()
}

#[tokio::test]
async fn archived_messages_read_back_identically() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let key = dm_key(alice, bob);
    let conversation = key.to_string();

    let stale = Utc::now() - Duration::days(40);
    for (i, text) in ["old one", "old two", "old three"].iter().enumerate() {
        h.ledger.seed_message(common::seeded_message(
            &conversation,
            alice,
            text,
            stale + Duration::minutes(i as i64),
        ));
    }

    let summary = Archiver::run_once(&h.state).await.unwrap();
    assert_eq!(summary.units_ok, 1);
    assert_eq!(summary.messages_archived, 3);

    // Hot tier emptied, one blob written, marker present.
    assert_eq!(h.ledger.message_count(), 0);
    assert_eq!(h.cold.object_count(), 1);
    let month = stale.format("%Y-%m").to_string();
    assert!(h
        .ledger
        .archive_marker(&conversation, &month)
        .await
        .unwrap()
        .is_some());

    // The merged read serves the same content from cold storage.
    let page = ReadMerger::page(&h.state, PageRequest::first_page(key))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;
    let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["old three", "old two", "old one"]);
    assert!(page.iter().all(|m| m.seen_by == vec![alice]));
}

#[tokio::test]
async fn reactions_after_archival_overlay_on_reads() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let key = dm_key(alice, bob);
    let conversation = key.to_string();

    let old = common::seeded_message(
        &conversation,
        alice,
        "cold but reactable",
        Utc::now() - Duration::days(45),
    );
    let message_id = old.id;
    h.ledger.seed_message(old);
    Archiver::run_once(&h.state).await.unwrap();

    // The hot row is gone, so this lands in the metadata store blind.
    MessageService::add_reaction(&h.state, &conversation, message_id, bob, "🔥")
        .await
        .unwrap();

    let page = ReadMerger::page(&h.state, PageRequest::first_page(key))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].reactions.len(), 1);
    assert_eq!(page[0].reactions[0].emoji, "🔥");
    assert_eq!(page[0].reactions[0].user_id, bob);
}

#[tokio::test]
async fn deleted_archived_messages_disappear_from_reads() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let key = dm_key(alice, bob);
    let conversation = key.to_string();

    let stale = Utc::now() - Duration::days(40);
    let keep = common::seeded_message(&conversation, alice, "keep", stale);
    let drop = common::seeded_message(&conversation, alice, "drop", stale + Duration::minutes(1));
    let drop_id = drop.id;
    h.ledger.seed_message(keep);
    h.ledger.seed_message(drop);
    Archiver::run_once(&h.state).await.unwrap();

    MessageService::delete(&h.state, &conversation, drop_id, alice)
        .await
        .unwrap();

    let page = ReadMerger::page(&h.state, PageRequest::first_page(key))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].content, "keep");
}

#[tokio::test]
async fn archiving_twice_is_a_noop() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let conversation = dm_key(alice, bob).to_string();

    h.ledger.seed_message(common::seeded_message(
        &conversation,
        alice,
        "once",
        Utc::now() - Duration::days(40),
    ));

    let first = Archiver::run_once(&h.state).await.unwrap();
    assert_eq!(first.units_ok, 1);

    let second = Archiver::run_once(&h.state).await.unwrap();
    assert_eq!(second.units_ok, 0);
    assert_eq!(second.messages_archived, 0);
    assert_eq!(h.cold.object_count(), 1);
}

#[tokio::test]
async fn failed_archive_leaves_rows_hot_for_the_next_tick() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let conversation = dm_key(alice, bob).to_string();

    h.ledger.seed_message(common::seeded_message(
        &conversation,
        alice,
        "stubborn",
        Utc::now() - Duration::days(40),
    ));

    h.cold.fail_puts(true);
    let failed = Archiver::run_once(&h.state).await.unwrap();
    assert_eq!(failed.units_failed, 1);
    assert_eq!(failed.units_ok, 0);
    assert_eq!(h.ledger.message_count(), 1); // nothing purged

    h.cold.fail_puts(false);
    let retried = Archiver::run_once(&h.state).await.unwrap();
    assert_eq!(retried.units_ok, 1);
    assert_eq!(h.ledger.message_count(), 0);
}

#[tokio::test]
async fn expired_rows_split_into_monthly_blobs() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let conversation = dm_key(alice, bob).to_string();

    let near = Utc::now() - Duration::days(35);
    let far = Utc::now() - Duration::days(70);
    h.ledger
        .seed_message(common::seeded_message(&conversation, alice, "near", near));
    h.ledger
        .seed_message(common::seeded_message(&conversation, alice, "far", far));

    let summary = Archiver::run_once(&h.state).await.unwrap();
    assert_eq!(summary.units_ok, 2);

    let keys = h.cold.object_keys();
    assert!(keys
        .iter()
        .any(|k| k.contains(&near.format("%Y-%m").to_string())));
    assert!(keys
        .iter()
        .any(|k| k.contains(&far.format("%Y-%m").to_string())));
}

#[tokio::test]
async fn pages_merge_hot_and_cold_newest_first() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let key = dm_key(alice, bob);
    let conversation = key.to_string();

    let stale = Utc::now() - Duration::days(40);
    h.ledger
        .seed_message(common::seeded_message(&conversation, alice, "cold a", stale));
    h.ledger.seed_message(common::seeded_message(
        &conversation,
        alice,
        "cold b",
        stale + Duration::minutes(1),
    ));
    Archiver::run_once(&h.state).await.unwrap();

    SendPipeline::send(&h.state, SendRequest::text(alice, bob, "hot a"))
        .await
        .unwrap();
    SendPipeline::send(&h.state, SendRequest::text(alice, bob, "hot b"))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;

    let page = ReadMerger::page(&h.state, PageRequest::first_page(key))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;
    let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hot b", "hot a", "cold b", "cold a"]);
}

#[tokio::test]
async fn cold_reads_fill_and_reuse_the_blob_cache() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let key = dm_key(alice, bob);
    let conversation = key.to_string();

    let stale = Utc::now() - Duration::days(40);
    h.ledger
        .seed_message(common::seeded_message(&conversation, alice, "cached", stale));
    Archiver::run_once(&h.state).await.unwrap();

    let first = ReadMerger::page(&h.state, PageRequest::first_page(key.clone()))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;
    assert_eq!(first.len(), 1);

    let cache_key = format!("archive:{conversation}:{}", stale.format("%Y-%m"));
    assert!(h.cache.contains(&cache_key));

    let second = ReadMerger::page(&h.state, PageRequest::first_page(key))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].content, "cached");
}

#[tokio::test]
async fn first_group_page_weaves_in_activity() {
    let h = common::harness();
    let group_id = Uuid::new_v4();
    let key = ConversationKey::group(group_id).unwrap();
    let conversation = key.to_string();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    h.ledger.seed_message(common::seeded_message(
        &conversation,
        alice,
        "welcome",
        Utc::now() - Duration::minutes(10),
    ));
    ActivityService::record(
        &h.state,
        ActivityEntry::new(
            group_id,
            ActivityKind::MemberAdded,
            alice,
            Some(bob),
            "{actor} added {target}",
        ),
    )
    .await
    .unwrap();
    h.state.tasks.wait_idle().await;

    let page = ReadMerger::page(&h.state, PageRequest::first_page(key.clone()))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;
    assert_eq!(page.len(), 2);
    let system = page
        .iter()
        .find(|m| m.content_type == ContentType::System)
        .unwrap();
    assert!(system.content.contains(&alice.to_string()));
    assert!(system.content.contains(&bob.to_string()));
    // Synthetic events sort with real messages; the newer event leads.
    assert_eq!(page[0].content_type, ContentType::System);

    // Later pages stay synthetic-free.
    let older = ReadMerger::page(
        &h.state,
        PageRequest {
            conversation: key,
            before: Some(Utc::now() - Duration::minutes(5)),
            limit: None,
            marketplace: false,
        },
    )
    .await
    .unwrap();
    h.state.tasks.wait_idle().await;
    assert!(older.iter().all(|m| m.content_type != ContentType::System));
}

#[tokio::test]
async fn marketplace_flag_without_product_survives_archival() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let key = dm_key(alice, bob);
    let conversation = key.to_string();

    // Flagged at compose time with no product reference attached.
    let mut listing = common::seeded_message(
        &conversation,
        alice,
        "handmade, no listing",
        Utc::now() - Duration::days(40),
    );
    listing.is_marketplace = true;
    h.ledger.seed_message(listing);

    let market_req = PageRequest {
        conversation: key.clone(),
        before: None,
        limit: None,
        marketplace: true,
    };

    let hot = ReadMerger::page(&h.state, market_req.clone()).await.unwrap();
    h.state.tasks.wait_idle().await;
    assert_eq!(hot.len(), 1);

    Archiver::run_once(&h.state).await.unwrap();

    // Still on the marketplace page, still absent from the social page.
    let market = ReadMerger::page(&h.state, market_req).await.unwrap();
    h.state.tasks.wait_idle().await;
    assert_eq!(market.len(), 1);
    assert_eq!(market[0].content, "handmade, no listing");
    assert!(market[0].is_marketplace);

    let plain = ReadMerger::page(&h.state, PageRequest::first_page(key))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;
    assert!(plain.is_empty());
}

#[tokio::test]
async fn marker_count_tracks_blob_merges() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let conversation = dm_key(alice, bob).to_string();
    let stale = Utc::now() - Duration::days(40);
    let month = stale.format("%Y-%m").to_string();

    h.ledger
        .seed_message(common::seeded_message(&conversation, alice, "early", stale));
    Archiver::run_once(&h.state).await.unwrap();
    let marker = h
        .ledger
        .archive_marker(&conversation, &month)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(marker.message_count, 1);

    // A late row for the same month merges into the existing blob; the
    // marker must follow the blob.
    h.ledger.seed_message(common::seeded_message(
        &conversation,
        alice,
        "late",
        stale + Duration::minutes(1),
    ));
    Archiver::run_once(&h.state).await.unwrap();
    let marker = h
        .ledger
        .archive_marker(&conversation, &month)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(marker.message_count, 2);
}

#[tokio::test]
async fn full_hot_pages_never_touch_the_archive_index() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let key = dm_key(alice, bob);

    SendPipeline::send(&h.state, SendRequest::text(alice, bob, "fresh"))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;

    let page = ReadMerger::page(
        &h.state,
        PageRequest {
            conversation: key,
            before: None,
            limit: Some(1),
            marketplace: false,
        },
    )
    .await
    .unwrap();
    h.state.tasks.wait_idle().await;
    assert_eq!(page.len(), 1);
    assert!(h.ledger.marker_reads().is_empty());
}

#[tokio::test]
async fn short_pages_probe_cold_months_from_the_retention_boundary() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let key = dm_key(alice, bob);

    // A young conversation: one recent message, nothing archived.
    SendPipeline::send(&h.state, SendRequest::text(alice, bob, "only one"))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;

    let page = ReadMerger::page(&h.state, PageRequest::first_page(key))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;
    assert_eq!(page.len(), 1);

    // The scan starts at the retention boundary's month, never probing
    // the newer months archives cannot reach, and stays bounded.
    let boundary_month = (Utc::now() - Duration::days(30)).format("%Y-%m").to_string();
    let reads = h.ledger.marker_reads();
    assert_eq!(reads.len(), 3);
    assert_eq!(reads[0].1, boundary_month);
}

#[tokio::test]
async fn marketplace_pages_stay_separate_across_tiers() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let key = dm_key(alice, bob);
    let conversation = key.to_string();

    // One archived marketplace message, one archived plain message.
    let stale = Utc::now() - Duration::days(40);
    let mut listing = common::seeded_message(&conversation, alice, "buy my lamp", stale);
    listing.product_id = Some(Uuid::new_v4());
    listing.is_marketplace = true;
    h.ledger.seed_message(listing);
    h.ledger.seed_message(common::seeded_message(
        &conversation,
        alice,
        "unrelated chat",
        stale + Duration::minutes(1),
    ));
    Archiver::run_once(&h.state).await.unwrap();

    let plain = ReadMerger::page(&h.state, PageRequest::first_page(key.clone()))
        .await
        .unwrap();
    h.state.tasks.wait_idle().await;
    assert_eq!(plain.len(), 1);
    assert_eq!(plain[0].content, "unrelated chat");

    let market = ReadMerger::page(
        &h.state,
        PageRequest {
            conversation: key,
            before: None,
            limit: None,
            marketplace: true,
        },
    )
    .await
    .unwrap();
    h.state.tasks.wait_idle().await;
    assert_eq!(market.len(), 1);
    assert_eq!(market[0].content, "buy my lamp");
    assert!(market[0].is_marketplace);
}
