//! Shared harness: the full service state wired against in-memory fakes,
//! with typed handles kept for assertions and failure injection.

use chat_delivery_service::config::Config;
use chat_delivery_service::models::{ContentType, Message};
use chat_delivery_service::state::AppState;
use chat_delivery_service::store::memory::{
    MemoryActivityLog, MemoryBroadcaster, MemoryCache, MemoryColdStore, MemoryLedger,
    MemoryMetadataStore, MemoryUnreadStore,
};
use chat_delivery_service::tasks::BackgroundTasks;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct TestHarness {
    pub state: AppState,
    pub ledger: Arc<MemoryLedger>,
    pub metadata: Arc<MemoryMetadataStore>,
    pub cold: Arc<MemoryColdStore>,
    pub broadcaster: Arc<MemoryBroadcaster>,
    pub unread: Arc<MemoryUnreadStore>,
    pub activity: Arc<MemoryActivityLog>,
    pub cache: Arc<MemoryCache>,
}

pub fn harness() -> TestHarness {
    let ledger = Arc::new(MemoryLedger::new());
    let metadata = Arc::new(MemoryMetadataStore::new());
    let cold = Arc::new(MemoryColdStore::new());
    let broadcaster = Arc::new(MemoryBroadcaster::new());
    let unread = Arc::new(MemoryUnreadStore::new());
    let activity = Arc::new(MemoryActivityLog::new());
    let cache = Arc::new(MemoryCache::new());

    let state = AppState {
        ledger: ledger.clone(),
        metadata: metadata.clone(),
        cold: cold.clone(),
        broadcaster: broadcaster.clone(),
        unread: unread.clone(),
        activity: activity.clone(),
        cache: cache.clone(),
        tasks: BackgroundTasks::new(),
        config: Arc::new(Config::test_defaults()),
    };

    TestHarness {
        state,
        ledger,
        metadata,
        cold,
        broadcaster,
        unread,
        activity,
        cache,
    }
}

/// A plain hot-ledger row with a chosen timestamp, for seeding directly.
pub fn seeded_message(
    conversation: &str,
    sender_id: Uuid,
    content: &str,
    created_at: DateTime<Utc>,
) -> Message {
    Message {
        conversation_id: conversation.to_string(),
        id: Uuid::now_v7(),
        sender_id,
        receiver_id: None,
        group_id: None,
        content: content.to_string(),
        content_type: ContentType::Text,
        media_urls: vec![],
        reactions: vec![],
        seen_by: vec![sender_id],
        delivered_to: vec![sender_id],
        is_deleted: false,
        deleted_at: None,
        is_edited: false,
        edited_at: None,
        product_id: None,
        is_marketplace: false,
        created_at,
    }
}
