//! Narrow store interfaces the pipeline is written against.
//!
//! Production wiring injects the Postgres/Redis/S3 implementations; tests
//! substitute the in-memory fakes from [`memory`] and assert on each stage
//! independently.

pub mod activity;
pub mod ledger;
pub mod memory;
pub mod metadata;
pub mod redis;
pub mod s3;

use crate::error::AppResult;
use crate::models::{ActivityEntry, ArchiveIndexEntry, InboxEntry, Message, MessageMetadata, Reaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Hot, per-conversation-partitioned message store plus the derived views
/// that must commit with it.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// All-or-nothing batch: the message row and the first inbox chunk.
    async fn append(&self, message: &Message, inbox: &[InboxEntry]) -> AppResult<()>;

    /// Best-effort inbox chunk upsert; independent of other chunks.
    async fn upsert_inbox(&self, entries: &[InboxEntry]) -> AppResult<()>;

    /// Cursor-based range scan, newest first. `before` is exclusive.
    async fn window(
        &self,
        conversation: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
        marketplace: bool,
    ) -> AppResult<Vec<Message>>;

    async fn get(&self, conversation: &str, message_id: Uuid) -> AppResult<Option<Message>>;

    /// Idempotent set insertion. Returns false when the hot row is gone
    /// (archived) and the mutation must fall through to the metadata store.
    async fn mark_seen(&self, conversation: &str, message_id: Uuid, user_id: Uuid)
        -> AppResult<bool>;
    async fn mark_delivered(
        &self,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool>;
    async fn add_reaction(
        &self,
        conversation: &str,
        message_id: Uuid,
        reaction: &Reaction,
    ) -> AppResult<bool>;
    async fn apply_edit(&self, conversation: &str, message_id: Uuid, content: &str)
        -> AppResult<bool>;
    async fn soft_delete(&self, conversation: &str, message_id: Uuid) -> AppResult<bool>;

    /// Archiver scan: every hot row created before `cutoff`.
    async fn older_than(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Message>>;

    /// Remove hot rows whose content has moved cold.
    async fn purge(&self, conversation: &str, message_ids: &[Uuid]) -> AppResult<u64>;

    async fn archive_marker(
        &self,
        conversation: &str,
        month: &str,
    ) -> AppResult<Option<ArchiveIndexEntry>>;
    async fn put_archive_marker(&self, entry: &ArchiveIndexEntry) -> AppResult<()>;

    async fn inbox_for(&self, user_id: Uuid) -> AppResult<Vec<InboxEntry>>;

    async fn members(&self, conversation: &str) -> AppResult<Vec<Uuid>>;
    async fn add_member(&self, conversation: &str, user_id: Uuid) -> AppResult<()>;
}

/// Mutable per-message fields, decoupled from immutable content. Mutations
/// are keyed only by (conversation, message id) and apply blind once the
/// content is cold; authorization happens earlier in the call chain.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put_many(
        &self,
        conversation: &str,
        entries: &[(Uuid, MessageMetadata)],
    ) -> AppResult<()>;
    async fn get_many(
        &self,
        conversation: &str,
        message_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, MessageMetadata>>;
    async fn mark_seen(&self, conversation: &str, message_id: Uuid, user_id: Uuid) -> AppResult<()>;
    async fn mark_delivered(
        &self,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()>;
    async fn add_reaction(
        &self,
        conversation: &str,
        message_id: Uuid,
        reaction: &Reaction,
    ) -> AppResult<()>;
    async fn set_deleted(&self, conversation: &str, message_id: Uuid) -> AppResult<()>;
    async fn set_edited(&self, conversation: &str, message_id: Uuid) -> AppResult<()>;
}

/// Compressed blob archive (object storage).
#[async_trait]
pub trait ColdStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> AppResult<()>;
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;
}

/// Pub/sub side channel; delivery ahead of durable commit by design.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, conversation: &str, payload: &str) -> AppResult<()>;
}

/// Increment-only unread counters. "Mark conversation seen" removes the
/// row; the next send recreates it.
#[async_trait]
pub trait UnreadStore: Send + Sync {
    async fn incr(&self, user_id: Uuid, conversation: &str) -> AppResult<()>;
    async fn clear(&self, user_id: Uuid, conversation: &str) -> AppResult<()>;
    async fn get(&self, user_id: Uuid, conversation: &str) -> AppResult<Option<i64>>;
    async fn all(&self, user_id: Uuid) -> AppResult<HashMap<String, i64>>;
}

/// Append-only group activity log.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(&self, entry: &ActivityEntry) -> AppResult<()>;
    async fn recent(&self, group_id: Uuid, limit: i64) -> AppResult<Vec<ActivityEntry>>;
    async fn prune(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

/// Short-TTL cache with best-effort invalidation.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()>;
    async fn delete(&self, key: &str) -> AppResult<()>;
}
