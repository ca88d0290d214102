//! Daily archiver: moves expired hot rows into monthly cold blobs.
//!
//! One unit of work is a (conversation, month) pair. Per unit, strictly in
//! order: upload the blob, copy mutable state to the metadata store, write
//! the index marker, purge the hot rows, drop the blob cache entry. A crash
//! between steps leaves rows hot and the next tick retries; re-uploading a
//! blob is an idempotent overwrite, so the retry merges rather than loses.

use crate::archive::{archive_cache_key, archive_object_key, decode_blob, encode_blob};
use crate::error::AppResult;
use crate::models::{ArchiveIndexEntry, ArchivedMessage, Message, MessageMetadata};
use crate::state::AppState;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ArchiveRunSummary {
    pub units_ok: usize,
    pub units_failed: usize,
    pub messages_archived: usize,
}

pub struct Archiver;

impl Archiver {
    pub async fn run_once(state: &AppState) -> AppResult<ArchiveRunSummary> {
        let cutoff = Utc::now() - ChronoDuration::days(state.config.retention_days);
        let expired = state.ledger.older_than(cutoff).await?;
        if expired.is_empty() {
            return Ok(ArchiveRunSummary::default());
        }

        let mut units: BTreeMap<(String, String), Vec<Message>> = BTreeMap::new();
        for message in expired {
            units
                .entry((message.conversation_id.clone(), message.archive_month()))
                .or_default()
                .push(message);
        }

        let mut summary = ArchiveRunSummary::default();
        for ((conversation, month), messages) in units {
            match Self::archive_unit(state, &conversation, &month, &messages).await {
                Ok(count) => {
                    crate::metrics::record_archive_unit("ok");
                    summary.units_ok += 1;
                    summary.messages_archived += count;
                }
                Err(e) => {
                    // One bad unit never blocks the rest of the run.
                    crate::metrics::record_archive_unit("error");
                    summary.units_failed += 1;
                    tracing::error!(%conversation, %month, error = %e, "archive unit failed");
                }
            }
        }
        Ok(summary)
    }

    async fn archive_unit(
        state: &AppState,
        conversation: &str,
        month: &str,
        messages: &[Message],
    ) -> AppResult<usize> {
        let object_key = archive_object_key(conversation, month);

        // A previous partial run (or late rows for an old month) may have
        // already written this blob; merge instead of clobbering.
        let mut records = match state.cold.get(&object_key).await? {
            Some(raw) => decode_blob(&raw)?,
            None => Vec::new(),
        };
        let known: std::collections::HashSet<Uuid> =
            records.iter().map(|r| r.message_id).collect();
        records.extend(
            messages
                .iter()
                .filter(|m| !known.contains(&m.id))
                .map(ArchivedMessage::from_message),
        );
        records.sort_by_key(|r| (r.created_at, r.message_id));

        let blob = encode_blob(&records)?;
        state.cold.put(&object_key, blob).await?;

        // Mutable state survives the move so post-archival mutations and
        // reads keep working.
        let metadata: Vec<(Uuid, MessageMetadata)> = messages
            .iter()
            .map(|m| (m.id, MessageMetadata::from_message(m)))
            .collect();
        state.metadata.put_many(conversation, &metadata).await?;

        state
            .ledger
            .put_archive_marker(&ArchiveIndexEntry {
                conversation_id: conversation.to_string(),
                month: month.to_string(),
                object_key: object_key.clone(),
                message_count: records.len() as i64,
                archived_at: Utc::now(),
            })
            .await?;

        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let purged = state.ledger.purge(conversation, &ids).await?;

        if let Err(e) = state.cache.delete(&archive_cache_key(conversation, month)).await {
            tracing::warn!(%conversation, %month, error = %e, "archive cache invalidation failed");
        }

        tracing::info!(
            %conversation,
            %month,
            archived = messages.len(),
            purged,
            blob_records = records.len(),
            "archived conversation month"
        );
        Ok(messages.len())
    }
}
