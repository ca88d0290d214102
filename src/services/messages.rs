//! Per-message mutations and the small read surfaces around them.
//!
//! Mutations prefer the hot row; when it has been archived the same change
//! applies blindly to the metadata store, keyed by (conversation, message).
//! Authorization for the blind path happens earlier in the call chain.

use crate::archive::archive_cache_key;
use crate::error::{AppError, AppResult};
use crate::models::{InboxEntry, Message, MutationNotice, NoticeType, Reaction};
use crate::state::AppState;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Month partition of a v7 message id, recovered from its embedded
/// timestamp. Lets blind mutations invalidate the right archive blob
/// without a content read.
fn month_of_message_id(message_id: Uuid) -> Option<String> {
    let ts = message_id.get_timestamp()?;
    let (secs, nanos) = ts.to_unix();
    let at: DateTime<Utc> = DateTime::from_timestamp(secs as i64, nanos)?;
    Some(at.format("%Y-%m").to_string())
}

pub struct MessageService;

impl MessageService {
    /// Idempotent set insertion; seeing twice yields one entry.
    pub async fn mark_seen(
        state: &AppState,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let hot = state
            .ledger
            .mark_seen(conversation, message_id, user_id)
            .await?;
        if !hot {
            state
                .metadata
                .mark_seen(conversation, message_id, user_id)
                .await?;
        }
        Ok(())
    }

    pub async fn mark_delivered(
        state: &AppState,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let hot = state
            .ledger
            .mark_delivered(conversation, message_id, user_id)
            .await?;
        if !hot {
            state
                .metadata
                .mark_delivered(conversation, message_id, user_id)
                .await?;
        }
        Ok(())
    }

    /// The counter only supports increment, so the row is deleted rather
    /// than zeroed; the next send recreates it.
    pub async fn mark_conversation_seen(
        state: &AppState,
        conversation: &str,
        user_id: Uuid,
    ) -> AppResult<()> {
        state.unread.clear(user_id, conversation).await
    }

    pub async fn add_reaction(
        state: &AppState,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
        emoji: impl Into<String>,
    ) -> AppResult<()> {
        let reaction = Reaction {
            user_id,
            emoji: emoji.into(),
            at: Utc::now(),
        };
        let hot = state
            .ledger
            .add_reaction(conversation, message_id, &reaction)
            .await?;
        if !hot {
            state
                .metadata
                .add_reaction(conversation, message_id, &reaction)
                .await?;
        }
        Ok(())
    }

    /// Sender-only, inside a bounded window from creation. Archived rows
    /// are always past the window, so edit never needs the blind path.
    pub async fn edit(
        state: &AppState,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
        new_content: &str,
    ) -> AppResult<()> {
        if new_content.trim().is_empty() {
            return Err(AppError::InvalidMessage("edited content is empty".into()));
        }
        let message = state
            .ledger
            .get(conversation, message_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if message.sender_id != user_id {
            return Err(AppError::Unauthorized);
        }
        let max_edit_minutes = state.config.edit_window_minutes;
        if Utc::now() - message.created_at > ChronoDuration::minutes(max_edit_minutes) {
            return Err(AppError::EditWindowExpired { max_edit_minutes });
        }

        let updated = state
            .ledger
            .apply_edit(conversation, message_id, new_content)
            .await?;
        if !updated {
            return Err(AppError::NotFound);
        }

        Self::publish_notice(state, conversation, message_id, NoticeType::MessageEdited).await;
        Ok(())
    }

    /// Always soft: content replaced with the deletion marker, media
    /// cleared, row identity preserved. Falls through to a blind metadata
    /// tombstone once the content is cold.
    pub async fn delete(
        state: &AppState,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        match state.ledger.get(conversation, message_id).await? {
            Some(message) => {
                if message.sender_id != user_id {
                    return Err(AppError::Unauthorized);
                }
                state.ledger.soft_delete(conversation, message_id).await?;
            }
            None => {
                // Content has gone cold; no cheap ownership read exists, so
                // the mutation applies keyed by (conversation, message) and
                // authorization is the caller's responsibility.
                state.metadata.set_deleted(conversation, message_id).await?;
            }
        }

        Self::invalidate_archive_cache(state, conversation, message_id);
        Self::publish_notice(state, conversation, message_id, NoticeType::MessageDeleted).await;
        Ok(())
    }

    pub async fn inbox(state: &AppState, user_id: Uuid) -> AppResult<Vec<InboxEntry>> {
        state.ledger.inbox_for(user_id).await
    }

    pub async fn unread_counts(
        state: &AppState,
        user_id: Uuid,
    ) -> AppResult<HashMap<String, i64>> {
        state.unread.all(user_id).await
    }

    /// Deliberately degraded: the hot tier has no search index. Callers
    /// must treat the empty page as "search unavailable", not "no matches".
    pub async fn search(
        _state: &AppState,
        conversation: &str,
        query: &str,
    ) -> AppResult<Vec<Message>> {
        tracing::warn!(%conversation, %query, "message search is stubbed; returning empty page");
        Ok(Vec::new())
    }

    async fn publish_notice(
        state: &AppState,
        conversation: &str,
        message_id: Uuid,
        notice_type: NoticeType,
    ) {
        let notice = MutationNotice {
            notice_type,
            conversation_id: conversation.to_string(),
            message_id,
        };
        match serde_json::to_string(&notice) {
            Ok(payload) => {
                if let Err(e) = state.broadcaster.publish(conversation, &payload).await {
                    tracing::warn!(%conversation, %message_id, error = %e, "mutation notice publish failed");
                }
            }
            Err(e) => tracing::warn!(%message_id, error = %e, "encode mutation notice failed"),
        }
    }

    fn invalidate_archive_cache(state: &AppState, conversation: &str, message_id: Uuid) {
        let Some(month) = month_of_message_id(message_id) else {
            return;
        };
        let cache = state.cache.clone();
        let key = archive_cache_key(conversation, &month);
        state.tasks.spawn("archive_cache_invalidate", async move {
            cache.delete(&key).await
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v7_id_month_recovery() {
        let id = Uuid::now_v7();
        let month = month_of_message_id(id).unwrap();
        assert_eq!(month, Utc::now().format("%Y-%m").to_string());
    }

    #[test]
    fn v4_id_has_no_embedded_month() {
        assert!(month_of_message_id(Uuid::new_v4()).is_none());
    }
}
