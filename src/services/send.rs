//! The send pipeline: Compose -> Validate -> OptimisticPublish -> Persist
//! -> {Committed | Compensate}.
//!
//! The broadcast deliberately runs ahead of the durable write; when the
//! persist batch fails, a tombstone carrying the same message id retracts
//! the phantom. Inbox fan-out past the first chunk is best-effort and
//! chunk-independent. Unread increments happen out-of-band after commit.

use crate::error::{AppError, AppResult};
use crate::models::{ContentType, ConversationKey, InboxEntry, Message};
use crate::state::AppState;
use chrono::Utc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub sender_id: Uuid,
    pub receiver_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub content: String,
    pub content_type: Option<ContentType>,
    pub media_urls: Vec<String>,
    pub product_id: Option<Uuid>,
    pub marketplace: bool,
}

impl SendRequest {
    pub fn text(sender_id: Uuid, receiver_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            receiver_id: Some(receiver_id),
            group_id: None,
            content: content.into(),
            content_type: Some(ContentType::Text),
            media_urls: vec![],
            product_id: None,
            marketplace: false,
        }
    }

    pub fn group_text(sender_id: Uuid, group_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            receiver_id: None,
            group_id: Some(group_id),
            content: content.into(),
            content_type: Some(ContentType::Text),
            media_urls: vec![],
            product_id: None,
            marketplace: false,
        }
    }
}

pub fn members_cache_key(conversation: &str) -> String {
    format!("members:{conversation}")
}

pub struct SendPipeline;

impl SendPipeline {
    pub async fn send(state: &AppState, req: SendRequest) -> AppResult<Message> {
        let key = Self::resolve(&req)?;
        let content_type = Self::validate(&req)?;
        let message = Self::compose(&key, &req, content_type);

        let recipients = Self::recipients(state, &key, req.sender_id).await?;

        // OptimisticPublish: subscribers see the message before it is
        // durable. A publish failure never fails the send.
        match serde_json::to_string(&message) {
            Ok(payload) => {
                if let Err(e) = state.broadcaster.publish(&message.conversation_id, &payload).await
                {
                    tracing::warn!(
                        conversation = %message.conversation_id,
                        message_id = %message.id,
                        error = %e,
                        "optimistic publish failed"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(message_id = %message.id, error = %e, "encode broadcast payload failed");
            }
        }

        match Self::persist(state, &message, &recipients).await {
            Ok(()) => {
                crate::metrics::record_send("committed");
                Self::schedule_unread_increments(state, &message, &recipients);
                Ok(message)
            }
            Err(e) if e.is_transient() => {
                crate::metrics::record_send("compensated");
                Self::compensate(state, &message).await;
                Err(e)
            }
            Err(e) => {
                crate::metrics::record_send("failed");
                Err(e)
            }
        }
    }

    fn resolve(req: &SendRequest) -> AppResult<ConversationKey> {
        match (req.group_id, req.receiver_id) {
            (Some(group_id), _) => ConversationKey::group(group_id),
            (None, Some(receiver_id)) => ConversationKey::direct(req.sender_id, receiver_id),
            (None, None) => Err(AppError::InvalidMessage(
                "either receiver_id or group_id is required".into(),
            )),
        }
    }

    fn validate(req: &SendRequest) -> AppResult<ContentType> {
        if req.sender_id.is_nil() {
            return Err(AppError::InvalidMessage("sender id is required".into()));
        }
        let content_type = req
            .content_type
            .ok_or_else(|| AppError::InvalidMessage("content type is required".into()))?;
        if req.content.trim().is_empty() && req.media_urls.is_empty() {
            return Err(AppError::InvalidMessage(
                "message needs content or media".into(),
            ));
        }
        Ok(content_type)
    }

    fn compose(key: &ConversationKey, req: &SendRequest, content_type: ContentType) -> Message {
        // The sender has trivially seen and received their own message.
        Message {
            conversation_id: key.to_string(),
            id: Uuid::now_v7(),
            sender_id: req.sender_id,
            receiver_id: req.receiver_id,
            group_id: req.group_id,
            content: req.content.clone(),
            content_type,
            media_urls: req.media_urls.clone(),
            reactions: vec![],
            seen_by: vec![req.sender_id],
            delivered_to: vec![req.sender_id],
            is_deleted: false,
            deleted_at: None,
            is_edited: false,
            edited_at: None,
            product_id: req.product_id,
            is_marketplace: req.marketplace || req.product_id.is_some(),
            created_at: Utc::now(),
        }
    }

    /// Everyone who gets an inbox rewrite besides the sender. Group member
    /// sets are read cache-first; the refill after a miss is asynchronous.
    async fn recipients(
        state: &AppState,
        key: &ConversationKey,
        sender_id: Uuid,
    ) -> AppResult<Vec<Uuid>> {
        match key {
            ConversationKey::Direct { low, high } => {
                let other = if *low == sender_id { *high } else { *low };
                Ok(vec![other])
            }
            ConversationKey::Group { .. } => {
                let conversation = key.to_string();
                let members = Self::member_set(state, &conversation).await?;
                if !members.contains(&sender_id) {
                    return Err(AppError::Unauthorized);
                }
                Ok(members.into_iter().filter(|m| *m != sender_id).collect())
            }
        }
    }

    async fn member_set(state: &AppState, conversation: &str) -> AppResult<Vec<Uuid>> {
        let cache_key = members_cache_key(conversation);
        match state.cache.get(&cache_key).await {
            Ok(Some(raw)) => {
                if let Ok(members) = serde_json::from_slice::<Vec<Uuid>>(&raw) {
                    return Ok(members);
                }
                tracing::warn!(%conversation, "corrupt member cache entry, refetching");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%conversation, error = %e, "member cache read failed"),
        }

        let members = state.ledger.members(conversation).await?;

        let cache = state.cache.clone();
        let ttl = Duration::from_secs(state.config.members_cache_ttl_secs);
        let payload = serde_json::to_vec(&members).unwrap_or_default();
        state.tasks.spawn("members_cache_fill", async move {
            cache.set(&cache_key, payload, ttl).await
        });

        Ok(members)
    }

    /// Persist: the ledger row and the first inbox chunk commit as one
    /// all-or-nothing batch; remaining chunks are independent.
    async fn persist(state: &AppState, message: &Message, recipients: &[Uuid]) -> AppResult<()> {
        let chunk_size = state.config.fanout_chunk_size.max(1);

        let mut entries = Vec::with_capacity(recipients.len() + 1);
        entries.push(InboxEntry::for_participant(message.sender_id, message));
        entries.extend(
            recipients
                .iter()
                .map(|user| InboxEntry::for_participant(*user, message)),
        );

        let mut chunks = entries.chunks(chunk_size);
        let first = chunks.next().unwrap_or(&[]);
        state.ledger.append(message, first).await?;

        for (i, chunk) in chunks.enumerate() {
            match state.ledger.upsert_inbox(chunk).await {
                Ok(()) => crate::metrics::record_fanout_chunk("ok"),
                Err(e) => {
                    // Best-effort by design: later chunks still run, the
                    // inbox view is rebuildable from the ledger.
                    crate::metrics::record_fanout_chunk("error");
                    tracing::error!(
                        conversation = %message.conversation_id,
                        message_id = %message.id,
                        chunk = i + 1,
                        error = %e,
                        "inbox fan-out chunk failed"
                    );
                }
            }
        }
        Ok(())
    }

    /// Broadcast the retraction for a message that was optimistically
    /// published but never became durable.
    async fn compensate(state: &AppState, message: &Message) {
        let tombstone = message.tombstone();
        match serde_json::to_string(&tombstone) {
            Ok(payload) => {
                if let Err(e) = state
                    .broadcaster
                    .publish(&tombstone.conversation_id, &payload)
                    .await
                {
                    tracing::error!(
                        conversation = %tombstone.conversation_id,
                        message_id = %tombstone.id,
                        error = %e,
                        "compensating tombstone publish failed"
                    );
                }
            }
            Err(e) => {
                tracing::error!(message_id = %tombstone.id, error = %e, "encode tombstone failed");
            }
        }
    }

    fn schedule_unread_increments(state: &AppState, message: &Message, recipients: &[Uuid]) {
        for user in recipients {
            let unread = state.unread.clone();
            let user = *user;
            let conversation = message.conversation_id.clone();
            state.tasks.spawn("unread_increment", async move {
                unread.incr(user, &conversation).await
            });
        }
    }
}
