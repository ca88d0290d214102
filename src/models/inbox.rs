use crate::models::message::{ContentType, Message, DELETED_CONTENT_MARKER};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const PREVIEW_MAX_CHARS: usize = 120;

/// Denormalized per-user conversation row, rewritten on every send for
/// every participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxEntry {
    pub user_id: Uuid,
    pub conversation_id: String,
    pub last_message_id: Uuid,
    pub last_sender_id: Uuid,
    pub last_content_preview: String,
    pub last_content_type: ContentType,
    pub last_message_at: DateTime<Utc>,
}

impl InboxEntry {
    pub fn for_participant(user_id: Uuid, msg: &Message) -> Self {
        let preview = match msg.content_type {
            ContentType::Deleted => DELETED_CONTENT_MARKER.to_string(),
            _ => msg.content.chars().take(PREVIEW_MAX_CHARS).collect(),
        };
        Self {
            user_id,
            conversation_id: msg.conversation_id.clone(),
            last_message_id: msg.id,
            last_sender_id: msg.sender_id,
            last_content_preview: preview,
            last_content_type: msg.content_type,
            last_message_at: msg.created_at,
        }
    }
}

/// Completion marker for one archived conversation/month unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveIndexEntry {
    pub conversation_id: String,
    pub month: String,
    pub object_key: String,
    pub message_count: i64,
    pub archived_at: DateTime<Utc>,
}
