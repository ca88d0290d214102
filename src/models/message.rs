use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Video,
    File,
    Audio,
    Product,
    System,
    Deleted,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::Video => "video",
            ContentType::File => "file",
            ContentType::Audio => "audio",
            ContentType::Product => "product",
            ContentType::System => "system",
            ContentType::Deleted => "deleted",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "text" => ContentType::Text,
            "image" => ContentType::Image,
            "video" => ContentType::Video,
            "file" => ContentType::File,
            "audio" => ContentType::Audio,
            "product" => ContentType::Product,
            "system" => ContentType::System,
            "deleted" => ContentType::Deleted,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: Uuid,
    pub emoji: String,
    pub at: DateTime<Utc>,
}

/// A message as served from the hot ledger or rehydrated from cold storage.
///
/// `(conversation_id, id)` is the only reliable post-write lookup key; ids
/// are UUIDv7 so they are time-ordered within a conversation and globally
/// unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub conversation_id: String,
    pub id: Uuid,
    pub sender_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    pub content: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub seen_by: Vec<Uuid>,
    #[serde(default)]
    pub delivered_to: Vec<Uuid>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub is_marketplace: bool,
    pub created_at: DateTime<Utc>,
}

pub const DELETED_CONTENT_MARKER: &str = "[deleted]";

impl Message {
    /// The compensating tombstone broadcast when the durable persist fails
    /// after the optimistic publish. Carries the same id so subscribers can
    /// retract the phantom.
    pub fn tombstone(&self) -> Message {
        let mut t = self.clone();
        t.content = String::new();
        t.content_type = ContentType::Deleted;
        t.media_urls.clear();
        t
    }

    /// Month partition this message archives into.
    pub fn archive_month(&self) -> String {
        self.created_at.format("%Y-%m").to_string()
    }
}

/// Mutable per-message state, kept separately so content can go cold
/// without losing mutability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub reactions: Vec<Reaction>,
    pub seen_by: Vec<Uuid>,
    pub delivered_to: Vec<Uuid>,
    pub is_deleted: bool,
    pub is_edited: bool,
}

impl MessageMetadata {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            reactions: msg.reactions.clone(),
            seen_by: msg.seen_by.clone(),
            delivered_to: msg.delivered_to.clone(),
            is_deleted: msg.is_deleted,
            is_edited: msg.is_edited,
        }
    }
}

/// Immutable record as serialized into cold-storage blobs:
/// `archives/{conversationKey}/{YYYY-MM}.json.gz`, a gzip JSON array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    pub content: String,
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Uuid>,
    /// The marketplace partition is fixed at compose time and can be set
    /// without a product reference, so the flag travels with the record.
    #[serde(default)]
    pub is_marketplace: bool,
    pub created_at: DateTime<Utc>,
}

impl ArchivedMessage {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            message_id: msg.id,
            sender_id: msg.sender_id,
            receiver_id: msg.receiver_id,
            group_id: msg.group_id,
            content: msg.content.clone(),
            content_type: msg.content_type,
            media_urls: if msg.media_urls.is_empty() {
                None
            } else {
                Some(msg.media_urls.clone())
            },
            product_id: msg.product_id,
            is_marketplace: msg.is_marketplace,
            created_at: msg.created_at,
        }
    }

    /// Rehydrate for the read path, overlaying the current mutable state.
    pub fn rehydrate(&self, conversation_id: &str, meta: Option<&MessageMetadata>) -> Message {
        let meta = meta.cloned().unwrap_or_default();
        Message {
            conversation_id: conversation_id.to_string(),
            id: self.message_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            group_id: self.group_id,
            content: self.content.clone(),
            content_type: self.content_type,
            media_urls: self.media_urls.clone().unwrap_or_default(),
            reactions: meta.reactions,
            seen_by: meta.seen_by,
            delivered_to: meta.delivered_to,
            is_deleted: meta.is_deleted,
            deleted_at: None,
            is_edited: meta.is_edited,
            edited_at: None,
            product_id: self.product_id,
            is_marketplace: self.is_marketplace,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeType {
    #[serde(rename = "MESSAGE_DELETED")]
    MessageDeleted,
    #[serde(rename = "MESSAGE_EDITED")]
    MessageEdited,
}

/// Out-of-band mutation notice published on the conversation channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationNotice {
    #[serde(rename = "type")]
    pub notice_type: NoticeType,
    pub conversation_id: String,
    pub message_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message {
            conversation_id: "group_00000000-0000-0000-0000-000000000001".into(),
            id: Uuid::now_v7(),
            sender_id: Uuid::new_v4(),
            receiver_id: None,
            group_id: Some(Uuid::new_v4()),
            content: "hello".into(),
            content_type: ContentType::Text,
            media_urls: vec!["https://cdn/x.png".into()],
            reactions: vec![],
            seen_by: vec![],
            delivered_to: vec![],
            is_deleted: false,
            deleted_at: None,
            is_edited: false,
            edited_at: None,
            product_id: None,
            is_marketplace: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tombstone_keeps_the_id() {
        let msg = sample();
        let t = msg.tombstone();
        assert_eq!(t.id, msg.id);
        assert_eq!(t.content_type, ContentType::Deleted);
        assert!(t.content.is_empty());
        assert!(t.media_urls.is_empty());
    }

    #[test]
    fn archived_record_round_trips_content() {
        let msg = sample();
        let archived = ArchivedMessage::from_message(&msg);
        let json = serde_json::to_string(&archived).unwrap();
        let back: ArchivedMessage = serde_json::from_str(&json).unwrap();
        let rehydrated = back.rehydrate(&msg.conversation_id, None);
        assert_eq!(rehydrated.id, msg.id);
        assert_eq!(rehydrated.content, msg.content);
        assert_eq!(rehydrated.media_urls, msg.media_urls);
        assert_eq!(rehydrated.created_at, msg.created_at);
    }

    #[test]
    fn notice_wire_shape() {
        let notice = MutationNotice {
            notice_type: NoticeType::MessageDeleted,
            conversation_id: "dm_a_b".into(),
            message_id: Uuid::nil(),
        };
        let v: serde_json::Value = serde_json::to_value(&notice).unwrap();
        assert_eq!(v["type"], "MESSAGE_DELETED");
    }
}
