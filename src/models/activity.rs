use crate::models::conversation::ConversationKey;
use crate::models::message::{ContentType, Message};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    MemberAdded,
    MemberRemoved,
    MemberLeft,
    GroupRenamed,
    GroupCreated,
}

/// Append-only group activity row, independent of the message ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub group_id: Uuid,
    pub kind: ActivityKind,
    pub actor_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<Uuid>,
    /// Human-readable template, `{actor}`/`{target}` placeholders.
    pub template: String,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        group_id: Uuid,
        kind: ActivityKind,
        actor_id: Uuid,
        target_id: Option<Uuid>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            group_id,
            kind,
            actor_id,
            target_id,
            template: template.into(),
            created_at: Utc::now(),
        }
    }

    pub fn render(&self) -> String {
        let mut text = self.template.replace("{actor}", &self.actor_id.to_string());
        if let Some(target) = self.target_id {
            text = text.replace("{target}", &target.to_string());
        }
        text
    }

    /// Convert to a synthetic system message for the read path.
    pub fn to_system_message(&self, key: &ConversationKey) -> Message {
        Message {
            conversation_id: key.to_string(),
            id: self.id,
            sender_id: self.actor_id,
            receiver_id: None,
            group_id: Some(self.group_id),
            content: self.render(),
            content_type: ContentType::System,
            media_urls: vec![],
            reactions: vec![],
            seen_by: vec![],
            delivered_to: vec![],
            is_deleted: false,
            deleted_at: None,
            is_edited: false,
            edited_at: None,
            product_id: None,
            is_marketplace: false,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_rendering_substitutes_ids() {
        let actor = Uuid::new_v4();
        let target = Uuid::new_v4();
        let entry = ActivityEntry::new(
            Uuid::new_v4(),
            ActivityKind::MemberAdded,
            actor,
            Some(target),
            "{actor} added {target}",
        );
        let rendered = entry.render();
        assert!(rendered.contains(&actor.to_string()));
        assert!(rendered.contains(&target.to_string()));
    }
}
