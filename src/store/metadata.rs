use crate::error::{AppError, AppResult};
use crate::models::{MessageMetadata, Reaction};
use crate::store::MetadataStore;
use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgMetadataStore {
    db: Pool<Postgres>,
}

impl PgMetadataStore {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn put_many(
        &self,
        conversation: &str,
        entries: &[(Uuid, MessageMetadata)],
    ) -> AppResult<()> {
        // Archival copies row-by-row; unit sizes are bounded by a month of
        // one conversation.
        for (message_id, meta) in entries {
            let reactions = serde_json::to_value(&meta.reactions)
                .map_err(|e| AppError::DataIntegrity(format!("encode reactions: {e}")))?;
            sqlx::query(
                "INSERT INTO message_metadata \
                 (conversation_id, message_id, reactions, seen_by, delivered_to, is_deleted, is_edited) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (conversation_id, message_id) DO UPDATE SET \
                 reactions = EXCLUDED.reactions, \
                 seen_by = EXCLUDED.seen_by, \
                 delivered_to = EXCLUDED.delivered_to, \
                 is_deleted = EXCLUDED.is_deleted, \
                 is_edited = EXCLUDED.is_edited, \
                 updated_at = NOW()",
            )
            .bind(conversation)
            .bind(message_id)
            .bind(reactions)
            .bind(&meta.seen_by)
            .bind(&meta.delivered_to)
            .bind(meta.is_deleted)
            .bind(meta.is_edited)
            .execute(&self.db)
            .await?;
        }
        Ok(())
    }

    async fn get_many(
        &self,
        conversation: &str,
        message_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, MessageMetadata>> {
        let rows = sqlx::query(
            "SELECT message_id, reactions, seen_by, delivered_to, is_deleted, is_edited \
             FROM message_metadata WHERE conversation_id = $1 AND message_id = ANY($2)",
        )
        .bind(conversation)
        .bind(message_ids)
        .fetch_all(&self.db)
        .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let message_id: Uuid = row.try_get("message_id")?;
            let reactions: serde_json::Value = row.try_get("reactions")?;
            let reactions: Vec<Reaction> = match serde_json::from_value(reactions) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(%message_id, error = %e, "skipping corrupt reactions blob");
                    Vec::new()
                }
            };
            out.insert(
                message_id,
                MessageMetadata {
                    reactions,
                    seen_by: row.try_get("seen_by")?,
                    delivered_to: row.try_get("delivered_to")?,
                    is_deleted: row.try_get("is_deleted")?,
                    is_edited: row.try_get("is_edited")?,
                },
            );
        }
        Ok(out)
    }

    async fn mark_seen(&self, conversation: &str, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO message_metadata (conversation_id, message_id, seen_by) \
             VALUES ($1, $2, ARRAY[$3::uuid]) \
             ON CONFLICT (conversation_id, message_id) DO UPDATE SET \
             seen_by = CASE WHEN message_metadata.seen_by @> ARRAY[$3::uuid] \
               THEN message_metadata.seen_by \
               ELSE array_append(message_metadata.seen_by, $3::uuid) END, \
             updated_at = NOW()",
        )
        .bind(conversation)
        .bind(message_id)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn mark_delivered(
        &self,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO message_metadata (conversation_id, message_id, delivered_to) \
             VALUES ($1, $2, ARRAY[$3::uuid]) \
             ON CONFLICT (conversation_id, message_id) DO UPDATE SET \
             delivered_to = CASE WHEN message_metadata.delivered_to @> ARRAY[$3::uuid] \
               THEN message_metadata.delivered_to \
               ELSE array_append(message_metadata.delivered_to, $3::uuid) END, \
             updated_at = NOW()",
        )
        .bind(conversation)
        .bind(message_id)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn add_reaction(
        &self,
        conversation: &str,
        message_id: Uuid,
        reaction: &Reaction,
    ) -> AppResult<()> {
        let reaction_json = serde_json::to_value(reaction)
            .map_err(|e| AppError::DataIntegrity(format!("encode reaction: {e}")))?;
        sqlx::query(
            "INSERT INTO message_metadata (conversation_id, message_id, reactions) \
             VALUES ($1, $2, jsonb_build_array($3::jsonb)) \
             ON CONFLICT (conversation_id, message_id) DO UPDATE SET \
             reactions = message_metadata.reactions || jsonb_build_array($3::jsonb), \
             updated_at = NOW()",
        )
        .bind(conversation)
        .bind(message_id)
        .bind(reaction_json)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn set_deleted(&self, conversation: &str, message_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO message_metadata (conversation_id, message_id, is_deleted) \
             VALUES ($1, $2, TRUE) \
             ON CONFLICT (conversation_id, message_id) DO UPDATE SET \
             is_deleted = TRUE, updated_at = NOW()",
        )
        .bind(conversation)
        .bind(message_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn set_edited(&self, conversation: &str, message_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO message_metadata (conversation_id, message_id, is_edited) \
             VALUES ($1, $2, TRUE) \
             ON CONFLICT (conversation_id, message_id) DO UPDATE SET \
             is_edited = TRUE, updated_at = NOW()",
        )
        .bind(conversation)
        .bind(message_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
