use crate::error::{AppError, AppResult};
use crate::models::message::DELETED_CONTENT_MARKER;
use crate::models::{ArchiveIndexEntry, ContentType, InboxEntry, Message, Reaction};
use crate::store::Ledger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

/// Hot store: Postgres, partitioned by conversation key, clustered by
/// recency via `idx_messages_conversation_recency`.
#[derive(Clone)]
pub struct PgLedger {
    db: Pool<Postgres>,
}

impl PgLedger {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }

    fn message_from_row(row: &PgRow) -> AppResult<Message> {
        let content_type: String = row.try_get("content_type")?;
        let content_type = ContentType::from_str(&content_type)
            .ok_or_else(|| AppError::DataIntegrity(format!("bad content_type: {content_type}")))?;

        let media_urls: serde_json::Value = row.try_get("media_urls")?;
        let media_urls: Vec<String> = serde_json::from_value(media_urls)
            .map_err(|e| AppError::DataIntegrity(format!("bad media_urls: {e}")))?;

        let reactions: serde_json::Value = row.try_get("reactions")?;
        let reactions: Vec<Reaction> = serde_json::from_value(reactions)
            .map_err(|e| AppError::DataIntegrity(format!("bad reactions: {e}")))?;

        Ok(Message {
            conversation_id: row.try_get("conversation_id")?,
            id: row.try_get("id")?,
            sender_id: row.try_get("sender_id")?,
            receiver_id: row.try_get("receiver_id")?,
            group_id: row.try_get("group_id")?,
            content: row.try_get("content")?,
            content_type,
            media_urls,
            reactions,
            seen_by: row.try_get("seen_by")?,
            delivered_to: row.try_get("delivered_to")?,
            is_deleted: row.try_get("is_deleted")?,
            deleted_at: row.try_get("deleted_at")?,
            is_edited: row.try_get("is_edited")?,
            edited_at: row.try_get("edited_at")?,
            product_id: row.try_get("product_id")?,
            is_marketplace: row.try_get("is_marketplace")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// One bad row must not fail an entire page: decode errors are logged
    /// and the row skipped.
    fn collect_messages(rows: Vec<PgRow>) -> Vec<Message> {
        rows.iter()
            .filter_map(|row| match Self::message_from_row(row) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping corrupt ledger row");
                    None
                }
            })
            .collect()
    }

    async fn upsert_inbox_exec<'e, E>(entries: &[InboxEntry], executor: E) -> AppResult<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        if entries.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO inbox (user_id, conversation_id, last_message_id, last_sender_id, \
             last_content_preview, last_content_type, last_message_at) ",
        );
        qb.push_values(entries, |mut b, e| {
            b.push_bind(e.user_id)
                .push_bind(&e.conversation_id)
                .push_bind(e.last_message_id)
                .push_bind(e.last_sender_id)
                .push_bind(&e.last_content_preview)
                .push_bind(e.last_content_type.as_str())
                .push_bind(e.last_message_at);
        });
        qb.push(
            " ON CONFLICT (user_id, conversation_id) DO UPDATE SET \
             last_message_id = EXCLUDED.last_message_id, \
             last_sender_id = EXCLUDED.last_sender_id, \
             last_content_preview = EXCLUDED.last_content_preview, \
             last_content_type = EXCLUDED.last_content_type, \
             last_message_at = EXCLUDED.last_message_at, \
             updated_at = NOW()",
        );
        qb.build().execute(executor).await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn append(&self, message: &Message, inbox: &[InboxEntry]) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO messages (conversation_id, id, sender_id, receiver_id, group_id, \
             content, content_type, media_urls, reactions, seen_by, delivered_to, \
             product_id, is_marketplace, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(&message.conversation_id)
        .bind(message.id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(message.group_id)
        .bind(&message.content)
        .bind(message.content_type.as_str())
        .bind(serde_json::to_value(&message.media_urls).unwrap_or_default())
        .bind(serde_json::to_value(&message.reactions).unwrap_or_default())
        .bind(&message.seen_by)
        .bind(&message.delivered_to)
        .bind(message.product_id)
        .bind(message.is_marketplace)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        Self::upsert_inbox_exec(inbox, &mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_inbox(&self, entries: &[InboxEntry]) -> AppResult<()> {
        Self::upsert_inbox_exec(entries, &self.db).await
    }

    async fn window(
        &self,
        conversation: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
        marketplace: bool,
    ) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages \
             WHERE conversation_id = $1 \
               AND ($2::timestamptz IS NULL OR created_at < $2) \
               AND is_marketplace = $3 \
             ORDER BY created_at DESC \
             LIMIT $4",
        )
        .bind(conversation)
        .bind(before)
        .bind(marketplace)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(Self::collect_messages(rows))
    }

    async fn get(&self, conversation: &str, message_id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE conversation_id = $1 AND id = $2")
            .bind(conversation)
            .bind(message_id)
            .fetch_optional(&self.db)
            .await?;
        row.map(|r| Self::message_from_row(&r)).transpose()
    }

    async fn mark_seen(
        &self,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE messages SET seen_by = CASE \
               WHEN seen_by @> ARRAY[$3::uuid] THEN seen_by \
               ELSE array_append(seen_by, $3::uuid) END \
             WHERE conversation_id = $1 AND id = $2",
        )
        .bind(conversation)
        .bind(message_id)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_delivered(
        &self,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE messages SET delivered_to = CASE \
               WHEN delivered_to @> ARRAY[$3::uuid] THEN delivered_to \
               ELSE array_append(delivered_to, $3::uuid) END \
             WHERE conversation_id = $1 AND id = $2",
        )
        .bind(conversation)
        .bind(message_id)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_reaction(
        &self,
        conversation: &str,
        message_id: Uuid,
        reaction: &Reaction,
    ) -> AppResult<bool> {
        let reaction_json = serde_json::to_value(reaction)
            .map_err(|e| AppError::DataIntegrity(format!("encode reaction: {e}")))?;
        let result = sqlx::query(
            "UPDATE messages SET reactions = reactions || jsonb_build_array($3::jsonb) \
             WHERE conversation_id = $1 AND id = $2",
        )
        .bind(conversation)
        .bind(message_id)
        .bind(reaction_json)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_edit(
        &self,
        conversation: &str,
        message_id: Uuid,
        content: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE messages SET content = $3, is_edited = TRUE, edited_at = NOW() \
             WHERE conversation_id = $1 AND id = $2 AND is_deleted = FALSE",
        )
        .bind(conversation)
        .bind(message_id)
        .bind(content)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, conversation: &str, message_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE messages SET content = $3, content_type = 'deleted', \
             media_urls = '[]'::jsonb, is_deleted = TRUE, deleted_at = NOW() \
             WHERE conversation_id = $1 AND id = $2",
        )
        .bind(conversation)
        .bind(message_id)
        .bind(DELETED_CONTENT_MARKER)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn older_than(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE created_at < $1 \
             ORDER BY conversation_id, created_at",
        )
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;
        Ok(Self::collect_messages(rows))
    }

    async fn purge(&self, conversation: &str, message_ids: &[Uuid]) -> AppResult<u64> {
        let result =
            sqlx::query("DELETE FROM messages WHERE conversation_id = $1 AND id = ANY($2)")
                .bind(conversation)
                .bind(message_ids)
                .execute(&self.db)
                .await?;
        Ok(result.rows_affected())
    }

    async fn archive_marker(
        &self,
        conversation: &str,
        month: &str,
    ) -> AppResult<Option<ArchiveIndexEntry>> {
        let row = sqlx::query(
            "SELECT conversation_id, month, object_key, message_count, archived_at \
             FROM archive_index WHERE conversation_id = $1 AND month = $2",
        )
        .bind(conversation)
        .bind(month)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| ArchiveIndexEntry {
            conversation_id: r.get("conversation_id"),
            month: r.get("month"),
            object_key: r.get("object_key"),
            message_count: r.get("message_count"),
            archived_at: r.get("archived_at"),
        }))
    }

    async fn put_archive_marker(&self, entry: &ArchiveIndexEntry) -> AppResult<()> {
        // Retries and late rows merge into the existing blob, so the marker
        // must track the blob's current record count.
        sqlx::query(
            "INSERT INTO archive_index (conversation_id, month, object_key, message_count, archived_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (conversation_id, month) DO UPDATE SET \
             object_key = EXCLUDED.object_key, \
             message_count = EXCLUDED.message_count, \
             archived_at = EXCLUDED.archived_at",
        )
        .bind(&entry.conversation_id)
        .bind(&entry.month)
        .bind(&entry.object_key)
        .bind(entry.message_count)
        .bind(entry.archived_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn inbox_for(&self, user_id: Uuid) -> AppResult<Vec<InboxEntry>> {
        let rows = sqlx::query(
            "SELECT user_id, conversation_id, last_message_id, last_sender_id, \
             last_content_preview, last_content_type, last_message_at \
             FROM inbox WHERE user_id = $1 ORDER BY last_message_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let content_type: String = row.try_get("last_content_type")?;
            let Some(content_type) = ContentType::from_str(&content_type) else {
                tracing::warn!(%content_type, "skipping inbox row with bad content type");
                continue;
            };
            entries.push(InboxEntry {
                user_id: row.try_get("user_id")?,
                conversation_id: row.try_get("conversation_id")?,
                last_message_id: row.try_get("last_message_id")?,
                last_sender_id: row.try_get("last_sender_id")?,
                last_content_preview: row.try_get("last_content_preview")?,
                last_content_type: content_type,
                last_message_at: row.try_get("last_message_at")?,
            });
        }
        Ok(entries)
    }

    async fn members(&self, conversation: &str) -> AppResult<Vec<Uuid>> {
        let members: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM conversation_members WHERE conversation_id = $1",
        )
        .bind(conversation)
        .fetch_all(&self.db)
        .await?;
        Ok(members)
    }

    async fn add_member(&self, conversation: &str, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO conversation_members (conversation_id, user_id) \
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(conversation)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
