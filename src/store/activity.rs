use crate::error::AppResult;
use crate::models::{ActivityEntry, ActivityKind};
use crate::store::ActivityLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

fn kind_as_str(kind: ActivityKind) -> &'static str {
    match kind {
        ActivityKind::MemberAdded => "member_added",
        ActivityKind::MemberRemoved => "member_removed",
        ActivityKind::MemberLeft => "member_left",
        ActivityKind::GroupRenamed => "group_renamed",
        ActivityKind::GroupCreated => "group_created",
    }
}

fn kind_from_str(value: &str) -> Option<ActivityKind> {
    Some(match value {
        "member_added" => ActivityKind::MemberAdded,
        "member_removed" => ActivityKind::MemberRemoved,
        "member_left" => ActivityKind::MemberLeft,
        "group_renamed" => ActivityKind::GroupRenamed,
        "group_created" => ActivityKind::GroupCreated,
        _ => return None,
    })
}

#[derive(Clone)]
pub struct PgActivityLog {
    db: Pool<Postgres>,
}

impl PgActivityLog {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActivityLog for PgActivityLog {
    async fn append(&self, entry: &ActivityEntry) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO group_activity (id, group_id, kind, actor_id, target_id, template, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT DO NOTHING",
        )
        .bind(entry.id)
        .bind(entry.group_id)
        .bind(kind_as_str(entry.kind))
        .bind(entry.actor_id)
        .bind(entry.target_id)
        .bind(&entry.template)
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn recent(&self, group_id: Uuid, limit: i64) -> AppResult<Vec<ActivityEntry>> {
        let rows = sqlx::query(
            "SELECT id, group_id, kind, actor_id, target_id, template, created_at \
             FROM group_activity WHERE group_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(group_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.try_get("kind")?;
            let Some(kind) = kind_from_str(&kind) else {
                tracing::warn!(%kind, "skipping activity row with unknown kind");
                continue;
            };
            entries.push(ActivityEntry {
                id: row.try_get("id")?,
                group_id: row.try_get("group_id")?,
                kind,
                actor_id: row.try_get("actor_id")?,
                target_id: row.try_get("target_id")?,
                template: row.try_get("template")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(entries)
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM group_activity WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
