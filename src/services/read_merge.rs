//! The tiered read path: hot ledger first, cold archives only when a page
//! comes up short.
//!
//! Cold reads go through a short-TTL blob cache in front of object storage;
//! a cache miss fetches the blob and refills the cache out-of-band. Archived
//! content is immutable, so the current mutable state (reactions, seen sets,
//! deletions) is overlaid from the metadata store before the merge.

use crate::archive::{archive_cache_key, decode_blob};
use crate::error::AppResult;
use crate::models::{ArchivedMessage, ConversationKey, Message, MessageMetadata};
use crate::services::activity::ActivityMerger;
use crate::state::AppState;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// How many consecutive archive months one page is allowed to touch. A gap
/// of quiet months ends the scan rather than walking the whole index.
const MAX_COLD_MONTHS_PER_PAGE: usize = 3;

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub conversation: ConversationKey,
    /// Exclusive cursor; None means the first (newest) page.
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub marketplace: bool,
}

impl PageRequest {
    pub fn first_page(conversation: ConversationKey) -> Self {
        Self {
            conversation,
            before: None,
            limit: None,
            marketplace: false,
        }
    }
}

pub struct ReadMerger;

impl ReadMerger {
    pub async fn page(state: &AppState, req: PageRequest) -> AppResult<Vec<Message>> {
        let limit = req
            .limit
            .unwrap_or(state.config.page_limit_default)
            .clamp(1, 100);
        let conversation = req.conversation.to_string();

        let hot = state
            .ledger
            .window(&conversation, req.before, limit, req.marketplace)
            .await?;

        let mut page = hot;
        let deficit = limit as usize - page.len().min(limit as usize);
        if deficit > 0 {
            // The hot tier ran out before the page filled; anything older
            // lives in monthly archive blobs.
            let cold_cursor = page
                .last()
                .map(|m| m.created_at)
                .or(req.before)
                .unwrap_or_else(Utc::now);
            let cold = Self::cold_window(state, &conversation, cold_cursor, deficit, req.marketplace)
                .await?;
            page.extend(cold);
        }

        page.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        page.truncate(limit as usize);

        if req.before.is_none() && req.conversation.is_group() {
            page = ActivityMerger::merge_first_page(state, &req.conversation, page).await;
        }

        Ok(page)
    }

    /// Walk monthly blobs backwards from `cursor`'s month, newest first,
    /// until `wanted` messages are gathered or the scan bound is hit.
    async fn cold_window(
        state: &AppState,
        conversation: &str,
        cursor: DateTime<Utc>,
        wanted: usize,
        marketplace: bool,
    ) -> AppResult<Vec<Message>> {
        let mut out: Vec<Message> = Vec::new();

        // Everything archived is older than the retention boundary, so
        // months between the boundary and a newer cursor hold nothing and
        // are not worth probing the index for.
        let boundary = Utc::now() - ChronoDuration::days(state.config.retention_days);
        let mut month = month_label(cursor.min(boundary));

        for _ in 0..MAX_COLD_MONTHS_PER_PAGE {
            let mut archived = Self::fetch_blob(state, conversation, &month).await?;
            archived.retain(|m| m.created_at < cursor && m.is_marketplace == marketplace);
            archived.sort_by(|a, b| (b.created_at, b.message_id).cmp(&(a.created_at, a.message_id)));

            if !archived.is_empty() {
                let ids: Vec<Uuid> = archived.iter().map(|m| m.message_id).collect();
                let meta = state.metadata.get_many(conversation, &ids).await?;
                out.extend(Self::overlay(conversation, archived, &meta));
            }

            if out.len() >= wanted {
                break;
            }
            month = previous_month(&month);
        }

        out.truncate(wanted);
        Ok(out)
    }

    fn overlay(
        conversation: &str,
        archived: Vec<ArchivedMessage>,
        meta: &HashMap<Uuid, MessageMetadata>,
    ) -> Vec<Message> {
        archived
            .into_iter()
            .filter_map(|a| {
                let m = meta.get(&a.message_id);
                if m.is_some_and(|m| m.is_deleted) {
                    return None;
                }
                Some(a.rehydrate(conversation, m))
            })
            .collect()
    }

    /// Cache-first monthly blob fetch. No index marker means nothing was
    /// archived for that month. A marker pointing at a missing object is a
    /// served-degraded case: log it and return the empty month.
    async fn fetch_blob(
        state: &AppState,
        conversation: &str,
        month: &str,
    ) -> AppResult<Vec<ArchivedMessage>> {
        let cache_key = archive_cache_key(conversation, month);
        match state.cache.get(&cache_key).await {
            Ok(Some(raw)) => match decode_blob(&raw) {
                Ok(messages) => return Ok(messages),
                Err(e) => {
                    tracing::warn!(%conversation, %month, error = %e, "corrupt cached archive blob, refetching")
                }
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(%conversation, %month, error = %e, "archive cache read failed"),
        }

        let Some(marker) = state.ledger.archive_marker(conversation, month).await? else {
            return Ok(Vec::new());
        };
        let Some(raw) = state.cold.get(&marker.object_key).await? else {
            tracing::error!(
                %conversation,
                %month,
                object_key = %marker.object_key,
                "archive marker points at a missing object"
            );
            return Ok(Vec::new());
        };
        let messages = match decode_blob(&raw) {
            Ok(messages) => messages,
            Err(e) => {
                // A corrupt month degrades that month, never the page.
                tracing::error!(%conversation, %month, error = %e, "corrupt archive blob");
                return Ok(Vec::new());
            }
        };

        let cache = state.cache.clone();
        let ttl = Duration::from_secs(state.config.archive_cache_ttl_secs);
        state.tasks.spawn("archive_cache_fill", async move {
            cache.set(&cache_key, raw, ttl).await
        });

        Ok(messages)
    }
}

fn month_label(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// "2026-01" -> "2025-12"
fn previous_month(month: &str) -> String {
    let (year, month_no) = month
        .split_once('-')
        .and_then(|(y, m)| Some((y.parse::<i32>().ok()?, m.parse::<u32>().ok()?)))
        .unwrap_or((Utc::now().year(), Utc::now().month()));
    if month_no <= 1 {
        format!("{:04}-12", year - 1)
    } else {
        format!("{:04}-{:02}", year, month_no - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_month_steps_and_wraps() {
        assert_eq!(previous_month("2026-08"), "2026-07");
        assert_eq!(previous_month("2026-01"), "2025-12");
        assert_eq!(previous_month("2026-10"), "2026-09");
    }
}
