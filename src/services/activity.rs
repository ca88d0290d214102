//! Group activity: an append-only log of membership and settings events,
//! surfaced as synthetic system messages on the first page of a group
//! conversation.

use crate::error::AppResult;
use crate::models::{ActivityEntry, ConversationKey, Message};
use crate::state::AppState;
use std::time::Duration;
use uuid::Uuid;

/// How many recent events the first page may surface.
const RECENT_ACTIVITY_LIMIT: i64 = 20;

pub fn activity_cache_key(group_id: Uuid) -> String {
    format!("activity:{group_id}")
}

pub struct ActivityService;

impl ActivityService {
    /// Append an event and drop the per-group cache so the next first-page
    /// read sees it. Cache invalidation is best-effort and out-of-band.
    pub async fn record(state: &AppState, entry: ActivityEntry) -> AppResult<()> {
        state.activity.append(&entry).await?;

        let cache = state.cache.clone();
        let key = activity_cache_key(entry.group_id);
        state.tasks.spawn("activity_cache_invalidate", async move {
            cache.delete(&key).await
        });
        Ok(())
    }
}

pub struct ActivityMerger;

impl ActivityMerger {
    /// Weave recent events into a first page as system messages, re-sorted
    /// newest first. Events older than the page's horizon are left out so
    /// they do not resurface on every load; a page that exhausted history
    /// has no horizon and takes them all. Activity is decorative: any
    /// failure on this path degrades to the plain page.
    pub async fn merge_first_page(
        state: &AppState,
        conversation: &ConversationKey,
        mut page: Vec<Message>,
    ) -> Vec<Message> {
        let Some(group_id) = conversation.group_id() else {
            return page;
        };

        let entries = match Self::recent(state, group_id).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(%group_id, error = %e, "activity fetch failed, serving page without it");
                return page;
            }
        };

        let page_full = page.len() >= state.config.page_limit_default as usize;
        let horizon = page.last().map(|m| m.created_at);
        page.extend(
            entries
                .iter()
                .filter(|e| !page_full || horizon.map_or(true, |h| e.created_at >= h))
                .map(|e| e.to_system_message(conversation)),
        );
        page.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        page
    }

    async fn recent(state: &AppState, group_id: Uuid) -> AppResult<Vec<ActivityEntry>> {
        let cache_key = activity_cache_key(group_id);
        match state.cache.get(&cache_key).await {
            Ok(Some(raw)) => {
                if let Ok(entries) = serde_json::from_slice::<Vec<ActivityEntry>>(&raw) {
                    return Ok(entries);
                }
                tracing::warn!(%group_id, "corrupt activity cache entry, refetching");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%group_id, error = %e, "activity cache read failed"),
        }

        let entries = state.activity.recent(group_id, RECENT_ACTIVITY_LIMIT).await?;

        let cache = state.cache.clone();
        let ttl = Duration::from_secs(state.config.activity_cache_ttl_secs);
        let payload = serde_json::to_vec(&entries).unwrap_or_default();
        state.tasks.spawn("activity_cache_fill", async move {
            cache.set(&cache_key, payload, ttl).await
        });

        Ok(entries)
    }
}
