//! Hourly activity pruner: trims the append-only group activity log to its
//! retention horizon.

use crate::error::AppResult;
use crate::state::AppState;
use chrono::{Duration as ChronoDuration, Utc};

pub struct ActivityPruner;

impl ActivityPruner {
    pub async fn run_once(state: &AppState) -> AppResult<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(state.config.activity_retention_days);
        let removed = state.activity.prune(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, "pruned expired group activity");
        }
        Ok(removed)
    }
}
