//! Fire-and-forget background work.
//!
//! The request path never blocks on these tasks and never sees their errors;
//! failures are logged and counted. Tests call `wait_idle` to observe
//! completion deterministically instead of racing the runtime.

use crate::error::AppResult;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    pending: AtomicUsize,
    idle: Notify,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, label: &'static str, fut: F)
    where
        F: Future<Output = AppResult<()>> + Send + 'static,
    {
        let inner = self.inner.clone();
        inner.pending.fetch_add(1, Ordering::SeqCst);
        let inner2 = self.inner.clone();
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                tracing::warn!(task = label, error = %e, "background task failed");
                crate::metrics::record_background_failure(label);
            }
            if inner2.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner2.idle.notify_waiters();
            }
        });
    }

    /// Wait until every spawned task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_idle_returns_after_tasks_complete() {
        let tasks = BackgroundTasks::new();
        let hit = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let hit = hit.clone();
            tasks.spawn("test", async move {
                hit.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        tasks.wait_idle().await;
        assert_eq!(hit.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("failing", async move {
            Err(crate::error::AppError::Store("boom".into()))
        });
        tasks.wait_idle().await;
    }
}
