use crate::config::Config;
use crate::store::{ActivityLog, Broadcaster, Cache, ColdStore, Ledger, MetadataStore, UnreadStore};
use crate::tasks::BackgroundTasks;
use std::sync::Arc;

/// Constructor-injected store handles; tests substitute the in-memory
/// fakes from `store::memory`.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn Ledger>,
    pub metadata: Arc<dyn MetadataStore>,
    pub cold: Arc<dyn ColdStore>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub unread: Arc<dyn UnreadStore>,
    pub activity: Arc<dyn ActivityLog>,
    pub cache: Arc<dyn Cache>,
    pub tasks: BackgroundTasks,
    pub config: Arc<Config>,
}
