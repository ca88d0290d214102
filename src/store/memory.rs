//! In-memory fakes for every store seam, with enough failure injection to
//! exercise the compensate path and chunk independence deterministically.

use crate::error::{AppError, AppResult};
use crate::models::message::DELETED_CONTENT_MARKER;
use crate::models::{
    ActivityEntry, ArchiveIndexEntry, ContentType, InboxEntry, Message, MessageMetadata, Reaction,
};
use crate::store::{ActivityLog, Broadcaster, Cache, ColdStore, Ledger, MetadataStore, UnreadStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryLedger {
    messages: Mutex<Vec<Message>>,
    inbox: Mutex<HashMap<(Uuid, String), InboxEntry>>,
    markers: Mutex<HashMap<(String, String), ArchiveIndexEntry>>,
    marker_reads: Mutex<Vec<(String, String)>>,
    members: Mutex<HashMap<String, Vec<Uuid>>>,
    inbox_upserts_applied: AtomicUsize,
    fail_next_append: AtomicBool,
    inbox_calls_seen: AtomicUsize,
    failing_inbox_calls: Mutex<HashSet<usize>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `append` fail with a transient store error.
    pub fn fail_next_append(&self) {
        self.fail_next_append.store(true, Ordering::SeqCst);
    }

    /// Make the n-th `upsert_inbox` call (0-based) fail.
    pub fn fail_inbox_call(&self, call_index: usize) {
        self.failing_inbox_calls
            .lock()
            .unwrap()
            .insert(call_index);
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn hot_messages(&self, conversation: &str) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.conversation_id == conversation)
            .cloned()
            .collect()
    }

    pub fn inbox_count(&self) -> usize {
        self.inbox.lock().unwrap().len()
    }

    pub fn inbox_upserts_applied(&self) -> usize {
        self.inbox_upserts_applied.load(Ordering::SeqCst)
    }

    pub fn seed_member(&self, conversation: &str, user_id: Uuid) {
        self.members
            .lock()
            .unwrap()
            .entry(conversation.to_string())
            .or_default()
            .push(user_id);
    }

    /// Insert a row directly, bypassing the pipeline (test setup).
    pub fn seed_message(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    /// Every (conversation, month) the archive index was probed for.
    pub fn marker_reads(&self) -> Vec<(String, String)> {
        self.marker_reads.lock().unwrap().clone()
    }

    fn apply_inbox(&self, entries: &[InboxEntry]) {
        let mut inbox = self.inbox.lock().unwrap();
        for entry in entries {
            self.inbox_upserts_applied.fetch_add(1, Ordering::SeqCst);
            inbox.insert(
                (entry.user_id, entry.conversation_id.clone()),
                entry.clone(),
            );
        }
    }

    fn with_message<T>(
        &self,
        conversation: &str,
        message_id: Uuid,
        f: impl FnOnce(&mut Message) -> T,
    ) -> Option<T> {
        let mut messages = self.messages.lock().unwrap();
        messages
            .iter_mut()
            .find(|m| m.conversation_id == conversation && m.id == message_id)
            .map(f)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn append(&self, message: &Message, inbox: &[InboxEntry]) -> AppResult<()> {
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(AppError::Store("ledger unavailable (injected)".into()));
        }
        self.messages.lock().unwrap().push(message.clone());
        self.apply_inbox(inbox);
        Ok(())
    }

    async fn upsert_inbox(&self, entries: &[InboxEntry]) -> AppResult<()> {
        let call = self.inbox_calls_seen.fetch_add(1, Ordering::SeqCst);
        if self.failing_inbox_calls.lock().unwrap().contains(&call) {
            return Err(AppError::Store(format!(
                "inbox chunk {call} unavailable (injected)"
            )));
        }
        self.apply_inbox(entries);
        Ok(())
    }

    async fn window(
        &self,
        conversation: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
        marketplace: bool,
    ) -> AppResult<Vec<Message>> {
        let mut out: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                m.conversation_id == conversation
                    && m.is_marketplace == marketplace
                    && before.map_or(true, |b| m.created_at < b)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn get(&self, conversation: &str, message_id: Uuid) -> AppResult<Option<Message>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.conversation_id == conversation && m.id == message_id)
            .cloned())
    }

    async fn mark_seen(
        &self,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        Ok(self
            .with_message(conversation, message_id, |m| {
                if !m.seen_by.contains(&user_id) {
                    m.seen_by.push(user_id);
                }
            })
            .is_some())
    }

    async fn mark_delivered(
        &self,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        Ok(self
            .with_message(conversation, message_id, |m| {
                if !m.delivered_to.contains(&user_id) {
                    m.delivered_to.push(user_id);
                }
            })
            .is_some())
    }

    async fn add_reaction(
        &self,
        conversation: &str,
        message_id: Uuid,
        reaction: &Reaction,
    ) -> AppResult<bool> {
        Ok(self
            .with_message(conversation, message_id, |m| {
                m.reactions.push(reaction.clone());
            })
            .is_some())
    }

    async fn apply_edit(
        &self,
        conversation: &str,
        message_id: Uuid,
        content: &str,
    ) -> AppResult<bool> {
        Ok(self
            .with_message(conversation, message_id, |m| {
                if m.is_deleted {
                    return false;
                }
                m.content = content.to_string();
                m.is_edited = true;
                m.edited_at = Some(Utc::now());
                true
            })
            .unwrap_or(false))
    }

    async fn soft_delete(&self, conversation: &str, message_id: Uuid) -> AppResult<bool> {
        Ok(self
            .with_message(conversation, message_id, |m| {
                m.content = DELETED_CONTENT_MARKER.to_string();
                m.content_type = ContentType::Deleted;
                m.media_urls.clear();
                m.is_deleted = true;
                m.deleted_at = Some(Utc::now());
            })
            .is_some())
    }

    async fn older_than(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Message>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn purge(&self, conversation: &str, message_ids: &[Uuid]) -> AppResult<u64> {
        let mut messages = self.messages.lock().unwrap();
        let before = messages.len();
        messages
            .retain(|m| !(m.conversation_id == conversation && message_ids.contains(&m.id)));
        Ok((before - messages.len()) as u64)
    }

    async fn archive_marker(
        &self,
        conversation: &str,
        month: &str,
    ) -> AppResult<Option<ArchiveIndexEntry>> {
        self.marker_reads
            .lock()
            .unwrap()
            .push((conversation.to_string(), month.to_string()));
        Ok(self
            .markers
            .lock()
            .unwrap()
            .get(&(conversation.to_string(), month.to_string()))
            .cloned())
    }

    async fn put_archive_marker(&self, entry: &ArchiveIndexEntry) -> AppResult<()> {
        self.markers.lock().unwrap().insert(
            (entry.conversation_id.clone(), entry.month.clone()),
            entry.clone(),
        );
        Ok(())
    }

    async fn inbox_for(&self, user_id: Uuid) -> AppResult<Vec<InboxEntry>> {
        let mut entries: Vec<InboxEntry> = self
            .inbox
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(entries)
    }

    async fn members(&self, conversation: &str) -> AppResult<Vec<Uuid>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(conversation)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_member(&self, conversation: &str, user_id: Uuid) -> AppResult<()> {
        let mut members = self.members.lock().unwrap();
        let list = members.entry(conversation.to_string()).or_default();
        if !list.contains(&user_id) {
            list.push(user_id);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    entries: Mutex<HashMap<(String, Uuid), MessageMetadata>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn update(&self, conversation: &str, message_id: Uuid, f: impl FnOnce(&mut MessageMetadata)) {
        let mut entries = self.entries.lock().unwrap();
        let meta = entries
            .entry((conversation.to_string(), message_id))
            .or_default();
        f(meta);
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn put_many(
        &self,
        conversation: &str,
        entries: &[(Uuid, MessageMetadata)],
    ) -> AppResult<()> {
        let mut map = self.entries.lock().unwrap();
        for (message_id, meta) in entries {
            map.insert((conversation.to_string(), *message_id), meta.clone());
        }
        Ok(())
    }

    async fn get_many(
        &self,
        conversation: &str,
        message_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, MessageMetadata>> {
        let map = self.entries.lock().unwrap();
        Ok(message_ids
            .iter()
            .filter_map(|id| {
                map.get(&(conversation.to_string(), *id))
                    .map(|meta| (*id, meta.clone()))
            })
            .collect())
    }

    async fn mark_seen(&self, conversation: &str, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        self.update(conversation, message_id, |meta| {
            if !meta.seen_by.contains(&user_id) {
                meta.seen_by.push(user_id);
            }
        });
        Ok(())
    }

    async fn mark_delivered(
        &self,
        conversation: &str,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        self.update(conversation, message_id, |meta| {
            if !meta.delivered_to.contains(&user_id) {
                meta.delivered_to.push(user_id);
            }
        });
        Ok(())
    }

    async fn add_reaction(
        &self,
        conversation: &str,
        message_id: Uuid,
        reaction: &Reaction,
    ) -> AppResult<()> {
        self.update(conversation, message_id, |meta| {
            meta.reactions.push(reaction.clone());
        });
        Ok(())
    }

    async fn set_deleted(&self, conversation: &str, message_id: Uuid) -> AppResult<()> {
        self.update(conversation, message_id, |meta| meta.is_deleted = true);
        Ok(())
    }

    async fn set_edited(&self, conversation: &str, message_id: Uuid) -> AppResult<()> {
        self.update(conversation, message_id, |meta| meta.is_edited = true);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryColdStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
}

impl MemoryColdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn object_keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ColdStore for MemoryColdStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> AppResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::Store("cold store unavailable (injected)".into()));
        }
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }
}

#[derive(Default)]
pub struct MemoryBroadcaster {
    events: Mutex<Vec<(String, String)>>,
}

impl MemoryBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, String)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broadcaster for MemoryBroadcaster {
    async fn publish(&self, conversation: &str, payload: &str) -> AppResult<()> {
        self.events
            .lock()
            .unwrap()
            .push((conversation.to_string(), payload.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUnreadStore {
    counts: Mutex<HashMap<(Uuid, String), i64>>,
}

impl MemoryUnreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UnreadStore for MemoryUnreadStore {
    async fn incr(&self, user_id: Uuid, conversation: &str) -> AppResult<()> {
        *self
            .counts
            .lock()
            .unwrap()
            .entry((user_id, conversation.to_string()))
            .or_insert(0) += 1;
        Ok(())
    }

    async fn clear(&self, user_id: Uuid, conversation: &str) -> AppResult<()> {
        self.counts
            .lock()
            .unwrap()
            .remove(&(user_id, conversation.to_string()));
        Ok(())
    }

    async fn get(&self, user_id: Uuid, conversation: &str) -> AppResult<Option<i64>> {
        Ok(self
            .counts
            .lock()
            .unwrap()
            .get(&(user_id, conversation.to_string()))
            .copied())
    }

    async fn all(&self, user_id: Uuid) -> AppResult<HashMap<String, i64>> {
        Ok(self
            .counts
            .lock()
            .unwrap()
            .iter()
            .filter(|((u, _), _)| *u == user_id)
            .map(|((_, c), n)| (c.clone(), *n))
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryActivityLog {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl ActivityLog for MemoryActivityLog {
    async fn append(&self, entry: &ActivityEntry) -> AppResult<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn recent(&self, group_id: Uuid, limit: i64) -> AppResult<Vec<ActivityEntry>> {
        let mut out: Vec<ActivityEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.group_id == group_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.created_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryCache {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> AppResult<()> {
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}
