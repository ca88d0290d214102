//! Redis-backed side stores: the pub/sub broadcaster, unread counters, and
//! the short-TTL cache.

use crate::error::AppResult;
use crate::store::{Broadcaster, Cache, UnreadStore};
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

fn channel_for_conversation(conversation: &str) -> String {
    format!("conversation:{conversation}")
}

fn unread_key(user_id: Uuid) -> String {
    format!("unread:{user_id}")
}

#[derive(Clone)]
pub struct RedisBroadcaster {
    client: Client,
}

impl RedisBroadcaster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn publish(&self, conversation: &str, payload: &str) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.publish::<_, _, ()>(channel_for_conversation(conversation), payload)
            .await?;
        Ok(())
    }
}

/// Counters live in one hash per user, one field per conversation. The
/// counter only supports increment, so "mark seen" deletes the field; the
/// next send recreates it.
#[derive(Clone)]
pub struct RedisUnreadStore {
    client: Client,
}

impl RedisUnreadStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UnreadStore for RedisUnreadStore {
    async fn incr(&self, user_id: Uuid, conversation: &str) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.hincr::<_, _, _, ()>(unread_key(user_id), conversation, 1)
            .await?;
        Ok(())
    }

    async fn clear(&self, user_id: Uuid, conversation: &str) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.hdel::<_, _, ()>(unread_key(user_id), conversation)
            .await?;
        Ok(())
    }

    async fn get(&self, user_id: Uuid, conversation: &str) -> AppResult<Option<i64>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: Option<i64> = conn.hget(unread_key(user_id), conversation).await?;
        Ok(count)
    }

    async fn all(&self, user_id: Uuid) -> AppResult<HashMap<String, i64>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let counts: HashMap<String, i64> = conn.hgetall(unread_key(user_id)).await?;
        Ok(counts)
    }
}

#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_includes_conversation_key() {
        assert_eq!(
            channel_for_conversation("group_abc"),
            "conversation:group_abc"
        );
    }

    #[test]
    fn unread_key_format() {
        let user = Uuid::nil();
        assert_eq!(
            unread_key(user),
            "unread:00000000-0000-0000-0000-000000000000"
        );
    }
}
