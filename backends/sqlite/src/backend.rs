use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use habitat_core::{
    ChangeFeed, Container, ContainerPort, Message, MessagePort, ResourceKind, SubResource,
};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use realtime_api::{messages_topic, ChangeEnvelope};
use tracing::{debug, warn};

use crate::{db, habitats, messages};

/// Both ports over one SQLite database. Every successful write is published
/// on the change feed under the habitat's message topic.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    feed: Arc<ChangeFeed>,
}

impl SqliteBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let manager = SqliteConnectionManager::file(path)
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::new(manager)
            .with_context(|| format!("opening database {}", path.display()))?;
        Self::with_pool(pool)
    }

    /// Private in-memory database, kept alive by a single pooled connection.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        Self::with_pool(pool)
    }

    fn with_pool(pool: Pool<SqliteConnectionManager>) -> Result<Self> {
        db::migrate(&*pool.get()?)?;
        Ok(Self {
            pool,
            feed: Arc::new(ChangeFeed::new()),
        })
    }

    pub fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    pub fn feed(&self) -> Arc<ChangeFeed> {
        self.feed.clone()
    }

    fn publish_insert(&self, message: &Message) {
        match ChangeEnvelope::insert(messages_topic(&message.resource_id), message) {
            Ok(change) => self.feed.publish(change.with_commit_timestamp(message.created_at)),
            Err(e) => warn!(message_id = %message.id, "encoding change failed: {e:#}"),
        }
    }
}

#[async_trait]
impl MessagePort for SqliteBackend {
    async fn fetch_messages(
        &self,
        resource_id: &str,
        _user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        messages::list_messages(&conn, resource_id, limit, offset)
    }

    async fn send_message(&self, resource_id: &str, user_id: &str, content: &str) -> Result<Message> {
        let message = {
            let conn = self.conn()?;
            messages::create_message(&conn, resource_id, user_id, content)?
        };
        debug!(message_id = %message.id, habitat_id = resource_id, "message stored");
        self.publish_insert(&message);
        Ok(message)
    }

    async fn delete_message(&self, message_id: &str, _user_id: &str, resource_id: &str) -> Result<()> {
        {
            let conn = self.conn()?;
            messages::delete_message(&conn, message_id, resource_id)?;
        }
        debug!(message_id, habitat_id = resource_id, "message deleted");
        self.feed
            .publish(ChangeEnvelope::delete(messages_topic(resource_id), message_id));
        Ok(())
    }
}

#[async_trait]
impl ContainerPort for SqliteBackend {
    async fn get_container(
        &self,
        container_id: &str,
        _requesting_user: Option<&str>,
    ) -> Result<Option<Container>> {
        let conn = self.conn()?;
        Ok(habitats::get_habitat(&conn, container_id)?.map(Container::from))
    }

    async fn is_member(&self, container_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        habitats::is_member(&conn, container_id, user_id)
    }

    async fn get_sub_resource(&self, resource_id: &str, kind: ResourceKind) -> Result<Option<SubResource>> {
        let conn = self.conn()?;
        habitats::get_sub_resource(&conn, resource_id, kind)
    }
}
