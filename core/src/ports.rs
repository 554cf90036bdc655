//! Boundaries to the managed backend. Both traits are object safe so callers
//! can hand the core an `Arc<dyn ...>`.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Container, Message, ResourceKind, SubResource};

/// Read/write access to message records of a resource.
#[async_trait]
pub trait MessagePort: Send + Sync {
    /// One page of messages, newest first, starting `offset` rows in.
    async fn fetch_messages(
        &self,
        resource_id: &str,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>>;

    /// Persist a new message and return it with its assigned id.
    async fn send_message(&self, resource_id: &str, user_id: &str, content: &str)
        -> Result<Message>;

    async fn delete_message(&self, message_id: &str, user_id: &str, resource_id: &str)
        -> Result<()>;
}

/// Ownership and membership lookups used by the access evaluator.
#[async_trait]
pub trait ContainerPort: Send + Sync {
    async fn get_container(
        &self,
        container_id: &str,
        requesting_user: Option<&str>,
    ) -> Result<Option<Container>>;

    async fn is_member(&self, container_id: &str, user_id: &str) -> Result<bool>;

    async fn get_sub_resource(
        &self,
        resource_id: &str,
        kind: ResourceKind,
    ) -> Result<Option<SubResource>>;
}
