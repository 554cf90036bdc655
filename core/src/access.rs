//! Permission evaluation over habitat roles, resource ownership and the
//! special-rule table.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::cache::{AccessControlConfig, CacheKey, CacheStats, PermissionCache};
use crate::error::{Error, Result};
use crate::model::{Container, ResourceKind};
use crate::ports::ContainerPort;
use crate::roles::{self, Permission, Role};

/// Outcome of one evaluation. The reason is diagnostic text, not for end users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub granted: bool,
    pub reason: String,
    /// Lowest role that would have been granted; only set on deny.
    pub required_role: Option<Role>,
    /// Only set on deny.
    pub required_permissions: Vec<Permission>,
}

impl AccessDecision {
    fn granted(reason: impl Into<String>) -> Self {
        Self {
            granted: true,
            reason: reason.into(),
            required_role: None,
            required_permissions: Vec::new(),
        }
    }

    fn denied(reason: impl Into<String>, permission: Permission) -> Self {
        Self {
            granted: false,
            reason: reason.into(),
            required_role: roles::minimum_role_for_permission(permission),
            required_permissions: vec![permission],
        }
    }
}

/// Facts about the actor and resource gathered before evaluation.
#[derive(Debug, Default)]
struct AccessContext {
    container_id: Option<String>,
    resource_owner_id: Option<String>,
    user_role: Option<Role>,
    is_owner: bool,
    is_public: bool,
}

/// Kinds whose owner is looked up. Polls and watch parties have no owner
/// lookup yet, so nobody counts as their owner.
fn tracks_ownership(kind: ResourceKind) -> bool {
    matches!(
        kind,
        ResourceKind::Habitat | ResourceKind::Message | ResourceKind::Discussion
    )
}

pub struct AccessControl {
    port: Arc<dyn ContainerPort>,
    cache: PermissionCache,
}

impl AccessControl {
    pub fn new(port: Arc<dyn ContainerPort>, config: AccessControlConfig) -> Self {
        Self {
            port,
            cache: PermissionCache::from_config(&config),
        }
    }

    /// Role of `user_id` in a habitat: owner, member or nothing.
    ///
    /// Moderator and admin exist in the tables but are never assigned here;
    /// there is no role management path yet.
    pub async fn get_user_role(&self, user_id: &str, container_id: &str) -> Option<Role> {
        if user_id.is_empty() || container_id.is_empty() {
            return None;
        }
        let res: anyhow::Result<Option<Role>> = async {
            match self.port.get_container(container_id, Some(user_id)).await? {
                Some(container) => self.role_in(&container, user_id).await,
                None => Ok(None),
            }
        }
        .await;
        res.unwrap_or_else(|e| {
            warn!(user_id, container_id, "role lookup failed: {e:#}");
            None
        })
    }

    async fn role_in(&self, container: &Container, user_id: &str) -> anyhow::Result<Option<Role>> {
        if container.owner_id == user_id {
            return Ok(Some(Role::Owner));
        }
        if self.port.is_member(&container.id, user_id).await? {
            return Ok(Some(Role::Member));
        }
        Ok(None)
    }

    pub async fn is_container_member(&self, user_id: &str, container_id: &str) -> bool {
        self.get_user_role(user_id, container_id).await.is_some()
    }

    pub async fn is_resource_owner(
        &self,
        user_id: &str,
        resource_id: &str,
        kind: ResourceKind,
    ) -> bool {
        if user_id.is_empty() || resource_id.is_empty() {
            return false;
        }
        match self.owner_of(resource_id, kind).await {
            Ok(owner) => owner.as_deref() == Some(user_id),
            Err(e) => {
                warn!(user_id, resource_id, %kind, "ownership lookup failed: {e:#}");
                false
            }
        }
    }

    async fn owner_of(&self, resource_id: &str, kind: ResourceKind) -> anyhow::Result<Option<String>> {
        if !tracks_ownership(kind) {
            return Ok(None);
        }
        if kind.is_container() {
            let container = self.port.get_container(resource_id, None).await?;
            return Ok(container.map(|c| c.owner_id));
        }
        let sub = self.port.get_sub_resource(resource_id, kind).await?;
        Ok(sub.map(|s| s.owner_id))
    }

    /// Whether `user_id` may perform `permission` on the resource. Faults
    /// while evaluating count as a deny.
    pub async fn check_permission(
        &self,
        user_id: &str,
        resource_id: &str,
        permission: Permission,
        kind: ResourceKind,
    ) -> bool {
        if user_id.is_empty() || resource_id.is_empty() {
            return false;
        }
        let key = CacheKey::new(user_id, resource_id, permission, kind);
        if let Some(granted) = self.cache.get(&key) {
            trace!(user_id, resource_id, %permission, %kind, granted, "permission cache hit");
            return granted;
        }
        match self.evaluate(user_id, resource_id, permission, kind).await {
            Ok(decision) => {
                debug!(
                    user_id,
                    resource_id,
                    %permission,
                    %kind,
                    granted = decision.granted,
                    reason = %decision.reason,
                    "permission evaluated"
                );
                self.cache.insert(key, decision.granted);
                decision.granted
            }
            Err(e) => {
                warn!(user_id, resource_id, %permission, %kind, "permission check failed: {e:#}");
                false
            }
        }
    }

    /// True as soon as one of `permissions` is granted, checked in order.
    pub async fn has_any_permission(
        &self,
        user_id: &str,
        resource_id: &str,
        permissions: &[Permission],
        kind: ResourceKind,
    ) -> bool {
        for permission in permissions {
            if self
                .check_permission(user_id, resource_id, *permission, kind)
                .await
            {
                return true;
            }
        }
        false
    }

    /// Assert form of [`check_permission`](Self::check_permission) for
    /// mutating call sites.
    pub async fn validate_access(
        &self,
        user_id: &str,
        resource_id: &str,
        permission: Permission,
        kind: ResourceKind,
    ) -> Result<()> {
        if self
            .check_permission(user_id, resource_id, permission, kind)
            .await
        {
            return Ok(());
        }
        Err(Error::AccessDenied {
            user_id: user_id.to_string(),
            resource_id: resource_id.to_string(),
            permission,
            kind,
        })
    }

    /// Full decision with reason. Always evaluated fresh; the cache is
    /// neither read nor written.
    pub async fn get_permission_result(
        &self,
        user_id: &str,
        resource_id: &str,
        permission: Permission,
        kind: ResourceKind,
    ) -> AccessDecision {
        if user_id.is_empty() || resource_id.is_empty() {
            return AccessDecision::denied("invalid input", permission);
        }
        match self.evaluate(user_id, resource_id, permission, kind).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(user_id, resource_id, %permission, %kind, "permission check failed: {e:#}");
                AccessDecision::denied(format!("evaluation failed: {e}"), permission)
            }
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn context(
        &self,
        user_id: &str,
        resource_id: &str,
        kind: ResourceKind,
    ) -> anyhow::Result<AccessContext> {
        let mut ctx = AccessContext::default();
        let container_id = if kind.is_container() {
            resource_id.to_string()
        } else {
            let Some(sub) = self.port.get_sub_resource(resource_id, kind).await? else {
                return Ok(ctx);
            };
            if tracks_ownership(kind) {
                ctx.resource_owner_id = Some(sub.owner_id);
            }
            sub.container_id
        };
        let Some(container) = self.port.get_container(&container_id, Some(user_id)).await? else {
            return Ok(ctx);
        };
        ctx.container_id = Some(container_id);
        if kind.is_container() {
            ctx.resource_owner_id = Some(container.owner_id.clone());
        }
        ctx.user_role = self.role_in(&container, user_id).await?;
        ctx.is_owner = ctx.resource_owner_id.as_deref() == Some(user_id);
        ctx.is_public = container.is_public;
        Ok(ctx)
    }

    async fn evaluate(
        &self,
        user_id: &str,
        resource_id: &str,
        permission: Permission,
        kind: ResourceKind,
    ) -> anyhow::Result<AccessDecision> {
        let ctx = self.context(user_id, resource_id, kind).await?;
        let Some(container_id) = ctx.container_id.as_deref() else {
            return Ok(AccessDecision::denied(
                format!("{kind} {resource_id} not found"),
                permission,
            ));
        };

        // Full predicate: moderators match even when they are not the owner.
        if let Some(rule) = roles::special_rule_for(permission) {
            let owner = ctx.resource_owner_id.as_deref().unwrap_or_default();
            if rule.applies(user_id, owner, ctx.user_role) {
                let source = if ctx.is_owner { "owner" } else { "role" };
                return Ok(AccessDecision::granted(format!(
                    "{source} special rule: {}",
                    rule.description
                )));
            }
        }

        if ctx.is_public && permission == Permission::ReadHabitat {
            return Ok(AccessDecision::granted("public read"));
        }

        Ok(match ctx.user_role {
            Some(role) if roles::role_has_permission(role, permission) => {
                AccessDecision::granted(format!("role {role} has permission {permission}"))
            }
            Some(role) => AccessDecision::denied(
                format!("role {role} lacks permission {permission}"),
                permission,
            ),
            None => AccessDecision::denied(
                format!("not a member of habitat {container_id}"),
                permission,
            ),
        })
    }
}
