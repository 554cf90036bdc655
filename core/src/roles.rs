//! Static role and permission tables.
//!
//! Roles form a strict total order `member < moderator < admin < owner`.
//! A role's effective permission set is its own declared set plus the
//! effective sets of every lower role, so anything a member may do every
//! higher role may do as well.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Moderator,
    Admin,
    Owner,
}

/// Roles in ascending order.
pub const ROLE_ORDER: [Role; 4] = [Role::Member, Role::Moderator, Role::Admin, Role::Owner];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    fn position(&self) -> usize {
        ROLE_ORDER.iter().position(|r| r == self).unwrap_or(0)
    }

    /// Permissions this role adds on top of the roles below it.
    fn declared(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Member => &[
                ReadHabitat,
                SendMessage,
                CreateDiscussion,
                CreatePoll,
                VotePoll,
                CreateWatchParty,
                JoinWatchParty,
            ],
            Role::Moderator => &[
                DeleteMessage,
                PinMessage,
                DeleteDiscussion,
                DeletePoll,
                DeleteWatchParty,
            ],
            Role::Admin => &[ManageMembers, UpdateHabitat],
            Role::Owner => &[DeleteHabitat, TransferOwnership],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ROLE_ORDER
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role: {s}"))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadHabitat,
    SendMessage,
    DeleteMessage,
    PinMessage,
    CreateDiscussion,
    DeleteDiscussion,
    CreatePoll,
    VotePoll,
    DeletePoll,
    CreateWatchParty,
    JoinWatchParty,
    DeleteWatchParty,
    ManageMembers,
    UpdateHabitat,
    DeleteHabitat,
    TransferOwnership,
}

impl Permission {
    pub const ALL: [Permission; 16] = [
        Permission::ReadHabitat,
        Permission::SendMessage,
        Permission::DeleteMessage,
        Permission::PinMessage,
        Permission::CreateDiscussion,
        Permission::DeleteDiscussion,
        Permission::CreatePoll,
        Permission::VotePoll,
        Permission::DeletePoll,
        Permission::CreateWatchParty,
        Permission::JoinWatchParty,
        Permission::DeleteWatchParty,
        Permission::ManageMembers,
        Permission::UpdateHabitat,
        Permission::DeleteHabitat,
        Permission::TransferOwnership,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadHabitat => "read_habitat",
            Permission::SendMessage => "send_message",
            Permission::DeleteMessage => "delete_message",
            Permission::PinMessage => "pin_message",
            Permission::CreateDiscussion => "create_discussion",
            Permission::DeleteDiscussion => "delete_discussion",
            Permission::CreatePoll => "create_poll",
            Permission::VotePoll => "vote_poll",
            Permission::DeletePoll => "delete_poll",
            Permission::CreateWatchParty => "create_watch_party",
            Permission::JoinWatchParty => "join_watch_party",
            Permission::DeleteWatchParty => "delete_watch_party",
            Permission::ManageMembers => "manage_members",
            Permission::UpdateHabitat => "update_habitat",
            Permission::DeleteHabitat => "delete_habitat",
            Permission::TransferOwnership => "transfer_ownership",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission: {s}"))
    }
}

/// Full permission set of a role, including everything inherited.
pub fn effective_permissions(role: Role) -> HashSet<Permission> {
    ROLE_ORDER
        .iter()
        .filter(|r| **r <= role)
        .flat_map(|r| r.declared().iter().copied())
        .collect()
}

pub fn role_has_permission(role: Role, permission: Permission) -> bool {
    ROLE_ORDER
        .iter()
        .filter(|r| **r <= role)
        .any(|r| r.declared().contains(&permission))
}

pub fn is_role_higher_than(a: Role, b: Role) -> bool {
    a.position() > b.position()
}

/// Lowest role whose effective set grants `permission`.
pub fn minimum_role_for_permission(permission: Permission) -> Option<Role> {
    ROLE_ORDER
        .into_iter()
        .find(|r| role_has_permission(*r, permission))
}

/// Grant that applies independently of the role table.
pub struct SpecialRule {
    pub permission: Permission,
    pub description: &'static str,
    predicate: fn(&str, &str, Option<Role>) -> bool,
}

impl SpecialRule {
    /// Evaluate the rule for `user_id` acting on a resource owned by
    /// `resource_owner_id`.
    pub fn applies(&self, user_id: &str, resource_owner_id: &str, role: Option<Role>) -> bool {
        (self.predicate)(user_id, resource_owner_id, role)
    }
}

fn is_author(user_id: &str, owner_id: &str, _role: Option<Role>) -> bool {
    !owner_id.is_empty() && user_id == owner_id
}

fn is_author_or_moderator(user_id: &str, owner_id: &str, role: Option<Role>) -> bool {
    is_author(user_id, owner_id, role)
        || role.is_some_and(|r| is_role_higher_than(r, Role::Member))
}

pub static SPECIAL_RULES: &[SpecialRule] = &[
    SpecialRule {
        permission: Permission::DeleteMessage,
        description: "authors may delete their own messages",
        predicate: is_author,
    },
    SpecialRule {
        permission: Permission::DeleteDiscussion,
        description: "creators and moderators may delete discussions",
        predicate: is_author_or_moderator,
    },
    SpecialRule {
        permission: Permission::DeletePoll,
        description: "creators and moderators may delete polls",
        predicate: is_author_or_moderator,
    },
    SpecialRule {
        permission: Permission::DeleteWatchParty,
        description: "hosts and moderators may delete watch parties",
        predicate: is_author_or_moderator,
    },
];

pub fn special_rule_for(permission: Permission) -> Option<&'static SpecialRule> {
    SPECIAL_RULES.iter().find(|r| r.permission == permission)
}
