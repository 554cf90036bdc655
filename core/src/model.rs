use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Denormalized display data of a message author.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AuthorProfile {
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub resource_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: i64,
    #[serde(default)]
    pub author_profile: Option<AuthorProfile>,
}

/// Container resource (a habitat) as seen by the access evaluator.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub owner_id: String,
    pub is_public: bool,
}

/// Resource living inside a container: its owner (author, creator, host)
/// and the container it belongs to.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SubResource {
    pub owner_id: String,
    pub container_id: String,
}

/// Kinds of resources permissions are checked against.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Habitat,
    Message,
    Discussion,
    Poll,
    WatchParty,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Habitat,
        ResourceKind::Message,
        ResourceKind::Discussion,
        ResourceKind::Poll,
        ResourceKind::WatchParty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Habitat => "habitat",
            ResourceKind::Message => "message",
            ResourceKind::Discussion => "discussion",
            ResourceKind::Poll => "poll",
            ResourceKind::WatchParty => "watch_party",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, ResourceKind::Habitat)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind: {s}"))
    }
}
