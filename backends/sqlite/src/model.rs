use habitat_core::Container;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Habitat {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub is_public: bool,
    pub created_at: i64,
}

impl From<Habitat> for Container {
    fn from(h: Habitat) -> Self {
        Container {
            id: h.id,
            owner_id: h.owner_id,
            is_public: h.is_public,
        }
    }
}
