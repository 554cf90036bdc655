//! Messaging and authorization layer for habitats: a paginated message store
//! that merges realtime changes, and a role based access evaluator.

pub mod access;
pub mod cache;
pub mod error;
pub mod events;
pub mod model;
pub mod ports;
pub mod roles;
pub mod store;

pub use access::{AccessControl, AccessDecision};
pub use cache::{AccessControlConfig, CacheStats};
pub use error::{Error, Result};
pub use events::ChangeFeed;
pub use model::{AuthorProfile, Container, Message, ResourceKind, SubResource};
pub use ports::{ContainerPort, MessagePort};
pub use roles::{Permission, Role};
pub use store::{MessageStore, StoreOptions, StoreState};
