use thiserror::Error;

use crate::model::ResourceKind;
use crate::roles::Permission;

/// Failures surfaced by the message store and the access evaluator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Missing identity or unusable input, raised before any port call.
    #[error("{0}")]
    InvalidArgument(String),

    /// The backing port rejected the call; carries the normalized message.
    #[error("{0}")]
    PortFailure(String),

    #[error("access denied: {user_id} may not {permission} on {kind} {resource_id}")]
    AccessDenied {
        user_id: String,
        resource_id: String,
        permission: Permission,
        kind: ResourceKind,
    },
}

impl Error {
    /// Normalize a port error into its display message.
    pub fn port(err: anyhow::Error) -> Self {
        Error::PortFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
