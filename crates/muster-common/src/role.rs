//! Authority roles for replicated state.

use crate::ids::ClientId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of whoever is attempting an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The authoritative server process.
    Server,
    /// A connected client.
    Client(ClientId),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client(id) => write!(f, "{id}"),
        }
    }
}

/// The single role allowed to write a given field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriterRole {
    /// Only the server may write.
    Server,
    /// Only the owning client may write.
    Owner(ClientId),
}

impl WriterRole {
    /// Returns whether `role` is the designated writer.
    #[must_use]
    pub fn permits(self, role: Role) -> bool {
        match (self, role) {
            (Self::Server, Role::Server) => true,
            (Self::Owner(owner), Role::Client(client)) => owner == client,
            _ => false,
        }
    }
}

impl fmt::Display for WriterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Owner(id) => write!(f, "owner {id}"),
        }
    }
}
