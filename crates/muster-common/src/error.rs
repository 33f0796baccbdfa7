//! Error types for Muster.

use crate::ids::ActorId;
use crate::role::{Role, WriterRole};
use thiserror::Error;

/// Top-level error type for Muster operations.
#[derive(Debug, Error)]
pub enum MusterError {
    /// Replicated state errors
    #[error("Replication error: {0}")]
    Replication(#[from] ReplicationError),

    /// Simulation errors
    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by replicated fields and the replication wire.
#[derive(Debug, Error, PartialEq)]
pub enum ReplicationError {
    /// A role other than the designated writer attempted a write
    #[error("write to `{field}` rejected: {attempted} is not the writer ({writer})")]
    WriteRejected {
        /// Field name
        field: &'static str,
        /// Role that attempted the write
        attempted: Role,
        /// Designated writer
        writer: WriterRole,
    },

    /// The field belongs to a despawned actor
    #[error("write to `{field}` rejected: field is retired")]
    FieldRetired {
        /// Field name
        field: &'static str,
    },

    /// Frame could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Frame header did not match
    #[error("Bad frame header")]
    BadMagic,

    /// Frame was written by an incompatible protocol version
    #[error("Protocol mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch {
        /// Expected version
        expected: String,
        /// Actual version found
        actual: String,
    },
}

/// Errors for caller-facing simulation operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimError {
    /// Actor is not registered
    #[error("Actor not found: {0}")]
    ActorNotFound(ActorId),

    /// Actor exists but is no longer alive
    #[error("Actor is not alive: {0}")]
    ActorNotAlive(ActorId),
}

/// Configuration load/save errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read or write the file
    #[error("Config IO failed: {0}")]
    Io(#[from] std::io::Error),

    /// File contents did not parse
    #[error("Config parse failed: {0}")]
    Parse(String),

    /// Config could not be serialized
    #[error("Config serialize failed: {0}")]
    Serialize(String),
}

/// Result type alias for Muster operations.
pub type MusterResult<T> = Result<T, MusterError>;
