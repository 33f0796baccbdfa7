//! Replication wire versioning.
//!
//! Every encoded frame starts with [`MagicBytes::FRAME`] followed by the
//! writer's [`ProtocolVersion`]. Readers accept any frame with their own
//! major version; minor and patch bumps only add optional content.

use serde::{Deserialize, Serialize};

/// Semantic version of the replication frame layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    /// Layout changes readers cannot skip
    pub major: u16,
    /// Additive changes
    pub minor: u16,
    /// Fixes with no layout change
    pub patch: u16,
}

impl ProtocolVersion {
    /// Creates a protocol version.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version written into replication frames by this build.
    pub const REPLICATION: Self = Self::new(1, 0, 0);

    /// Whether a reader at this version can decode a frame written at
    /// `frame_version`.
    #[must_use]
    pub const fn can_read(&self, frame_version: &Self) -> bool {
        self.major == frame_version.major
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Four-byte header identifying an encoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicBytes(pub [u8; 4]);

impl MagicBytes {
    /// Header of every replication frame.
    pub const FRAME: Self = Self(*b"MSTR");
}
