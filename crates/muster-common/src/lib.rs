//! # Muster Common
//!
//! Common types, utilities, and shared abstractions for Muster.
//!
//! This crate provides foundational types used across all Muster crates:
//! - ID types (ActorId, GroupId, ClientId, SlotId)
//! - Authority roles for replicated fields
//! - Vector helpers and tint colors
//! - Wire protocol versioning
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;
pub mod math;
pub mod role;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::math::*;
    pub use crate::role::*;
    pub use crate::version::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_id_sequence_skips_zero() {
        let mut seq = IdSequence::new();
        let first = seq.next_raw();
        let second = seq.next_raw();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert!(ActorId::from_raw(first).is_valid());
        assert!(!ActorId::NULL.is_valid());
    }

    #[test]
    fn test_group_id_none() {
        assert!(GroupId::NONE.is_none());
        assert_eq!(GroupId::NONE.get(), None);
        assert_eq!(GroupId::from_raw(4).get(), Some(GroupId::from_raw(4)));
        assert_eq!(GroupId::default(), GroupId::NONE);
    }

    #[test]
    fn test_frame_version_readability() {
        let reader = ProtocolVersion::REPLICATION;
        let newer_minor = ProtocolVersion::new(reader.major, reader.minor + 1, 0);
        let next_major = ProtocolVersion::new(reader.major + 1, 0, 0);

        assert!(reader.can_read(&newer_minor));
        assert!(!reader.can_read(&next_major));
        assert_eq!(next_major.to_string(), "2.0.0");
    }

    proptest! {
        #[test]
        fn prop_id_sequence_strictly_increasing(n in 1usize..200) {
            let mut seq = IdSequence::new();
            let mut last = 0;
            for _ in 0..n {
                let id = seq.next_raw();
                prop_assert!(id > last);
                last = id;
            }
        }
    }
}
