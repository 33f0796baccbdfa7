//! # Muster Sim
//!
//! Authoritative NPC simulation for Muster.
//!
//! This crate provides the server-side core and its client counterpart:
//! - Single-writer replicated fields and per-actor state
//! - Behavior state machine (idle, wander, seek, form, in-group)
//! - Group coordination with static circle and walking column formations
//! - Tick-clock continuations
//! - Replication bridge (server frames, client replica with interpolation)
//! - Lobby slot arbitration
//! - Navigation/presentation capability traits with in-process implementations
//! - Event bus and consistency checks

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod actor;
pub mod behavior;
pub mod capabilities;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod formation;
pub mod group;
pub mod invariants;
pub mod lobby;
pub mod registry;
pub mod replica;
pub mod replicated;
pub mod replication;
pub mod scheduler;
pub mod simulation;


/// Prelude for convenient imports
pub mod prelude {
    pub use crate::actor::*;
    pub use crate::behavior::*;
    pub use crate::capabilities::*;
    pub use crate::config::*;
    pub use crate::coordinator::*;
    pub use crate::events::*;
    pub use crate::formation::*;
    pub use crate::group::*;
    pub use crate::invariants::ConsistencyViolation;
    pub use crate::lobby::*;
    pub use crate::registry::*;
    pub use crate::replica::*;
    pub use crate::replicated::*;
    pub use crate::replication::*;
    pub use crate::scheduler::*;
    pub use crate::simulation::*;
}

pub use prelude::*;
