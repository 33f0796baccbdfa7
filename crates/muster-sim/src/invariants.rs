//! Membership and capacity consistency checks.
//!
//! These conditions can only break through a bug in the leave/disband
//! sequence. They are reported, never repaired.

use crate::coordinator::GroupCoordinator;
use crate::registry::ActorRegistry;
use muster_common::{ActorId, GroupId};
use thiserror::Error;

/// A broken membership or capacity invariant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsistencyViolation {
    /// An actor's group id names a group that does not exist
    #[error("{actor} references missing group {}", .group.raw())]
    DanglingGroup {
        /// Actor
        actor: ActorId,
        /// Referenced group
        group: GroupId,
    },

    /// An actor's group id names a group that does not list it
    #[error("{actor} claims group {} but is not a member", .group.raw())]
    NotListed {
        /// Actor
        actor: ActorId,
        /// Claimed group
        group: GroupId,
    },

    /// A group lists an actor that is no longer registered
    #[error("group {} lists despawned {actor}", .group.raw())]
    StaleMember {
        /// Group
        group: GroupId,
        /// Missing actor
        actor: ActorId,
    },

    /// A group lists an actor whose group id is something else
    #[error("group {} lists {actor}, whose group is {}", .group.raw(), .actual.raw())]
    MemberMismatch {
        /// Group
        group: GroupId,
        /// Listed actor
        actor: ActorId,
        /// Actor's actual group id
        actual: GroupId,
    },

    /// A group lists the same actor twice
    #[error("group {} lists {actor} twice", .group.raw())]
    DuplicateMember {
        /// Group
        group: GroupId,
        /// Duplicated actor
        actor: ActorId,
    },

    /// A group has no members
    #[error("group {} is empty", .group.raw())]
    EmptyGroup {
        /// Group
        group: GroupId,
    },

    /// A group's leader is not one of its members
    #[error("group {} leader {leader} is not a member", .group.raw())]
    LeaderNotMember {
        /// Group
        group: GroupId,
        /// Recorded leader
        leader: ActorId,
    },

    /// A group's size is outside its allowed window
    #[error("group {} has {size} members, allowed {min}..={max}", .group.raw())]
    Capacity {
        /// Group
        group: GroupId,
        /// Member count
        size: usize,
        /// Allowed minimum
        min: usize,
        /// Allowed maximum
        max: usize,
    },
}

/// Checks every group and every actor. Returns all violations found.
#[must_use]
pub fn check(registry: &ActorRegistry, coordinator: &GroupCoordinator) -> Vec<ConsistencyViolation> {
    let mut out = Vec::new();

    for actor in registry.iter() {
        let id = actor.id();
        let gid = actor.state.group();
        if gid.is_none() {
            continue;
        }
        match coordinator.group(gid) {
            None => out.push(ConsistencyViolation::DanglingGroup { actor: id, group: gid }),
            Some(group) if !group.contains(id) => {
                out.push(ConsistencyViolation::NotListed { actor: id, group: gid });
            },
            Some(_) => {},
        }
    }

    for group in coordinator.groups() {
        let gid = group.id();
        let members = group.members();
        if members.is_empty() {
            out.push(ConsistencyViolation::EmptyGroup { group: gid });
            continue;
        }
        if !group.contains(group.leader()) {
            out.push(ConsistencyViolation::LeaderNotMember {
                group: gid,
                leader: group.leader(),
            });
        }
        for (i, member) in members.iter().enumerate() {
            if members[..i].contains(member) {
                out.push(ConsistencyViolation::DuplicateMember {
                    group: gid,
                    actor: *member,
                });
            }
            match registry.state(*member) {
                None => out.push(ConsistencyViolation::StaleMember {
                    group: gid,
                    actor: *member,
                }),
                Some(state) if state.group() != gid => {
                    out.push(ConsistencyViolation::MemberMismatch {
                        group: gid,
                        actor: *member,
                        actual: state.group(),
                    });
                },
                Some(_) => {},
            }
        }
        let min = if group.is_forming() { 1 } else { group.min_size() };
        if members.len() < min || members.len() > group.max_size() {
            out.push(ConsistencyViolation::Capacity {
                group: gid,
                size: members.len(),
                min,
                max: group.max_size(),
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorState;
    use crate::config::GroupConfig;
    use crate::group::GroupKind;
    use crate::registry::Actor;
    use glam::Vec3;
    use muster_common::Color;

    fn spawn(registry: &mut ActorRegistry, x: f32) -> ActorId {
        let id = registry.allocate_id();
        registry.insert(Actor::new(ActorState::new(
            id,
            Vec3::new(x, 0.0, 0.0),
            Color::WHITE,
        )));
        id
    }

    #[test]
    fn test_clean_world_passes() {
        let mut registry = ActorRegistry::new();
        let mut coordinator = GroupCoordinator::new();
        let config = GroupConfig::default();
        let ids: Vec<ActorId> = (0..4).map(|i| spawn(&mut registry, i as f32)).collect();
        for id in &ids {
            coordinator.try_join_or_create(*id, GroupKind::Static, &config, &mut registry);
        }
        assert!(check(&registry, &coordinator).is_empty());
    }

    #[test]
    fn test_detects_dangling_group_id() {
        let mut registry = ActorRegistry::new();
        let coordinator = GroupCoordinator::new();
        let a = spawn(&mut registry, 0.0);
        registry
            .state_mut(a)
            .expect("a")
            .set_group(GroupId::from_raw(42));
        assert_eq!(
            check(&registry, &coordinator),
            vec![ConsistencyViolation::DanglingGroup {
                actor: a,
                group: GroupId::from_raw(42)
            }]
        );
    }

    #[test]
    fn test_detects_stale_member() {
        let mut registry = ActorRegistry::new();
        let mut coordinator = GroupCoordinator::new();
        let config = GroupConfig::default();
        let a = spawn(&mut registry, 0.0);
        spawn(&mut registry, 1.0);
        spawn(&mut registry, 2.0);
        coordinator.try_join_or_create(a, GroupKind::Static, &config, &mut registry);
        registry.remove(a);

        let violations = check(&registry, &coordinator);
        assert!(violations
            .iter()
            .any(|v| matches!(v, ConsistencyViolation::StaleMember { actor, .. } if *actor == a)));
    }
}
