//! Group coordinator: the single owner of group membership.
//!
//! Every membership change goes through here so that a group's member list
//! and each member's replicated `group_id` are updated together. The
//! coordinator runs inside the tick and is never shared across threads.

use crate::config::GroupConfig;
use crate::events::{emit, SimEvent};
use crate::group::{Group, GroupKind};
use crate::registry::ActorRegistry;
use crossbeam_channel::Sender;
use glam::Vec3;
use muster_common::{centroid, planar_distance, ActorId, GroupId, IdSequence};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Result of [`GroupCoordinator::try_join_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Joined an existing group
    Joined(GroupId),
    /// Created a forming group led by the caller
    CreatedLeading(GroupId),
    /// Nothing suitable nearby
    NoOp,
}

/// Side effects of [`GroupCoordinator::leave`] that callers must act on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Group that was left (`NONE` if the actor was ungrouped)
    pub group: GroupId,
    /// New leader of a still-forming group
    pub forming_leader: Option<ActorId>,
    /// Members released because the group fell below its minimum size
    pub released: Vec<ActorId>,
    /// Whether the group no longer exists
    pub removed: bool,
}

/// Owns every group and mediates membership.
#[derive(Debug, Default)]
pub struct GroupCoordinator {
    groups: BTreeMap<GroupId, Group>,
    ids: IdSequence,
    events: Option<Sender<SimEvent>>,
}

impl GroupCoordinator {
    /// Creates an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes group events through `sender`.
    pub fn set_event_sender(&mut self, sender: Sender<SimEvent>) {
        self.events = Some(sender);
    }

    /// Returns a group.
    #[must_use]
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// Iterates groups in ID order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Number of live groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Puts `actor` into a nearby group of `kind`, or founds one.
    ///
    /// The nearest group of the same kind with room whose centroid lies within
    /// the search radius is joined. Failing that, a forming group led by
    /// `actor` is created when enough free candidates are nearby to reach the
    /// minimum size. Actors that are dead or already grouped get
    /// [`JoinOutcome::NoOp`].
    pub fn try_join_or_create(
        &mut self,
        actor: ActorId,
        kind: GroupKind,
        config: &GroupConfig,
        registry: &mut ActorRegistry,
    ) -> JoinOutcome {
        let Some(state) = registry.state(actor) else {
            return JoinOutcome::NoOp;
        };
        if !state.is_alive() || !state.group().is_none() {
            return JoinOutcome::NoOp;
        }
        let position = state.position();

        let nearest = self
            .groups
            .values()
            .filter(|g| g.kind() == kind && g.has_room())
            .map(|g| (g.id(), planar_distance(g.centroid(), position)))
            .filter(|(_, d)| *d <= config.search_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(id, _)| id);

        if let Some(id) = nearest {
            self.add_member(id, actor, registry);
            return JoinOutcome::Joined(id);
        }

        let params = config.kind_config(kind);
        let candidates = registry.count_candidates_near(position, config.search_radius, actor);
        if candidates + 1 < params.min_size {
            return JoinOutcome::NoOp;
        }

        let id = GroupId::from_raw(self.ids.next_raw());
        let group = Group::new(id, kind, actor, position, params.min_size, params.max_size);
        let tint = group.tint();
        self.groups.insert(id, group);
        if let Some(state) = registry.state_mut(actor) {
            state.set_group(id);
            state.set_tint(tint);
        }
        debug!("{actor} founded group {} ({kind:?})", id.raw());
        emit(
            self.events.as_ref(),
            SimEvent::GroupCreated {
                group: id,
                kind,
                leader: actor,
            },
        );
        JoinOutcome::CreatedLeading(id)
    }

    fn add_member(&mut self, id: GroupId, actor: ActorId, registry: &mut ActorRegistry) {
        let Some(group) = self.groups.get_mut(&id) else {
            return;
        };
        group.push_member(actor);
        let tint = group.tint();
        refresh_centroid(group, registry);
        if let Some(state) = registry.state_mut(actor) {
            state.set_group(id);
            state.set_tint(tint);
        }
        debug!("{actor} joined group {}", id.raw());
        emit(
            self.events.as_ref(),
            SimEvent::MemberJoined { group: id, actor },
        );
    }

    /// Removes `actor` from its group. Idempotent.
    ///
    /// An emptied group is deleted. A committed group that drops below its
    /// minimum size is disbanded and its remaining members released. When the
    /// leader of a forming group leaves, the first remaining member takes over
    /// and is reported in [`LeaveOutcome::forming_leader`].
    pub fn leave(
        &mut self,
        actor: ActorId,
        config: &GroupConfig,
        registry: &mut ActorRegistry,
    ) -> LeaveOutcome {
        let Some(state) = registry.state_mut(actor) else {
            return LeaveOutcome::default();
        };
        let id = state.group();
        if id.is_none() {
            return LeaveOutcome::default();
        }
        state.set_group(GroupId::NONE);
        state.set_tint(config.default_tint);

        let mut outcome = LeaveOutcome {
            group: id,
            ..LeaveOutcome::default()
        };

        let Some(group) = self.groups.get_mut(&id) else {
            error!("{actor} referenced missing group {}", id.raw());
            outcome.removed = true;
            return outcome;
        };
        let new_leader = group.remove_member(actor);
        debug!("{actor} left group {}", id.raw());
        emit(self.events.as_ref(), SimEvent::MemberLeft { group: id, actor });

        if group.is_empty() {
            self.groups.remove(&id);
            outcome.removed = true;
            emit(self.events.as_ref(), SimEvent::GroupRemoved { group: id });
            return outcome;
        }

        if !group.is_forming() && !group.is_viable() {
            outcome.released = self.disband(id, config, registry);
            outcome.removed = true;
            return outcome;
        }

        refresh_centroid(group, registry);
        if let Some(leader) = new_leader {
            emit(
                self.events.as_ref(),
                SimEvent::LeaderChanged { group: id, leader },
            );
            if group.is_forming() {
                outcome.forming_leader = Some(leader);
            }
        }
        outcome
    }

    /// Dissolves a group, clearing every member's group and tint.
    /// Returns the released members in slot order.
    pub fn disband(
        &mut self,
        id: GroupId,
        config: &GroupConfig,
        registry: &mut ActorRegistry,
    ) -> Vec<ActorId> {
        let Some(group) = self.groups.remove(&id) else {
            return Vec::new();
        };
        let released = group.members().to_vec();
        for member in &released {
            if let Some(state) = registry.state_mut(*member) {
                state.set_group(GroupId::NONE);
                state.set_tint(config.default_tint);
            }
        }
        info!("Group {} disbanded, released {}", id.raw(), released.len());
        emit(
            self.events.as_ref(),
            SimEvent::GroupDisbanded {
                group: id,
                released: released.len(),
            },
        );
        released
    }

    /// Commits a forming group that has reached its minimum size.
    /// Returns false if the group is missing, already committed or too small.
    pub fn commit(&mut self, id: GroupId, registry: &ActorRegistry) -> bool {
        let Some(group) = self.groups.get_mut(&id) else {
            return false;
        };
        if !group.is_forming() || !group.is_viable() {
            return false;
        }
        group.commit();
        refresh_centroid(group, registry);
        info!(
            "Group {} committed as {:?} with {} members",
            id.raw(),
            group.group_type(),
            group.len()
        );
        emit(
            self.events.as_ref(),
            SimEvent::GroupCommitted {
                group: id,
                size: group.len(),
            },
        );
        true
    }

    /// Moves a walking group's anchor to its leader and points it along
    /// `heading`.
    pub fn update_anchor(&mut self, id: GroupId, anchor: Vec3, heading: Vec3) {
        if let Some(group) = self.groups.get_mut(&id) {
            group.set_centroid(anchor);
            group.set_heading(heading);
        }
    }

    /// Sets a walking group's current destination.
    pub fn set_waypoint(&mut self, id: GroupId, waypoint: Option<Vec3>) {
        if let Some(group) = self.groups.get_mut(&id) {
            group.set_waypoint(waypoint);
        }
    }
}

/// Static groups sit at their members' centroid; walking groups are anchored
/// on their leader.
fn refresh_centroid(group: &mut Group, registry: &ActorRegistry) {
    let point = match group.kind() {
        GroupKind::Static => centroid(
            group
                .members()
                .iter()
                .filter_map(|m| registry.state(*m).map(|s| s.position())),
        ),
        GroupKind::Walking => registry.state(group.leader()).map(|s| s.position()),
    };
    if let Some(point) = point {
        group.set_centroid(point);
    }
}
