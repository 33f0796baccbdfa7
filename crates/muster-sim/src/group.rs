//! Group aggregate: an ordered set of actors sharing a formation.

use glam::Vec3;
use muster_common::{ActorId, Color, GroupId};
use serde::{Deserialize, Serialize};

/// The formation a group is meant to hold once committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    /// Members stand in a circle around the centroid
    Static,
    /// Members walk in a column behind the leader
    Walking,
}

/// Lifecycle type of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupType {
    /// Gathering members; may hold fewer than `min_size`
    Forming,
    /// Committed circle
    Static,
    /// Committed column
    Walking,
}

impl GroupKind {
    /// The committed type for this kind.
    #[must_use]
    pub const fn committed_type(self) -> GroupType {
        match self {
            Self::Static => GroupType::Static,
            Self::Walking => GroupType::Walking,
        }
    }
}

/// Tints handed out to groups, cycled by group id.
const GROUP_PALETTE: [Color; 6] = [
    Color::rgb(0.95, 0.45, 0.40),
    Color::rgb(0.40, 0.75, 0.95),
    Color::rgb(0.55, 0.90, 0.45),
    Color::rgb(0.95, 0.85, 0.35),
    Color::rgb(0.80, 0.50, 0.95),
    Color::rgb(0.40, 0.90, 0.80),
];

/// Returns the palette tint for a group.
#[must_use]
pub fn tint_for(id: GroupId) -> Color {
    let index = (id.raw() as usize).wrapping_sub(1) % GROUP_PALETTE.len();
    GROUP_PALETTE[index]
}

/// A transient aggregate of actors.
///
/// Member order is insertion order and is the formation slot order for the
/// life of the group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    id: GroupId,
    kind: GroupKind,
    group_type: GroupType,
    members: Vec<ActorId>,
    leader: ActorId,
    centroid: Vec3,
    min_size: usize,
    max_size: usize,
    tint: Color,
    heading: Vec3,
    waypoint: Option<Vec3>,
}

impl Group {
    /// Creates a forming group with `leader` as its only member.
    #[must_use]
    pub fn new(
        id: GroupId,
        kind: GroupKind,
        leader: ActorId,
        position: Vec3,
        min_size: usize,
        max_size: usize,
    ) -> Self {
        Self {
            id,
            kind,
            group_type: GroupType::Forming,
            members: vec![leader],
            leader,
            centroid: position,
            min_size,
            max_size: max_size.max(min_size),
            tint: tint_for(id),
            heading: Vec3::Z,
            waypoint: None,
        }
    }

    /// Group ID.
    #[must_use]
    pub const fn id(&self) -> GroupId {
        self.id
    }

    /// Intended formation kind.
    #[must_use]
    pub const fn kind(&self) -> GroupKind {
        self.kind
    }

    /// Lifecycle type.
    #[must_use]
    pub const fn group_type(&self) -> GroupType {
        self.group_type
    }

    /// Whether the group is still gathering.
    #[must_use]
    pub fn is_forming(&self) -> bool {
        self.group_type == GroupType::Forming
    }

    /// Members in slot order.
    #[must_use]
    pub fn members(&self) -> &[ActorId] {
        &self.members
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Current leader.
    #[must_use]
    pub const fn leader(&self) -> ActorId {
        self.leader
    }

    /// Current centroid (static) or anchor (walking).
    #[must_use]
    pub const fn centroid(&self) -> Vec3 {
        self.centroid
    }

    /// Minimum committed size.
    #[must_use]
    pub const fn min_size(&self) -> usize {
        self.min_size
    }

    /// Maximum size.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Member tint.
    #[must_use]
    pub const fn tint(&self) -> Color {
        self.tint
    }

    /// Walking direction of a column.
    #[must_use]
    pub const fn heading(&self) -> Vec3 {
        self.heading
    }

    /// Current walking destination.
    #[must_use]
    pub const fn waypoint(&self) -> Option<Vec3> {
        self.waypoint
    }

    /// Whether another member fits.
    #[must_use]
    pub fn has_room(&self) -> bool {
        self.members.len() < self.max_size
    }

    /// Whether the group meets its minimum size.
    #[must_use]
    pub fn is_viable(&self) -> bool {
        self.members.len() >= self.min_size
    }

    /// Whether `actor` is a member.
    #[must_use]
    pub fn contains(&self, actor: ActorId) -> bool {
        self.members.contains(&actor)
    }

    /// Formation slot of `actor`.
    #[must_use]
    pub fn slot_of(&self, actor: ActorId) -> Option<usize> {
        self.members.iter().position(|m| *m == actor)
    }

    pub(crate) fn push_member(&mut self, actor: ActorId) {
        if !self.contains(actor) {
            self.members.push(actor);
        }
    }

    /// Removes `actor`; reassigns the leader to the first remaining member.
    /// Returns the new leader when leadership changed.
    pub(crate) fn remove_member(&mut self, actor: ActorId) -> Option<ActorId> {
        let index = self.slot_of(actor)?;
        self.members.remove(index);
        if self.leader == actor {
            if let Some(first) = self.members.first() {
                self.leader = *first;
                return Some(self.leader);
            }
        }
        None
    }

    pub(crate) fn set_centroid(&mut self, centroid: Vec3) {
        self.centroid = centroid;
    }

    pub(crate) fn set_heading(&mut self, heading: Vec3) {
        if heading.length_squared() > 1e-8 {
            self.heading = heading.normalize();
        }
    }

    pub(crate) fn set_waypoint(&mut self, waypoint: Option<Vec3>) {
        self.waypoint = waypoint;
    }

    pub(crate) fn commit(&mut self) {
        self.group_type = self.kind.committed_type();
    }
}
