//! Per-actor replicated state.

use crate::replicated::ReplicatedField;
use glam::Vec3;
use muster_common::{ActorId, Color, GroupId, ReplicationError, Role};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifies one replicated field of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldId {
    /// Authoritative position
    Position,
    /// Normalized facing/movement direction
    MovementIntent,
    /// Whether the actor is currently moving
    IsMoving,
    /// Visual tint
    Tint,
    /// Liveness
    Alive,
    /// Current group (or `GroupId::NONE`)
    GroupId,
}

impl FieldId {
    /// All fields in commit order.
    pub const ALL: [Self; 6] = [
        Self::Position,
        Self::MovementIntent,
        Self::IsMoving,
        Self::Tint,
        Self::Alive,
        Self::GroupId,
    ];
}

/// A typed field value as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Position value
    Position(Vec3),
    /// Movement intent value
    MovementIntent(Vec3),
    /// Is-moving value
    IsMoving(bool),
    /// Tint value
    Tint(Color),
    /// Alive value
    Alive(bool),
    /// Group value
    Group(GroupId),
}

impl FieldValue {
    /// Returns which field this value belongs to.
    #[must_use]
    pub const fn field_id(&self) -> FieldId {
        match self {
            Self::Position(_) => FieldId::Position,
            Self::MovementIntent(_) => FieldId::MovementIntent,
            Self::IsMoving(_) => FieldId::IsMoving,
            Self::Tint(_) => FieldId::Tint,
            Self::Alive(_) => FieldId::Alive,
            Self::Group(_) => FieldId::GroupId,
        }
    }
}

/// One committed `(actor, field, value)` change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    /// Actor the field belongs to
    pub actor: ActorId,
    /// Field that changed
    pub field: FieldId,
    /// New value
    pub value: FieldValue,
}

impl FieldUpdate {
    /// Creates an update, deriving the field id from the value.
    #[must_use]
    pub const fn new(actor: ActorId, value: FieldValue) -> Self {
        Self {
            actor,
            field: value.field_id(),
            value,
        }
    }
}

/// Read-only copy of an actor's replicated values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    /// Actor ID
    pub id: ActorId,
    /// Position
    pub position: Vec3,
    /// Movement intent
    pub movement_intent: Vec3,
    /// Is moving
    pub is_moving: bool,
    /// Tint
    pub tint: Color,
    /// Alive
    pub alive: bool,
    /// Group
    pub group_id: GroupId,
}

/// Server-local, non-replicated working data.
#[derive(Debug, Clone, Default)]
pub struct ActorScratch {
    /// Last target handed to navigation
    pub move_target: Option<Vec3>,
    /// Tick the actor was spawned on
    pub spawned_tick: u64,
}

/// The replicated field bundle of one actor plus local scratch.
#[derive(Debug)]
pub struct ActorState {
    id: ActorId,
    /// Authoritative position
    pub position: ReplicatedField<Vec3>,
    /// Direction the server believes the actor is moving in
    pub movement_intent: ReplicatedField<Vec3>,
    /// Whether the actor is moving
    pub is_moving: ReplicatedField<bool>,
    /// Visual tint
    pub tint: ReplicatedField<Color>,
    /// Liveness
    pub alive: ReplicatedField<bool>,
    /// Current group
    pub group_id: ReplicatedField<GroupId>,
    /// Local scratch data
    pub scratch: ActorScratch,
}

impl ActorState {
    /// Creates a live, ungrouped actor at `position`.
    #[must_use]
    pub fn new(id: ActorId, position: Vec3, tint: Color) -> Self {
        Self {
            id,
            position: ReplicatedField::server("position", position),
            movement_intent: ReplicatedField::server("movement_intent", Vec3::ZERO),
            is_moving: ReplicatedField::server("is_moving", false),
            tint: ReplicatedField::server("tint", tint),
            alive: ReplicatedField::server("alive", true),
            group_id: ReplicatedField::server("group_id", GroupId::NONE),
            scratch: ActorScratch::default(),
        }
    }

    /// Returns the actor ID.
    #[must_use]
    pub const fn id(&self) -> ActorId {
        self.id
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        *self.position.read()
    }

    /// Current group.
    #[must_use]
    pub fn group(&self) -> GroupId {
        *self.group_id.read()
    }

    /// Whether the actor is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        *self.alive.read()
    }

    /// Server write of the position.
    pub fn set_position(&mut self, position: Vec3) {
        log_rejected(self.id, self.position.write(Role::Server, position));
    }

    /// Server write of the movement intent. Non-zero inputs are normalized.
    pub fn set_movement_intent(&mut self, intent: Vec3) {
        let intent = intent.normalize_or_zero();
        log_rejected(self.id, self.movement_intent.write(Role::Server, intent));
    }

    /// Server write of the is-moving flag.
    pub fn set_moving(&mut self, moving: bool) {
        log_rejected(self.id, self.is_moving.write(Role::Server, moving));
    }

    /// Server write of the tint.
    pub fn set_tint(&mut self, tint: Color) {
        log_rejected(self.id, self.tint.write(Role::Server, tint));
    }

    /// Server write of liveness.
    pub fn set_alive(&mut self, alive: bool) {
        log_rejected(self.id, self.alive.write(Role::Server, alive));
    }

    /// Server write of the group id. Only the group coordinator calls this.
    pub(crate) fn set_group(&mut self, group: GroupId) {
        log_rejected(self.id, self.group_id.write(Role::Server, group));
    }

    /// Returns whether any field has uncommitted writes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.position.is_dirty()
            || self.movement_intent.is_dirty()
            || self.is_moving.is_dirty()
            || self.tint.is_dirty()
            || self.alive.is_dirty()
            || self.group_id.is_dirty()
    }

    /// Commits every field and returns the changes in [`FieldId::ALL`] order.
    pub fn commit(&mut self) -> Vec<FieldUpdate> {
        let id = self.id;
        let mut out = Vec::new();
        if let Some(c) = self.position.commit() {
            out.push(FieldUpdate::new(id, FieldValue::Position(c.current)));
        }
        if let Some(c) = self.movement_intent.commit() {
            out.push(FieldUpdate::new(id, FieldValue::MovementIntent(c.current)));
        }
        if let Some(c) = self.is_moving.commit() {
            out.push(FieldUpdate::new(id, FieldValue::IsMoving(c.current)));
        }
        if let Some(c) = self.tint.commit() {
            out.push(FieldUpdate::new(id, FieldValue::Tint(c.current)));
        }
        if let Some(c) = self.alive.commit() {
            out.push(FieldUpdate::new(id, FieldValue::Alive(c.current)));
        }
        if let Some(c) = self.group_id.commit() {
            out.push(FieldUpdate::new(id, FieldValue::Group(c.current)));
        }
        out
    }

    /// Retires every field. Pending changes are discarded.
    pub fn retire(&mut self) {
        self.position.retire();
        self.movement_intent.retire();
        self.is_moving.retire();
        self.tint.retire();
        self.alive.retire();
        self.group_id.retire();
    }

    /// Returns a read-only copy of the values as of the last commit.
    #[must_use]
    pub fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            id: self.id,
            position: *self.position.committed(),
            movement_intent: *self.movement_intent.committed(),
            is_moving: *self.is_moving.committed(),
            tint: *self.tint.committed(),
            alive: *self.alive.committed(),
            group_id: *self.group_id.committed(),
        }
    }
}

fn log_rejected(actor: ActorId, result: Result<(), ReplicationError>) {
    if let Err(e) = result {
        debug!("{actor}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> ActorState {
        ActorState::new(ActorId::from_raw(1), Vec3::ZERO, Color::WHITE)
    }

    #[test]
    fn test_new_actor_is_clean_and_ungrouped() {
        let a = actor();
        assert!(!a.is_dirty());
        assert!(a.is_alive());
        assert!(a.group().is_none());
    }

    #[test]
    fn test_commit_orders_fields() {
        let mut a = actor();
        a.set_group(GroupId::from_raw(2));
        a.set_position(Vec3::new(1.0, 0.0, 0.0));
        a.set_moving(true);

        let updates = a.commit();
        let fields: Vec<FieldId> = updates.iter().map(|u| u.field).collect();
        assert_eq!(
            fields,
            vec![FieldId::Position, FieldId::IsMoving, FieldId::GroupId]
        );
        assert!(!a.is_dirty());
    }

    #[test]
    fn test_movement_intent_is_normalized() {
        let mut a = actor();
        a.set_movement_intent(Vec3::new(3.0, 0.0, 4.0));
        assert!((a.movement_intent.read().length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_retired_actor_ignores_writes() {
        let mut a = actor();
        a.set_position(Vec3::ONE);
        a.retire();
        a.set_position(Vec3::new(5.0, 0.0, 5.0));
        assert!(a.commit().is_empty());
        assert_eq!(a.position(), Vec3::ONE);
    }

    #[test]
    fn test_snapshot_matches_fields() {
        let mut a = actor();
        a.set_tint(Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(a.snapshot().tint, Color::WHITE, "uncommitted write not shown");

        a.commit();
        let snap = a.snapshot();
        assert_eq!(snap.tint, Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(snap.id, a.id());
    }

    #[test]
    fn test_field_value_ids() {
        for (value, id) in [
            (FieldValue::Position(Vec3::ZERO), FieldId::Position),
            (FieldValue::IsMoving(true), FieldId::IsMoving),
            (FieldValue::Group(GroupId::NONE), FieldId::GroupId),
        ] {
            assert_eq!(value.field_id(), id);
        }
    }
}
