//! Actor registry: the live actor set of one simulation, in ID order.

use crate::actor::ActorState;
use crate::behavior::BehaviorStateMachine;
use crate::capabilities::ProximityQuery;
use glam::Vec3;
use muster_common::{planar_distance, ActorId, IdSequence};
use std::collections::BTreeMap;

/// One registered actor: replicated state plus its behavior machine.
#[derive(Debug)]
pub struct Actor {
    /// Replicated fields and scratch data
    pub state: ActorState,
    /// Behavior state machine
    pub behavior: BehaviorStateMachine,
}

impl Actor {
    /// Creates an actor entry in the idle state.
    #[must_use]
    pub fn new(state: ActorState) -> Self {
        Self {
            state,
            behavior: BehaviorStateMachine::new(),
        }
    }

    /// Returns the actor ID.
    #[must_use]
    pub const fn id(&self) -> ActorId {
        self.state.id()
    }
}

/// Owns every live actor.
///
/// Iteration is in ascending ID order, which keeps seeded runs reproducible.
#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: BTreeMap<ActorId, Actor>,
    ids: IdSequence,
}

impl ActorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a fresh actor ID.
    pub fn allocate_id(&mut self) -> ActorId {
        ActorId::from_raw(self.ids.next_raw())
    }

    /// Inserts an actor, replacing any entry with the same ID.
    pub fn insert(&mut self, actor: Actor) {
        self.actors.insert(actor.id(), actor);
    }

    /// Removes an actor.
    pub fn remove(&mut self, id: ActorId) -> Option<Actor> {
        self.actors.remove(&id)
    }

    /// Returns the actor entry.
    #[must_use]
    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    /// Returns the actor entry mutably.
    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    /// Returns the actor's replicated state.
    #[must_use]
    pub fn state(&self, id: ActorId) -> Option<&ActorState> {
        self.actors.get(&id).map(|a| &a.state)
    }

    /// Returns the actor's replicated state mutably.
    pub fn state_mut(&mut self, id: ActorId) -> Option<&mut ActorState> {
        self.actors.get_mut(&id).map(|a| &mut a.state)
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ActorId) -> bool {
        self.actors.contains_key(&id)
    }

    /// Number of registered actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Whether no actors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Registered IDs in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<ActorId> {
        self.actors.keys().copied().collect()
    }

    /// Iterates actors in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    /// Iterates actors mutably in ID order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Actor> {
        self.actors.values_mut()
    }

    /// Counts live, ungrouped, undirected actors within `radius` of
    /// `position`, excluding `exclude`.
    #[must_use]
    pub fn count_candidates_near(&self, position: Vec3, radius: f32, exclude: ActorId) -> usize {
        self.actors
            .values()
            .filter(|a| a.id() != exclude)
            .filter(|a| a.state.is_alive() && a.state.group().is_none())
            .filter(|a| a.behavior.state().is_undirected())
            .filter(|a| planar_distance(a.state.position(), position) <= radius)
            .count()
    }
}

impl ProximityQuery for ActorRegistry {
    fn find_actors_in_radius(&self, position: Vec3, radius: f32) -> Vec<ActorId> {
        self.actors
            .values()
            .filter(|a| a.state.is_alive())
            .filter(|a| planar_distance(a.state.position(), position) <= radius)
            .map(Actor::id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorState;
    use muster_common::{Color, GroupId};

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
    fn test_ids_are_unique_and_ordered() {
        let mut registry = ActorRegistry::new();
        let a = spawn(&mut registry, 0.0);
        let b = spawn(&mut registry, 1.0);
        assert_ne!(a, b);
        assert_eq!(registry.ids(), vec![a, b]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_actor() {
        let mut registry = ActorRegistry::new();
        let a = spawn(&mut registry, 0.0);
        assert!(registry.remove(a).is_some());
        assert!(!registry.contains(a));
        assert!(registry.remove(a).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_proximity_skips_dead_and_far() {
        let mut registry = ActorRegistry::new();
        let near = spawn(&mut registry, 1.0);
        let far = spawn(&mut registry, 30.0);
        let dead = spawn(&mut registry, 2.0);
        registry.state_mut(dead).expect("dead").set_alive(false);

        let found = registry.find_actors_in_radius(Vec3::ZERO, 5.0);
        assert_eq!(found, vec![near]);
        assert!(!found.contains(&far));
    }

    #[test]
    fn test_candidates_exclude_grouped_and_directed() {
        let mut registry = ActorRegistry::new();
        let me = spawn(&mut registry, 0.0);
        let free = spawn(&mut registry, 1.0);
        let grouped = spawn(&mut registry, 1.5);
        let seeking = spawn(&mut registry, 2.0);
        registry
            .state_mut(grouped)
            .expect("grouped")
            .set_group(GroupId::from_raw(1));
        registry
            .get_mut(seeking)
            .expect("seeking")
            .behavior
            .force_state(BehaviorState::SeekingStaticGroup);

        assert_eq!(registry.count_candidates_near(Vec3::ZERO, 5.0, me), 1);
        assert_eq!(registry.count_candidates_near(Vec3::ZERO, 5.0, free), 1);
    }
}
