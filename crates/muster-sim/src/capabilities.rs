//! Capability interfaces consumed from excluded subsystems.
//!
//! Navigation, presentation and spatial queries live outside this crate; the
//! simulation only talks to them through these traits. [`SimpleNavigator`]
//! is the in-process navigator of the headless server; [`MockNavigation`]
//! and [`RecordingPresentation`] are for tests.

use ahash::AHashMap;
use glam::Vec3;
use muster_common::{planar_direction, planar_distance, ActorId, Color};
use serde::{Deserialize, Serialize};

/// Navigation agent control.
pub trait Navigation {
    /// Creates an agent for `actor` standing at `position`.
    fn register(&mut self, actor: ActorId, position: Vec3);
    /// Removes the agent for `actor`.
    fn unregister(&mut self, actor: ActorId);
    /// Picks a walkable point within `radius` of `position`.
    fn compute_walkable_point_near(&mut self, position: Vec3, radius: f32) -> Option<Vec3>;
    /// Starts moving `actor` toward `target`. Returns false if the target is unreachable.
    fn move_toward(&mut self, actor: ActorId, target: Vec3) -> bool;
    /// Stops `actor` where it stands.
    fn stop(&mut self, actor: ActorId);
    /// Returns true once `actor` has no remaining path.
    fn is_path_complete(&self, actor: ActorId) -> bool;
    /// Advances every agent by `dt` seconds.
    fn advance(&mut self, dt: f32);
    /// Current agent position.
    fn agent_position(&self, actor: ActorId) -> Option<Vec3>;
    /// Current agent velocity (zero when idle).
    fn agent_velocity(&self, actor: ActorId) -> Vec3;
}

/// Server-side presentation hooks.
pub trait Presentation {
    /// Plays an animation clip on `actor`.
    fn play_animation(&mut self, actor: ActorId, clip: &str);
    /// Applies a tint to `actor`.
    fn set_tint(&mut self, actor: ActorId, color: Color);
}

/// Spatial lookup of actors.
pub trait ProximityQuery {
    /// Returns actors whose position lies within `radius` of `position`.
    fn find_actors_in_radius(&self, position: Vec3, radius: f32) -> Vec<ActorId>;
}

/// Animation clip names used by the simulation.
pub mod clips {
    /// Standing still
    pub const IDLE: &str = "idle";
    /// Walking
    pub const WALK: &str = "walk";
    /// Death
    pub const DEATH: &str = "death";
}

/// Axis-aligned walkable rectangle on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkableBounds {
    /// Minimum x
    pub min_x: f32,
    /// Minimum z
    pub min_z: f32,
    /// Maximum x
    pub max_x: f32,
    /// Maximum z
    pub max_z: f32,
}

impl WalkableBounds {
    /// Creates a square centered on the origin.
    #[must_use]
    pub fn square(half_extent: f32) -> Self {
        Self {
            min_x: -half_extent,
            min_z: -half_extent,
            max_x: half_extent,
            max_z: half_extent,
        }
    }

    /// Returns whether `p` lies inside the bounds.
    #[must_use]
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.z >= self.min_z && p.z <= self.max_z
    }
}

impl Default for WalkableBounds {
    fn default() -> Self {
        Self::square(50.0)
    }
}

#[derive(Debug, Clone)]
struct Agent {
    position: Vec3,
    target: Option<Vec3>,
    velocity: Vec3,
}

/// Straight-line kinematic navigation inside rectangular bounds.
#[derive(Debug)]
pub struct SimpleNavigator {
    agents: AHashMap<ActorId, Agent>,
    bounds: WalkableBounds,
    speed: f32,
    arrival_tolerance: f32,
    rng: fastrand::Rng,
}

impl SimpleNavigator {
    /// Sample attempts per walkable-point query.
    const SAMPLE_ATTEMPTS: usize = 8;

    /// Creates a navigator.
    #[must_use]
    pub fn new(bounds: WalkableBounds, speed: f32, seed: u64) -> Self {
        Self {
            agents: AHashMap::new(),
            bounds,
            speed: speed.max(0.01),
            arrival_tolerance: 0.05,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Sets the distance at which a target counts as reached.
    #[must_use]
    pub fn with_arrival_tolerance(mut self, tolerance: f32) -> Self {
        self.arrival_tolerance = tolerance.max(0.0);
        self
    }

    /// Returns the walkable bounds.
    #[must_use]
    pub const fn bounds(&self) -> WalkableBounds {
        self.bounds
    }

    /// Returns the number of registered agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Returns the agent's current target.
    #[must_use]
    pub fn target_of(&self, actor: ActorId) -> Option<Vec3> {
        self.agents.get(&actor).and_then(|a| a.target)
    }
}

impl Navigation for SimpleNavigator {
    fn register(&mut self, actor: ActorId, position: Vec3) {
        self.agents.insert(
            actor,
            Agent {
                position,
                target: None,
                velocity: Vec3::ZERO,
            },
        );
    }

    fn unregister(&mut self, actor: ActorId) {
        self.agents.remove(&actor);
    }

    fn compute_walkable_point_near(&mut self, position: Vec3, radius: f32) -> Option<Vec3> {
        for _ in 0..Self::SAMPLE_ATTEMPTS {
            let angle = self.rng.f32() * std::f32::consts::TAU;
            let dist = self.rng.f32() * radius.max(0.0);
            let candidate = Vec3::new(
                position.x + angle.cos() * dist,
                position.y,
                position.z + angle.sin() * dist,
            );
            if self.bounds.contains(candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn move_toward(&mut self, actor: ActorId, target: Vec3) -> bool {
        if !self.bounds.contains(target) {
            return false;
        }
        match self.agents.get_mut(&actor) {
            Some(agent) => {
                agent.target = Some(target);
                true
            },
            None => false,
        }
    }

    fn stop(&mut self, actor: ActorId) {
        if let Some(agent) = self.agents.get_mut(&actor) {
            agent.target = None;
            agent.velocity = Vec3::ZERO;
        }
    }

    fn is_path_complete(&self, actor: ActorId) -> bool {
        self.agents.get(&actor).map_or(true, |a| a.target.is_none())
    }

    fn advance(&mut self, dt: f32) {
        let step = self.speed * dt.max(0.0);
        let tolerance = self.arrival_tolerance;
        for agent in self.agents.values_mut() {
            let Some(target) = agent.target else {
                agent.velocity = Vec3::ZERO;
                continue;
            };
            let dist = planar_distance(agent.position, target);
            if dist <= tolerance.max(step) {
                agent.position = Vec3::new(target.x, agent.position.y, target.z);
                agent.target = None;
                agent.velocity = Vec3::ZERO;
                continue;
            }
            let dir = planar_direction(agent.position, target);
            agent.position += dir * step;
            agent.velocity = dir * self.speed;
        }
    }

    fn agent_position(&self, actor: ActorId) -> Option<Vec3> {
        self.agents.get(&actor).map(|a| a.position)
    }

    fn agent_velocity(&self, actor: ActorId) -> Vec3 {
        self.agents.get(&actor).map_or(Vec3::ZERO, |a| a.velocity)
    }
}

/// Scriptable navigation for tests.
///
/// Agents teleport to their target on the next `advance`. Move orders are
/// recorded, and reachability can be switched off to exercise failure paths.
#[derive(Debug, Default)]
pub struct MockNavigation {
    positions: AHashMap<ActorId, Vec3>,
    targets: AHashMap<ActorId, Vec3>,
    /// Every accepted `(actor, target)` move order, in order
    pub orders: Vec<(ActorId, Vec3)>,
    /// When false, every move order and walkable-point query fails
    pub unreachable: bool,
}

impl MockNavigation {
    /// Creates a navigator where everything is reachable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of orders issued to `actor`.
    #[must_use]
    pub fn orders_for(&self, actor: ActorId) -> usize {
        self.orders.iter().filter(|(a, _)| *a == actor).count()
    }
}

impl Navigation for MockNavigation {
    fn register(&mut self, actor: ActorId, position: Vec3) {
        self.positions.insert(actor, position);
    }

    fn unregister(&mut self, actor: ActorId) {
        self.positions.remove(&actor);
        self.targets.remove(&actor);
    }

    fn compute_walkable_point_near(&mut self, position: Vec3, radius: f32) -> Option<Vec3> {
        if self.unreachable {
            return None;
        }
        Some(position + Vec3::new(radius * 0.5, 0.0, 0.0))
    }

    fn move_toward(&mut self, actor: ActorId, target: Vec3) -> bool {
        if self.unreachable || !self.positions.contains_key(&actor) {
            return false;
        }
        self.targets.insert(actor, target);
        self.orders.push((actor, target));
        true
    }

    fn stop(&mut self, actor: ActorId) {
        self.targets.remove(&actor);
    }

    fn is_path_complete(&self, actor: ActorId) -> bool {
        !self.targets.contains_key(&actor)
    }

    fn advance(&mut self, _dt: f32) {
        for (actor, target) in self.targets.drain() {
            if let Some(p) = self.positions.get_mut(&actor) {
                *p = target;
            }
        }
    }

    fn agent_position(&self, actor: ActorId) -> Option<Vec3> {
        self.positions.get(&actor).copied()
    }

    fn agent_velocity(&self, actor: ActorId) -> Vec3 {
        match (self.positions.get(&actor), self.targets.get(&actor)) {
            (Some(p), Some(t)) => planar_direction(*p, *t),
            _ => Vec3::ZERO,
        }
    }
}

/// Presentation that discards every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresentation;

impl Presentation for NullPresentation {
    fn play_animation(&mut self, _actor: ActorId, _clip: &str) {}
    fn set_tint(&mut self, _actor: ActorId, _color: Color) {}
}

/// A presentation call captured by [`RecordingPresentation`].
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationCall {
    /// `play_animation`
    Animation(ActorId, String),
    /// `set_tint`
    Tint(ActorId, Color),
}

/// Presentation that records every call, for tests and diagnostics.
#[derive(Debug, Default, Clone)]
pub struct RecordingPresentation {
    calls: Vec<PresentationCall>,
}

impl RecordingPresentation {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded calls.
    #[must_use]
    pub fn calls(&self) -> &[PresentationCall] {
        &self.calls
    }

    /// Returns the clips played on `actor`, in order.
    #[must_use]
    pub fn clips_for(&self, actor: ActorId) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                PresentationCall::Animation(a, clip) if *a == actor => Some(clip.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Presentation for RecordingPresentation {
    fn play_animation(&mut self, actor: ActorId, clip: &str) {
        self.calls
            .push(PresentationCall::Animation(actor, clip.to_owned()));
    }

    fn set_tint(&mut self, actor: ActorId, color: Color) {
        self.calls.push(PresentationCall::Tint(actor, color));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> ActorId {
        ActorId::from_raw(n)
    }

    #[test]
    fn test_agent_walks_to_target() {
        let mut nav = SimpleNavigator::new(WalkableBounds::square(20.0), 2.0, 1);
        nav.register(id(1), Vec3::ZERO);
        assert!(nav.move_toward(id(1), Vec3::new(4.0, 0.0, 0.0)));
        assert!(!nav.is_path_complete(id(1)));

        nav.advance(1.0);
        let p = nav.agent_position(id(1)).expect("agent");
        assert!((p.x - 2.0).abs() < 1e-4);
        assert!((nav.agent_velocity(id(1)).x - 2.0).abs() < 1e-4);

        nav.advance(1.0);
        assert!(nav.is_path_complete(id(1)));
        assert_eq!(nav.agent_velocity(id(1)), Vec3::ZERO);
    }

    #[test]
    fn test_out_of_bounds_target_refused() {
        let mut nav = SimpleNavigator::new(WalkableBounds::square(5.0), 1.0, 1);
        nav.register(id(1), Vec3::ZERO);
        assert!(!nav.move_toward(id(1), Vec3::new(50.0, 0.0, 0.0)));
        assert!(nav.is_path_complete(id(1)));
    }

    #[test]
    fn test_unknown_agent_refused() {
        let mut nav = SimpleNavigator::new(WalkableBounds::default(), 1.0, 1);
        assert!(!nav.move_toward(id(9), Vec3::ZERO));
        assert!(nav.is_path_complete(id(9)));
    }

    #[test]
    fn test_walkable_point_within_radius_and_bounds() {
        let mut nav = SimpleNavigator::new(WalkableBounds::square(10.0), 1.0, 42);
        for _ in 0..50 {
            if let Some(p) = nav.compute_walkable_point_near(Vec3::new(9.0, 0.0, 9.0), 3.0) {
                assert!(nav.bounds().contains(p));
                assert!(planar_distance(p, Vec3::new(9.0, 0.0, 9.0)) <= 3.0 + 1e-4);
            }
        }
    }

    #[test]
    fn test_walkable_point_outside_world_is_none() {
        let mut nav = SimpleNavigator::new(WalkableBounds::square(1.0), 1.0, 3);
        assert_eq!(
            nav.compute_walkable_point_near(Vec3::new(500.0, 0.0, 500.0), 2.0),
            None
        );
    }

    #[test]
    fn test_mock_navigation_teleports_and_records() {
        let mut nav = MockNavigation::new();
        nav.register(id(1), Vec3::ZERO);
        assert!(nav.move_toward(id(1), Vec3::new(3.0, 0.0, 0.0)));
        assert_eq!(nav.agent_velocity(id(1)), Vec3::X);
        nav.advance(0.1);
        assert!(nav.is_path_complete(id(1)));
        assert_eq!(nav.agent_position(id(1)), Some(Vec3::new(3.0, 0.0, 0.0)));
        assert_eq!(nav.orders_for(id(1)), 1);

        nav.unreachable = true;
        assert!(!nav.move_toward(id(1), Vec3::ZERO));
        assert_eq!(nav.compute_walkable_point_near(Vec3::ZERO, 1.0), None);
    }

    #[test]
    fn test_recording_presentation() {
        let mut p = RecordingPresentation::new();
        p.play_animation(id(1), clips::WALK);
        p.set_tint(id(1), Color::WHITE);
        p.play_animation(id(2), clips::IDLE);
        assert_eq!(p.clips_for(id(1)), vec!["walk"]);
        assert_eq!(p.calls().len(), 3);
    }
}
