//! Per-actor behavior state machine.
//!
//! Each actor cycles through idle, wandering and group states on timers. A
//! machine never owns the world: every step receives a [`BehaviorContext`]
//! with the registry, the group coordinator and navigation. When a machine
//! has to act on another actor (a leader committing its group, members
//! released by a disband), the other actor's machine is copied out of the
//! registry, driven, and written back.

use crate::capabilities::Navigation;
use crate::config::SimConfig;
use crate::coordinator::{GroupCoordinator, JoinOutcome, LeaveOutcome};
use crate::events::{emit, SimEvent};
use crate::formation::target_position_for_member;
use crate::group::GroupKind;
use crate::registry::ActorRegistry;
use crossbeam_channel::Sender;
use glam::Vec3;
use muster_common::{planar_direction, planar_distance, ActorId, GroupId};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Behavior states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BehaviorState {
    /// Standing still
    #[default]
    Idle,
    /// Walking to random nearby points
    Wandering,
    /// Looking for a static group to join or found
    SeekingStaticGroup,
    /// Leading a static group that is still gathering
    FormingStaticGroup,
    /// Holding a slot in a static group
    InStaticGroup,
    /// Looking for a walking group to join or found
    SeekingWalkingGroup,
    /// Leading a walking group that is still gathering
    FormingWalkingGroup,
    /// Holding a slot in a walking group
    InWalkingGroup,
    /// Playing the death animation; no further decisions
    Dead,
}

impl BehaviorState {
    /// Seeking state for `kind`.
    #[must_use]
    pub const fn seeking(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Static => Self::SeekingStaticGroup,
            GroupKind::Walking => Self::SeekingWalkingGroup,
        }
    }

    /// Forming state for `kind`.
    #[must_use]
    pub const fn forming(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Static => Self::FormingStaticGroup,
            GroupKind::Walking => Self::FormingWalkingGroup,
        }
    }

    /// In-group state for `kind`.
    #[must_use]
    pub const fn in_group(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Static => Self::InStaticGroup,
            GroupKind::Walking => Self::InWalkingGroup,
        }
    }

    /// Group kind this state relates to, if any.
    #[must_use]
    pub const fn group_kind(self) -> Option<GroupKind> {
        match self {
            Self::SeekingStaticGroup | Self::FormingStaticGroup | Self::InStaticGroup => {
                Some(GroupKind::Static)
            },
            Self::SeekingWalkingGroup | Self::FormingWalkingGroup | Self::InWalkingGroup => {
                Some(GroupKind::Walking)
            },
            Self::Idle | Self::Wandering | Self::Dead => None,
        }
    }

    /// Whether this is a seeking state.
    #[must_use]
    pub const fn is_seeking(self) -> bool {
        matches!(self, Self::SeekingStaticGroup | Self::SeekingWalkingGroup)
    }

    /// Whether this is a forming state.
    #[must_use]
    pub const fn is_forming(self) -> bool {
        matches!(self, Self::FormingStaticGroup | Self::FormingWalkingGroup)
    }

    /// Whether this is an in-group state.
    #[must_use]
    pub const fn is_in_group(self) -> bool {
        matches!(self, Self::InStaticGroup | Self::InWalkingGroup)
    }

    /// Idle or wandering: free to be counted as a group candidate.
    #[must_use]
    pub const fn is_undirected(self) -> bool {
        matches!(self, Self::Idle | Self::Wandering)
    }
}

/// A one-shot countdown in simulation seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timer {
    remaining: Option<f32>,
}

impl Timer {
    /// Arms the timer.
    pub fn set(&mut self, seconds: f32) {
        self.remaining = Some(seconds.max(0.0));
    }

    /// Disarms the timer.
    pub fn clear(&mut self) {
        self.remaining = None;
    }

    /// Seconds left, or `None` when disarmed.
    #[must_use]
    pub const fn remaining(&self) -> Option<f32> {
        self.remaining
    }

    /// Counts down by `dt`. Returns true on the tick the timer fires.
    pub fn tick(&mut self, dt: f32) -> bool {
        let Some(remaining) = self.remaining.as_mut() else {
            return false;
        };
        *remaining -= dt;
        if *remaining <= 0.0 {
            self.remaining = None;
            return true;
        }
        false
    }
}

/// Everything a behavior step may touch.
pub struct BehaviorContext<'a> {
    /// Actor registry
    pub registry: &'a mut ActorRegistry,
    /// Group coordinator
    pub coordinator: &'a mut GroupCoordinator,
    /// Navigation capability
    pub navigation: &'a mut dyn Navigation,
    /// Seeded simulation RNG
    pub rng: &'a mut fastrand::Rng,
    /// Configuration
    pub config: &'a SimConfig,
    /// Event sink
    pub events: Option<&'a Sender<SimEvent>>,
    /// Tick length in seconds
    pub dt: f32,
}

/// Server-side behavior of one actor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BehaviorStateMachine {
    state: BehaviorState,
    state_timer: Timer,
    seek_timer: Timer,
}

impl BehaviorStateMachine {
    /// Creates a machine in `Idle` with no timer armed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> BehaviorState {
        self.state
    }

    /// State timer.
    #[must_use]
    pub const fn state_timer(&self) -> Timer {
        self.state_timer
    }

    /// Seeking/forming timer.
    #[must_use]
    pub const fn seek_timer(&self) -> Timer {
        self.seek_timer
    }

    /// Whether the actor has died.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.state == BehaviorState::Dead
    }

    /// Sets the state without entry actions or timers.
    pub(crate) fn force_state(&mut self, state: BehaviorState) {
        self.state = state;
    }

    /// Stops all decisions; only the death continuation remains.
    pub fn kill(&mut self) {
        self.state = BehaviorState::Dead;
        self.state_timer.clear();
        self.seek_timer.clear();
    }

    /// Enters `next`, arming its timers and running its entry action.
    pub fn enter(&mut self, id: ActorId, next: BehaviorState, ctx: &mut BehaviorContext<'_>) {
        let previous = self.state;
        self.state = next;
        self.state_timer.clear();
        self.seek_timer.clear();
        if previous != next {
            trace!("{id}: {previous:?} -> {next:?}");
            emit(
                ctx.events,
                SimEvent::BehaviorChanged {
                    actor: id,
                    from: previous,
                    to: next,
                },
            );
        }

        match next {
            BehaviorState::Idle => {
                self.state_timer.set(random_state_time(ctx));
                stop(id, ctx);
            },
            BehaviorState::Wandering => {
                self.state_timer.set(random_state_time(ctx));
                if !wander(id, ctx) {
                    self.idle_unreachable(id, ctx);
                }
            },
            BehaviorState::SeekingStaticGroup
            | BehaviorState::SeekingWalkingGroup
            | BehaviorState::FormingStaticGroup
            | BehaviorState::FormingWalkingGroup => {
                let b = &ctx.config.behavior;
                let seek = b.max_seeking_time + ctx.rng.f32() * b.seek_jitter;
                self.seek_timer.set(seek);
                stop(id, ctx);
            },
            BehaviorState::InStaticGroup | BehaviorState::InWalkingGroup => {
                self.state_timer.set(random_state_time(ctx));
                if let Some(state) = ctx.registry.state_mut(id) {
                    state.scratch.move_target = None;
                }
                self.step_in_group(id, ctx);
            },
            BehaviorState::Dead => {
                stop(id, ctx);
            },
        }
    }

    /// Advances the machine by one tick.
    pub fn tick(&mut self, id: ActorId, ctx: &mut BehaviorContext<'_>) {
        match self.state {
            BehaviorState::Dead => {},
            BehaviorState::Idle => {
                if self.state_timer.tick(ctx.dt) {
                    self.decide_next(id, ctx);
                }
            },
            BehaviorState::Wandering => {
                if self.state_timer.tick(ctx.dt) {
                    self.decide_next(id, ctx);
                } else if ctx.navigation.is_path_complete(id) && !wander(id, ctx) {
                    self.idle_unreachable(id, ctx);
                }
            },
            BehaviorState::SeekingStaticGroup => self.tick_seeking(id, GroupKind::Static, ctx),
            BehaviorState::SeekingWalkingGroup => self.tick_seeking(id, GroupKind::Walking, ctx),
            BehaviorState::FormingStaticGroup => self.tick_forming(id, GroupKind::Static, ctx),
            BehaviorState::FormingWalkingGroup => self.tick_forming(id, GroupKind::Walking, ctx),
            BehaviorState::InStaticGroup | BehaviorState::InWalkingGroup => {
                if self.state_timer.tick(ctx.dt) {
                    self.decide_next(id, ctx);
                } else {
                    self.step_in_group(id, ctx);
                }
            },
        }
    }

    /// Leaves any group and rolls the next behavior from the configured
    /// weights.
    pub fn decide_next(&mut self, id: ActorId, ctx: &mut BehaviorContext<'_>) {
        leave_group(id, ctx);
        let w = ctx.config.behavior.weights;
        let total = w.total();
        let next = if total <= f32::EPSILON {
            BehaviorState::Idle
        } else {
            let roll = ctx.rng.f32() * total;
            if roll < w.idle {
                BehaviorState::Idle
            } else if roll < w.idle + w.wander {
                BehaviorState::Wandering
            } else if roll < w.idle + w.wander + w.seek_static {
                BehaviorState::SeekingStaticGroup
            } else {
                BehaviorState::SeekingWalkingGroup
            }
        };
        debug!("{id} decided {next:?}");
        self.enter(id, next, ctx);
    }

    /// Falls back to a non-group state (idle or wander by their relative
    /// weights), leaving any group first.
    pub fn fall_back(&mut self, id: ActorId, ctx: &mut BehaviorContext<'_>) {
        leave_group(id, ctx);
        let w = ctx.config.behavior.weights;
        let total = w.idle + w.wander;
        let next = if total <= f32::EPSILON || ctx.rng.f32() * total < w.idle {
            BehaviorState::Idle
        } else {
            BehaviorState::Wandering
        };
        self.enter(id, next, ctx);
    }

    /// Navigation failed: leave any group and idle for the short timer.
    fn idle_unreachable(&mut self, id: ActorId, ctx: &mut BehaviorContext<'_>) {
        debug!("{id}: target unreachable, idling");
        leave_group(id, ctx);
        self.enter(id, BehaviorState::Idle, ctx);
        self.state_timer.set(ctx.config.behavior.unreachable_idle_time);
    }

    fn tick_seeking(&mut self, id: ActorId, kind: GroupKind, ctx: &mut BehaviorContext<'_>) {
        let outcome = ctx
            .coordinator
            .try_join_or_create(id, kind, &ctx.config.groups, ctx.registry);
        match outcome {
            JoinOutcome::Joined(_) => self.enter(id, BehaviorState::in_group(kind), ctx),
            JoinOutcome::CreatedLeading(_) => self.enter(id, BehaviorState::forming(kind), ctx),
            JoinOutcome::NoOp => {
                if self.seek_timer.tick(ctx.dt) {
                    debug!("{id} gave up seeking");
                    self.fall_back(id, ctx);
                }
            },
        }
    }

    fn tick_forming(&mut self, id: ActorId, kind: GroupKind, ctx: &mut BehaviorContext<'_>) {
        let gid = group_of(id, ctx);
        let Some(group) = ctx.coordinator.group(gid) else {
            self.fall_back(id, ctx);
            return;
        };
        if !group.is_forming() || group.leader() != id {
            self.enter(id, BehaviorState::in_group(kind), ctx);
            return;
        }

        if group.is_viable() {
            let members = group.members().to_vec();
            ctx.coordinator.commit(gid, ctx.registry);
            for member in members.into_iter().filter(|m| *m != id) {
                with_machine(ctx, member, |machine, ctx| {
                    machine.enter(member, BehaviorState::in_group(kind), ctx);
                });
            }
            self.enter(id, BehaviorState::in_group(kind), ctx);
            return;
        }

        if self.seek_timer.tick(ctx.dt) {
            debug!("{id}: group {} timed out while forming", gid.raw());
            let released = ctx
                .coordinator
                .disband(gid, &ctx.config.groups, ctx.registry);
            for member in released.into_iter().filter(|m| *m != id) {
                with_machine(ctx, member, |machine, ctx| machine.fall_back(member, ctx));
            }
            self.fall_back(id, ctx);
        }
    }

    fn step_in_group(&mut self, id: ActorId, ctx: &mut BehaviorContext<'_>) {
        let Some(kind) = self.state.group_kind() else {
            return;
        };
        let gid = group_of(id, ctx);
        let Some(group) = ctx.coordinator.group(gid) else {
            self.fall_back(id, ctx);
            return;
        };
        if group.is_forming() && group.leader() == id {
            self.enter(id, BehaviorState::forming(kind), ctx);
            return;
        }

        let moved = if kind == GroupKind::Walking && group.leader() == id {
            lead_walk(id, gid, ctx)
        } else {
            hold_formation(id, gid, kind, ctx)
        };
        if !moved {
            self.idle_unreachable(id, ctx);
        }
    }
}

/// Removes `id` from its group and settles the other actors affected.
pub fn leave_group(id: ActorId, ctx: &mut BehaviorContext<'_>) {
    if group_of(id, ctx).is_none() {
        return;
    }
    let outcome = ctx.coordinator.leave(id, &ctx.config.groups, ctx.registry);
    settle_leave(id, &outcome, ctx);
}

/// Applies the side effects of a leave: released members fall back, and the
/// new leader of a forming group takes over the forming state.
pub fn settle_leave(id: ActorId, outcome: &LeaveOutcome, ctx: &mut BehaviorContext<'_>) {
    for member in outcome.released.iter().copied().filter(|m| *m != id) {
        with_machine(ctx, member, |machine, ctx| machine.fall_back(member, ctx));
    }
    if let Some(leader) = outcome.forming_leader.filter(|l| *l != id) {
        let Some(kind) = ctx.coordinator.group(outcome.group).map(|g| g.kind()) else {
            return;
        };
        with_machine(ctx, leader, |machine, ctx| {
            machine.enter(leader, BehaviorState::forming(kind), ctx);
        });
    }
}

/// Copies `id`'s machine out of the registry, runs `f` on it and writes it
/// back.
fn with_machine<'a>(
    ctx: &mut BehaviorContext<'a>,
    id: ActorId,
    f: impl FnOnce(&mut BehaviorStateMachine, &mut BehaviorContext<'a>),
) {
    let Some(mut machine) = ctx.registry.get(id).map(|a| a.behavior.clone()) else {
        return;
    };
    if machine.is_dead() {
        return;
    }
    f(&mut machine, ctx);
    if let Some(actor) = ctx.registry.get_mut(id) {
        actor.behavior = machine;
    }
}

fn group_of(id: ActorId, ctx: &BehaviorContext<'_>) -> GroupId {
    ctx.registry.state(id).map_or(GroupId::NONE, |s| s.group())
}

fn position_of(id: ActorId, ctx: &BehaviorContext<'_>) -> Option<Vec3> {
    ctx.registry.state(id).map(|s| s.position())
}

fn random_state_time(ctx: &mut BehaviorContext<'_>) -> f32 {
    let b = &ctx.config.behavior;
    b.min_state_time + ctx.rng.f32() * (b.max_state_time - b.min_state_time)
}

fn stop(id: ActorId, ctx: &mut BehaviorContext<'_>) {
    ctx.navigation.stop(id);
    if let Some(state) = ctx.registry.state_mut(id) {
        state.scratch.move_target = None;
    }
}

fn order_move(id: ActorId, target: Vec3, ctx: &mut BehaviorContext<'_>) -> bool {
    if !ctx.navigation.move_toward(id, target) {
        return false;
    }
    if let Some(state) = ctx.registry.state_mut(id) {
        state.scratch.move_target = Some(target);
    }
    true
}

fn wander(id: ActorId, ctx: &mut BehaviorContext<'_>) -> bool {
    let Some(position) = position_of(id, ctx) else {
        return false;
    };
    let radius = ctx.config.behavior.wander_radius;
    match ctx.navigation.compute_walkable_point_near(position, radius) {
        Some(target) => order_move(id, target, ctx),
        None => false,
    }
}

/// Moves toward the formation slot when it is farther than the hysteresis
/// distance and the current order does not already lead there.
fn hold_formation(id: ActorId, gid: GroupId, kind: GroupKind, ctx: &mut BehaviorContext<'_>) -> bool {
    let radius = ctx.config.groups.kind_config(kind).formation_radius;
    let hysteresis = ctx.config.groups.formation_hysteresis;
    let Some(target) = ctx
        .coordinator
        .group(gid)
        .and_then(|g| target_position_for_member(g, id, radius))
    else {
        return true;
    };
    let Some(state) = ctx.registry.state(id) else {
        return true;
    };
    if planar_distance(state.position(), target) <= hysteresis {
        return true;
    }
    if let Some(current) = state.scratch.move_target {
        if planar_distance(current, target) <= hysteresis && !ctx.navigation.is_path_complete(id) {
            return true;
        }
    }
    order_move(id, target, ctx)
}

/// Walking group leader: walk legs between random waypoints, dragging the
/// column anchor along.
fn lead_walk(id: ActorId, gid: GroupId, ctx: &mut BehaviorContext<'_>) -> bool {
    let Some(position) = position_of(id, ctx) else {
        return true;
    };
    let hysteresis = ctx.config.groups.formation_hysteresis;
    let waypoint = ctx.coordinator.group(gid).and_then(|g| g.waypoint());
    let reached = waypoint.map_or(true, |w| planar_distance(position, w) <= hysteresis);

    let waypoint = if reached {
        let leg = ctx.config.groups.walk_leg_radius;
        let Some(next) = ctx.navigation.compute_walkable_point_near(position, leg) else {
            return false;
        };
        ctx.coordinator.set_waypoint(gid, Some(next));
        next
    } else {
        match waypoint {
            Some(w) => w,
            None => return true,
        }
    };

    let ordered = ctx
        .registry
        .state(id)
        .and_then(|s| s.scratch.move_target)
        .is_some_and(|t| t == waypoint);
    if (!ordered || ctx.navigation.is_path_complete(id)) && !order_move(id, waypoint, ctx) {
        return false;
    }
    ctx.coordinator
        .update_anchor(gid, position, planar_direction(position, waypoint));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorState;
    use crate::capabilities::{SimpleNavigator, WalkableBounds};
    use crate::config::BehaviorWeights;
    use crate::group::GroupType;
    use crate::registry::Actor;
    use muster_common::Color;

    struct Harness {
        registry: ActorRegistry,
        coordinator: GroupCoordinator,
        navigation: SimpleNavigator,
        rng: fastrand::Rng,
        config: SimConfig,
    }

    impl Harness {
        fn new(config: SimConfig) -> Self {
            Self {
                registry: ActorRegistry::new(),
                coordinator: GroupCoordinator::new(),
                navigation: SimpleNavigator::new(WalkableBounds::square(40.0), 4.0, 7),
                rng: fastrand::Rng::with_seed(11),
                config,
            }
        }

        fn spawn(&mut self, x: f32, z: f32) -> ActorId {
            let id = self.registry.allocate_id();
            let position = Vec3::new(x, 0.0, z);
            self.registry
                .insert(Actor::new(ActorState::new(id, position, Color::WHITE)));
            self.navigation.register(id, position);
            id
        }

        fn drive(&mut self, id: ActorId, f: impl FnOnce(&mut BehaviorStateMachine, &mut BehaviorContext<'_>)) {
            let mut machine = self.registry.get(id).expect("actor").behavior.clone();
            let mut ctx = BehaviorContext {
                registry: &mut self.registry,
                coordinator: &mut self.coordinator,
                navigation: &mut self.navigation,
                rng: &mut self.rng,
                config: &self.config,
                events: None,
                dt: 0.1,
            };
            f(&mut machine, &mut ctx);
            self.registry.get_mut(id).expect("actor").behavior = machine;
        }

        fn enter(&mut self, id: ActorId, state: BehaviorState) {
            self.drive(id, |m, ctx| m.enter(id, state, ctx));
        }

        fn tick(&mut self, id: ActorId) {
            self.drive(id, |m, ctx| m.tick(id, ctx));
        }

        fn state(&self, id: ActorId) -> BehaviorState {
            self.registry.get(id).expect("actor").behavior.state()
        }

        fn group(&self, id: ActorId) -> GroupId {
            self.registry.state(id).expect("actor").group()
        }
    }

    fn weights(idle: f32, wander: f32, seek_static: f32, seek_walking: f32) -> SimConfig {
        let mut config = SimConfig::default();
        config.behavior.weights = BehaviorWeights {
            idle,
            wander,
            seek_static,
            seek_walking,
        };
        config
    }

    #[test]
    fn test_timer_fires_once() {
        let mut t = Timer::default();
        assert!(!t.tick(1.0));
        t.set(0.25);
        assert!(!t.tick(0.1));
        assert!(!t.tick(0.1));
        assert!(t.tick(0.1));
        assert!(!t.tick(0.1));
        assert_eq!(t.remaining(), None);
    }

    #[test]
    fn test_state_timer_within_bounds() {
        let mut h = Harness::new(SimConfig::default());
        let a = h.spawn(0.0, 0.0);
        for _ in 0..20 {
            h.enter(a, BehaviorState::Idle);
            let t = h.registry.get(a).expect("a").behavior.state_timer();
            let secs = t.remaining().expect("armed");
            assert!((3.0..=8.0).contains(&secs));
        }
    }

    #[test]
    fn test_idle_expiry_rolls_weighted_choice() {
        let mut h = Harness::new(weights(0.0, 1.0, 0.0, 0.0));
        let a = h.spawn(0.0, 0.0);
        h.enter(a, BehaviorState::Idle);
        for _ in 0..100 {
            h.tick(a);
        }
        assert_eq!(h.state(a), BehaviorState::Wandering);
        assert!(h.navigation.target_of(a).is_some());
    }

    #[test]
    fn test_seeking_creates_then_joins() {
        let mut h = Harness::new(SimConfig::default());
        let a = h.spawn(0.0, 0.0);
        let b = h.spawn(1.0, 0.0);
        let c = h.spawn(0.0, 1.0);

        h.enter(a, BehaviorState::SeekingStaticGroup);
        h.tick(a);
        assert_eq!(h.state(a), BehaviorState::FormingStaticGroup);
        let gid = h.group(a);
        assert!(!gid.is_none());

        h.enter(b, BehaviorState::SeekingStaticGroup);
        h.tick(b);
        assert_eq!(h.state(b), BehaviorState::InStaticGroup);
        assert_eq!(h.group(b), gid);

        h.enter(c, BehaviorState::SeekingStaticGroup);
        h.tick(c);
        h.tick(a);

        let group = h.coordinator.group(gid).expect("group");
        assert_eq!(group.group_type(), GroupType::Static);
        assert_eq!(group.len(), 3);
        for id in [a, b, c] {
            assert_eq!(h.state(id), BehaviorState::InStaticGroup);
        }
    }

    #[test]
    fn test_forming_timeout_disbands() {
        let mut config = weights(1.0, 0.0, 0.0, 0.0);
        config.behavior.max_seeking_time = 0.5;
        config.behavior.seek_jitter = 0.0;
        let mut h = Harness::new(config);
        let a = h.spawn(0.0, 0.0);
        let b = h.spawn(1.0, 0.0);
        h.spawn(0.0, 1.0);

        h.enter(a, BehaviorState::SeekingStaticGroup);
        h.tick(a);
        h.enter(b, BehaviorState::SeekingStaticGroup);
        h.tick(b);
        let gid = h.group(a);

        for _ in 0..10 {
            h.tick(a);
        }
        assert!(h.coordinator.group(gid).is_none());
        assert!(h.group(a).is_none());
        assert!(h.group(b).is_none());
        assert_eq!(h.state(a), BehaviorState::Idle);
        assert_eq!(h.state(b), BehaviorState::Idle);
    }

    #[test]
    fn test_seek_timeout_falls_back() {
        let mut config = weights(0.0, 1.0, 0.0, 0.0);
        config.behavior.max_seeking_time = 0.3;
        config.behavior.seek_jitter = 0.0;
        let mut h = Harness::new(config);
        let a = h.spawn(0.0, 0.0);
        h.enter(a, BehaviorState::SeekingStaticGroup);
        for _ in 0..5 {
            h.tick(a);
        }
        assert_eq!(h.state(a), BehaviorState::Wandering);
        assert!(h.coordinator.is_empty());
    }

    #[test]
    fn test_unreachable_wander_idles_briefly() {
        let mut h = Harness::new(weights(0.0, 1.0, 0.0, 0.0));
        let a = h.spawn(500.0, 500.0);
        h.enter(a, BehaviorState::Wandering);
        assert_eq!(h.state(a), BehaviorState::Idle);
        let t = h.registry.get(a).expect("a").behavior.state_timer();
        assert_eq!(t.remaining(), Some(h.config.behavior.unreachable_idle_time));
    }

    #[test]
    fn test_member_issues_move_only_outside_hysteresis() {
        let mut h = Harness::new(SimConfig::default());
        let a = h.spawn(0.0, 0.0);
        let b = h.spawn(1.0, 0.0);
        h.spawn(0.0, 1.0);
        h.enter(a, BehaviorState::SeekingStaticGroup);
        h.tick(a);
        h.enter(b, BehaviorState::SeekingStaticGroup);
        h.tick(b);

        let first = h.navigation.target_of(b).expect("move order");
        h.tick(b);
        assert_eq!(h.navigation.target_of(b), Some(first));
        assert_eq!(
            h.registry.state(b).expect("b").scratch.move_target,
            Some(first)
        );
    }

    #[test]
    fn test_forming_leader_leaving_hands_over() {
        let mut h = Harness::new(weights(1.0, 0.0, 0.0, 0.0));
        let a = h.spawn(0.0, 0.0);
        let b = h.spawn(1.0, 0.0);
        h.spawn(0.0, 1.0);
        h.enter(a, BehaviorState::SeekingStaticGroup);
        h.tick(a);
        h.enter(b, BehaviorState::SeekingStaticGroup);
        h.tick(b);
        let gid = h.group(a);

        h.drive(a, |m, ctx| m.decide_next(a, ctx));
        assert!(h.group(a).is_none());
        assert_eq!(h.coordinator.group(gid).expect("group").leader(), b);
        assert_eq!(h.state(b), BehaviorState::FormingStaticGroup);
    }

    #[test]
    fn test_dead_machine_ignores_ticks() {
        let mut h = Harness::new(SimConfig::default());
        let a = h.spawn(0.0, 0.0);
        h.drive(a, |m, _| m.kill());
        for _ in 0..200 {
            h.tick(a);
        }
        assert_eq!(h.state(a), BehaviorState::Dead);
    }

    #[test]
    fn test_walking_leader_drags_anchor() {
        let mut h = Harness::new(SimConfig::default());
        let a = h.spawn(0.0, 0.0);
        let b = h.spawn(1.0, 0.0);
        h.enter(a, BehaviorState::SeekingWalkingGroup);
        h.tick(a);
        h.enter(b, BehaviorState::SeekingWalkingGroup);
        h.tick(b);
        h.tick(a);
        assert_eq!(h.state(a), BehaviorState::InWalkingGroup);
        let gid = h.group(a);
        let group = h.coordinator.group(gid).expect("group");
        assert_eq!(group.group_type(), GroupType::Walking);
        assert!(group.waypoint().is_some());
        assert_eq!(h.navigation.target_of(a), group.waypoint());
    }
}
