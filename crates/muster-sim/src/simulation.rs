//! The authoritative simulation session.
//!
//! One [`Simulation`] owns every piece of server state and runs the
//! coordination tick: due continuations, navigation, kinematic sync, one
//! behavior step per actor in id order, then a single commit and replication
//! flush. Nothing observes a half-applied tick.

use crate::actor::{ActorSnapshot, ActorState, FieldValue};
use crate::behavior::{self, BehaviorContext, BehaviorState, BehaviorStateMachine};
use crate::capabilities::{clips, Navigation, Presentation};
use crate::config::SimConfig;
use crate::coordinator::GroupCoordinator;
use crate::events::{emit, EventBus, SimEvent};
use crate::invariants::{self, ConsistencyViolation};
use crate::registry::{Actor, ActorRegistry};
use crate::replication::{ObserverEndpoint, ReplicationServer};
use crate::scheduler::Scheduler;
use crossbeam_channel::Sender;
use glam::Vec3;
use muster_common::{ActorId, SimError};
use tracing::{debug, error, info, trace};

const DEFAULT_DT: f32 = 1.0 / 30.0;
const MOVING_EPSILON: f32 = 1e-6;

/// Delayed work owned by the simulation clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Continuation {
    /// Remove an actor once its death clip has played
    Despawn(ActorId),
}

/// Summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick that just closed
    pub tick: u64,
    /// Registered actors after the tick
    pub actors: usize,
    /// Active groups after the tick
    pub groups: usize,
    /// Field changes committed this tick
    pub updates: usize,
    /// Actors removed by continuations this tick
    pub despawned: usize,
    /// Frames handed to observers
    pub frames_sent: usize,
}

/// Server-side simulation session.
pub struct Simulation<N: Navigation, P: Presentation> {
    config: SimConfig,
    registry: ActorRegistry,
    coordinator: GroupCoordinator,
    navigation: N,
    presentation: P,
    rng: fastrand::Rng,
    scheduler: Scheduler<Continuation>,
    bridge: ReplicationServer,
    events: EventBus,
    event_sender: Sender<SimEvent>,
    tick: u64,
    last_dt: f32,
}

impl<N: Navigation, P: Presentation> Simulation<N, P> {
    /// Creates a session. The configuration is validated first.
    pub fn new(mut config: SimConfig, navigation: N, presentation: P) -> Self {
        config.validate();
        let events = EventBus::default();
        let event_sender = events.sender();
        let mut coordinator = GroupCoordinator::new();
        coordinator.set_event_sender(events.sender());
        info!("Simulation created (seed {})", config.seed);

        Self {
            rng: fastrand::Rng::with_seed(config.seed),
            bridge: ReplicationServer::new(config.replication.observer_queue),
            config,
            registry: ActorRegistry::new(),
            coordinator,
            navigation,
            presentation,
            scheduler: Scheduler::new(),
            events,
            event_sender,
            tick: 0,
            last_dt: DEFAULT_DT,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Actor registry.
    #[must_use]
    pub const fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    /// Group coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &GroupCoordinator {
        &self.coordinator
    }

    /// Navigation capability.
    #[must_use]
    pub const fn navigation(&self) -> &N {
        &self.navigation
    }

    /// Mutable navigation capability.
    pub fn navigation_mut(&mut self) -> &mut N {
        &mut self.navigation
    }

    /// Presentation capability.
    #[must_use]
    pub const fn presentation(&self) -> &P {
        &self.presentation
    }

    /// Mutable presentation capability.
    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.presentation
    }

    /// Replication bridge.
    #[must_use]
    pub const fn bridge(&self) -> &ReplicationServer {
        &self.bridge
    }

    /// Event bus.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Number of registered actors.
    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of active groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.coordinator.len()
    }

    /// Connects a replication observer. Its first frame lists every live actor.
    pub fn connect_observer(&mut self) -> ObserverEndpoint {
        self.bridge.connect()
    }

    fn context(&mut self, dt: f32) -> BehaviorContext<'_> {
        BehaviorContext {
            registry: &mut self.registry,
            coordinator: &mut self.coordinator,
            navigation: &mut self.navigation,
            rng: &mut self.rng,
            config: &self.config,
            events: Some(&self.event_sender),
            dt,
        }
    }

    fn ticks_for(&self, seconds: f32) -> u64 {
        let ticks = (seconds.max(0.0) / self.last_dt).ceil();
        (ticks as u64).max(1)
    }

    /// Spawns an actor at `position` and starts its behavior in `Idle`.
    pub fn spawn_actor(&mut self, position: Vec3) -> ActorId {
        let id = self.registry.allocate_id();
        let tint = self.config.groups.default_tint;
        let mut state = ActorState::new(id, position, tint);
        state.scratch.spawned_tick = self.tick;
        self.registry.insert(Actor::new(state));
        self.navigation.register(id, position);
        self.presentation.set_tint(id, tint);
        self.presentation.play_animation(id, clips::IDLE);

        let dt = self.last_dt;
        let mut machine = BehaviorStateMachine::new();
        {
            let mut ctx = self.context(dt);
            machine.enter(id, BehaviorState::Idle, &mut ctx);
        }
        if let Some(actor) = self.registry.get_mut(id) {
            actor.behavior = machine;
            self.bridge.record_spawn(actor.state.snapshot());
        }

        emit(Some(&self.event_sender), SimEvent::ActorSpawned { actor: id });
        debug!("Spawned {id} at {position:?}");
        id
    }

    /// Removes an actor. Its pending continuations are canceled and it
    /// leaves its group before it disappears from the registry.
    pub fn despawn_actor(&mut self, id: ActorId) -> Result<(), SimError> {
        if !self.registry.contains(id) {
            return Err(SimError::ActorNotFound(id));
        }
        self.scheduler
            .cancel_where(|task| *task == Continuation::Despawn(id));

        let dt = self.last_dt;
        {
            let mut ctx = self.context(dt);
            behavior::leave_group(id, &mut ctx);
        }

        self.navigation.stop(id);
        self.navigation.unregister(id);
        if let Some(mut actor) = self.registry.remove(id) {
            actor.state.retire();
        }
        self.bridge.record_despawn(id);
        emit(Some(&self.event_sender), SimEvent::ActorDespawned { actor: id });
        debug!("Despawned {id}");
        Ok(())
    }

    /// Kills an actor: it leaves its group, stops, plays its death clip and
    /// is despawned once the clip has had time to finish.
    pub fn kill_actor(&mut self, id: ActorId) -> Result<(), SimError> {
        let Some(actor) = self.registry.get(id) else {
            return Err(SimError::ActorNotFound(id));
        };
        if !actor.state.is_alive() || actor.behavior.is_dead() {
            return Err(SimError::ActorNotAlive(id));
        }

        let dt = self.last_dt;
        {
            let mut ctx = self.context(dt);
            behavior::leave_group(id, &mut ctx);
        }

        self.navigation.stop(id);
        if let Some(actor) = self.registry.get_mut(id) {
            actor.behavior.kill();
            actor.state.scratch.move_target = None;
            actor.state.set_alive(false);
            actor.state.set_moving(false);
            actor.state.set_movement_intent(Vec3::ZERO);
        }
        self.presentation.play_animation(id, clips::DEATH);

        let delay = self.ticks_for(self.config.behavior.death_animation_time);
        self.scheduler.schedule_in(delay, Continuation::Despawn(id));
        emit(Some(&self.event_sender), SimEvent::ActorKilled { actor: id });
        info!("{id} killed, despawn in {delay} ticks");
        Ok(())
    }

    /// Read-only copy of an actor's committed state.
    #[must_use]
    pub fn actor_snapshot(&self, id: ActorId) -> Option<ActorSnapshot> {
        self.registry.state(id).map(ActorState::snapshot)
    }

    /// Snapshots of every registered actor, in id order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<ActorSnapshot> {
        self.registry.iter().map(|a| a.state.snapshot()).collect()
    }

    /// Current behavior state of an actor.
    #[must_use]
    pub fn behavior_of(&self, id: ActorId) -> Option<BehaviorState> {
        self.registry.get(id).map(|a| a.behavior.state())
    }

    /// Directs an actor into `state` as if its own decision had picked it.
    /// The actor leaves its group first unless the state is a group state.
    /// `Dead` is routed through [`Self::kill_actor`].
    pub fn set_behavior(&mut self, id: ActorId, state: BehaviorState) -> Result<(), SimError> {
        if state == BehaviorState::Dead {
            return self.kill_actor(id);
        }
        let Some(mut machine) = self.registry.get(id).map(|a| a.behavior.clone()) else {
            return Err(SimError::ActorNotFound(id));
        };
        if machine.is_dead() {
            return Err(SimError::ActorNotAlive(id));
        }

        let dt = self.last_dt;
        {
            let mut ctx = self.context(dt);
            if !state.is_forming() && !state.is_in_group() {
                behavior::leave_group(id, &mut ctx);
                if let Some(updated) = ctx.registry.get(id).map(|a| a.behavior.clone()) {
                    machine = updated;
                }
            }
            machine.enter(id, state, &mut ctx);
        }
        if let Some(actor) = self.registry.get_mut(id) {
            actor.behavior = machine;
        }
        Ok(())
    }

    /// Checks membership and capacity consistency. Violations are logged.
    #[must_use]
    pub fn check_invariants(&self) -> Vec<ConsistencyViolation> {
        let violations = invariants::check(&self.registry, &self.coordinator);
        for v in &violations {
            error!("Consistency violation at tick {}: {v}", self.tick);
        }
        violations
    }

    /// Runs one coordination tick of `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        let dt = dt.max(0.0);
        if dt > 0.0 {
            self.last_dt = dt;
        }
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        for task in self.scheduler.advance_to(self.tick) {
            match task {
                Continuation::Despawn(id) => match self.despawn_actor(id) {
                    Ok(()) => report.despawned += 1,
                    Err(e) => debug!("Skipping despawn: {e}"),
                },
            }
        }

        self.navigation.advance(dt);
        self.sync_kinematics();

        for id in self.registry.ids() {
            let Some(mut machine) = self.registry.get(id).map(|a| a.behavior.clone()) else {
                continue;
            };
            if machine.is_dead() {
                continue;
            }
            {
                let mut ctx = self.context(dt);
                machine.tick(id, &mut ctx);
            }
            if let Some(actor) = self.registry.get_mut(id) {
                actor.behavior = machine;
            }
        }

        if cfg!(debug_assertions) {
            let violations = self.check_invariants();
            debug_assert!(
                violations.is_empty(),
                "consistency violations at tick {}: {violations:?}",
                self.tick
            );
        }

        report.updates = self.commit_fields();
        let live = if self.bridge.needs_snapshot() {
            self.snapshots()
        } else {
            Vec::new()
        };
        let stats = self.bridge.flush(self.tick, &live);
        report.frames_sent = stats.frames_sent;
        report.actors = self.registry.len();
        report.groups = self.coordinator.len();
        trace!("Tick {} done: {report:?}", self.tick);
        report
    }

    /// Copies agent kinematics into the replicated fields.
    fn sync_kinematics(&mut self) {
        for actor in self.registry.iter_mut() {
            if !actor.state.is_alive() {
                continue;
            }
            let id = actor.id();
            if let Some(position) = self.navigation.agent_position(id) {
                actor.state.set_position(position);
            }
            let velocity = self.navigation.agent_velocity(id);
            let moving = velocity.length_squared() > MOVING_EPSILON;
            actor.state.set_moving(moving);
            if moving {
                actor.state.set_movement_intent(velocity);
            }
        }
    }

    /// Commits every actor's fields, drives presentation from the committed
    /// values and hands the changes to the bridge.
    fn commit_fields(&mut self) -> usize {
        let mut total = 0;
        for actor in self.registry.iter_mut() {
            let alive = actor.state.is_alive();
            let updates = actor.state.commit();
            for update in &updates {
                match update.value {
                    FieldValue::Tint(color) => self.presentation.set_tint(update.actor, color),
                    FieldValue::IsMoving(moving) if alive => {
                        let clip = if moving { clips::WALK } else { clips::IDLE };
                        self.presentation.play_animation(update.actor, clip);
                    },
                    _ => {},
                }
            }
            total += updates.len();
            self.bridge.record_updates(updates);
        }
        total
    }
}
