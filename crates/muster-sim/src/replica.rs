//! Client side of the replication bridge.
//!
//! A [`ClientReplica`] keeps one shadow per visible actor, built only from
//! received frames. Newly visible actors snap to their position; later
//! position updates, resync snapshots included, are interpolated over the
//! configured window. Visual effects are pushed to a [`VisualHooks`]
//! implementation.

use crate::actor::{ActorSnapshot, FieldValue};
use crate::capabilities::clips;
use crate::replication::ReplicationFrame;
use ahash::AHashMap;
use glam::Vec3;
use muster_common::{ActorId, Color, GroupId};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{trace, warn};

/// Visual effects driven by replicated changes.
pub trait VisualHooks {
    /// An actor became visible.
    fn on_spawn(&mut self, actor: &ShadowActor);
    /// A new authoritative position arrived.
    fn on_position(&mut self, actor: ActorId, target: Vec3);
    /// The moving flag changed; `clip` is the animation to play.
    fn on_moving_changed(&mut self, actor: ActorId, moving: bool, clip: &str);
    /// The tint changed.
    fn on_tint(&mut self, actor: ActorId, tint: Color);
    /// Liveness changed.
    fn on_alive_changed(&mut self, actor: ActorId, alive: bool);
    /// Group membership changed.
    fn on_group_changed(&mut self, actor: ActorId, group: GroupId);
    /// The actor is gone.
    fn on_despawn(&mut self, actor: ActorId);
}

/// Hooks that ignore everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHooks;

impl VisualHooks for NullHooks {
    fn on_spawn(&mut self, _actor: &ShadowActor) {}
    fn on_position(&mut self, _actor: ActorId, _target: Vec3) {}
    fn on_moving_changed(&mut self, _actor: ActorId, _moving: bool, _clip: &str) {}
    fn on_tint(&mut self, _actor: ActorId, _tint: Color) {}
    fn on_alive_changed(&mut self, _actor: ActorId, _alive: bool) {}
    fn on_group_changed(&mut self, _actor: ActorId, _group: GroupId) {}
    fn on_despawn(&mut self, _actor: ActorId) {}
}

/// A hook invocation captured by [`RecordingHooks`].
#[derive(Debug, Clone, PartialEq)]
pub enum HookCall {
    /// `on_spawn`
    Spawn(ActorId),
    /// `on_position`
    Position(ActorId, Vec3),
    /// `on_moving_changed` with the clip name
    Moving(ActorId, bool, String),
    /// `on_tint`
    Tint(ActorId, Color),
    /// `on_alive_changed`
    Alive(ActorId, bool),
    /// `on_group_changed`
    Group(ActorId, GroupId),
    /// `on_despawn`
    Despawn(ActorId),
}

/// Hooks that record every call.
#[derive(Debug, Default, Clone)]
pub struct RecordingHooks {
    /// Calls in order
    pub calls: Vec<HookCall>,
}

impl RecordingHooks {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls concerning `actor`.
    #[must_use]
    pub fn calls_for(&self, actor: ActorId) -> Vec<&HookCall> {
        self.calls
            .iter()
            .filter(|c| match c {
                HookCall::Spawn(a)
                | HookCall::Position(a, _)
                | HookCall::Moving(a, _, _)
                | HookCall::Tint(a, _)
                | HookCall::Alive(a, _)
                | HookCall::Group(a, _)
                | HookCall::Despawn(a) => *a == actor,
            })
            .collect()
    }
}

impl VisualHooks for RecordingHooks {
    fn on_spawn(&mut self, actor: &ShadowActor) {
        self.calls.push(HookCall::Spawn(actor.id));
    }

    fn on_position(&mut self, actor: ActorId, target: Vec3) {
        self.calls.push(HookCall::Position(actor, target));
    }

    fn on_moving_changed(&mut self, actor: ActorId, moving: bool, clip: &str) {
        self.calls
            .push(HookCall::Moving(actor, moving, clip.to_owned()));
    }

    fn on_tint(&mut self, actor: ActorId, tint: Color) {
        self.calls.push(HookCall::Tint(actor, tint));
    }

    fn on_alive_changed(&mut self, actor: ActorId, alive: bool) {
        self.calls.push(HookCall::Alive(actor, alive));
    }

    fn on_group_changed(&mut self, actor: ActorId, group: GroupId) {
        self.calls.push(HookCall::Group(actor, group));
    }

    fn on_despawn(&mut self, actor: ActorId) {
        self.calls.push(HookCall::Despawn(actor));
    }
}

/// Client-side copy of one actor.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowActor {
    /// Actor ID
    pub id: ActorId,
    /// Latest authoritative position
    pub position: Vec3,
    /// Latest movement intent (orientation only)
    pub movement_intent: Vec3,
    /// Latest moving flag
    pub is_moving: bool,
    /// Latest tint
    pub tint: Color,
    /// Latest liveness
    pub alive: bool,
    /// Latest group
    pub group_id: GroupId,
    from: Vec3,
    started_at: f64,
}

impl ShadowActor {
    fn from_snapshot(s: &ActorSnapshot, now: f64) -> Self {
        Self {
            id: s.id,
            position: s.position,
            movement_intent: s.movement_intent,
            is_moving: s.is_moving,
            tint: s.tint,
            alive: s.alive,
            group_id: s.group_id,
            from: s.position,
            started_at: now,
        }
    }

    /// Folds a snapshot of an already visible actor in as field updates.
    /// Only changed values reach the hooks and the position keeps
    /// interpolating from where it is rendered.
    fn resync(&mut self, s: &ActorSnapshot, now: f64, window: f32, hooks: &mut dyn VisualHooks) {
        if s.position != self.position {
            self.from = self.position_at(now, window);
            self.position = s.position;
            self.started_at = now;
            hooks.on_position(self.id, s.position);
        }
        self.movement_intent = s.movement_intent;
        if s.is_moving != self.is_moving {
            self.is_moving = s.is_moving;
            let clip = if s.is_moving { clips::WALK } else { clips::IDLE };
            hooks.on_moving_changed(self.id, s.is_moving, clip);
        }
        if s.tint != self.tint {
            self.tint = s.tint;
            hooks.on_tint(self.id, s.tint);
        }
        if s.alive != self.alive {
            self.alive = s.alive;
            hooks.on_alive_changed(self.id, s.alive);
        }
        if s.group_id != self.group_id {
            self.group_id = s.group_id;
            hooks.on_group_changed(self.id, s.group_id);
        }
    }

    /// Rendered position at `now`, interpolated over `window` seconds.
    #[must_use]
    pub fn position_at(&self, now: f64, window: f32) -> Vec3 {
        if window <= 0.0 {
            return self.position;
        }
        let t = ((now - self.started_at) / f64::from(window)).clamp(0.0, 1.0) as f32;
        self.from.lerp(self.position, t)
    }
}

/// Everything one client knows about the simulation.
#[derive(Debug, Clone)]
pub struct ClientReplica {
    actors: AHashMap<ActorId, ShadowActor>,
    last_tick: Option<u64>,
    interpolation_time: f32,
}

impl ClientReplica {
    /// Creates an empty replica interpolating over `interpolation_time` seconds.
    #[must_use]
    pub fn new(interpolation_time: f32) -> Self {
        Self {
            actors: AHashMap::new(),
            last_tick: None,
            interpolation_time: interpolation_time.max(0.0),
        }
    }

    /// Last applied server tick.
    #[must_use]
    pub const fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Number of visible actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Whether no actors are visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Shadow of `actor`.
    #[must_use]
    pub fn actor(&self, actor: ActorId) -> Option<&ShadowActor> {
        self.actors.get(&actor)
    }

    /// Visible actor IDs, sorted.
    #[must_use]
    pub fn actor_ids(&self) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self.actors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Rendered position of `actor` at render time `now`.
    #[must_use]
    pub fn position_at(&self, actor: ActorId, now: f64) -> Option<Vec3> {
        self.actors
            .get(&actor)
            .map(|a| a.position_at(now, self.interpolation_time))
    }

    /// Applies one frame received at time `now`.
    ///
    /// Returns false if the frame is stale (not newer than the last applied
    /// tick) and was discarded.
    pub fn apply(&mut self, frame: &ReplicationFrame, now: f64, hooks: &mut dyn VisualHooks) -> bool {
        if let Some(last) = self.last_tick {
            if frame.tick <= last {
                warn!("Discarding stale frame {} (last applied {last})", frame.tick);
                return false;
            }
        }
        self.last_tick = Some(frame.tick);

        if frame.full_snapshot {
            let keep: Vec<ActorId> = frame.spawned.iter().map(|s| s.id).collect();
            let gone: Vec<ActorId> = self
                .actors
                .keys()
                .filter(|id| !keep.contains(id))
                .copied()
                .collect();
            for id in gone {
                self.actors.remove(&id);
                hooks.on_despawn(id);
            }
        }

        for snapshot in &frame.spawned {
            if let Some(shadow) = self.actors.get_mut(&snapshot.id) {
                shadow.resync(snapshot, now, self.interpolation_time, hooks);
                continue;
            }
            let shadow = ShadowActor::from_snapshot(snapshot, now);
            hooks.on_spawn(&shadow);
            self.actors.insert(snapshot.id, shadow);
        }

        for update in &frame.updates {
            let Some(shadow) = self.actors.get_mut(&update.actor) else {
                trace!("Update for unknown {}", update.actor);
                continue;
            };
            match update.value {
                FieldValue::Position(p) => {
                    shadow.from = shadow.position_at(now, self.interpolation_time);
                    shadow.position = p;
                    shadow.started_at = now;
                    hooks.on_position(update.actor, p);
                },
                FieldValue::MovementIntent(v) => shadow.movement_intent = v,
                FieldValue::IsMoving(moving) => {
                    shadow.is_moving = moving;
                    let clip = if moving { clips::WALK } else { clips::IDLE };
                    hooks.on_moving_changed(update.actor, moving, clip);
                },
                FieldValue::Tint(c) => {
                    shadow.tint = c;
                    hooks.on_tint(update.actor, c);
                },
                FieldValue::Alive(alive) => {
                    shadow.alive = alive;
                    hooks.on_alive_changed(update.actor, alive);
                },
                FieldValue::Group(g) => {
                    shadow.group_id = g;
                    hooks.on_group_changed(update.actor, g);
                },
            }
        }

        for id in &frame.despawned {
            if self.actors.remove(id).is_some() {
                hooks.on_despawn(*id);
            }
        }
        true
    }
}

/// A replica shared between a network-apply loop and a render loop.
#[derive(Debug, Clone)]
pub struct ReplicaHandle {
    inner: Arc<RwLock<ClientReplica>>,
}

impl ReplicaHandle {
    /// Wraps a replica.
    #[must_use]
    pub fn new(replica: ClientReplica) -> Self {
        Self {
            inner: Arc::new(RwLock::new(replica)),
        }
    }

    /// Applies a frame under the write lock.
    pub fn apply(&self, frame: &ReplicationFrame, now: f64, hooks: &mut dyn VisualHooks) -> bool {
        self.inner.write().apply(frame, now, hooks)
    }

    /// Samples a rendered position under the read lock.
    #[must_use]
    pub fn position_at(&self, actor: ActorId, now: f64) -> Option<Vec3> {
        self.inner.read().position_at(actor, now)
    }

    /// Copies one shadow out.
    #[must_use]
    pub fn actor(&self, actor: ActorId) -> Option<ShadowActor> {
        self.inner.read().actor(actor).cloned()
    }

    /// Number of visible actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no actors are visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
