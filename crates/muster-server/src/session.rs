//! Headless server session.
//!
//! Owns the simulation, a lobby and a set of in-process observers, and runs
//! the fixed-timestep loop for the configured duration.

use crate::config::ServerConfig;
use crate::timing::FixedTimestep;
use anyhow::Result;
use glam::Vec3;
use muster_common::ClientId;
use muster_sim::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Counters for a whole session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    /// Seed the session ran with
    pub seed: u64,
    /// Ticks run
    pub ticks: u64,
    /// Actors alive at the end
    pub actors: usize,
    /// Groups at the end
    pub groups: usize,
    /// Groups committed over the session
    pub groups_committed: usize,
    /// Groups disbanded over the session
    pub groups_disbanded: usize,
    /// Frames handed to observers
    pub frames_sent: u64,
    /// Lobby slots owned at the end
    pub slots_taken: usize,
}

/// Group counts by type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupCounts {
    /// Still gathering members
    pub forming: usize,
    /// Committed circles
    pub standing: usize,
    /// Committed columns
    pub walking: usize,
}

impl GroupCounts {
    /// Counts the coordinator's groups.
    #[must_use]
    pub fn of(coordinator: &GroupCoordinator) -> Self {
        let mut counts = Self::default();
        for group in coordinator.groups() {
            match group.group_type() {
                GroupType::Forming => counts.forming += 1,
                GroupType::Static => counts.standing += 1,
                GroupType::Walking => counts.walking += 1,
            }
        }
        counts
    }
}

struct Observer {
    endpoint: ObserverEndpoint,
    replica: ReplicaHandle,
}

/// A running server session.
pub struct Session {
    config: ServerConfig,
    sim: Simulation<SimpleNavigator, NullPresentation>,
    lobby: LobbyHandle,
    observers: Vec<Observer>,
    summary: SessionSummary,
}

impl Session {
    /// Builds the session: spawns the population, connects observers and
    /// seats lobby clients.
    #[must_use]
    pub fn new(mut config: ServerConfig) -> Self {
        config.validate();
        let seed = config.resolve_seed();

        let nav = &config.sim.navigation;
        let navigator = SimpleNavigator::new(nav.bounds, nav.speed, seed)
            .with_arrival_tolerance(nav.arrival_tolerance);
        let mut sim = Simulation::new(config.sim.clone(), navigator, NullPresentation);

        let mut rng = fastrand::Rng::with_seed(seed ^ 0x5eed);
        let half = config.spawn_half_extent;
        let bounds = nav.bounds;
        for _ in 0..config.actor_count {
            let x = (rng.f32() * 2.0 - 1.0) * half;
            let z = (rng.f32() * 2.0 - 1.0) * half;
            let position = Vec3::new(
                x.clamp(bounds.min_x, bounds.max_x),
                0.0,
                z.clamp(bounds.min_z, bounds.max_z),
            );
            sim.spawn_actor(position);
        }
        info!("Spawned {} actors", config.actor_count);

        let interpolation = config.sim.replication.interpolation_time;
        let observers = (0..config.observer_count)
            .map(|_| Observer {
                endpoint: sim.connect_observer(),
                replica: ReplicaHandle::new(ClientReplica::new(interpolation)),
            })
            .collect();

        let mut lobby = Lobby::new(&config.sim.lobby);
        for n in 1..=config.lobby_clients {
            lobby.join(ClientId::new(n));
        }

        Self {
            summary: SessionSummary {
                seed,
                ..SessionSummary::default()
            },
            config,
            sim,
            lobby: LobbyHandle::new(lobby),
            observers,
        }
    }

    /// Runs one tick of everything.
    pub fn step(&mut self) -> TickReport {
        let report = self.sim.tick(self.config.tick_dt());

        for event in self.sim.events().drain() {
            match event {
                SimEvent::GroupCommitted { .. } => self.summary.groups_committed += 1,
                SimEvent::GroupDisbanded { .. } => self.summary.groups_disbanded += 1,
                _ => {},
            }
        }

        for change in self.lobby.tick() {
            info!(
                "Slot {}: {:?} -> {:?}",
                change.slot.raw(),
                change.previous.map(ClientId::raw),
                change.current.map(ClientId::raw)
            );
        }

        let now = self.clock(report.tick);
        for observer in &self.observers {
            for frame in observer.endpoint.drain() {
                observer.replica.apply(&frame, now, &mut NullHooks);
            }
        }

        self.summary.ticks = report.tick;
        report
    }

    /// Observer-side clock for `tick`, in seconds.
    fn clock(&self, tick: u64) -> f64 {
        tick as f64 * f64::from(self.config.tick_dt())
    }

    /// Largest distance between a server position and what an observer
    /// renders for it right now.
    #[must_use]
    pub fn max_observer_lag(&self) -> f32 {
        let now = self.clock(self.sim.current_tick());
        let mut worst = 0.0f32;
        for snapshot in self.sim.snapshots() {
            for observer in &self.observers {
                if let Some(p) = observer.replica.position_at(snapshot.id, now) {
                    worst = worst.max(p.distance(snapshot.position));
                }
            }
        }
        worst
    }

    fn log_stats(&self, report: &TickReport) {
        let counts = GroupCounts::of(self.sim.coordinator());
        info!(
            "tick {}: {} actors, groups {}/{}/{} (forming/static/walking), {} frames sent, lag {:.2}",
            report.tick,
            report.actors,
            counts.forming,
            counts.standing,
            counts.walking,
            self.sim.bridge().frames_sent(),
            self.max_observer_lag()
        );
    }

    /// Runs the session to completion.
    pub fn run(&mut self) -> Result<SessionSummary> {
        let total = self.config.total_ticks();
        let stats_every = self.config.stats_interval_ticks();
        info!(
            "Session start: seed {}, {} ticks at {} Hz",
            self.summary.seed, total, self.config.tick_rate
        );

        let mut timing = FixedTimestep::new(self.config.tick_rate);
        let mut ticks = 0u64;
        while ticks < total {
            let due = if self.config.realtime {
                timing.sleep_remainder();
                let dt = timing.delta_time();
                u64::from(timing.accumulate(dt))
            } else {
                1
            };
            for _ in 0..due.min(total - ticks) {
                let report = self.step();
                ticks += 1;
                if report.tick % stats_every == 0 {
                    self.log_stats(&report);
                }
            }
        }

        let violations = self.sim.check_invariants();
        if !violations.is_empty() {
            warn!("Session ended with {} consistency violations", violations.len());
        }

        self.summary.actors = self.sim.actor_count();
        self.summary.groups = self.sim.group_count();
        self.summary.frames_sent = self.sim.bridge().frames_sent();
        self.summary.slots_taken = self.lobby.with(|lobby| lobby.arbiter().taken_count());

        debug!(
            "Final snapshot: {}",
            serde_json::to_string_pretty(&self.sim.snapshots())?
        );
        info!("Session summary: {}", serde_json::to_string(&self.summary)?);
        Ok(self.summary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ServerConfig {
        ServerConfig {
            tick_rate: 20,
            duration_secs: 10.0,
            seed: Some(42),
            actor_count: 10,
            spawn_half_extent: 5.0,
            observer_count: 2,
            lobby_clients: 2,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_session_spawns_population() {
        let session = Session::new(small_config());
        assert_eq!(session.sim.actor_count(), 10);
        assert_eq!(session.sim.bridge().observer_count(), 2);
    }

    #[test]
    fn test_session_runs_to_completion() {
        let mut session = Session::new(small_config());
        let summary = session.run().expect("run");
        assert_eq!(summary.seed, 42);
        assert_eq!(summary.ticks, 200);
        assert_eq!(summary.actors, 10);
        assert!(summary.frames_sent > 0);
        assert!(session.sim.check_invariants().is_empty());
    }

    #[test]
    fn test_lobby_clients_auto_assigned() {
        let mut config = small_config();
        config.sim.lobby.auto_assign_delay_ticks = 5;
        let mut session = Session::new(config);
        for _ in 0..10 {
            session.step();
        }
        let summary = session.run().expect("run");
        assert_eq!(summary.slots_taken, 2);
    }

    #[test]
    fn test_observers_keep_up() {
        let mut session = Session::new(small_config());
        for _ in 0..40 {
            session.step();
        }
        // Replicas lag by at most one interpolation window of travel
        let speed = session.sim.config().navigation.speed;
        let window = session.sim.config().replication.interpolation_time;
        assert!(session.max_observer_lag() <= speed * window + 0.01);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let mut a = Session::new(small_config());
        let mut b = Session::new(small_config());
        for _ in 0..100 {
            a.step();
            b.step();
        }
        assert_eq!(a.sim.snapshots(), b.sim.snapshots());
    }

    #[test]
    fn test_group_counts() {
        let coordinator = GroupCoordinator::new();
        assert_eq!(GroupCounts::of(&coordinator), GroupCounts::default());
    }
}
