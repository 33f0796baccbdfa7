//! Simulation configuration.
//!
//! Tunables for behavior timers, group sizes, formation geometry, replication
//! and the lobby. Configuration can be loaded from and saved to a TOML file.

use crate::capabilities::WalkableBounds;
use crate::group::GroupKind;
use muster_common::{Color, ConfigError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Relative probabilities for the next behavior after a timer expires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorWeights {
    /// Weight of going idle
    pub idle: f32,
    /// Weight of wandering
    pub wander: f32,
    /// Weight of seeking a static group
    pub seek_static: f32,
    /// Weight of seeking a walking group
    pub seek_walking: f32,
}

impl Default for BehaviorWeights {
    fn default() -> Self {
        Self {
            idle: 0.4,
            wander: 0.4,
            seek_static: 0.2,
            seek_walking: 0.0,
        }
    }
}

impl BehaviorWeights {
    /// Sum of all weights.
    #[must_use]
    pub fn total(&self) -> f32 {
        self.idle + self.wander + self.seek_static + self.seek_walking
    }

    /// Clamps negatives to zero and rescales so the weights sum to 1.
    /// Falls back to the defaults if every weight is zero.
    pub fn normalize(&mut self) {
        self.idle = self.idle.max(0.0);
        self.wander = self.wander.max(0.0);
        self.seek_static = self.seek_static.max(0.0);
        self.seek_walking = self.seek_walking.max(0.0);
        let total = self.total();
        if total <= f32::EPSILON {
            *self = Self::default();
            return;
        }
        self.idle /= total;
        self.wander /= total;
        self.seek_static /= total;
        self.seek_walking /= total;
    }
}

/// Behavior state machine timers and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Lower bound of the random state timer (seconds)
    pub min_state_time: f32,
    /// Upper bound of the random state timer (seconds)
    pub max_state_time: f32,
    /// Seeking/forming timeout (seconds)
    pub max_seeking_time: f32,
    /// Maximum extra random time added to the seeking timeout
    pub seek_jitter: f32,
    /// Idle time after a navigation failure
    pub unreachable_idle_time: f32,
    /// Radius for wander destinations
    pub wander_radius: f32,
    /// Time between death and despawn
    pub death_animation_time: f32,
    /// Next-behavior weights
    pub weights: BehaviorWeights,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            min_state_time: 3.0,
            max_state_time: 8.0,
            max_seeking_time: 6.0,
            seek_jitter: 1.0,
            unreachable_idle_time: 1.0,
            wander_radius: 6.0,
            death_animation_time: 2.0,
            weights: BehaviorWeights::default(),
        }
    }
}

/// Size window and geometry for one kind of group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupKindConfig {
    /// Minimum members for a committed group
    pub min_size: usize,
    /// Maximum members
    pub max_size: usize,
    /// Circle radius (static) or column spacing (walking)
    pub formation_radius: f32,
}

impl Default for GroupKindConfig {
    fn default() -> Self {
        Self {
            min_size: 3,
            max_size: 6,
            formation_radius: 2.5,
        }
    }
}

/// Group discovery and formation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Radius for discovering groups and candidates
    pub search_radius: f32,
    /// Distance to a formation target below which no new move order is issued
    pub formation_hysteresis: f32,
    /// Distance a walking group's leader travels per leg
    pub walk_leg_radius: f32,
    /// Tint of ungrouped actors
    pub default_tint: Color,
    /// Static (circle) groups
    pub static_group: GroupKindConfig,
    /// Walking (column) groups
    pub walking_group: GroupKindConfig,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            search_radius: 8.0,
            formation_hysteresis: 0.5,
            walk_leg_radius: 10.0,
            default_tint: Color::WHITE,
            static_group: GroupKindConfig::default(),
            walking_group: GroupKindConfig {
                min_size: 2,
                max_size: 4,
                formation_radius: 1.5,
            },
        }
    }
}

impl GroupConfig {
    /// Size window and geometry for `kind`.
    #[must_use]
    pub const fn kind_config(&self, kind: GroupKind) -> &GroupKindConfig {
        match kind {
            GroupKind::Static => &self.static_group,
            GroupKind::Walking => &self.walking_group,
        }
    }
}

/// Replication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Per-observer queue capacity in frames
    pub observer_queue: usize,
    /// Client interpolation window (seconds)
    pub interpolation_time: f32,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            observer_queue: 256,
            interpolation_time: 0.1,
        }
    }
}

/// Lobby character-selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Number of exclusive slots
    pub slot_count: u16,
    /// Ticks to wait after a client joins before auto-assigning a slot
    pub auto_assign_delay_ticks: u64,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            slot_count: 4,
            auto_assign_delay_ticks: 30,
        }
    }
}

/// Kinematic navigation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Walkable area
    pub bounds: WalkableBounds,
    /// Agent speed (units per second)
    pub speed: f32,
    /// Arrival tolerance
    pub arrival_tolerance: f32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            bounds: WalkableBounds::default(),
            speed: 3.0,
            arrival_tolerance: 0.05,
        }
    }
}

/// Complete simulation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// RNG seed for the session
    pub seed: u64,
    /// Behavior settings
    pub behavior: BehaviorConfig,
    /// Group settings
    pub groups: GroupConfig,
    /// Replication settings
    pub replication: ReplicationConfig,
    /// Lobby settings
    pub lobby: LobbyConfig,
    /// Navigation settings
    pub navigation: NavigationConfig,
}

impl SimConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match Self::try_load_from(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to load config file: {e}");
                Self::default()
            },
        }
    }

    /// Load and validate configuration, reporting failures.
    pub fn try_load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate();
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        let b = &mut self.behavior;
        b.min_state_time = b.min_state_time.max(0.1);
        b.max_state_time = b.max_state_time.max(b.min_state_time);
        b.max_seeking_time = b.max_seeking_time.max(0.1);
        b.seek_jitter = b.seek_jitter.max(0.0);
        b.unreachable_idle_time = b.unreachable_idle_time.max(0.1);
        b.wander_radius = b.wander_radius.max(0.0);
        b.death_animation_time = b.death_animation_time.max(0.0);
        b.weights.normalize();

        let g = &mut self.groups;
        g.search_radius = g.search_radius.max(0.0);
        g.formation_hysteresis = g.formation_hysteresis.max(0.0);
        g.walk_leg_radius = g.walk_leg_radius.max(0.0);
        g.default_tint = g.default_tint.clamped();
        for kind in [&mut g.static_group, &mut g.walking_group] {
            kind.min_size = kind.min_size.max(2);
            kind.max_size = kind.max_size.max(kind.min_size);
            kind.formation_radius = kind.formation_radius.max(0.0);
        }

        self.replication.observer_queue = self.replication.observer_queue.clamp(1, 65_536);
        self.replication.interpolation_time = self.replication.interpolation_time.max(0.0);

        self.lobby.slot_count = self.lobby.slot_count.max(1);

        let n = &mut self.navigation;
        n.speed = n.speed.max(0.01);
        n.arrival_tolerance = n.arrival_tolerance.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = BehaviorWeights::default();
        assert!((w.total() - 1.0).abs() < 1e-6);
        assert!((w.idle - 0.4).abs() < 1e-6);
        assert!((w.seek_static - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_weights() {
        let mut w = BehaviorWeights {
            idle: 2.0,
            wander: 2.0,
            seek_static: -1.0,
            seek_walking: 4.0,
        };
        w.normalize();
        assert!((w.total() - 1.0).abs() < 1e-6);
        assert_eq!(w.seek_static, 0.0);
        assert!((w.seek_walking - 0.5).abs() < 1e-6);

        let mut zero = BehaviorWeights {
            idle: 0.0,
            wander: 0.0,
            seek_static: 0.0,
            seek_walking: 0.0,
        };
        zero.normalize();
        assert_eq!(zero, BehaviorWeights::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SimConfig::default();

        config.behavior.min_state_time = 5.0;
        config.behavior.max_state_time = 1.0;
        config.groups.static_group.min_size = 0;
        config.groups.static_group.max_size = 1;
        config.lobby.slot_count = 0;

        config.validate();

        assert_eq!(config.behavior.max_state_time, 5.0);
        assert_eq!(config.groups.static_group.min_size, 2);
        assert_eq!(config.groups.static_group.max_size, 2);
        assert_eq!(config.lobby.slot_count, 1);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("muster.toml");

        let mut config = SimConfig::default();
        config.seed = 99;
        config.groups.search_radius = 12.0;
        config.behavior.weights.seek_walking = 0.2;
        config.behavior.weights.seek_static = 0.0;

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = SimConfig::load_from(&config_path);
        assert_eq!(loaded.seed, 99);
        assert!((loaded.groups.search_radius - 12.0).abs() < 1e-6);
        assert!((loaded.behavior.weights.seek_walking - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = SimConfig::load_from("/nonexistent/path/muster.toml");
        assert_eq!(config.lobby.slot_count, 4);
    }

    #[test]
    fn test_config_load_invalid_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "seed = [not toml").expect("write");

        assert!(matches!(
            SimConfig::try_load_from(&path),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(SimConfig::load_from(&path).seed, 0);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SimConfig = toml::from_str("seed = 5\n[groups]\nsearch_radius = 3.0\n")
            .expect("parse partial config");
        assert_eq!(config.seed, 5);
        assert!((config.groups.search_radius - 3.0).abs() < 1e-6);
        assert_eq!(config.groups.static_group.min_size, 3);
    }
}
