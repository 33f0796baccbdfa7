//! Server configuration.
//!
//! Session parameters (tick rate, population, observers, run length) plus the
//! embedded simulation configuration. Loaded from and saved to TOML.

use muster_sim::SimConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{info, warn};

/// Configuration file name.
pub const CONFIG_FILE: &str = "muster.toml";

/// Server configuration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    // === Timing ===
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Session length in seconds of simulated time
    pub duration_secs: f32,
    /// Pace ticks to wall-clock time (false = run as fast as possible)
    pub realtime: bool,
    /// Seconds between stats lines
    pub stats_interval_secs: f32,

    // === Population ===
    /// Session seed (None = random)
    pub seed: Option<u64>,
    /// Actors spawned at start
    pub actor_count: usize,
    /// Actors spawn in a square of this half-extent around the origin
    pub spawn_half_extent: f32,

    // === Clients ===
    /// In-process replication observers
    pub observer_count: usize,
    /// Lobby clients that join at start
    pub lobby_clients: u32,

    // === Simulation ===
    /// Simulation settings
    pub sim: SimConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // Timing
            tick_rate: 30,
            duration_secs: 60.0,
            realtime: false,
            stats_interval_secs: 5.0,

            // Population
            seed: None,
            actor_count: 24,
            spawn_half_extent: 12.0,

            // Clients
            observer_count: 2,
            lobby_clients: 3,

            sim: SimConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match fs::File::open(path) {
            Ok(mut file) => {
                let mut contents = String::new();
                if let Err(e) = file.read_to_string(&mut contents) {
                    warn!("Failed to read config file: {e}");
                    return Self::default();
                }

                match toml::from_str(&contents) {
                    Ok(config) => {
                        info!("Loaded config from {}", path.display());
                        config
                    },
                    Err(e) => {
                        warn!("Failed to parse config file: {e}");
                        Self::default()
                    },
                }
            },
            Err(e) => {
                warn!("Failed to open config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.tick_rate = self.tick_rate.clamp(1, 240);
        self.duration_secs = self.duration_secs.max(0.0);
        self.stats_interval_secs = self.stats_interval_secs.max(0.1);

        self.actor_count = self.actor_count.min(10_000);
        self.spawn_half_extent = self.spawn_half_extent.max(0.0);

        self.observer_count = self.observer_count.min(64);
        self.lobby_clients = self.lobby_clients.min(256);

        self.sim.validate();
    }

    /// Fixed tick length in seconds.
    #[must_use]
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Number of ticks the session runs for.
    #[must_use]
    pub fn total_ticks(&self) -> u64 {
        (self.duration_secs * self.tick_rate as f32).ceil() as u64
    }

    /// Ticks between stats lines.
    #[must_use]
    pub fn stats_interval_ticks(&self) -> u64 {
        ((self.stats_interval_secs * self.tick_rate as f32).round() as u64).max(1)
    }

    /// Resolves the session seed, drawing one if none is configured. Drawn
    /// seeds stay within TOML's integer range.
    pub fn resolve_seed(&mut self) -> u64 {
        let seed = *self.seed.get_or_insert_with(|| fastrand::u64(..i64::MAX as u64));
        self.sim.seed = seed;
        seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.actor_count, 24);
        assert!(config.seed.is_none());
        assert_eq!(config.total_ticks(), 1800);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ServerConfig::default();

        config.tick_rate = 0;
        config.stats_interval_secs = 0.0;
        config.sim.groups.static_group.min_size = 0;

        config.validate();

        assert_eq!(config.tick_rate, 1);
        assert!((config.stats_interval_secs - 0.1).abs() < 0.001);
        assert_eq!(config.sim.groups.static_group.min_size, 2);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("server.toml");

        let mut config = ServerConfig::default();
        config.tick_rate = 20;
        config.seed = Some(12345);
        config.sim.groups.search_radius = 11.0;

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = ServerConfig::load_from(&config_path);
        assert_eq!(loaded.tick_rate, 20);
        assert_eq!(loaded.seed, Some(12345));
        assert!((loaded.sim.groups.search_radius - 11.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = ServerConfig::load_from("/nonexistent/path/muster.toml");
        assert_eq!(config.tick_rate, 30);
    }

    #[test]
    fn test_config_load_invalid_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("broken.toml");
        fs::write(&config_path, "tick_rate = \"fast\"").expect("write");

        let config = ServerConfig::load_from(&config_path);
        assert_eq!(config.tick_rate, 30);
    }

    #[test]
    fn test_resolve_seed_is_stable() {
        let mut config = ServerConfig::default();
        let seed = config.resolve_seed();
        assert_eq!(config.seed, Some(seed));
        assert_eq!(config.sim.seed, seed);
        assert_eq!(config.resolve_seed(), seed);
    }

    #[test]
    fn test_interval_ticks() {
        let mut config = ServerConfig::default();
        config.stats_interval_secs = 2.0;
        assert_eq!(config.stats_interval_ticks(), 60);
        assert!((config.tick_dt() - 1.0 / 30.0).abs() < 1e-6);
    }
}
