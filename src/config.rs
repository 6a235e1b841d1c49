// Global configuration and constants

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Live tunables read once per tick. These are the knobs an external control
/// surface is allowed to adjust while the simulation runs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// Signal emission frequency per source (Hz).
    pub signal_frequency_hz: f32,
    /// Probability of a branch attempt after a successful growth step.
    pub branch_probability: f32,
    /// Base signal travel speed (cells per second, before conductivity).
    pub base_pulse_speed: f32,
    /// Weight per relative growth direction, indexed by rotation from the
    /// last movement heading: 0 = forward, then counter-clockwise through
    /// forward-left, left, backward-left, backward, backward-right, right,
    /// forward-right. Forward-heavy defaults keep growth directional.
    pub direction_weights: [f32; 8],
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            signal_frequency_hz: 1.5,
            branch_probability: 0.08,
            base_pulse_speed: 12.0,
            direction_weights: [5.0, 2.0, 0.5, 0.1, 0.0, 0.1, 0.5, 2.0],
        }
    }
}

impl Tunables {
    pub fn validate(&self) -> Result<()> {
        if !(self.signal_frequency_hz > 0.0) {
            return Err(SimError::InvalidConfig(
                "signal_frequency_hz must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.branch_probability) {
            return Err(SimError::InvalidConfig(
                "branch_probability must be in [0, 1]".into(),
            ));
        }
        if !(self.base_pulse_speed > 0.0) {
            return Err(SimError::InvalidConfig(
                "base_pulse_speed must be > 0".into(),
            ));
        }
        if self.direction_weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SimError::InvalidConfig(
                "direction_weights must be non-negative finite floats".into(),
            ));
        }
        Ok(())
    }
}

// Configuration struct for simulation parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // Grid
    pub grid_width: usize,
    pub grid_height: usize,

    // Sources & energy
    pub source_count: usize,
    pub initial_energy: f32,
    pub cell_energy_cost: f32,
    /// Fraction of initial_energy an inactive source must accumulate to
    /// regenerate.
    pub reactivation_fraction: f32,
    pub min_source_distance: f32,
    pub placement_attempts: usize,

    // Growth & branching
    pub min_branch_path_len: usize,

    // Signal propagation
    pub min_conductivity: f32,
    pub max_conductivity: f32,
    /// Cell age (ticks) at which conductivity saturates.
    pub max_cell_age_ticks: u64,

    // Food
    pub food_max_pellets: usize,
    pub food_pellet_size: usize,
    pub food_cell_energy: f32,
    pub food_spawn_interval_ticks: u64,
    pub food_spawn_attempts: usize,
    pub food_edge_margin: usize,

    // Decay
    pub fading_rate: f32,
    pub reabsorbing_rate: f32,
    /// Opacity below which a decaying tendril is removed from the registry.
    pub removal_epsilon: f32,
    /// Ticks a tendril may sit Blocked (source still active) before it is
    /// reabsorbed to reclaim its energy.
    pub blocked_reabsorb_ticks: u64,

    // Path integrity verification
    pub integrity_interval_ticks: u64,

    // Live tunables
    pub tunables: Tunables,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            grid_width: 200,
            grid_height: 200,
            source_count: 4,
            initial_energy: 500.0,
            cell_energy_cost: 1.0,
            reactivation_fraction: 0.25,
            min_source_distance: 40.0,
            placement_attempts: 64,
            min_branch_path_len: 6,
            min_conductivity: 0.5,
            max_conductivity: 1.5,
            max_cell_age_ticks: 600,
            food_max_pellets: 6,
            food_pellet_size: 4,
            food_cell_energy: 50.0,
            food_spawn_interval_ticks: 120,
            food_spawn_attempts: 16,
            food_edge_margin: 2,
            fading_rate: 0.02,
            reabsorbing_rate: 0.05,
            removal_epsilon: 0.01,
            blocked_reabsorb_ticks: 240,
            integrity_interval_ticks: 30,
            tunables: Tunables::default(),
        }
    }
}

impl SimConfig {
    /// Fatal configuration errors: the simulation must not start with these.
    pub fn validate(&self) -> Result<()> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(SimError::InvalidConfig(
                "grid dimensions must be positive".into(),
            ));
        }
        if self.source_count == 0 {
            return Err(SimError::InvalidConfig("source_count must be > 0".into()));
        }
        if self.initial_energy <= 0.0 || self.cell_energy_cost <= 0.0 {
            return Err(SimError::InvalidConfig(
                "initial_energy and cell_energy_cost must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.reactivation_fraction) {
            return Err(SimError::InvalidConfig(
                "reactivation_fraction must be in [0, 1]".into(),
            ));
        }
        if self.min_conductivity <= 0.0 || self.max_conductivity < self.min_conductivity {
            return Err(SimError::InvalidConfig(
                "conductivity range must satisfy 0 < min <= max".into(),
            ));
        }
        if self.food_pellet_size == 0 {
            return Err(SimError::InvalidConfig(
                "food_pellet_size must be > 0".into(),
            ));
        }
        if self.integrity_interval_ticks == 0 {
            return Err(SimError::InvalidConfig(
                "integrity_interval_ticks must be > 0".into(),
            ));
        }
        self.tunables.validate()
    }

    pub fn reactivation_threshold(&self) -> f32 {
        self.reactivation_fraction * self.initial_energy
    }

    /// Load configuration from a YAML or JSON file, by extension.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SimConfig = if path.ends_with(".yaml") || path.ends_with(".yml") {
            serde_yaml::from_str(&contents)?
        } else if path.ends_with(".json") {
            serde_json::from_str(&contents)?
        } else {
            return Err(SimError::ConfigFormat(path.to_string()));
        };
        config.validate()?;
        Ok(config)
    }

    /// Search for config.yaml, config.yml or config.json in the current
    /// directory; fall back to defaults.
    pub fn from_default_paths() -> Self {
        for path in ["config.yaml", "config.yml", "config.json"] {
            if std::path::Path::new(path).exists() {
                match Self::from_file(path) {
                    Ok(config) => {
                        tracing::info!(path, "loaded configuration");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(path, error = %e, "ignoring unreadable config file");
                    }
                }
            }
        }
        Self::default()
    }
}
