//! Application configuration
//!
//! Configuration is loaded from multiple sources with the following priority (lowest to highest):
//! 1. `config/default.toml` (version controlled)
//! 2. `config/user.toml` (gitignored, user overrides)
//! 3. Environment variables (`R2D_SECTION__KEY`)

use figment::{Figment, providers::{Format, Toml, Env}};
use rigid2d_math::Vec2;
use serde::{Serialize, Deserialize};
use std::path::Path;

use crate::scene::ScenePreset;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// World options handed to the physics engine
    #[serde(default)]
    pub physics: PhysicsConfig,
    /// Stepping and scene selection for the headless runner
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Debug configuration
    #[serde(default)]
    pub debug: DebugConfig,
}

impl AppConfig {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. `config/default.toml`
    /// 2. `config/user.toml`
    /// 3. Environment variables (`R2D_*`)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific config directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let default_path = config_dir.join("default.toml");
        let user_path = config_dir.join("user.toml");

        let mut figment = Figment::new();

        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }

        // Load user config (optional)
        if user_path.exists() {
            figment = figment.merge(Toml::file(&user_path));
        }

        // Environment variables override everything
        // R2D_SIMULATION__STEPS=120 -> simulation.steps = 120
        figment = figment.merge(Env::prefixed("R2D_").split("__"));

        figment.extract().map_err(ConfigError::from)
    }
}

/// Physics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity [x, y] in m/s² (negative y = downward)
    pub gravity: [f32; 2],
    /// Let resting islands fall asleep
    pub allow_sleep: bool,
    /// Reuse last step's impulses as the starting guess
    pub warm_starting: bool,
    /// Sweep fast bodies through the time-of-impact pass
    pub continuous_physics: bool,
    /// Time-of-impact sub-steps allowed per step
    pub max_toi_events: usize,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        let engine = rigid2d_physics::PhysicsConfig::default();
        Self {
            gravity: [engine.gravity.x, engine.gravity.y],
            allow_sleep: engine.allow_sleep,
            warm_starting: engine.warm_starting,
            continuous_physics: engine.continuous_physics,
            max_toi_events: engine.max_toi_events,
        }
    }
}

impl PhysicsConfig {
    /// Convert to the physics engine's world options
    pub fn to_physics_config(&self) -> rigid2d_physics::PhysicsConfig {
        rigid2d_physics::PhysicsConfig {
            gravity: Vec2::new(self.gravity[0], self.gravity[1]),
            allow_sleep: self.allow_sleep,
            warm_starting: self.warm_starting,
            continuous_physics: self.continuous_physics,
            max_toi_events: self.max_toi_events,
            ..rigid2d_physics::PhysicsConfig::default()
        }
    }
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed time step in seconds
    pub dt: f32,
    /// Velocity solver iterations per step
    pub velocity_iterations: usize,
    /// Position solver iterations per step
    pub position_iterations: usize,
    /// Number of steps to run
    pub steps: usize,
    /// Scene to build
    pub scene: ScenePreset,
    /// Preset size (pyramid base row, chain link count)
    pub scene_size: usize,
    /// Log world statistics every this many steps (0 = never)
    pub report_interval: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            velocity_iterations: 8,
            position_iterations: 3,
            steps: 600,
            scene: ScenePreset::Pyramid,
            scene_size: 10,
            report_interval: 60,
        }
    }
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Log every contact and joint event as it is drained
    pub log_events: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_events: false,
        }
    }
}

/// Configuration error
#[derive(Debug)]
pub struct ConfigError {
    message: String,
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError {
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.physics.gravity, [0.0, -10.0]);
        assert_eq!(config.simulation.velocity_iterations, 8);
        assert_eq!(config.simulation.scene, ScenePreset::Pyramid);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("gravity"));
        assert!(toml.contains("scene = \"pyramid\""));
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: AppConfig = toml::from_str("[simulation]\nsteps = 5\nscene = \"pendulum_chain\"\n").unwrap();
        assert_eq!(config.simulation.steps, 5);
        assert_eq!(config.simulation.scene, ScenePreset::PendulumChain);
        assert_eq!(config.simulation.position_iterations, 3);
        assert!(config.physics.continuous_physics);
    }

    #[test]
    fn test_to_physics_config() {
        let mut config = PhysicsConfig::default();
        config.gravity = [1.0, -3.0];
        config.allow_sleep = false;
        config.max_toi_events = 8;

        let engine = config.to_physics_config();
        assert_eq!(engine.gravity, Vec2::new(1.0, -3.0));
        assert!(!engine.allow_sleep);
        assert!(engine.warm_starting);
        assert!(engine.auto_clear_forces);
        assert_eq!(engine.max_toi_events, 8);
    }
}
