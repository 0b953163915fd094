use std::time::Duration;

// World defaults
pub const DEFAULT_WORLD_WIDTH: f64 = 800.0;
pub const DEFAULT_WORLD_HEIGHT: f64 = 600.0;
pub const DEFAULT_TICK_RATE: u32 = 20;

// Movement: units per second contributed by each held direction.
pub const DEFAULT_PLAYER_SPEED: f64 = 180.0;

pub const PLAYER_RADIUS: f64 = 12.0;
pub const COIN_RADIUS: f64 = 10.0;

// Coins spawn at least this far from every edge.
pub const COIN_SPAWN_MARGIN: f64 = 20.0;

// Display names
pub const DEFAULT_NAME_MAX_LEN: usize = 24;
pub const DEFAULT_PLAYER_NAME: &str = "Anonymous";

/// Settings that would leave the world unplayable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a finite number greater than {min}, got {value}")]
    InvalidDimension {
        name: &'static str,
        value: f64,
        min: f64,
    },
    #[error("PLAYER_SPEED must be a finite, non-negative number, got {0}")]
    InvalidSpeed(f64),
}

/// Simulation settings, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub width: f64,
    pub height: f64,
    /// Ticks per second.
    pub tick_rate: u32,
    pub speed: f64,
    pub player_radius: f64,
    pub coin_radius: f64,
    pub name_max_len: usize,
}

impl GameConfig {
    /// Nominal time between two ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    /// Smallest width or height that still leaves room to spawn both a
    /// player and a coin.
    pub fn min_dimension(&self) -> f64 {
        2.0 * self.player_radius.max(COIN_SPAWN_MARGIN)
    }

    /// Reject settings that cannot produce a valid world.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let min = self.min_dimension();
        for (name, value) in [("WORLD_WIDTH", self.width), ("WORLD_HEIGHT", self.height)] {
            if !value.is_finite() || value <= min {
                return Err(ConfigError::InvalidDimension { name, value, min });
            }
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(ConfigError::InvalidSpeed(self.speed));
        }
        Ok(())
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WORLD_WIDTH,
            height: DEFAULT_WORLD_HEIGHT,
            tick_rate: DEFAULT_TICK_RATE,
            speed: DEFAULT_PLAYER_SPEED,
            player_radius: PLAYER_RADIUS,
            coin_radius: COIN_RADIUS,
            name_max_len: DEFAULT_NAME_MAX_LEN,
        }
    }
}
