// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::config::{ConfigError, GameConfig};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Directory containing a built client to serve as static files.
    pub static_dir: Option<PathBuf>,
    /// Simulation settings (world size, tick rate, speed, name bound).
    pub game: GameConfig,
    /// How often the leaderboard is re-read and broadcast.
    pub leaderboard_interval: Duration,
    /// Number of entries in each leaderboard broadcast.
    pub leaderboard_size: i64,
    /// Pending persistence jobs allowed before new ones are dropped.
    pub persist_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:coinrush.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 4000)
    /// - `STATIC_DIR` - Path to a client dist directory for static file serving
    /// - `WORLD_WIDTH` / `WORLD_HEIGHT` - World bounds (default: 800 x 600)
    /// - `TICK_RATE` - Simulation ticks per second (default: 20)
    /// - `PLAYER_SPEED` - Units per second per held direction (default: 180)
    /// - `NAME_MAX_LEN` - Display name bound in characters (default: 24)
    /// - `LEADERBOARD_INTERVAL_SECS` - Leaderboard broadcast period (default: 5)
    /// - `LEADERBOARD_SIZE` - Entries per leaderboard (default: 10)
    /// - `PERSIST_QUEUE_CAPACITY` - Persistence queue bound (default: 1024)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--database-url <URL>` - Override the database URL
    ///
    /// Malformed values fall back to their defaults. World sizes or speeds that
    /// parse but cannot produce a playable world are rejected.
    pub fn load() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        let defaults = GameConfig::default();

        let database_url = Self::parse_cli_value(&args, "--database-url")
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| "sqlite:coinrush.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env_parse("PORT"))
            .unwrap_or(4000);

        let static_dir = std::env::var("STATIC_DIR").ok().map(PathBuf::from);

        let game = GameConfig {
            width: env_parse("WORLD_WIDTH").unwrap_or(defaults.width),
            height: env_parse("WORLD_HEIGHT").unwrap_or(defaults.height),
            tick_rate: env_parse("TICK_RATE")
                .filter(|&hz: &u32| hz > 0)
                .unwrap_or(defaults.tick_rate),
            speed: env_parse("PLAYER_SPEED").unwrap_or(defaults.speed),
            name_max_len: env_parse("NAME_MAX_LEN").unwrap_or(defaults.name_max_len),
            ..defaults
        };

        let leaderboard_interval = Duration::from_secs(
            env_parse("LEADERBOARD_INTERVAL_SECS")
                .filter(|&s: &u64| s > 0)
                .unwrap_or(5),
        );
        let leaderboard_size = env_parse("LEADERBOARD_SIZE").unwrap_or(10);
        let persist_queue_capacity = env_parse("PERSIST_QUEUE_CAPACITY")
            .filter(|&n: &usize| n > 0)
            .unwrap_or(1024);

        game.validate()?;

        Ok(Config {
            database_url,
            port,
            static_dir,
            game,
            leaderboard_interval,
            leaderboard_size,
            persist_queue_capacity,
        })
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

/// Read and parse an environment variable, ignoring unset or malformed values.
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli_value() {
        let args: Vec<String> = [
            "coinrush-backend",
            "--port",
            "9000",
            "--database-url",
            "sqlite::memory:",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(Config::parse_cli_value(&args, "--port").as_deref(), Some("9000"));
        assert_eq!(
            Config::parse_cli_value(&args, "--database-url").as_deref(),
            Some("sqlite::memory:")
        );
        assert!(Config::parse_cli_value(&args, "--missing").is_none());
    }

    #[test]
    fn test_parse_cli_value_flag_without_value() {
        let args: Vec<String> = vec!["coinrush-backend".into(), "--port".into()];
        assert!(Config::parse_cli_value(&args, "--port").is_none());
    }

    #[test]
    fn test_env_parse_ignores_garbage() {
        std::env::set_var("COINRUSH_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_parse::<u32>("COINRUSH_TEST_GARBAGE"), None);
        std::env::set_var("COINRUSH_TEST_NUMBER", " 42 ");
        assert_eq!(env_parse::<u32>("COINRUSH_TEST_NUMBER"), Some(42));
    }

    #[test]
    fn test_env_parse_accepts_non_finite_floats() {
        // "NaN" and "inf" parse as f64, so they have to be caught by validation.
        std::env::set_var("COINRUSH_TEST_NAN", "NaN");
        assert!(env_parse::<f64>("COINRUSH_TEST_NAN").is_some_and(f64::is_nan));
    }

    #[test]
    fn test_load_rejects_non_finite_world() {
        // The only test that touches the real variable names.
        std::env::set_var("WORLD_WIDTH", "NaN");
        let result = Config::load();
        std::env::remove_var("WORLD_WIDTH");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidDimension { name: "WORLD_WIDTH", .. })
        ));
        assert!(Config::load().is_ok());
    }
}
