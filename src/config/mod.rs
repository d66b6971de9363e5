//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::collision::INFECTION_RADIUS;
use crate::util::time::{COLLISION_TICK_MS, ROUND_DURATION_SECS};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS ("*" allows any)
    pub client_origin: String,
    /// Game room tunables
    pub room: RoomConfig,
}

/// Settings for a single game room
#[derive(Clone, Debug, PartialEq)]
pub struct RoomConfig {
    /// Countdown length in seconds
    pub round_duration_secs: u32,
    /// Period of the collision re-evaluation tick
    pub collision_tick: Duration,
    /// Zombie-to-human distance below which infection happens
    pub infection_radius: f32,
    /// Joins beyond this are refused
    pub max_players: usize,
    /// Seed for spawn positions; random when unset
    pub seed: Option<u64>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            round_duration_secs: ROUND_DURATION_SECS,
            collision_tick: Duration::from_millis(COLLISION_TICK_MS),
            infection_radius: INFECTION_RADIUS,
            max_players: 16,
            seed: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:2567".to_string()),
        };

        let defaults = RoomConfig::default();
        let room = RoomConfig {
            round_duration_secs: parse_or(
                &lookup,
                "ROUND_DURATION_SECS",
                defaults.round_duration_secs,
            )?,
            collision_tick: Duration::from_millis(parse_or(
                &lookup,
                "COLLISION_TICK_MS",
                COLLISION_TICK_MS,
            )?),
            infection_radius: parse_or(&lookup, "INFECTION_RADIUS", defaults.infection_radius)?,
            max_players: parse_or(&lookup, "MAX_PLAYERS", defaults.max_players)?,
            seed: lookup("ROOM_SEED")
                .map(|raw| raw.trim().parse().map_err(|_| ConfigError::Invalid("ROOM_SEED")))
                .transpose()?,
        };

        if room.round_duration_secs == 0 {
            return Err(ConfigError::Invalid("ROUND_DURATION_SECS"));
        }
        if room.collision_tick.is_zero() {
            return Err(ConfigError::Invalid("COLLISION_TICK_MS"));
        }
        if !room.infection_radius.is_finite() || room.infection_radius < 0.0 {
            return Err(ConfigError::Invalid("INFECTION_RADIUS"));
        }
        if room.max_players == 0 {
            return Err(ConfigError::Invalid("MAX_PLAYERS"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_else(|| "*".to_string()),

            room,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
