//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

use crate::game::room::RoomConfig;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origin for CORS; unset allows any origin
    pub client_origin: Option<String>,
    /// Override for riders required before a room arms its countdown
    pub min_players: Option<usize>,
    /// Override for the room occupancy cap
    pub max_players: Option<usize>,
    /// Override for the pre-race countdown length in seconds
    pub countdown_secs: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT; fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").ok(),

            min_players: parse_var("MIN_PLAYERS")?,
            max_players: parse_var("MAX_PLAYERS")?,
            countdown_secs: parse_var("COUNTDOWN_SECS")?,
        })
    }

    /// Room tunables with env overrides applied on top of the defaults
    pub fn room_config(&self) -> RoomConfig {
        let mut config = RoomConfig::default();
        if let Some(min) = self.min_players {
            config.min_players = min;
        }
        if let Some(max) = self.max_players {
            config.max_players = max;
        }
        if let Some(secs) = self.countdown_secs {
            config.countdown_secs = secs;
        }
        config
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map(Some).map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::MAX_PLAYERS;

    #[test]
    fn room_overrides_apply_on_top_of_defaults() {
        let config = Config {
            server_addr: "0.0.0.0:8080".parse().unwrap(),
            log_level: "info".to_string(),
            client_origin: None,
            min_players: Some(2),
            max_players: None,
            countdown_secs: Some(5),
        };
        let room = config.room_config();
        assert_eq!(room.min_players, 2);
        assert_eq!(room.max_players, MAX_PLAYERS);
        assert_eq!(room.countdown_secs, 5);
    }
}
