//! Configuration
//!
//! Server and engine settings. Defaults suit a single-node deployment; every
//! field can be overridden from `ANGLER_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::game::session::SessionTimings;
use crate::network::auth::AuthConfig;

/// Engine timing configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Interval between bite checks while waiting.
    pub bite_check_interval: Duration,
    /// Interval between fight ticks. Also the fight time step.
    pub fight_tick_interval: Duration,
    /// Time a player has to set the hook.
    pub bite_window: Duration,
    /// Pause before bite checks resume after a missed bite.
    pub post_timeout_delay: Duration,
    /// Pin the hour of day used for feeding windows. Local time when unset.
    pub fixed_hour: Option<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bite_check_interval: Duration::from_secs(1),
            fight_tick_interval: Duration::from_millis(100),
            bite_window: Duration::from_secs(8),
            post_timeout_delay: Duration::from_secs(10),
            fixed_hour: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bite_check_interval: env_millis("ANGLER_BITE_CHECK_MS").unwrap_or(defaults.bite_check_interval),
            fight_tick_interval: env_millis("ANGLER_FIGHT_TICK_MS").unwrap_or(defaults.fight_tick_interval),
            bite_window: env_millis("ANGLER_BITE_WINDOW_MS").unwrap_or(defaults.bite_window),
            post_timeout_delay: env_millis("ANGLER_POST_TIMEOUT_MS").unwrap_or(defaults.post_timeout_delay),
            fixed_hour: env_parse::<u8>("ANGLER_FIXED_HOUR").filter(|hour| *hour < 24),
        }
    }

    /// Timer lengths handed to each session.
    pub fn session_timings(&self) -> SessionTimings {
        SessionTimings {
            bite_window: self.bite_window,
            post_timeout_delay: self.post_timeout_delay,
        }
    }

    /// Fight time step in seconds.
    pub fn fight_dt(&self) -> f64 {
        self.fight_tick_interval.as_secs_f64()
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Close a connection after this long without a client message.
    pub idle_timeout: Duration,
    /// Catalog file. The built-in demo catalog when unset.
    pub catalog_path: Option<PathBuf>,
    /// Token validation.
    pub auth: AuthConfig,
    /// Engine timings.
    pub engine: EngineConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            catalog_path: None,
            auth: AuthConfig::default(),
            engine: EngineConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parse("ANGLER_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: env_parse("ANGLER_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            idle_timeout: env_parse::<u64>("ANGLER_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            catalog_path: std::env::var_os("ANGLER_CATALOG").map(PathBuf::from),
            auth: AuthConfig::from_env(),
            engine: EngineConfig::from_env(),
            version: defaults.version,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key)
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}
