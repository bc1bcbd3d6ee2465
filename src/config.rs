//! Configuration types.

use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

/// Hub configuration shared by the registry, correlator, sweeper and transport.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// How long a correlated status query waits for the worker's response.
    pub query_timeout: Duration,
    /// How often the liveness sweeper runs.
    pub sweep_interval: Duration,
    /// Connections silent for longer than this are evicted by the sweeper.
    pub stale_after: Duration,
    /// Outbound frames buffered per connection before new frames are dropped.
    pub outbound_buffer: usize,
    /// Dropped outbound frames tolerated before a slow connection is closed.
    pub max_send_drops: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            query_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60), // 1 minute
            stale_after: Duration::from_secs(120),   // 2 minutes
            outbound_buffer: 64,
            max_send_drops: 100,
        }
    }
}

impl HubConfig {
    /// Build a config from `WORKER_HUB_*` environment variables.
    ///
    /// Unset variables keep their defaults. Unparseable or out-of-range values
    /// are logged and ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_parse("WORKER_HUB_PORT", defaults.port);
        let query_timeout = Duration::from_millis(env_parse(
            "WORKER_HUB_QUERY_TIMEOUT_MS",
            defaults.query_timeout.as_millis() as u64,
        ));
        let sweep_interval = Duration::from_secs(env_parse(
            "WORKER_HUB_SWEEP_INTERVAL_SECS",
            defaults.sweep_interval.as_secs(),
        ));
        let stale_after = Duration::from_secs(env_parse(
            "WORKER_HUB_STALE_AFTER_SECS",
            defaults.stale_after.as_secs(),
        ));
        let outbound_buffer = env_parse("WORKER_HUB_OUTBOUND_BUFFER", defaults.outbound_buffer);
        let max_send_drops = env_parse("WORKER_HUB_MAX_SEND_DROPS", defaults.max_send_drops);

        let config = Self {
            port,
            query_timeout,
            sweep_interval,
            stale_after,
            outbound_buffer,
            max_send_drops,
        };

        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!(error = %e, "Invalid hub configuration from environment, using defaults");
                defaults
            }
        }
    }

    /// Reject values the hub cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "query_timeout".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "sweep_interval".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "outbound_buffer".into(),
                message: "must hold at least one frame".into(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparseable environment value");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = HubConfig::default();
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.stale_after, Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = HubConfig {
            query_timeout: Duration::ZERO,
            ..HubConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "query_timeout"
        ));
    }

    #[test]
    fn empty_outbound_buffer_is_rejected() {
        let config = HubConfig {
            outbound_buffer: 0,
            ..HubConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
