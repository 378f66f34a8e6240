//! Configuration module for the depth observer

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::FeedError;

/// Depth polling frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Frequency {
    #[default]
    Hz1,
    Hz2,
    Hz4,
    Hz5,
    Hz10,
    Hz20,
}

impl Frequency {
    pub const ALL: [Frequency; 6] = [
        Frequency::Hz1,
        Frequency::Hz2,
        Frequency::Hz4,
        Frequency::Hz5,
        Frequency::Hz10,
        Frequency::Hz20,
    ];

    /// Polls per second
    pub fn hertz(self) -> u32 {
        match self {
            Frequency::Hz1 => 1,
            Frequency::Hz2 => 2,
            Frequency::Hz4 => 4,
            Frequency::Hz5 => 5,
            Frequency::Hz10 => 10,
            Frequency::Hz20 => 20,
        }
    }

    /// Time between two polls
    pub fn period(self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.hertz()))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hz{}", self.hertz())
    }
}

impl FromStr for Frequency {
    type Err = FeedError;

    /// Accepts `Hz10`, `hz10` or a bare `10`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("Hz")
            .or_else(|| trimmed.strip_prefix("hz"))
            .unwrap_or(trimmed);
        let hertz: u32 = digits
            .parse()
            .map_err(|_| FeedError::ConfigError(format!("Invalid frequency: {s}")))?;
        Frequency::ALL
            .into_iter()
            .find(|f| f.hertz() == hertz)
            .ok_or_else(|| FeedError::ConfigError(format!("Unsupported frequency: {s}")))
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Depth server address
    pub address: IpAddr,

    /// Depth server port
    pub port: u16,

    /// How often the depth poller reads the book
    pub frequency: Frequency,

    /// Order book depth levels handed to the display per side
    pub depth_levels: usize,

    /// How long the poller waits for the session to connect
    pub connect_timeout_ms: u64,

    /// Reconnection settings
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,

    /// Drop incremental updates until the first snapshot arrives
    pub await_snapshot: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from a dotenv-style file, falling back to the
    /// process environment for keys the file does not set
    pub fn from_env_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let vars = dotenvy::from_path_iter(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .collect::<Result<HashMap<String, String>, _>>()
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Self::from_lookup(|key| vars.get(key).cloned().or_else(|| env::var(key).ok()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let address = match lookup("FEED_ADDRESS") {
            Some(raw) => raw
                .trim()
                .parse::<IpAddr>()
                .map_err(|e| FeedError::ConfigError(format!("FEED_ADDRESS {raw:?}: {e}")))?,
            None => defaults.address,
        };

        Ok(Self {
            address,
            port: parse_or(&lookup, "FEED_PORT", defaults.port),
            frequency: parse_or(&lookup, "POLL_FREQUENCY", defaults.frequency),
            depth_levels: parse_or(&lookup, "DEPTH_LEVELS", defaults.depth_levels),
            connect_timeout_ms: parse_or(&lookup, "CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms),
            reconnect_delay_ms: parse_or(&lookup, "RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            max_reconnect_attempts: parse_or(
                &lookup,
                "MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            await_snapshot: parse_or(&lookup, "AWAIT_SNAPSHOT", defaults.await_snapshot),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + fmt::Debug,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = ?default, "Invalid configuration value, using default");
            default
        }),
        None => default,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 1234,
            frequency: Frequency::Hz1,
            depth_levels: 20,
            connect_timeout_ms: 5000,
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 10,
            await_snapshot: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_frequency_periods() {
        assert_eq!(Frequency::Hz1.period(), Duration::from_millis(1000));
        assert_eq!(Frequency::Hz4.period(), Duration::from_millis(250));
        assert_eq!(Frequency::Hz5.period(), Duration::from_millis(200));
        assert_eq!(Frequency::Hz20.period(), Duration::from_millis(50));
    }

    #[test]
    fn test_frequency_parse() {
        assert_eq!("Hz10".parse::<Frequency>().unwrap(), Frequency::Hz10);
        assert_eq!("hz2".parse::<Frequency>().unwrap(), Frequency::Hz2);
        assert_eq!(" 20 ".parse::<Frequency>().unwrap(), Frequency::Hz20);
        assert!("Hz3".parse::<Frequency>().is_err());
        assert!("fast".parse::<Frequency>().is_err());
        assert_eq!(Frequency::Hz5.to_string(), "Hz5");
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.port, 1234);
        assert_eq!(config.frequency, Frequency::Hz1);
        assert!(config.await_snapshot);
    }

    #[test]
    fn test_values_and_fallbacks() {
        let config = Config::from_lookup(lookup_from(&[
            ("FEED_ADDRESS", "10.0.0.7"),
            ("FEED_PORT", "not-a-port"),
            ("POLL_FREQUENCY", "Hz10"),
            ("DEPTH_LEVELS", "32"),
            ("AWAIT_SNAPSHOT", "false"),
        ]))
        .unwrap();

        assert_eq!(config.address, "10.0.0.7".parse::<IpAddr>().unwrap());
        assert_eq!(config.port, 1234);
        assert_eq!(config.frequency, Frequency::Hz10);
        assert_eq!(config.depth_levels, 32);
        assert!(!config.await_snapshot);
    }

    #[test]
    fn test_bad_address_is_error() {
        let result = Config::from_lookup(lookup_from(&[("FEED_ADDRESS", "localhost:1")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_env_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "FEED_ADDRESS=192.168.1.20").unwrap();
        writeln!(file, "FEED_PORT=4455").unwrap();
        writeln!(file, "POLL_FREQUENCY=4").unwrap();

        let config = Config::from_env_file(file.path()).unwrap();

        assert_eq!(config.address, "192.168.1.20".parse::<IpAddr>().unwrap());
        assert_eq!(config.port, 4455);
        assert_eq!(config.frequency, Frequency::Hz4);
    }
}
