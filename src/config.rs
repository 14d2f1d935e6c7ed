// ============================================================================
// CONFIGURATION - Environment-driven settings
// ============================================================================
//
// Loaded once at startup. `.env` is honoured when present; every key has a
// default so a bare `cargo run` works against ./lottobook_data.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime, Offset, Utc};

pub const DEFAULT_DATA_PATH: &str = "./lottobook_data";
pub const DEFAULT_PORT: u16 = 8080;
/// Asia/Bangkok
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 7 * 60;
pub const DEFAULT_DAY_CUTOFF: &str = "05:20";
pub const DEFAULT_RISK_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_LOTTERY_CACHE_TTL_SECS: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub data_path: String,
    pub bind_addr: SocketAddr,
    /// Default local time zone for lotteries that don't carry their own
    pub utc_offset: FixedOffset,
    /// Wall-clock time before which activity belongs to the previous operating day
    pub day_cutoff: NaiveTime,
    pub risk_cache_ttl: Duration,
    pub lottery_cache_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: DEFAULT_DATA_PATH.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            utc_offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_MINUTES * 60).unwrap_or_else(|| Utc.fix()),
            day_cutoff: crate::schedule::parse_wall_time(DEFAULT_DAY_CUTOFF).unwrap_or(NaiveTime::MIN),
            risk_cache_ttl: Duration::from_secs(DEFAULT_RISK_CACHE_TTL_SECS),
            lottery_cache_ttl: Duration::from_secs(DEFAULT_LOTTERY_CACHE_TTL_SECS),
        }
    }
}

impl Config {
    /// Build configuration from the process environment (and `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(path) = lookup("LOTTOBOOK_DATA_PATH") {
            config.data_path = path;
        }

        if let Some(addr) = lookup("LOTTOBOOK_BIND_ADDR") {
            config.bind_addr = addr.parse().map_err(|_| ConfigError::Invalid {
                key: "LOTTOBOOK_BIND_ADDR",
                value: addr.clone(),
            })?;
        }

        if let Some(raw) = lookup("LOTTOBOOK_UTC_OFFSET_MINUTES") {
            config.utc_offset = raw
                .parse::<i32>()
                .ok()
                .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
                .ok_or(ConfigError::Invalid { key: "LOTTOBOOK_UTC_OFFSET_MINUTES", value: raw.clone() })?;
        }

        if let Some(raw) = lookup("LOTTOBOOK_DAY_CUTOFF") {
            config.day_cutoff = crate::schedule::parse_wall_time(&raw)
                .ok_or(ConfigError::Invalid { key: "LOTTOBOOK_DAY_CUTOFF", value: raw.clone() })?;
        }

        if let Some(raw) = lookup("LOTTOBOOK_RISK_CACHE_TTL_SECS") {
            config.risk_cache_ttl = parse_secs("LOTTOBOOK_RISK_CACHE_TTL_SECS", &raw)?;
        }

        if let Some(raw) = lookup("LOTTOBOOK_LOTTERY_CACHE_TTL_SECS") {
            config.lottery_cache_ttl = parse_secs("LOTTOBOOK_LOTTERY_CACHE_TTL_SECS", &raw)?;
        }

        Ok(config)
    }
}

fn parse_secs(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::Invalid { key, value: raw.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.data_path, DEFAULT_DATA_PATH);
        assert_eq!(config.utc_offset.local_minus_utc(), 7 * 3600);
        assert_eq!(config.day_cutoff, NaiveTime::from_hms_opt(5, 20, 0).unwrap());
        assert_eq!(config.risk_cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("LOTTOBOOK_DATA_PATH", "/tmp/lotto"),
            ("LOTTOBOOK_UTC_OFFSET_MINUTES", "0"),
            ("LOTTOBOOK_DAY_CUTOFF", "04:00:30"),
            ("LOTTOBOOK_LOTTERY_CACHE_TTL_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.data_path, "/tmp/lotto");
        assert_eq!(config.utc_offset.local_minus_utc(), 0);
        assert_eq!(config.day_cutoff, NaiveTime::from_hms_opt(4, 0, 30).unwrap());
        assert_eq!(config.lottery_cache_ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_cutoff_rejected() {
        let err = Config::from_lookup(lookup_from(&[("LOTTOBOOK_DAY_CUTOFF", "25:99")])).unwrap_err();
        assert!(err.to_string().contains("LOTTOBOOK_DAY_CUTOFF"));
    }
}
