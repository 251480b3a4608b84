//! Durations written as humantime strings (`"20s"`, `"1m 30s"`) in configuration files.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// Parses one of the `DEFAULT_*_POLL_INTERVAL` constants.
pub fn parse_default(value: &str) -> Duration {
    humantime::parse_duration(value).unwrap_or(Duration::from_secs(10))
}
