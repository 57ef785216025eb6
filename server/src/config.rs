// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_DB_URL: &str = "sqlite://database/reminders.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Runtime settings, read from the environment with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// How often the background catch-up sweep wakes up.
    pub sweep_interval: Duration,
    /// Wall-clock limit for one whole sweep.
    pub sweep_timeout: Duration,
    /// How long a series is left alone after the sweep touched it.
    pub series_cooldown: Duration,
    /// Minimum spacing between two sweeps, manual ones included.
    pub sweep_min_interval: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DB_URL.to_string());
        let bind_addr: SocketAddr = parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse()?)?;

        Ok(Self {
            database_url,
            bind_addr,
            sweep_interval: seconds_or(&lookup, "SWEEP_INTERVAL_SECS", 5 * 60)?,
            sweep_timeout: seconds_or(&lookup, "SWEEP_TIMEOUT_SECS", 30)?,
            series_cooldown: seconds_or(&lookup, "SERIES_COOLDOWN_SECS", 60)?,
            sweep_min_interval: seconds_or(&lookup, "SWEEP_MIN_INTERVAL_SECS", 60)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn seconds_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default_secs: u64,
) -> Result<Duration> {
    parse_or(lookup, key, default_secs).map(Duration::from_secs)
}
