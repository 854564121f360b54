//! Server configuration from environment.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use gcs_link::{DEFAULT_COMMAND_PORT, DEFAULT_DATA_PORT, DEFAULT_TELEMETRY_PORT};

use crate::maneuvers::ManeuverConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// Local address for the telemetry listener
    pub bind_addr: IpAddr,
    pub command_port: u16,
    pub data_port: u16,
    pub telemetry_port: u16,
    /// Where discovery probes go, usually a broadcast address
    pub probe_addr: IpAddr,
    pub discovery_window: Duration,
    /// Vehicles silent for longer are flagged in fleet listings
    pub telemetry_stale_after: Duration,
    pub maneuvers: ManeuverConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = ManeuverConfig::default();

        Self {
            bind_addr: env_or("GCS_BIND_ADDR", IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            command_port: env_or("GCS_COMMAND_PORT", DEFAULT_COMMAND_PORT),
            data_port: env_or("GCS_DATA_PORT", DEFAULT_DATA_PORT),
            telemetry_port: env_or("GCS_TELEMETRY_PORT", DEFAULT_TELEMETRY_PORT),
            probe_addr: env_or("GCS_PROBE_ADDR", IpAddr::V4(Ipv4Addr::BROADCAST)),
            discovery_window: Duration::from_millis(env_or("GCS_DISCOVERY_WINDOW_MS", 1000)),
            telemetry_stale_after: Duration::from_secs(env_or("GCS_TELEMETRY_STALE_SECS", 5)),
            maneuvers: ManeuverConfig {
                arrival_threshold: env_or("GCS_ARRIVAL_THRESHOLD", defaults.arrival_threshold),
                arrival_wait: Duration::from_secs(env_or("GCS_ARRIVAL_WAIT_SECS", 60)),
                start_delay: Duration::from_secs(env_or("GCS_START_DELAY_SECS", 20)),
                follow_period: Duration::from_secs(env_or("GCS_FOLLOW_PERIOD_SECS", 3)),
                return_margin_m: env_or("GCS_RETURN_MARGIN_M", defaults.return_margin_m),
                vertical: env_or("GCS_VERTICAL_AXIS", defaults.vertical),
                // Unset or 0 means wait forever.
                return_timeout: env::var("GCS_RETURN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
                ..defaults
            },
        }
    }

    pub fn telemetry_bind(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.telemetry_port)
    }

    pub fn probe_target(&self) -> SocketAddr {
        SocketAddr::new(self.probe_addr, self.command_port)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
