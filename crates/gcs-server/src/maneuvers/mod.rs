//! Fleet maneuvers.
//!
//! Every maneuver validates its parameters locally, then talks to vehicles
//! only through an [`Uplink`]. Multi-step maneuvers wait on fleet state
//! (telemetry, "waypoint reached") rather than on command acknowledgements.

mod basic;
mod follow;
mod mission;
mod return_home;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use gcs_core::models::VerticalAxis;
use gcs_core::rules::{CommandError, CommandLimits};
use gcs_link::{LinkError, Uplink};
use thiserror::Error;

use crate::state::FleetState;

pub use mission::MissionReport;

#[derive(Debug, Error)]
pub enum ManeuverError {
    #[error("rejected: {0}")]
    Rejected(#[from] CommandError),
    #[error("link failure: {0}")]
    Link(#[from] LinkError),
    #[error("no telemetry from {0}")]
    UnknownVehicle(IpAddr),
    #[error("mission path needs at least two waypoints, got {0}")]
    PathTooShort(usize),
    #[error("expected {expected} offsets, got {actual}")]
    OffsetCount { expected: usize, actual: usize },
    #[error("timed out waiting for {vehicle} during {step}")]
    Timeout { vehicle: IpAddr, step: &'static str },
}

/// Tunables for multi-step maneuvers.
#[derive(Debug, Clone)]
pub struct ManeuverConfig {
    pub limits: CommandLimits,
    /// Which way "above" points in the vehicles' frame
    pub vertical: VerticalAxis,
    /// Distance from the first waypoint that counts as arrived
    pub arrival_threshold: f64,
    pub arrival_wait: Duration,
    /// Delay between the go decision and the shared mission start
    pub start_delay: Duration,
    /// Follow relay interval when the leader is silent
    pub follow_period: Duration,
    /// Extra climb over home before the final descent
    pub return_margin_m: f64,
    /// `None` waits forever for each "waypoint reached"
    pub return_timeout: Option<Duration>,
    /// Re-check interval for event-driven waits
    pub poll_tick: Duration,
}

impl Default for ManeuverConfig {
    fn default() -> Self {
        Self {
            limits: CommandLimits::default(),
            vertical: VerticalAxis::Up,
            arrival_threshold: 0.2,
            arrival_wait: Duration::from_secs(60),
            start_delay: Duration::from_secs(20),
            follow_period: Duration::from_secs(3),
            return_margin_m: 2.0,
            return_timeout: None,
            poll_tick: Duration::from_millis(500),
        }
    }
}

/// Runs maneuvers against the fleet through one uplink.
pub struct Coordinator<U> {
    uplink: U,
    fleet: Arc<FleetState>,
    config: ManeuverConfig,
}

impl<U: Uplink> Coordinator<U> {
    pub fn new(uplink: U, fleet: Arc<FleetState>, config: ManeuverConfig) -> Self {
        Self {
            uplink,
            fleet,
            config,
        }
    }

    pub fn fleet(&self) -> &Arc<FleetState> {
        &self.fleet
    }

    pub fn config(&self) -> &ManeuverConfig {
        &self.config
    }
}
