//! Core data models for the ground-control system.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::{CommandError, CommandLimits};

/// Wire protocol version carried by every command datagram.
pub const PROTOCOL_VERSION: u8 = 2;

/// A geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Ground station position, with elevation used as the altitude datum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundStation {
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub elevation_m: f64,
}

/// A position in the vehicle frame, in metres. Whether `z` grows upward or
/// downward depends on the vehicles, see [`VerticalAxis`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn magnitude(&self) -> f64 {
        self.distance(&Vec3::default())
    }

    /// Same horizontal position, `z` larger by `height`.
    pub fn raised(&self, height: f64) -> Vec3 {
        Vec3 {
            z: self.z + height,
            ..*self
        }
    }

    pub fn offset(&self, by: &Vec3) -> Vec3 {
        Vec3 {
            x: self.x + by.x,
            y: self.y + by.y,
            z: self.z + by.z,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Direction of `z` in the vehicles' local frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAxis {
    #[default]
    Up,
    /// North-east-down style frames
    Down,
}

impl VerticalAxis {
    /// `z` of a point `height` metres above the frame origin.
    pub fn z_at(self, height: f64) -> f64 {
        match self {
            VerticalAxis::Up => height,
            VerticalAxis::Down => -height,
        }
    }

    /// `point` moved `height` metres away from the ground.
    pub fn lift(self, point: &Vec3, height: f64) -> Vec3 {
        point.raised(self.z_at(height))
    }
}

impl FromStr for VerticalAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(VerticalAxis::Up),
            "down" => Ok(VerticalAxis::Down),
            other => Err(format!("unknown vertical axis {other:?}, expected up or down")),
        }
    }
}

/// Attitude quaternion as reported by a vehicle (scalar first).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Attitude {
    fn default() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

/// State report broadcast by a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub position: Vec3,
    pub attitude: Attitude,
    /// Battery charge in percent, always within 0-100.
    pub battery_pct: f64,
}

/// One point of a geographic flight plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanWaypoint {
    pub lon: f64,
    pub lat: f64,
    pub altitude_m: f64,
    /// Seconds from mission start.
    pub time_s: f64,
}

/// Path handed to the fleet for a synchronized mission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionPath {
    pub waypoints: Vec<Vec3>,
    /// Capture times in seconds from mission start, one per waypoint.
    pub capture_times_s: Vec<f64>,
}

impl MissionPath {
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn first(&self) -> Option<Vec3> {
        self.waypoints.first().copied()
    }
}

/// Command sent to one or more vehicles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub protocol: u8,
    #[serde(rename = "command")]
    pub kind: CommandType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params", rename_all = "lowercase")]
pub enum CommandType {
    /// Take off and climb to `alt`
    Takeoff { alt: f64 },
    /// Land immediately
    Land {},
    /// Drop the current task and hover
    Stop {},
    /// Fly to a single point
    #[serde(rename = "flytopoint")]
    FlyToPoint { x: f64, y: f64, z: f64 },
    /// Fly a path delivered as side transfers, starting at `start_time`
    #[serde(rename = "flymission")]
    FlyMission {
        path_transfer: u32,
        capture_transfer: u32,
        waypoints: usize,
        start_time: DateTime<Utc>,
    },
}

impl Command {
    pub fn new(kind: CommandType) -> Self {
        Self {
            protocol: PROTOCOL_VERSION,
            kind,
        }
    }

    pub fn takeoff(alt: f64) -> Self {
        Self::new(CommandType::Takeoff { alt })
    }

    pub fn land() -> Self {
        Self::new(CommandType::Land {})
    }

    pub fn stop() -> Self {
        Self::new(CommandType::Stop {})
    }

    pub fn fly_to(point: Vec3) -> Self {
        Self::new(CommandType::FlyToPoint {
            x: point.x,
            y: point.y,
            z: point.z,
        })
    }

    /// Verb as it appears on the wire.
    pub fn verb(&self) -> &'static str {
        match self.kind {
            CommandType::Takeoff { .. } => "takeoff",
            CommandType::Land {} => "land",
            CommandType::Stop {} => "stop",
            CommandType::FlyToPoint { .. } => "flytopoint",
            CommandType::FlyMission { .. } => "flymission",
        }
    }

    /// Check parameters against the configured limits before sending.
    pub fn validate(&self, limits: &CommandLimits) -> Result<(), CommandError> {
        if self.protocol != PROTOCOL_VERSION {
            return Err(CommandError::UnsupportedProtocol(self.protocol));
        }
        match &self.kind {
            CommandType::Takeoff { alt } => limits.check_takeoff_altitude(*alt),
            CommandType::Land {} | CommandType::Stop {} => Ok(()),
            CommandType::FlyToPoint { x, y, z } => {
                if Vec3::new(*x, *y, *z).is_finite() {
                    Ok(())
                } else {
                    Err(CommandError::NotFinite("flytopoint target"))
                }
            }
            CommandType::FlyMission { waypoints, .. } => {
                if *waypoints == 0 {
                    Err(CommandError::Invalid(
                        "flymission needs at least one waypoint".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}
