//! Parameter limits for fleet commands and maneuvers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a command or maneuver request is rejected before anything is sent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("{parameter} must be between {min} and {max}, got {value}")]
    OutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{0} must be a finite number")]
    NotFinite(&'static str),
    #[error("no target vehicles specified")]
    NoTargets,
    #[error("unsupported protocol version {0}")]
    UnsupportedProtocol(u8),
    #[error("{0}")]
    Invalid(String),
}

/// Accepted ranges for operator-supplied parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLimits {
    pub takeoff_min_alt_m: f64,
    pub takeoff_max_alt_m: f64,
    /// Climb applied before flying home
    pub return_min_alt_m: f64,
    pub return_max_alt_m: f64,
    /// Vertical spacing between followers
    pub follow_min_offset_m: f64,
    pub follow_max_offset_m: f64,
    /// Largest per-vehicle offset accepted for a synchronized mission
    pub mission_max_offset_m: f64,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            takeoff_min_alt_m: 5.0,
            takeoff_max_alt_m: 100.0,
            return_min_alt_m: 5.0,
            return_max_alt_m: 100.0,
            follow_min_offset_m: 1.0,
            follow_max_offset_m: 3.0,
            mission_max_offset_m: 50.0,
        }
    }
}

impl CommandLimits {
    pub fn check_takeoff_altitude(&self, alt: f64) -> Result<(), CommandError> {
        check_range(
            "takeoff altitude",
            alt,
            self.takeoff_min_alt_m,
            self.takeoff_max_alt_m,
        )
    }

    pub fn check_return_altitude(&self, alt: f64) -> Result<(), CommandError> {
        check_range(
            "return altitude",
            alt,
            self.return_min_alt_m,
            self.return_max_alt_m,
        )
    }

    pub fn check_follow_offset(&self, offset: f64) -> Result<(), CommandError> {
        check_range(
            "follow altitude offset",
            offset,
            self.follow_min_offset_m,
            self.follow_max_offset_m,
        )
    }

    pub fn check_mission_offset(&self, magnitude: f64) -> Result<(), CommandError> {
        check_range(
            "mission offset magnitude",
            magnitude,
            0.0,
            self.mission_max_offset_m,
        )
    }
}

fn check_range(parameter: &'static str, value: f64, min: f64, max: f64) -> Result<(), CommandError> {
    if !value.is_finite() {
        return Err(CommandError::NotFinite(parameter));
    }
    if value < min || value > max {
        return Err(CommandError::OutOfRange {
            parameter,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        let limits = CommandLimits::default();
        assert!(limits.check_follow_offset(1.0).is_ok());
        assert!(limits.check_follow_offset(3.0).is_ok());
        assert!(limits.check_follow_offset(3.01).is_err());
    }

    #[test]
    fn nan_is_rejected_as_not_finite() {
        let limits = CommandLimits::default();
        assert_eq!(
            limits.check_return_altitude(f64::NAN),
            Err(CommandError::NotFinite("return altitude"))
        );
    }

    #[test]
    fn out_of_range_message_names_the_parameter() {
        let err = CommandLimits::default()
            .check_mission_offset(80.0)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "mission offset magnitude must be between 0 and 50, got 80"
        );
    }
}
