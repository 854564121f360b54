//! Single-command maneuvers.

use std::net::IpAddr;

use gcs_core::models::{Command, Vec3};
use gcs_core::rules::CommandError;
use gcs_link::Uplink;

use super::{Coordinator, ManeuverError};

impl<U: Uplink> Coordinator<U> {
    /// Validate and send one command to every target.
    pub async fn dispatch(&self, targets: &[IpAddr], command: Command) -> Result<(), ManeuverError> {
        if targets.is_empty() {
            return Err(CommandError::NoTargets.into());
        }
        command.validate(&self.config.limits)?;
        self.uplink.send_command(targets, &command).await?;
        Ok(())
    }

    pub async fn takeoff(&self, targets: &[IpAddr], alt: f64) -> Result<(), ManeuverError> {
        self.dispatch(targets, Command::takeoff(alt)).await
    }

    pub async fn land(&self, targets: &[IpAddr]) -> Result<(), ManeuverError> {
        self.dispatch(targets, Command::land()).await
    }

    pub async fn stop(&self, targets: &[IpAddr]) -> Result<(), ManeuverError> {
        self.dispatch(targets, Command::stop()).await
    }

    pub async fn fly_to(&self, targets: &[IpAddr], point: Vec3) -> Result<(), ManeuverError> {
        self.dispatch(targets, Command::fly_to(point)).await
    }
}
