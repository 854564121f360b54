//! Return-to-home.

use std::net::IpAddr;

use gcs_core::models::Vec3;
use gcs_link::Uplink;

use super::{Coordinator, ManeuverError};
use crate::signal::Signal;

impl<U: Uplink> Coordinator<U> {
    /// Climb by `alt`, fly over home with a safety margin, descend to home
    /// and land. Each step after the first waits for "waypoint reached".
    pub async fn return_home(&self, vehicle: IpAddr, alt: f64) -> Result<(), ManeuverError> {
        self.config.limits.check_return_altitude(alt)?;
        let state = self
            .fleet
            .get(&vehicle)
            .ok_or(ManeuverError::UnknownVehicle(vehicle))?;

        let up = self.config.vertical;
        let waypoints: [Vec3; 3] = [
            up.lift(&state.position, alt),
            up.lift(&state.home, alt + self.config.return_margin_m),
            state.home,
        ];
        let targets = [vehicle];
        let reached = self.fleet.reached_signal(vehicle);
        reached.clear();

        tracing::info!(%vehicle, home = ?state.home, "Returning home");
        self.fly_to(&targets, waypoints[0]).await?;
        for (step, point) in ["climb", "transit"].into_iter().zip(&waypoints[1..]) {
            self.await_reached(vehicle, &reached, step).await?;
            self.fly_to(&targets, *point).await?;
        }
        self.await_reached(vehicle, &reached, "descent").await?;
        self.land(&targets).await?;
        tracing::info!(%vehicle, "Return complete, landing");
        Ok(())
    }

    async fn await_reached(
        &self,
        vehicle: IpAddr,
        reached: &Signal,
        step: &'static str,
    ) -> Result<(), ManeuverError> {
        match self.config.return_timeout {
            Some(limit) => tokio::time::timeout(limit, reached.wait_take())
                .await
                .map_err(|_| ManeuverError::Timeout { vehicle, step }),
            None => {
                reached.wait_take().await;
                Ok(())
            }
        }
    }
}
