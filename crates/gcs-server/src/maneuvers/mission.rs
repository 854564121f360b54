//! Synchronized multi-vehicle mission start.

use std::collections::HashSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use gcs_core::models::{Command, CommandType, MissionPath, Vec3};
use gcs_core::rules::CommandError;
use gcs_link::{ArrayBlob, LinkError, Uplink};
use serde::Serialize;
use tokio::time::Instant;

use super::{Coordinator, ManeuverError};

const PATH_TAG: &str = "path";
const CAPTURE_TAG: &str = "capture_time";

/// Outcome of a mission start attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionReport {
    /// Shared start time, set only when every vehicle was confirmed
    pub start_time: Option<DateTime<Utc>>,
    pub confirmed: Vec<IpAddr>,
    pub unconfirmed: Vec<IpAddr>,
}

impl MissionReport {
    pub fn started(&self) -> bool {
        self.start_time.is_some()
    }
}

impl<U: Uplink> Coordinator<U> {
    /// Send every vehicle to its start point, wait until all of them are
    /// there, then hand out the remaining path and a shared start time.
    ///
    /// `offsets` shifts the path per vehicle; empty means no shift. If any
    /// vehicle fails to arrive in time nothing further is sent and the report
    /// lists who did and did not make it.
    pub async fn run_mission(
        &self,
        vehicles: &[IpAddr],
        path: &MissionPath,
        offsets: &[Vec3],
    ) -> Result<MissionReport, ManeuverError> {
        if vehicles.is_empty() {
            return Err(CommandError::NoTargets.into());
        }
        if path.waypoints.len() < 2 {
            return Err(ManeuverError::PathTooShort(path.waypoints.len()));
        }
        if path.capture_times_s.len() != path.waypoints.len() {
            return Err(CommandError::Invalid(format!(
                "{} capture times for {} waypoints",
                path.capture_times_s.len(),
                path.waypoints.len()
            ))
            .into());
        }
        let offsets: Vec<Vec3> = if offsets.is_empty() {
            vec![Vec3::default(); vehicles.len()]
        } else if offsets.len() == vehicles.len() {
            offsets.to_vec()
        } else {
            return Err(ManeuverError::OffsetCount {
                expected: vehicles.len(),
                actual: offsets.len(),
            });
        };
        for offset in &offsets {
            self.config.limits.check_mission_offset(offset.magnitude())?;
        }

        let Some(first) = path.first() else {
            return Err(ManeuverError::PathTooShort(0));
        };
        let targets: Vec<Vec3> = offsets.iter().map(|o| first.offset(o)).collect();
        let issued_at = Utc::now();
        for (vehicle, target) in vehicles.iter().zip(&targets) {
            self.fly_to(std::slice::from_ref(vehicle), *target).await?;
        }

        // Arrival is latched: a vehicle that drifts off after a confirming
        // report stays confirmed.
        let threshold = self.config.arrival_threshold;
        let mut arrived: HashSet<IpAddr> = HashSet::new();
        let deadline = Instant::now() + self.config.arrival_wait;
        self.fleet
            .wait_until(Some(deadline), self.config.poll_tick, |fleet| {
                for (vehicle, target) in vehicles.iter().zip(&targets) {
                    if arrived.contains(vehicle) {
                        continue;
                    }
                    let close = fleet.get(vehicle).is_some_and(|state| {
                        state.last_update > issued_at
                            && state.position.distance(target) <= threshold
                    });
                    if close {
                        tracing::debug!(%vehicle, "Start point reached");
                        arrived.insert(*vehicle);
                    }
                }
                vehicles.iter().all(|v| arrived.contains(v))
            })
            .await;

        let (confirmed, unconfirmed): (Vec<IpAddr>, Vec<IpAddr>) =
            vehicles.iter().partition(|v| arrived.contains(*v));

        if !unconfirmed.is_empty() {
            tracing::warn!(
                ?confirmed,
                ?unconfirmed,
                "Mission aborted: not every vehicle reached its start point"
            );
            return Ok(MissionReport {
                start_time: None,
                confirmed,
                unconfirmed,
            });
        }

        let start_time = Utc::now()
            + chrono::Duration::from_std(self.config.start_delay).unwrap_or_default();
        let remaining = &path.waypoints[1..];
        let captures = ArrayBlob::from_values(CAPTURE_TAG, path.capture_times_s[1..].to_vec());

        for (vehicle, offset) in vehicles.iter().zip(&offsets) {
            let rows: Vec<Vec<f64>> = remaining
                .iter()
                .map(|p| {
                    let p = p.offset(offset);
                    vec![p.x, p.y, p.z]
                })
                .collect();
            let path_blob = ArrayBlob::from_rows(PATH_TAG, &rows).map_err(LinkError::from)?;

            let target = std::slice::from_ref(vehicle);
            let path_transfer = self.uplink.send_blob(target, &path_blob).await?;
            let capture_transfer = self.uplink.send_blob(target, &captures).await?;
            self.dispatch(
                target,
                Command::new(CommandType::FlyMission {
                    path_transfer,
                    capture_transfer,
                    waypoints: rows.len(),
                    start_time,
                }),
            )
            .await?;
        }

        tracing::info!(vehicles = vehicles.len(), %start_time, "Mission started");
        Ok(MissionReport {
            start_time: Some(start_time),
            confirmed,
            unconfirmed,
        })
    }
}
