//! In-memory fleet state using DashMap.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gcs_core::models::{Attitude, Telemetry, Vec3};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::signal::Signal;

/// Latest known state of one vehicle, keyed by its source address.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleState {
    pub ip: IpAddr,
    pub position: Vec3,
    pub attitude: Attitude,
    pub battery_pct: f64,
    pub last_update: DateTime<Utc>,
    /// First position this vehicle ever reported.
    pub home: Vec3,
}

impl VehicleState {
    fn from_telemetry(ip: IpAddr, telemetry: &Telemetry, now: DateTime<Utc>) -> Self {
        Self {
            ip,
            position: telemetry.position,
            attitude: telemetry.attitude,
            battery_pct: telemetry.battery_pct,
            last_update: now,
            home: telemetry.position,
        }
    }

    fn update(&mut self, telemetry: &Telemetry, now: DateTime<Utc>) {
        self.position = telemetry.position;
        self.attitude = telemetry.attitude;
        self.battery_pct = telemetry.battery_pct;
        self.last_update = now;
    }

    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.last_update);
        age.to_std().map(|age| age > max_age).unwrap_or(false)
    }
}

/// Fleet table shared between receive loops and maneuvers.
#[derive(Default)]
pub struct FleetState {
    vehicles: DashMap<IpAddr, VehicleState>,
    reached: DashMap<IpAddr, Arc<Signal>>,
    acks: DashMap<IpAddr, u64>,
    updates: Notify,
}

impl FleetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a telemetry report and wake anyone waiting on fleet changes.
    pub fn update_telemetry(&self, ip: IpAddr, telemetry: Telemetry) {
        self.update_telemetry_at(ip, telemetry, Utc::now());
    }

    pub fn update_telemetry_at(&self, ip: IpAddr, telemetry: Telemetry, now: DateTime<Utc>) {
        self.vehicles
            .entry(ip)
            .and_modify(|state| state.update(&telemetry, now))
            .or_insert_with(|| {
                tracing::info!(%ip, "New vehicle, home set to {:?}", telemetry.position);
                VehicleState::from_telemetry(ip, &telemetry, now)
            });
        self.updates.notify_waiters();
    }

    pub fn get(&self, ip: &IpAddr) -> Option<VehicleState> {
        self.vehicles.get(ip).map(|r| r.value().clone())
    }

    pub fn position(&self, ip: &IpAddr) -> Option<Vec3> {
        self.vehicles.get(ip).map(|r| r.position)
    }

    /// Snapshot of every vehicle, ordered by address.
    pub fn all(&self) -> Vec<VehicleState> {
        let mut out: Vec<VehicleState> = self.vehicles.iter().map(|r| r.value().clone()).collect();
        out.sort_by_key(|v| v.ip);
        out
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// "Waypoint reached" latch for `ip`, created on first use.
    pub fn reached_signal(&self, ip: IpAddr) -> Arc<Signal> {
        self.reached.entry(ip).or_default().clone()
    }

    pub fn mark_reached(&self, ip: IpAddr) {
        tracing::debug!(%ip, "Waypoint reached");
        self.reached_signal(ip).raise();
    }

    pub fn record_ack(&self, ip: IpAddr) {
        *self.acks.entry(ip).or_insert(0) += 1;
    }

    pub fn ack_count(&self, ip: &IpAddr) -> u64 {
        self.acks.get(ip).map(|r| *r).unwrap_or(0)
    }

    /// Wait until `ready` holds, re-checking on every telemetry update and at
    /// least every `tick`. Returns `false` if `deadline` passes first.
    pub async fn wait_until<F>(&self, deadline: Option<Instant>, tick: Duration, mut ready: F) -> bool
    where
        F: FnMut(&FleetState) -> bool,
    {
        loop {
            let notified = self.updates.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if ready(self) {
                return true;
            }

            let now = Instant::now();
            let wake = match deadline {
                Some(deadline) if deadline <= now => return false,
                Some(deadline) => deadline.min(now + tick),
                None => now + tick,
            };
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn telemetry(x: f64, y: f64, z: f64) -> Telemetry {
        Telemetry {
            position: Vec3::new(x, y, z),
            attitude: Attitude::default(),
            battery_pct: 90.0,
        }
    }

    #[test]
    fn first_report_sets_home() {
        let fleet = FleetState::new();
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        fleet.update_telemetry(ip, telemetry(1.0, 2.0, 0.0));
        fleet.update_telemetry(ip, telemetry(5.0, 6.0, 10.0));

        let state = fleet.get(&ip).unwrap();
        assert_eq!(state.home, Vec3::new(1.0, 2.0, 0.0));
        assert_eq!(state.position, Vec3::new(5.0, 6.0, 10.0));
        assert_eq!(fleet.len(), 1);
    }

    #[test]
    fn staleness_uses_last_update() {
        let fleet = FleetState::new();
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));
        let then = Utc::now() - chrono::Duration::seconds(30);
        fleet.update_telemetry_at(ip, telemetry(0.0, 0.0, 0.0), then);

        let state = fleet.get(&ip).unwrap();
        assert!(state.is_stale(Duration::from_secs(5), Utc::now()));
        assert!(!state.is_stale(Duration::from_secs(60), Utc::now()));
    }

    #[tokio::test]
    async fn wait_until_wakes_on_telemetry() {
        let fleet = Arc::new(FleetState::new());
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 4));

        let writer = {
            let fleet = fleet.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                fleet.update_telemetry(ip, telemetry(1.0, 1.0, 1.0));
            })
        };

        let deadline = Instant::now() + Duration::from_secs(2);
        let arrived = fleet
            .wait_until(Some(deadline), Duration::from_secs(3), |f| f.position(&ip).is_some())
            .await;
        writer.await.unwrap();
        assert!(arrived);
    }

    #[tokio::test]
    async fn wait_until_gives_up_at_deadline() {
        let fleet = FleetState::new();
        let deadline = Instant::now() + Duration::from_millis(50);
        assert!(!fleet.wait_until(Some(deadline), Duration::from_millis(10), |_| false).await);
    }
}
