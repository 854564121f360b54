//! Point-mass vehicle used to exercise the ground station without hardware.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use gcs_core::models::{Attitude, Command, CommandType, Telemetry, Vec3};
use gcs_link::ArrayBlob;

/// Distance at which a target counts as reached.
pub const ARRIVAL_RADIUS: f64 = 0.05;
const BATTERY_DRAIN_PER_S: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Grounded,
    Flying,
    Landing,
}

#[derive(Debug, Clone, PartialEq)]
struct PendingMission {
    path_transfer: u32,
    capture_transfer: u32,
    waypoints: usize,
    start_time: DateTime<Utc>,
}

/// What happened during one simulation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimEvent {
    Reached(Vec3),
    Landed,
    MissionStarted { waypoints: usize },
}

#[derive(Debug)]
pub struct SimVehicle {
    position: Vec3,
    speed_mps: f64,
    battery_pct: f64,
    phase: Phase,
    targets: VecDeque<Vec3>,
    blobs: HashMap<u32, ArrayBlob>,
    pending: Option<PendingMission>,
}

impl SimVehicle {
    pub fn new(position: Vec3, speed_mps: f64) -> Self {
        Self {
            position,
            speed_mps,
            battery_pct: 100.0,
            phase: Phase::Grounded,
            targets: VecDeque::new(),
            blobs: HashMap::new(),
            pending: None,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Side transfers held for a mission that has not started yet.
    pub fn stored_blobs(&self) -> usize {
        self.blobs.len()
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            position: self.position,
            attitude: Attitude::default(),
            battery_pct: self.battery_pct,
        }
    }

    pub fn apply(&mut self, command: &Command) {
        match &command.kind {
            CommandType::Takeoff { alt } => {
                self.set_target(Vec3::new(self.position.x, self.position.y, *alt));
                self.phase = Phase::Flying;
            }
            CommandType::Land {} => {
                self.set_target(Vec3::new(self.position.x, self.position.y, 0.0));
                self.phase = Phase::Landing;
            }
            CommandType::Stop {} => {
                self.targets.clear();
                self.pending = None;
            }
            CommandType::FlyToPoint { x, y, z } => {
                self.set_target(Vec3::new(*x, *y, *z));
                self.phase = Phase::Flying;
            }
            CommandType::FlyMission {
                path_transfer,
                capture_transfer,
                waypoints,
                start_time,
            } => {
                self.pending = Some(PendingMission {
                    path_transfer: *path_transfer,
                    capture_transfer: *capture_transfer,
                    waypoints: *waypoints,
                    start_time: *start_time,
                });
            }
        }
    }

    /// Store a completed side transfer for a later `flymission`.
    pub fn accept_blob(&mut self, transfer_id: u32, blob: ArrayBlob) {
        self.blobs.insert(transfer_id, blob);
    }

    fn set_target(&mut self, target: Vec3) {
        self.targets.clear();
        self.targets.push_back(target);
    }

    /// Advance by `dt` seconds.
    pub fn step(&mut self, dt: f64, now: DateTime<Utc>) -> Vec<SimEvent> {
        let mut events = Vec::new();
        if let Some(started) = self.try_start_mission(now) {
            events.push(started);
        }

        if self.phase != Phase::Grounded {
            self.battery_pct = (self.battery_pct - BATTERY_DRAIN_PER_S * dt).max(0.0);
        }

        let mut budget = self.speed_mps * dt;
        while let Some(target) = self.targets.front().copied() {
            let remaining = self.position.distance(&target);
            if remaining > budget + ARRIVAL_RADIUS {
                let t = budget / remaining;
                self.position = Vec3::new(
                    self.position.x + (target.x - self.position.x) * t,
                    self.position.y + (target.y - self.position.y) * t,
                    self.position.z + (target.z - self.position.z) * t,
                );
                break;
            }

            budget = (budget - remaining).max(0.0);
            self.position = target;
            self.targets.pop_front();
            if self.phase == Phase::Landing && self.targets.is_empty() {
                self.phase = Phase::Grounded;
                events.push(SimEvent::Landed);
            } else {
                events.push(SimEvent::Reached(target));
            }
        }
        events
    }

    fn try_start_mission(&mut self, now: DateTime<Utc>) -> Option<SimEvent> {
        let pending = self.pending.as_ref()?;
        if now < pending.start_time
            || !self.blobs.contains_key(&pending.path_transfer)
            || !self.blobs.contains_key(&pending.capture_transfer)
        {
            return None;
        }
        let pending = self.pending.take()?;
        let path = self.blobs.remove(&pending.path_transfer)?;
        self.blobs.remove(&pending.capture_transfer);

        let waypoints: VecDeque<Vec3> = path
            .rows()
            .into_iter()
            .filter_map(|row| match row.as_slice() {
                [x, y, z] => Some(Vec3::new(*x, *y, *z)),
                _ => None,
            })
            .take(pending.waypoints)
            .collect();
        let count = waypoints.len();

        self.targets = waypoints;
        self.phase = Phase::Flying;
        Some(SimEvent::MissionStarted { waypoints: count })
    }
}
