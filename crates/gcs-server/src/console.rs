//! Operator console.
//!
//! One command per line, parsed with clap, e.g.
//! `takeoff --ip 192.168.1.20,192.168.1.21 --alt 15`. When `--ip` is left
//! out the vehicles found by the last `search` are used.

use std::fmt::Write as _;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gcs_core::coverage::{plan_coverage, CoverageRequest};
use gcs_core::models::Vec3;
use gcs_link::{discover, Uplink};

use crate::config::Config;
use crate::maneuvers::Coordinator;
use crate::signal::Signal;

#[derive(Parser, Debug)]
#[command(name = "gcs", no_binary_name = true, disable_version_flag = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Probe the network for vehicles
    Search {
        #[arg(long)]
        window_ms: Option<u64>,
    },
    Takeoff {
        #[arg(long, value_delimiter = ',')]
        ip: Vec<IpAddr>,
        #[arg(long)]
        alt: f64,
    },
    Land {
        #[arg(long, value_delimiter = ',')]
        ip: Vec<IpAddr>,
    },
    /// Drop current task and hover
    Stop {
        #[arg(long, value_delimiter = ',')]
        ip: Vec<IpAddr>,
    },
    /// Fly to a point in the vehicle frame
    Goto {
        #[arg(long, value_delimiter = ',')]
        ip: Vec<IpAddr>,
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
        #[arg(long, allow_hyphen_values = true)]
        z: f64,
    },
    /// Stack vehicles above a leader
    Follow {
        #[arg(long, value_delimiter = ',')]
        ip: Vec<IpAddr>,
        #[arg(long)]
        leader: IpAddr,
        #[arg(long)]
        offset: f64,
    },
    /// Stop the running follow relay
    Unfollow,
    /// Climb, fly home and land
    Return {
        #[arg(long, value_delimiter = ',')]
        ip: Vec<IpAddr>,
        #[arg(long)]
        alt: f64,
    },
    /// Mark a waypoint as reached on behalf of a vehicle
    Reached {
        #[arg(long)]
        ip: IpAddr,
    },
    /// Plan a coverage mission from a JSON request and start it. Waypoints
    /// are metres from the request's ground station.
    Mission {
        #[arg(long, value_delimiter = ',')]
        ip: Vec<IpAddr>,
        #[arg(long)]
        plan: PathBuf,
        /// Per-vehicle offset `x:y:z`, one per vehicle in `--ip` order
        #[arg(long = "offset", value_parser = parse_vec3, allow_hyphen_values = true)]
        offsets: Vec<Vec3>,
    },
    /// List known vehicles
    Fleet,
}

fn parse_vec3(s: &str) -> Result<Vec3, String> {
    let parts: Vec<f64> = s
        .split(':')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected x:y:z, got {s:?}")),
    }
}

pub fn parse_line(line: &str) -> Result<ConsoleCommand, clap::Error> {
    ConsoleLine::try_parse_from(line.split_whitespace()).map(|l| l.command)
}

pub struct Console<U> {
    coordinator: Arc<Coordinator<U>>,
    probe_target: SocketAddr,
    discovery_window: Duration,
    stale_after: Duration,
    follow_stop: Arc<Signal>,
    known: Vec<IpAddr>,
}

impl<U: Uplink + 'static> Console<U> {
    pub fn new(coordinator: Arc<Coordinator<U>>, config: &Config) -> Self {
        Self {
            coordinator,
            probe_target: config.probe_target(),
            discovery_window: config.discovery_window,
            stale_after: config.telemetry_stale_after,
            follow_stop: Arc::new(Signal::new()),
            known: Vec::new(),
        }
    }

    /// Vehicles found by the last search.
    pub fn known(&self) -> &[IpAddr] {
        &self.known
    }

    fn targets(&self, ip: Vec<IpAddr>) -> Result<Vec<IpAddr>> {
        if !ip.is_empty() {
            return Ok(ip);
        }
        if self.known.is_empty() {
            bail!("no target vehicles: pass --ip or run `search` first");
        }
        Ok(self.known.clone())
    }

    /// Run one command and describe the outcome. Long maneuvers are spawned
    /// and report through the log.
    pub async fn execute(&mut self, command: ConsoleCommand) -> Result<String> {
        let coordinator = self.coordinator.clone();
        match command {
            ConsoleCommand::Search { window_ms } => {
                let window = window_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.discovery_window);
                self.known = discover(self.probe_target, window).await?;
                Ok(format!("found {} vehicle(s): {:?}", self.known.len(), self.known))
            }
            ConsoleCommand::Takeoff { ip, alt } => {
                let targets = self.targets(ip)?;
                coordinator.takeoff(&targets, alt).await?;
                Ok(format!("takeoff to {alt} m sent to {targets:?}"))
            }
            ConsoleCommand::Land { ip } => {
                let targets = self.targets(ip)?;
                coordinator.land(&targets).await?;
                Ok(format!("land sent to {targets:?}"))
            }
            ConsoleCommand::Stop { ip } => {
                let targets = self.targets(ip)?;
                coordinator.stop(&targets).await?;
                Ok(format!("stop sent to {targets:?}"))
            }
            ConsoleCommand::Goto { ip, x, y, z } => {
                let targets = self.targets(ip)?;
                coordinator.fly_to(&targets, Vec3::new(x, y, z)).await?;
                Ok(format!("flytopoint ({x}, {y}, {z}) sent to {targets:?}"))
            }
            ConsoleCommand::Follow { ip, leader, offset } => {
                let followers: Vec<IpAddr> = self
                    .targets(ip)?
                    .into_iter()
                    .filter(|f| *f != leader)
                    .collect();
                coordinator.config().limits.check_follow_offset(offset)?;
                self.follow_stop.clear();
                let stop = self.follow_stop.clone();
                let count = followers.len();
                tokio::spawn(async move {
                    if let Err(err) = coordinator.follow(leader, &followers, offset, &stop).await {
                        tracing::warn!(%leader, "Follow failed: {}", err);
                    }
                });
                Ok(format!("{count} vehicle(s) following {leader}"))
            }
            ConsoleCommand::Unfollow => {
                self.follow_stop.raise();
                Ok("follow stop requested".to_string())
            }
            ConsoleCommand::Return { ip, alt } => {
                let targets = self.targets(ip)?;
                coordinator.config().limits.check_return_altitude(alt)?;
                for vehicle in targets.iter().copied() {
                    let coordinator = coordinator.clone();
                    tokio::spawn(async move {
                        if let Err(err) = coordinator.return_home(vehicle, alt).await {
                            tracing::warn!(%vehicle, "Return home failed: {}", err);
                        }
                    });
                }
                Ok(format!("returning {targets:?} home"))
            }
            ConsoleCommand::Reached { ip } => {
                coordinator.fleet().mark_reached(ip);
                Ok(format!("{ip} marked as reached"))
            }
            ConsoleCommand::Mission { ip, plan, offsets } => {
                let targets = self.targets(ip)?;
                let text = std::fs::read_to_string(&plan)
                    .with_context(|| format!("reading {}", plan.display()))?;
                let request: CoverageRequest = serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", plan.display()))?;
                let path = plan_coverage(&request)?
                    .mission_path(&request.ground_station, coordinator.config().vertical);
                let points = path.waypoints.len();
                tokio::spawn(async move {
                    match coordinator.run_mission(&targets, &path, &offsets).await {
                        Ok(report) if report.started() => {
                            tracing::info!(?report, "Mission running");
                        }
                        Ok(report) => {
                            tracing::warn!(unconfirmed = ?report.unconfirmed, "Mission aborted");
                        }
                        Err(err) => tracing::warn!("Mission failed: {}", err),
                    }
                });
                Ok(format!("mission with {points} waypoint(s) starting"))
            }
            ConsoleCommand::Fleet => Ok(self.describe_fleet()),
        }
    }

    fn describe_fleet(&self) -> String {
        let now = Utc::now();
        let vehicles = self.coordinator.fleet().all();
        if vehicles.is_empty() {
            return "no telemetry received yet".to_string();
        }
        let mut out = String::new();
        for v in vehicles {
            let _ = writeln!(
                out,
                "{} pos=({:.2}, {:.2}, {:.2}) battery={:.0}% home=({:.2}, {:.2}, {:.2}){}",
                v.ip,
                v.position.x,
                v.position.y,
                v.position.z,
                v.battery_pct,
                v.home.x,
                v.home.y,
                v.home.z,
                if v.is_stale(self.stale_after, now) { " [stale]" } else { "" }
            );
        }
        out
    }
}
