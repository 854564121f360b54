//! Area-coverage flight planning.
//!
//! Turns a surveyed polygon plus camera geometry into a time-stamped
//! sequence of exposure points flown as parallel lanes. Four lane/point
//! orderings are built and the one starting closest to the ground station
//! is returned in geographic coordinates.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use thiserror::Error;

use crate::models::{GeoPoint, GroundStation, MissionPath, PlanWaypoint, Vec3, VerticalAxis};
use crate::planar::{self, OrientedRect, PlanarPoint};
use crate::projection::ProjectedFrame;

const MIN_VERTICES: usize = 3;
// Degrees squared; roughly 1 cm^2 at mid latitudes.
const MIN_GEO_AREA: f64 = 1e-14;

pub const DEFAULT_TURN_BUFFER_S: f64 = 2.0;
/// Upper bound on flight lanes in one plan.
pub const MAX_LANES: usize = 10_000;
/// Upper bound on exposure points in one plan.
pub const MAX_EXPOSURES: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("survey area needs at least 3 distinct vertices, got {0}")]
    TooFewVertices(usize),
    #[error("survey area has zero area")]
    ZeroArea,
    #[error("{0} must be finite")]
    NonFinite(&'static str),
    #[error("{name} overlap must be in [0, 1), got {value}")]
    Overlap { name: &'static str, value: f64 },
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} field of view must be in (0, 180) degrees, got {value}")]
    FieldOfView { name: &'static str, value: f64 },
    #[error("turn buffer must not be negative, got {0}")]
    NegativeBuffer(f64),
    #[error("plan needs about {requested:.0} {what}, limit is {max}")]
    TooDense {
        what: &'static str,
        requested: f64,
        max: usize,
    },
}

/// Closed survey polygon in decimal degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GeoPoint>", into = "Vec<GeoPoint>")]
pub struct SurveyArea {
    vertices: Vec<GeoPoint>,
}

impl SurveyArea {
    /// Validate and normalise a ring. A repeated closing vertex is dropped.
    pub fn new(mut vertices: Vec<GeoPoint>) -> Result<Self, PlanError> {
        if vertices
            .iter()
            .any(|p| !p.lon.is_finite() || !p.lat.is_finite())
        {
            return Err(PlanError::NonFinite("survey area vertex"));
        }

        vertices.dedup();
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < MIN_VERTICES {
            return Err(PlanError::TooFewVertices(vertices.len()));
        }

        let as_planar: Vec<PlanarPoint> = vertices
            .iter()
            .map(|p| PlanarPoint::new(p.lon, p.lat))
            .collect();
        if planar::signed_area(&as_planar).abs() < MIN_GEO_AREA {
            return Err(PlanError::ZeroArea);
        }

        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[GeoPoint] {
        &self.vertices
    }
}

impl TryFrom<Vec<GeoPoint>> for SurveyArea {
    type Error = PlanError;

    fn try_from(vertices: Vec<GeoPoint>) -> Result<Self, Self::Error> {
        Self::new(vertices)
    }
}

impl From<SurveyArea> for Vec<GeoPoint> {
    fn from(area: SurveyArea) -> Self {
        area.vertices
    }
}

/// Everything the planner needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageRequest {
    pub area: SurveyArea,
    /// Flight altitude above the ground station
    pub altitude_m: f64,
    pub vfov_deg: f64,
    pub hfov_deg: f64,
    pub speed_mps: f64,
    pub overlap_front: f64,
    pub overlap_side: f64,
    pub ground_station: GroundStation,
    #[serde(default = "default_turn_buffer")]
    pub turn_buffer_s: f64,
}

fn default_turn_buffer() -> f64 {
    DEFAULT_TURN_BUFFER_S
}

impl CoverageRequest {
    fn validate(&self) -> Result<(), PlanError> {
        for (name, value) in [
            ("altitude", self.altitude_m),
            ("speed", self.speed_mps),
            ("vertical field of view", self.vfov_deg),
            ("horizontal field of view", self.hfov_deg),
            ("front overlap", self.overlap_front),
            ("side overlap", self.overlap_side),
            ("turn buffer", self.turn_buffer_s),
            ("ground station longitude", self.ground_station.lon),
            ("ground station latitude", self.ground_station.lat),
            ("ground station elevation", self.ground_station.elevation_m),
        ] {
            if !value.is_finite() {
                return Err(PlanError::NonFinite(name));
            }
        }

        if self.altitude_m <= 0.0 {
            return Err(PlanError::NonPositive {
                name: "altitude",
                value: self.altitude_m,
            });
        }
        if self.speed_mps <= 0.0 {
            return Err(PlanError::NonPositive {
                name: "speed",
                value: self.speed_mps,
            });
        }
        for (name, value) in [("vertical", self.vfov_deg), ("horizontal", self.hfov_deg)] {
            if value <= 0.0 || value >= 180.0 {
                return Err(PlanError::FieldOfView { name, value });
            }
        }
        for (name, value) in [("front", self.overlap_front), ("side", self.overlap_side)] {
            if !(0.0..1.0).contains(&value) {
                return Err(PlanError::Overlap { name, value });
            }
        }
        if self.turn_buffer_s < 0.0 {
            return Err(PlanError::NegativeBuffer(self.turn_buffer_s));
        }
        Ok(())
    }
}

/// Ground footprint of one exposure and the derived spacings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub width_m: f64,
    pub height_m: f64,
    pub lane_spacing_m: f64,
    pub exposure_interval_m: f64,
}

impl Footprint {
    pub fn new(request: &CoverageRequest) -> Self {
        let width_m = 2.0 * request.altitude_m * (request.hfov_deg.to_radians() / 2.0).tan();
        let height_m = 2.0 * request.altitude_m * (request.vfov_deg.to_radians() / 2.0).tan();
        Self {
            width_m,
            height_m,
            lane_spacing_m: width_m * (1.0 - request.overlap_side),
            exposure_interval_m: height_m * (1.0 - request.overlap_front),
        }
    }
}

/// One straight pass over the area, in projected metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlightLane {
    pub index: usize,
    pub start: PlanarPoint,
    pub end: PlanarPoint,
}

impl FlightLane {
    pub fn length(&self) -> f64 {
        self.start.distance(&self.end)
    }

    /// Points every `interval` metres from the start, including the start.
    /// Empty when the lane is shorter than one interval.
    fn sample(&self, interval: f64) -> Vec<PlanarPoint> {
        let length = self.length();
        let steps = (length / interval).floor() as usize;
        if steps == 0 {
            return Vec::new();
        }
        let (ux, uy) = (
            (self.end.x - self.start.x) / length,
            (self.end.y - self.start.y) / length,
        );
        (0..=steps)
            .map(|k| {
                let d = k as f64 * interval;
                PlanarPoint::new(self.start.x + ux * d, self.start.y + uy * d)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposurePoint {
    pub position: PlanarPoint,
    /// Seconds from mission start.
    pub time_s: f64,
    pub lane: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrder {
    Forward,
    ReversedLanes,
    ReversedPoints,
    ReversedBoth,
}

impl CandidateOrder {
    pub const ALL: [CandidateOrder; 4] = [
        CandidateOrder::Forward,
        CandidateOrder::ReversedLanes,
        CandidateOrder::ReversedPoints,
        CandidateOrder::ReversedBoth,
    ];

    fn reverses_lanes(self) -> bool {
        matches!(self, CandidateOrder::ReversedLanes | CandidateOrder::ReversedBoth)
    }

    fn reverses_points(self) -> bool {
        matches!(self, CandidateOrder::ReversedPoints | CandidateOrder::ReversedBoth)
    }
}

/// One re-timed ordering of the sampled lanes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub order: CandidateOrder,
    pub points: Vec<ExposurePoint>,
    /// Planar distance from the ground station to the first point.
    pub start_distance_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoveragePlan {
    pub frame: ProjectedFrame,
    pub footprint: Footprint,
    /// Heading of the lanes, radians from the projected +x axis
    pub sweep_angle_rad: f64,
    pub lanes: Vec<FlightLane>,
    /// Turn time applied between every pair of lanes
    pub turn_time_s: f64,
    pub candidates: Vec<Candidate>,
    pub selected: CandidateOrder,
    /// Selected candidate in geographic coordinates with absolute altitude
    pub waypoints: Vec<PlanWaypoint>,
}

impl CoveragePlan {
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn selected_candidate(&self) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.order == self.selected)
    }

    /// `Lon,Lat,Z,Time` rows for the selected plan.
    pub fn trajectory_csv(&self) -> String {
        let mut out = String::from("Lon,Lat,Z,Time\n");
        for wp in &self.waypoints {
            let _ = writeln!(out, "{},{},{},{}", wp.lon, wp.lat, wp.altitude_m, wp.time_s);
        }
        out
    }

    /// The selected plan as a path the fleet can fly, in metres relative to
    /// `origin`: x east, y north, `z` from the height above the origin's
    /// elevation. Capture times ride along unchanged.
    pub fn mission_path(&self, origin: &GroundStation, vertical: VerticalAxis) -> MissionPath {
        let (ox, oy) = self.frame.forward(origin.lon, origin.lat);
        let points = self
            .selected_candidate()
            .map(|c| c.points.as_slice())
            .unwrap_or_default();
        let waypoints = points
            .iter()
            .zip(&self.waypoints)
            .map(|(p, wp)| {
                Vec3::new(
                    p.position.x - ox,
                    p.position.y - oy,
                    vertical.z_at(wp.altitude_m - origin.elevation_m),
                )
            })
            .collect();
        MissionPath {
            waypoints,
            capture_times_s: self.waypoints.iter().map(|wp| wp.time_s).collect(),
        }
    }
}

/// Build a coverage plan. Pure and deterministic.
pub fn plan_coverage(request: &CoverageRequest) -> Result<CoveragePlan, PlanError> {
    request.validate()?;

    let vertices = request.area.vertices();
    let frame = ProjectedFrame::for_points(vertices)
        .ok_or(PlanError::TooFewVertices(vertices.len()))?;
    let ring: Vec<PlanarPoint> = vertices
        .iter()
        .map(|p| {
            let (x, y) = frame.forward(p.lon, p.lat);
            PlanarPoint::new(x, y)
        })
        .collect();
    let station = {
        let (x, y) = frame.forward(request.ground_station.lon, request.ground_station.lat);
        PlanarPoint::new(x, y)
    };

    let footprint = Footprint::new(request);
    let bounds = planar::minimum_area_rect(&ring).ok_or(PlanError::ZeroArea)?;
    let sweep_angle_rad = bounds.long_axis_angle();

    let lanes = build_lanes(&ring, &bounds, sweep_angle_rad, footprint.lane_spacing_m)?;
    let exposures: f64 = lanes
        .iter()
        .map(|lane| (lane.length() / footprint.exposure_interval_m).floor() + 1.0)
        .sum();
    if exposures > MAX_EXPOSURES as f64 {
        return Err(PlanError::TooDense {
            what: "exposures",
            requested: exposures,
            max: MAX_EXPOSURES,
        });
    }
    let sequences = sample_lanes(&lanes, footprint.exposure_interval_m);
    let turn_time_s = last_turn_time(&sequences, request.speed_mps, request.turn_buffer_s);
    let interval_time_s = footprint.exposure_interval_m / request.speed_mps;

    let candidates: Vec<Candidate> = CandidateOrder::ALL
        .iter()
        .map(|&order| {
            let points = retime(&reorder(&sequences, order), interval_time_s, turn_time_s);
            let start_distance_m = points.first().map(|p| p.position.distance(&station));
            Candidate {
                order,
                points,
                start_distance_m,
            }
        })
        .collect();

    let selected = select_closest(&candidates);
    let altitude_m = request.altitude_m + request.ground_station.elevation_m;
    let waypoints = candidates
        .iter()
        .find(|c| c.order == selected)
        .map(|c| {
            c.points
                .iter()
                .map(|p| {
                    let (lon, lat) = frame.inverse(p.position.x, p.position.y);
                    PlanWaypoint {
                        lon,
                        lat,
                        altitude_m,
                        time_s: p.time_s,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(CoveragePlan {
        frame,
        footprint,
        sweep_angle_rad,
        lanes,
        turn_time_s,
        candidates,
        selected,
        waypoints,
    })
}

/// Parallel lines across the area, clipped to the bounds grown by one spacing.
fn build_lanes(
    ring: &[PlanarPoint],
    bounds: &OrientedRect,
    angle: f64,
    spacing: f64,
) -> Result<Vec<FlightLane>, PlanError> {
    let dir = (angle.cos(), angle.sin());
    let perp = (-angle.sin(), angle.cos());

    let offsets: Vec<f64> = ring.iter().map(|p| p.along(perp)).collect();
    let min_proj = offsets.iter().copied().fold(f64::INFINITY, f64::min);
    let max_proj = offsets.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mid_proj = (min_proj + max_proj) / 2.0;
    let span_lanes = ((max_proj - min_proj) / spacing).floor() + 2.0;
    if span_lanes > MAX_LANES as f64 {
        return Err(PlanError::TooDense {
            what: "lanes",
            requested: span_lanes,
            max: MAX_LANES,
        });
    }
    let lane_count = span_lanes as usize;

    let anchor = planar::centroid(ring);
    let half_length = planar::perimeter(ring);
    let clip_ring = bounds.expanded(spacing).corners();

    let mut lanes = Vec::new();
    for i in 0..=lane_count {
        let shift = min_proj + i as f64 * spacing - mid_proj;
        let center = PlanarPoint::new(anchor.x + perp.0 * shift, anchor.y + perp.1 * shift);
        let a = PlanarPoint::new(center.x - dir.0 * half_length, center.y - dir.1 * half_length);
        let b = PlanarPoint::new(center.x + dir.0 * half_length, center.y + dir.1 * half_length);

        for (start, end) in planar::clip_segment(a, b, &clip_ring) {
            lanes.push(FlightLane {
                index: lanes.len(),
                start,
                end,
            });
        }
    }
    Ok(lanes)
}

/// Sampled points per lane, odd lanes flown backwards. Lanes too short to
/// hold two exposures are skipped but keep their index.
fn sample_lanes(lanes: &[FlightLane], interval: f64) -> Vec<Vec<(PlanarPoint, usize)>> {
    lanes
        .iter()
        .filter_map(|lane| {
            let mut points = lane.sample(interval);
            if points.is_empty() {
                return None;
            }
            if lane.index % 2 == 1 {
                points.reverse();
            }
            Some(points.into_iter().map(|p| (p, lane.index)).collect())
        })
        .collect()
}

/// Transit time of the last lane change in sampling order.
fn last_turn_time(sequences: &[Vec<(PlanarPoint, usize)>], speed: f64, buffer: f64) -> f64 {
    sequences
        .windows(2)
        .filter_map(|pair| {
            let (prev_end, _) = pair[0].last()?;
            let (next_start, _) = pair[1].first()?;
            Some(prev_end.distance(next_start) / speed + buffer)
        })
        .last()
        .unwrap_or(0.0)
}

fn reorder(
    sequences: &[Vec<(PlanarPoint, usize)>],
    order: CandidateOrder,
) -> Vec<Vec<(PlanarPoint, usize)>> {
    let mut out: Vec<Vec<(PlanarPoint, usize)>> = sequences.to_vec();
    if order.reverses_lanes() {
        out.reverse();
    }
    if order.reverses_points() {
        for lane in &mut out {
            lane.reverse();
        }
    }
    out
}

/// Flat re-timing: one turn before every lane but the first, one interval
/// between consecutive points inside a lane.
fn retime(
    sequences: &[Vec<(PlanarPoint, usize)>],
    interval_time: f64,
    turn_time: f64,
) -> Vec<ExposurePoint> {
    let mut clock = 0.0;
    let mut out = Vec::with_capacity(sequences.iter().map(Vec::len).sum());
    for (s, lane) in sequences.iter().enumerate() {
        for (p, &(position, lane_index)) in lane.iter().enumerate() {
            if p == 0 && s > 0 {
                clock += turn_time;
            } else if p > 0 {
                clock += interval_time;
            }
            out.push(ExposurePoint {
                position,
                time_s: clock,
                lane: lane_index,
            });
        }
    }
    out
}

fn select_closest(candidates: &[Candidate]) -> CandidateOrder {
    let mut best: Option<(CandidateOrder, f64)> = None;
    for c in candidates {
        let Some(d) = c.start_distance_m else {
            continue;
        };
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((c.order, d)),
        }
    }
    best.map(|(order, _)| order).unwrap_or(CandidateOrder::Forward)
}
