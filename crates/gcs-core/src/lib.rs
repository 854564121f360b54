pub mod coverage;
pub mod models;
pub mod planar;
pub mod projection;
pub mod rules;

pub use coverage::{
    plan_coverage, Candidate, CandidateOrder, CoveragePlan, CoverageRequest, ExposurePoint,
    FlightLane, Footprint, PlanError, SurveyArea,
};
pub use models::{
    Attitude, Command, CommandType, GeoPoint, GroundStation, MissionPath, PlanWaypoint,
    Telemetry, Vec3, VerticalAxis, PROTOCOL_VERSION,
};
pub use planar::{OrientedRect, PlanarPoint};
pub use projection::ProjectedFrame;
pub use rules::{CommandError, CommandLimits};
