//! Vehicle simulation.

pub mod vehicle;

pub use vehicle::{Phase, SimEvent, SimVehicle, ARRIVAL_RADIUS};
