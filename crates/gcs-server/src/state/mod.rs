//! Shared fleet state.

mod store;

pub use store::{FleetState, VehicleState};
