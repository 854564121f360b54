//! GCS CLI - Command line tools for the ground-control stack.
//!
//! Binaries:
//! - plan_coverage: coverage plan from a JSON request
//! - send_command: one command to one or more vehicles
//! - search_fleet: discovery probe
//! - sim_vehicle: simulated vehicle speaking the fleet protocol

pub mod sim;

pub use sim::{SimEvent, SimVehicle};
