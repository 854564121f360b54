//! Ground-control server: fleet state, receive loops, maneuvers and the
//! operator console.

pub mod config;
pub mod console;
pub mod loops;
pub mod maneuvers;
pub mod signal;
pub mod state;

pub use config::Config;
pub use maneuvers::{Coordinator, ManeuverConfig, ManeuverError, MissionReport};
pub use signal::Signal;
pub use state::{FleetState, VehicleState};
