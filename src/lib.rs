//! transfer-routing core
//!
//! Waste collection routing with intermediate transfer stations: generate an
//! instance, formulate the leg-selection MILP, solve it, report routes.

pub mod error;
pub mod traits;
pub mod haversine;
pub mod instance;
pub mod generator;
pub mod model;
pub mod solver;
pub mod report;

pub use error::{PlannerError, Result};
