//! Seams between the planner core and its collaborators.
//!
//! Travel times and MILP solving both sit behind traits so the generator and
//! the pipeline can be exercised with other backends.

use crate::error::Result;
use crate::haversine::GeoLocation;
use crate::model::{Assignment, Formulation};

/// Provides a travel-time matrix (minutes) for a set of locations.
///
/// The matrix is indexed by the provided location order.
pub trait TravelTimeProvider {
    fn matrix_for(&self, locations: &[GeoLocation]) -> Result<Vec<Vec<f64>>>;
}

/// An optimization engine that can decide a 0/1 formulation.
///
/// Implementations return an assignment that satisfies every constraint and
/// minimizes the objective, or report that none exists.
pub trait AssignmentSolver {
    fn solve(&self, formulation: &Formulation) -> Result<Assignment>;
}
