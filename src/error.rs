//! Error type shared by the planner components.

use thiserror::Error;

use crate::haversine::GeoLocation;

pub type Result<T> = std::result::Result<T, PlannerError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlannerError {
    /// The central angle's cosine left the tolerated band around [-1, 1].
    ///
    /// Unreachable for finite coordinates; seeing it means a bug upstream.
    #[error("error in distance for {from} and {to}: cosine argument {value}")]
    Computation {
        from: GeoLocation,
        to: GeoLocation,
        value: f64,
    },

    #[error("no solution found: {reason}")]
    Infeasible { reason: String },

    #[error("model is unbounded")]
    Unbounded,

    #[error("solver failure: {0}")]
    Solver(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A solved plan could not be rendered.
    #[error("cannot write routes: {0}")]
    Output(String),
}

impl PlannerError {
    pub fn infeasible(reason: impl Into<String>) -> Self {
        Self::Infeasible {
            reason: reason.into(),
        }
    }
}
