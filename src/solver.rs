//! MILP backend and the end-to-end planning pipeline.

use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable, constraint,
    microlp, variable,
};
use tracing::{debug, info};

use crate::error::{PlannerError, Result};
use crate::instance::Instance;
use crate::model::{Assignment, Formulation, FormulationOptions, Sense, VarId, formulate};
use crate::report::RoutePlan;
use crate::traits::AssignmentSolver;

/// Solves formulations with `good_lp` on the pure-Rust `microlp` backend.
#[derive(Debug, Clone, Default)]
pub struct GoodLpSolver;

impl AssignmentSolver for GoodLpSolver {
    fn solve(&self, formulation: &Formulation) -> Result<Assignment> {
        let mut problem = ProblemVariables::new();
        let vars: Vec<Variable> = (0..formulation.index.len())
            .map(|_| problem.add(variable().binary()))
            .collect();

        let mut model = problem
            .minimise(linear(&vars, &formulation.objective))
            .using(microlp);
        for row in &formulation.constraints {
            let lhs = linear(&vars, &row.terms);
            let built = match row.sense {
                Sense::Eq => constraint::eq(lhs, row.rhs),
                Sense::Leq => constraint::leq(lhs, row.rhs),
            };
            model.add_constraint(built);
        }

        let solution = model.solve().map_err(|err| match err {
            ResolutionError::Infeasible => {
                PlannerError::infeasible("no combination of legs satisfies every constraint")
            }
            ResolutionError::Unbounded => PlannerError::Unbounded,
            other => PlannerError::Solver(other.to_string()),
        })?;

        Ok(Assignment::new(
            vars.iter().map(|&var| solution.value(var) > 0.5).collect(),
        ))
    }
}

fn linear(vars: &[Variable], terms: &[(VarId, f64)]) -> Expression {
    let mut expr = Expression::with_capacity(terms.len());
    for &(id, coef) in terms {
        expr.add_mul(coef, vars[id.0]);
    }
    expr
}

/// Formulate, solve and report routes for `instance`.
///
/// An instance without collection points needs no vehicles and never reaches
/// the solver. The solver's assignment is checked against every constraint
/// before it is reported.
pub fn plan<S: AssignmentSolver>(
    instance: &Instance,
    options: &FormulationOptions,
    solver: &S,
) -> Result<RoutePlan> {
    if instance.points.is_empty() {
        return Ok(RoutePlan::default());
    }

    let formulation = formulate(instance, options)?;
    let assignment = solver.solve(&formulation)?;

    if assignment.len() != formulation.index.len() {
        return Err(PlannerError::Solver(format!(
            "expected {} values, got {}",
            formulation.index.len(),
            assignment.len()
        )));
    }
    let violations = formulation.violations(&assignment);
    if let Some(first) = violations.first() {
        return Err(PlannerError::Solver(format!(
            "assignment breaks {} constraints, first {}",
            violations.len(),
            first.name
        )));
    }

    let routes = RoutePlan::from_assignment(instance, &formulation.index, &assignment);
    for route in &routes.routes {
        debug!(
            vehicle = route.vehicle,
            duration = route.duration_minutes,
            load = route.load_kg,
            "Route"
        );
    }
    info!(
        fleet_size = routes.fleet_size,
        objective = formulation.objective_value(&assignment),
        "Solved"
    );
    Ok(routes)
}
