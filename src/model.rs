//! Model formulator.
//!
//! Turns an [`Instance`] into a solver-agnostic 0/1 program: a
//! [`VariableIndex`] owning every decision variable, a linear objective, and
//! named linear constraints. Backends translate a [`Formulation`] into their
//! own modelling API; see [`crate::solver`].
//!
//! Variables (all binary):
//! - `x_i`: Type-1 leg `i` selected
//! - `y_j`: Type-2 leg `j` selected
//! - `v_{k,i}`: Type-1 leg `i` assigned to vehicle `k`
//! - `w_{k,j}`: Type-2 leg `j` assigned to vehicle `k`
//!
//! The objective counts assigned Type-1 legs, i.e. the fleet size.

use std::fmt;

use tracing::{debug, info};

use crate::error::{PlannerError, Result};
use crate::instance::Instance;

/// Slack used when checking an assignment against a constraint.
const EPSILON: f64 = 1e-6;

/// Position of a variable inside a [`Formulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

/// What a variable decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionVar {
    Type1Selected { leg: usize },
    Type2Selected { leg: usize },
    Type1Assigned { vehicle: usize, leg: usize },
    Type2Assigned { vehicle: usize, leg: usize },
}

impl fmt::Display for DecisionVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type1Selected { leg } => write!(f, "x[{}]", leg),
            Self::Type2Selected { leg } => write!(f, "y[{}]", leg),
            Self::Type1Assigned { vehicle, leg } => write!(f, "v[{},{}]", vehicle, leg),
            Self::Type2Assigned { vehicle, leg } => write!(f, "w[{},{}]", vehicle, leg),
        }
    }
}

/// Explicit (vehicle, leg) → variable maps, grouped by vehicle.
///
/// Assignment variables are sparse. With leg ordering on, vehicle `k` only
/// gets `v_{k,i}` for `i >= k`. A `w_{k,j}` exists only when vehicle `k` has
/// some Type-1 leg ending where leg `j` starts.
#[derive(Debug, Clone)]
pub struct VariableIndex {
    vars: Vec<DecisionVar>,
    x: Vec<VarId>,
    y: Vec<VarId>,
    v: Vec<Vec<(usize, VarId)>>,
    w: Vec<Vec<(usize, VarId)>>,
}

impl VariableIndex {
    fn new(instance: &Instance, vehicles: usize, order_legs: bool) -> Self {
        let type1_legs = instance.type1_legs.len();
        let type2_legs = instance.type2_legs.len();
        let feeders = feeders_by_type2_leg(instance);

        let mut vars = Vec::with_capacity((1 + vehicles) * (type1_legs + type2_legs));
        let mut add = |var: DecisionVar| {
            vars.push(var);
            VarId(vars.len() - 1)
        };

        let x = (0..type1_legs)
            .map(|leg| add(DecisionVar::Type1Selected { leg }))
            .collect();
        let y = (0..type2_legs)
            .map(|leg| add(DecisionVar::Type2Selected { leg }))
            .collect();

        let mut v = Vec::with_capacity(vehicles);
        let mut w = Vec::with_capacity(vehicles);
        for vehicle in 0..vehicles {
            let first_leg = if order_legs { vehicle } else { 0 };
            let row: Vec<(usize, VarId)> = (first_leg..type1_legs)
                .map(|leg| (leg, add(DecisionVar::Type1Assigned { vehicle, leg })))
                .collect();
            let fed: Vec<(usize, VarId)> = feeders
                .iter()
                .enumerate()
                .filter(|(_, legs)| legs.iter().any(|&i| i >= first_leg))
                .map(|(leg, _)| (leg, add(DecisionVar::Type2Assigned { vehicle, leg })))
                .collect();
            v.push(row);
            w.push(fed);
        }

        Self { vars, x, y, v, w }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn vehicles(&self) -> usize {
        self.v.len()
    }

    pub fn decision(&self, id: VarId) -> DecisionVar {
        self.vars[id.0]
    }

    pub fn x(&self, leg: usize) -> VarId {
        self.x[leg]
    }

    pub fn y(&self, leg: usize) -> VarId {
        self.y[leg]
    }

    /// `v_{k,i}`, if vehicle `k` may take Type-1 leg `i`.
    pub fn v(&self, vehicle: usize, leg: usize) -> Option<VarId> {
        lookup(self.v.get(vehicle)?, leg)
    }

    /// `w_{k,j}`, if vehicle `k` may take Type-2 leg `j`.
    pub fn w(&self, vehicle: usize, leg: usize) -> Option<VarId> {
        lookup(self.w.get(vehicle)?, leg)
    }

    /// `(i, v_{k,i})` pairs of vehicle `k`, ascending by leg.
    pub fn type1_of_vehicle(&self, vehicle: usize) -> &[(usize, VarId)] {
        &self.v[vehicle]
    }

    /// `(j, w_{k,j})` pairs of vehicle `k`, ascending by leg.
    pub fn type2_of_vehicle(&self, vehicle: usize) -> &[(usize, VarId)] {
        &self.w[vehicle]
    }
}

fn lookup(row: &[(usize, VarId)], leg: usize) -> Option<VarId> {
    row.binary_search_by_key(&leg, |&(i, _)| i)
        .ok()
        .map(|pos| row[pos].1)
}

/// Type-1 legs ending at the station each Type-2 leg departs from.
fn feeders_by_type2_leg(instance: &Instance) -> Vec<Vec<usize>> {
    instance
        .type2_legs
        .iter()
        .map(|second| {
            instance
                .type1_legs
                .iter()
                .enumerate()
                .filter(|(_, first)| Some(first.terminal) == second.start_station())
                .map(|(i, _)| i)
                .collect()
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintFamily {
    Coverage,
    SingleType1,
    SingleType2,
    TieType1,
    TieType2,
    LegConnectivity,
    RouteDuration,
    VehicleOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Eq,
    Leq,
}

#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub family: ConstraintFamily,
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn lhs(&self, assignment: &Assignment) -> f64 {
        self.terms
            .iter()
            .filter(|(var, _)| assignment.value(*var))
            .map(|(_, coef)| coef)
            .sum()
    }

    pub fn is_satisfied_by(&self, assignment: &Assignment) -> bool {
        let lhs = self.lhs(assignment);
        match self.sense {
            Sense::Eq => (lhs - self.rhs).abs() <= EPSILON,
            Sense::Leq => lhs <= self.rhs + EPSILON,
        }
    }
}

/// A 0/1 value for every variable of a formulation, indexed by [`VarId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    values: Vec<bool>,
}

impl Assignment {
    pub fn new(values: Vec<bool>) -> Self {
        Self { values }
    }

    /// All-zero assignment for `len` variables.
    pub fn zeros(len: usize) -> Self {
        Self {
            values: vec![false; len],
        }
    }

    pub fn set(&mut self, var: VarId, value: bool) {
        self.values[var.0] = value;
    }

    pub fn value(&self, var: VarId) -> bool {
        self.values.get(var.0).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FormulationOptions {
    /// Fleet size upper bound `n_K`. Defaults to one vehicle per collection point.
    pub vehicles: Option<usize>,
    /// Break vehicle symmetry: vehicle `k` may only take Type-1 legs
    /// `i >= k`, and is used only if vehicle `k - 1` is.
    pub order_vehicles: bool,
}

impl Default for FormulationOptions {
    fn default() -> Self {
        Self {
            vehicles: None,
            order_vehicles: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Formulation {
    pub index: VariableIndex,
    /// Minimized.
    pub objective: Vec<(VarId, f64)>,
    pub constraints: Vec<LinearConstraint>,
}

impl Formulation {
    pub fn objective_value(&self, assignment: &Assignment) -> f64 {
        self.objective
            .iter()
            .filter(|(var, _)| assignment.value(*var))
            .map(|(_, coef)| coef)
            .sum()
    }

    /// Constraints that `assignment` breaks.
    pub fn violations<'a>(&'a self, assignment: &Assignment) -> Vec<&'a LinearConstraint> {
        self.constraints
            .iter()
            .filter(|constraint| !constraint.is_satisfied_by(assignment))
            .collect()
    }

    pub fn constraints_of(
        &self,
        family: ConstraintFamily,
    ) -> impl Iterator<Item = &LinearConstraint> {
        self.constraints.iter().filter(move |c| c.family == family)
    }
}

/// Collects constraints, resolving those without variables on the spot.
struct ConstraintSink {
    constraints: Vec<LinearConstraint>,
}

impl ConstraintSink {
    fn push(
        &mut self,
        family: ConstraintFamily,
        name: String,
        terms: Vec<(VarId, f64)>,
        sense: Sense,
        rhs: f64,
    ) -> Result<()> {
        let constraint = LinearConstraint {
            family,
            name,
            terms,
            sense,
            rhs,
        };
        if constraint.terms.is_empty() {
            if constraint.is_satisfied_by(&Assignment::zeros(0)) {
                return Ok(());
            }
            return Err(PlannerError::infeasible(format!(
                "constraint {} has no variables and cannot hold",
                constraint.name
            )));
        }
        self.constraints.push(constraint);
        Ok(())
    }
}

/// Build the full model for `instance`.
///
/// Fails with [`PlannerError::Infeasible`] when a constraint is already
/// unsatisfiable without looking at any variable, such as a collection point
/// no candidate leg covers.
pub fn formulate(instance: &Instance, options: &FormulationOptions) -> Result<Formulation> {
    let n_i = instance.type1_legs.len();
    let n_j = instance.type2_legs.len();
    let n_k = options.vehicles.unwrap_or(instance.points.len());
    let max_route = instance.limits.max_route_minutes;

    let index = VariableIndex::new(instance, n_k, options.order_vehicles);
    let mut sink = ConstraintSink {
        constraints: Vec::new(),
    };

    // Coverage: every point is serviced by exactly one selected leg.
    for c in 0..instance.points.len() {
        let terms = instance
            .type1_covering(c)
            .iter()
            .map(|&i| (index.x(i), 1.0))
            .chain(instance.type2_covering(c).iter().map(|&j| (index.y(j), 1.0)))
            .collect();
        sink.push(
            ConstraintFamily::Coverage,
            format!("c_cover[{}]", c),
            terms,
            Sense::Eq,
            1.0,
        )?;
    }

    for k in 0..n_k {
        let terms = index.type1_of_vehicle(k).iter().map(|&(_, var)| (var, 1.0)).collect();
        sink.push(
            ConstraintFamily::SingleType1,
            format!("c_leg_t1[{}]", k),
            terms,
            Sense::Leq,
            1.0,
        )?;

        let terms = index.type2_of_vehicle(k).iter().map(|&(_, var)| (var, 1.0)).collect();
        sink.push(
            ConstraintFamily::SingleType2,
            format!("c_leg_t2[{}]", k),
            terms,
            Sense::Leq,
            1.0,
        )?;
    }

    // sum_k v_{k,i} - x_i = 0
    for i in 0..n_i {
        let terms = (0..n_k)
            .filter_map(|k| index.v(k, i))
            .map(|var| (var, 1.0))
            .chain(std::iter::once((index.x(i), -1.0)))
            .collect();
        sink.push(
            ConstraintFamily::TieType1,
            format!("c_tie_v_x[{}]", i),
            terms,
            Sense::Eq,
            0.0,
        )?;
    }
    for j in 0..n_j {
        let terms = (0..n_k)
            .filter_map(|k| index.w(k, j))
            .map(|var| (var, 1.0))
            .chain(std::iter::once((index.y(j), -1.0)))
            .collect();
        sink.push(
            ConstraintFamily::TieType2,
            format!("c_tie_w_y[{}]", j),
            terms,
            Sense::Eq,
            0.0,
        )?;
    }

    // w_{k,j} - sum_{i: t(i) = s(j)} v_{k,i} <= 0
    for k in 0..n_k {
        for &(j, second) in index.type2_of_vehicle(k) {
            let start = instance.type2_legs[j].start_station();
            let terms = std::iter::once((second, 1.0))
                .chain(
                    index
                        .type1_of_vehicle(k)
                        .iter()
                        .filter(|&&(i, _)| Some(instance.type1_legs[i].terminal) == start)
                        .map(|&(_, first)| (first, -1.0)),
                )
                .collect();
            sink.push(
                ConstraintFamily::LegConnectivity,
                format!("c_tie_legs[{},{}]", k, j),
                terms,
                Sense::Leq,
                0.0,
            )?;
        }
    }

    for k in 0..n_k {
        let terms = index
            .type1_of_vehicle(k)
            .iter()
            .map(|&(i, var)| (var, instance.type1_legs[i].duration_minutes))
            .chain(
                index
                    .type2_of_vehicle(k)
                    .iter()
                    .map(|&(j, var)| (var, instance.type2_legs[j].duration_minutes)),
            )
            .collect();
        sink.push(
            ConstraintFamily::RouteDuration,
            format!("c_route_dur[{}]", k),
            terms,
            Sense::Leq,
            max_route,
        )?;
    }

    if options.order_vehicles {
        // sum_i v_{k,i} - sum_i v_{k-1,i} <= 0
        for k in 1..n_k {
            let terms = index
                .type1_of_vehicle(k)
                .iter()
                .map(|&(_, var)| (var, 1.0))
                .chain(index.type1_of_vehicle(k - 1).iter().map(|&(_, var)| (var, -1.0)))
                .collect();
            sink.push(
                ConstraintFamily::VehicleOrder,
                format!("c_order[{}]", k),
                terms,
                Sense::Leq,
                0.0,
            )?;
        }
    }

    let objective = (0..n_k)
        .flat_map(|k| index.type1_of_vehicle(k).iter().map(|&(_, var)| (var, 1.0)))
        .collect();

    let formulation = Formulation {
        index,
        objective,
        constraints: sink.constraints,
    };
    for constraint in &formulation.constraints {
        debug!(name = %constraint.name, terms = constraint.terms.len(), "Constraint");
    }
    info!(
        variables = formulation.index.len(),
        constraints = formulation.constraints.len(),
        vehicles = n_k,
        "Formulated model"
    );
    Ok(formulation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::haversine::GeoLocation;
    use crate::instance::{CollectionPoint, Leg, LegOrigin, RouteLimits, TransferStation};

    fn point() -> CollectionPoint {
        CollectionPoint {
            location: GeoLocation::new(0.05, 0.05),
            demand_kg: 150.0,
        }
    }

    fn station(lat: f64) -> TransferStation {
        TransferStation {
            location: GeoLocation::new(lat, 0.1),
        }
    }

    /// Two points, two stations; legs 0/1 end at stations 0/1, Type-2 leg
    /// departs station 0.
    fn two_point_instance() -> Instance {
        Instance::new(
            GeoLocation::new(0.0, 0.0),
            vec![point(), point()],
            vec![station(0.0), station(0.2)],
            vec![
                Leg::new(LegOrigin::Depot, 0, vec![0], 100.0, 150.0),
                Leg::new(LegOrigin::Depot, 1, vec![0, 1], 200.0, 300.0),
            ],
            vec![Leg::new(LegOrigin::Station(0), 1, vec![1], 150.0, 150.0)],
            RouteLimits::default(),
        )
        .unwrap()
    }

    fn unordered() -> FormulationOptions {
        FormulationOptions {
            order_vehicles: false,
            ..FormulationOptions::default()
        }
    }

    #[test]
    fn test_variable_counts() {
        let formulation = formulate(&two_point_instance(), &FormulationOptions::default()).unwrap();
        // 2 x + 1 y + vehicle 0 (2 v + 1 w) + vehicle 1 (1 v, nothing feeds leg 0)
        assert_eq!(formulation.index.len(), 7);
        assert_eq!(formulation.index.vehicles(), 2);
        assert_eq!(formulation.objective.len(), 3);
    }

    #[test]
    fn test_unordered_variable_counts() {
        let formulation = formulate(&two_point_instance(), &unordered()).unwrap();
        // 2 x + 1 y + 2 vehicles * (2 v + 1 w)
        assert_eq!(formulation.index.len(), 9);
        assert_eq!(formulation.objective.len(), 4);
    }

    #[test]
    fn test_constraint_counts_by_family() {
        let formulation = formulate(&two_point_instance(), &FormulationOptions::default()).unwrap();
        let count = |family| formulation.constraints_of(family).count();
        assert_eq!(count(ConstraintFamily::Coverage), 2);
        assert_eq!(count(ConstraintFamily::SingleType1), 2);
        assert_eq!(count(ConstraintFamily::SingleType2), 1);
        assert_eq!(count(ConstraintFamily::TieType1), 2);
        assert_eq!(count(ConstraintFamily::TieType2), 1);
        assert_eq!(count(ConstraintFamily::LegConnectivity), 1);
        assert_eq!(count(ConstraintFamily::RouteDuration), 2);
        assert_eq!(count(ConstraintFamily::VehicleOrder), 1);
    }

    #[test]
    fn test_later_vehicles_skip_lower_legs() {
        let ordered = formulate(&two_point_instance(), &FormulationOptions::default()).unwrap();
        assert_eq!(ordered.index.v(1, 0), None);
        assert_eq!(ordered.index.w(1, 0), None);
        assert!(ordered.index.v(1, 1).is_some());

        let unordered = formulate(&two_point_instance(), &unordered()).unwrap();
        assert!(unordered.index.v(1, 0).is_some());
        assert!(unordered.index.w(1, 0).is_some());
    }

    #[test]
    fn test_type1_tie_spans_only_existing_vehicles() {
        let formulation = formulate(&two_point_instance(), &FormulationOptions::default()).unwrap();
        let index = &formulation.index;
        let tie = formulation
            .constraints_of(ConstraintFamily::TieType1)
            .next()
            .unwrap();
        assert_eq!(tie.name, "c_tie_v_x[0]");
        assert_eq!(tie.terms, vec![(index.v(0, 0).unwrap(), 1.0), (index.x(0), -1.0)]);
    }

    #[test]
    fn test_connectivity_only_uses_matching_feeders() {
        let formulation = formulate(&two_point_instance(), &FormulationOptions::default()).unwrap();
        let index = &formulation.index;
        let constraint = formulation
            .constraints_of(ConstraintFamily::LegConnectivity)
            .next()
            .unwrap();
        assert_eq!(
            constraint.terms,
            vec![(index.w(0, 0).unwrap(), 1.0), (index.v(0, 0).unwrap(), -1.0)]
        );
    }

    #[test]
    fn test_chained_route_satisfies_model() {
        let formulation = formulate(&two_point_instance(), &FormulationOptions::default()).unwrap();
        let index = &formulation.index;
        let mut assignment = Assignment::zeros(index.len());
        assignment.set(index.x(0), true);
        assignment.set(index.y(0), true);
        assignment.set(index.v(0, 0).unwrap(), true);
        assignment.set(index.w(0, 0).unwrap(), true);
        assert!(formulation.violations(&assignment).is_empty());
        assert_eq!(formulation.objective_value(&assignment), 1.0);
    }

    #[test]
    fn test_double_coverage_is_violation() {
        let formulation = formulate(&two_point_instance(), &FormulationOptions::default()).unwrap();
        let index = &formulation.index;
        let mut assignment = Assignment::zeros(index.len());
        assignment.set(index.x(0), true);
        assignment.set(index.x(1), true);
        assignment.set(index.v(0, 0).unwrap(), true);
        assignment.set(index.v(1, 1).unwrap(), true);
        let families: Vec<_> = formulation
            .violations(&assignment)
            .iter()
            .map(|c| c.family)
            .collect();
        assert_eq!(families, vec![ConstraintFamily::Coverage]);
    }

    #[test]
    fn test_unfed_type2_leg_is_violation() {
        let formulation = formulate(&two_point_instance(), &FormulationOptions::default()).unwrap();
        let index = &formulation.index;
        let mut assignment = Assignment::zeros(index.len());
        // Type-2 leg departs station 0 but the vehicle's Type-1 leg ends at station 1.
        assignment.set(index.x(1), true);
        assignment.set(index.y(0), true);
        assignment.set(index.v(0, 1).unwrap(), true);
        assignment.set(index.w(0, 0).unwrap(), true);
        let families: Vec<_> = formulation
            .violations(&assignment)
            .iter()
            .map(|c| c.family)
            .collect();
        assert!(families.contains(&ConstraintFamily::LegConnectivity));
        assert!(!families.contains(&ConstraintFamily::RouteDuration));
    }

    #[test]
    fn test_skipping_vehicle_zero_breaks_ordering() {
        let formulation = formulate(&two_point_instance(), &FormulationOptions::default()).unwrap();
        let index = &formulation.index;
        let mut assignment = Assignment::zeros(index.len());
        assignment.set(index.x(1), true);
        assignment.set(index.v(1, 1).unwrap(), true);
        let families: Vec<_> = formulation
            .violations(&assignment)
            .iter()
            .map(|c| c.family)
            .collect();
        assert_eq!(families, vec![ConstraintFamily::VehicleOrder]);
    }

    #[test]
    fn test_ordering_can_be_disabled() {
        let formulation = formulate(&two_point_instance(), &unordered()).unwrap();
        assert_eq!(formulation.constraints_of(ConstraintFamily::VehicleOrder).count(), 0);
    }

    #[test]
    fn test_uncovered_point_is_infeasible() {
        let instance = Instance::new(
            GeoLocation::new(0.0, 0.0),
            vec![point(), point()],
            vec![station(0.0)],
            vec![Leg::new(LegOrigin::Depot, 0, vec![0], 10.0, 150.0)],
            Vec::new(),
            RouteLimits::default(),
        )
        .unwrap();
        let result = formulate(&instance, &FormulationOptions::default());
        assert!(matches!(result, Err(PlannerError::Infeasible { .. })));
    }

    #[test]
    fn test_explicit_fleet_size() {
        let options = FormulationOptions {
            vehicles: Some(5),
            ..FormulationOptions::default()
        };
        let formulation = formulate(&two_point_instance(), &options).unwrap();
        let index = &formulation.index;
        assert_eq!(index.vehicles(), 5);
        // Only two Type-1 legs exist, so vehicles 2.. can never be used.
        assert!(index.type1_of_vehicle(4).is_empty());
        assert!(index.type2_of_vehicle(4).is_empty());
        assert_eq!(formulation.constraints_of(ConstraintFamily::SingleType1).count(), 2);
        assert_eq!(formulation.constraints_of(ConstraintFamily::VehicleOrder).count(), 2);
    }

    #[test]
    fn test_decision_names() {
        let formulation = formulate(&two_point_instance(), &FormulationOptions::default()).unwrap();
        let index = &formulation.index;
        assert_eq!(index.decision(index.x(1)).to_string(), "x[1]");
        assert_eq!(index.decision(index.v(1, 1).unwrap()).to_string(), "v[1,1]");
        assert_eq!(index.decision(index.w(0, 0).unwrap()).to_string(), "w[0,0]");
    }
}
