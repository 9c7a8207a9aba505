//! Route reporter.
//!
//! Reads each vehicle's own assignment variables and turns them into a
//! `(type-1 leg, optional type-2 leg)` route. Vehicles without a Type-1 leg
//! are unused and left out.

use std::fmt;

use serde::Serialize;

use crate::instance::Instance;
use crate::model::{Assignment, VarId, VariableIndex};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRoute {
    pub vehicle: usize,
    pub type1_leg: usize,
    pub type2_leg: Option<usize>,
    pub duration_minutes: f64,
    pub load_kg: f64,
    /// Collection points in service order across both legs.
    pub points: Vec<usize>,
}

impl fmt::Display for VehicleRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type2_leg {
            Some(second) => {
                write!(f, "vehicle {} route {}, {}", self.vehicle, self.type1_leg, second)
            }
            None => write!(f, "vehicle {} route {}, none", self.vehicle, self.type1_leg),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutePlan {
    pub routes: Vec<VehicleRoute>,
    pub fleet_size: usize,
}

impl RoutePlan {
    pub fn from_assignment(
        instance: &Instance,
        index: &VariableIndex,
        assignment: &Assignment,
    ) -> Self {
        let routes: Vec<VehicleRoute> = (0..index.vehicles())
            .filter_map(|vehicle| {
                let type1_leg = first_set(index.type1_of_vehicle(vehicle), assignment)?;
                let type2_leg = first_set(index.type2_of_vehicle(vehicle), assignment);

                let first = &instance.type1_legs[type1_leg];
                let second = type2_leg.map(|j| &instance.type2_legs[j]);
                let legs = std::iter::once(first).chain(second);

                let mut route = VehicleRoute {
                    vehicle,
                    type1_leg,
                    type2_leg,
                    duration_minutes: 0.0,
                    load_kg: 0.0,
                    points: Vec::new(),
                };
                for leg in legs {
                    route.duration_minutes += leg.duration_minutes;
                    route.load_kg += leg.load_kg;
                    route.points.extend_from_slice(&leg.points);
                }
                Some(route)
            })
            .collect();

        Self {
            fleet_size: routes.len(),
            routes,
        }
    }

    pub fn route_of(&self, vehicle: usize) -> Option<&VehicleRoute> {
        self.routes.iter().find(|route| route.vehicle == vehicle)
    }

    /// How many routes visit each collection point.
    pub fn visits_per_point(&self, point_count: usize) -> Vec<usize> {
        let mut visits = vec![0; point_count];
        for route in &self.routes {
            for &point in &route.points {
                visits[point] += 1;
            }
        }
        visits
    }
}

impl fmt::Display for RoutePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for route in &self.routes {
            writeln!(f, "{}", route)?;
        }
        Ok(())
    }
}

fn first_set(vars: &[(usize, VarId)], assignment: &Assignment) -> Option<usize> {
    vars.iter()
        .find(|&&(_, var)| assignment.value(var))
        .map(|&(leg, _)| leg)
}
