//! Problem instance: collection points, transfer stations and candidate legs.
//!
//! An [`Instance`] is built once, frozen, and then only read by the
//! formulator and the reporter. Construction derives the point → leg lookups
//! (`a_c`/`b_c`); the leg → point direction lives on each [`Leg`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::haversine::GeoLocation;

/// A place where waste is picked up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollectionPoint {
    pub location: GeoLocation,
    /// Quantity to collect, in kg.
    pub demand_kg: f64,
}

/// A place where a vehicle offloads and may continue with a Type-2 leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferStation {
    pub location: GeoLocation,
}

/// Where a leg begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegOrigin {
    Depot,
    Station(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegKind {
    /// Depot → transfer station. Always the first segment of a route.
    DepotToStation,
    /// Transfer station → transfer station. Optional second segment.
    StationToStation,
}

/// A candidate, indivisible route segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub origin: LegOrigin,
    /// Station index the leg ends at.
    pub terminal: usize,
    /// Collection point indices, in visiting order.
    pub points: Vec<usize>,
    pub duration_minutes: f64,
    pub load_kg: f64,
}

impl Leg {
    pub fn new(
        origin: LegOrigin,
        terminal: usize,
        points: Vec<usize>,
        duration_minutes: f64,
        load_kg: f64,
    ) -> Self {
        Self {
            origin,
            terminal,
            points,
            duration_minutes,
            load_kg,
        }
    }

    pub fn kind(&self) -> LegKind {
        match self.origin {
            LegOrigin::Depot => LegKind::DepotToStation,
            LegOrigin::Station(_) => LegKind::StationToStation,
        }
    }

    /// Station a Type-2 leg departs from. `None` for Type-1 legs.
    pub fn start_station(&self) -> Option<usize> {
        match self.origin {
            LegOrigin::Depot => None,
            LegOrigin::Station(station) => Some(station),
        }
    }

    pub fn covers(&self, point: usize) -> bool {
        self.points.contains(&point)
    }
}

/// Per-vehicle limits shared by the whole homogeneous fleet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteLimits {
    /// Small-vehicle capacity `Q`, in kg.
    pub capacity_kg: f64,
    /// Maximum route duration `L`, in minutes.
    pub max_route_minutes: f64,
}

impl Default for RouteLimits {
    fn default() -> Self {
        Self {
            capacity_kg: 400.0,
            max_route_minutes: 480.0,
        }
    }
}

/// A leg that breaks the generator contract.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    OverCapacity { kind: LegKind, leg: usize, load_kg: f64 },
    OverDuration { kind: LegKind, leg: usize, duration_minutes: f64 },
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverCapacity { kind, leg, load_kg } => {
                write!(f, "{:?} leg {} carries {:.1} kg", kind, leg, load_kg)
            }
            Self::OverDuration {
                kind,
                leg,
                duration_minutes,
            } => write!(f, "{:?} leg {} takes {:.1} min", kind, leg, duration_minutes),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Instance {
    pub depot: GeoLocation,
    pub points: Vec<CollectionPoint>,
    pub stations: Vec<TransferStation>,
    pub type1_legs: Vec<Leg>,
    pub type2_legs: Vec<Leg>,
    pub limits: RouteLimits,
    #[serde(skip)]
    type1_by_point: Vec<Vec<usize>>,
    #[serde(skip)]
    type2_by_point: Vec<Vec<usize>>,
}

impl Instance {
    /// Freeze the parts into an instance and build the coverage lookups.
    ///
    /// Fails when a leg has the wrong origin for its list or references a
    /// point or station that does not exist.
    pub fn new(
        depot: GeoLocation,
        points: Vec<CollectionPoint>,
        stations: Vec<TransferStation>,
        type1_legs: Vec<Leg>,
        type2_legs: Vec<Leg>,
        limits: RouteLimits,
    ) -> Result<Self> {
        let mut type1_by_point = vec![Vec::new(); points.len()];
        let mut type2_by_point = vec![Vec::new(); points.len()];

        for (legs, expected, by_point) in [
            (&type1_legs, LegKind::DepotToStation, &mut type1_by_point),
            (&type2_legs, LegKind::StationToStation, &mut type2_by_point),
        ] {
            for (index, leg) in legs.iter().enumerate() {
                if leg.kind() != expected {
                    return Err(PlannerError::InvalidConfig(format!(
                        "leg {} listed as {:?} but starts at {:?}",
                        index, expected, leg.origin
                    )));
                }
                let known_station = |s: usize| s < stations.len();
                if !known_station(leg.terminal) || !leg.start_station().is_none_or(known_station) {
                    return Err(PlannerError::InvalidConfig(format!(
                        "{:?} leg {} references an unknown transfer station",
                        expected, index
                    )));
                }
                for &point in &leg.points {
                    let Some(slot) = by_point.get_mut(point) else {
                        return Err(PlannerError::InvalidConfig(format!(
                            "{:?} leg {} references unknown collection point {}",
                            expected, index, point
                        )));
                    };
                    if !slot.contains(&index) {
                        slot.push(index);
                    }
                }
            }
        }

        Ok(Self {
            depot,
            points,
            stations,
            type1_legs,
            type2_legs,
            limits,
            type1_by_point,
            type2_by_point,
        })
    }

    /// Type-1 legs covering collection point `point` (`a_c`).
    pub fn type1_covering(&self, point: usize) -> &[usize] {
        &self.type1_by_point[point]
    }

    /// Type-2 legs covering collection point `point` (`b_c`).
    pub fn type2_covering(&self, point: usize) -> &[usize] {
        &self.type2_by_point[point]
    }

    /// Points no candidate leg of either type covers.
    pub fn uncovered_points(&self) -> Vec<usize> {
        (0..self.points.len())
            .filter(|&c| self.type1_by_point[c].is_empty() && self.type2_by_point[c].is_empty())
            .collect()
    }

    /// Legs whose load exceeds `Q` or whose duration exceeds `L`.
    ///
    /// Unknown points and stations never get this far; [`Instance::new`]
    /// rejects them.
    pub fn contract_violations(&self) -> Vec<ContractViolation> {
        let mut violations = Vec::new();
        for (kind, legs) in [
            (LegKind::DepotToStation, &self.type1_legs),
            (LegKind::StationToStation, &self.type2_legs),
        ] {
            for (leg_index, leg) in legs.iter().enumerate() {
                if leg.load_kg > self.limits.capacity_kg {
                    violations.push(ContractViolation::OverCapacity {
                        kind,
                        leg: leg_index,
                        load_kg: leg.load_kg,
                    });
                }
                if leg.duration_minutes > self.limits.max_route_minutes {
                    violations.push(ContractViolation::OverDuration {
                        kind,
                        leg: leg_index,
                        duration_minutes: leg.duration_minutes,
                    });
                }
            }
        }
        violations
    }
}
