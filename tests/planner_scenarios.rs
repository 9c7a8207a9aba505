//! End-to-end planner scenarios.
//!
//! Hand-built instances pin down exact outcomes; generated instances check
//! that any solution honours coverage, per-vehicle leg counts and the route
//! duration cap.

use transfer_routing::PlannerError;
use transfer_routing::generator::{InstanceConfig, generate};
use transfer_routing::haversine::GeoLocation;
use transfer_routing::instance::{
    CollectionPoint, Instance, Leg, LegOrigin, RouteLimits, TransferStation,
};
use transfer_routing::model::{Assignment, FormulationOptions, VarId, formulate};
use transfer_routing::solver::{GoodLpSolver, plan};
use transfer_routing::traits::AssignmentSolver;

// ============================================================================
// Test Fixtures
// ============================================================================

fn collection_point(lat: f64, lon: f64) -> CollectionPoint {
    CollectionPoint {
        location: GeoLocation::new(lat, lon),
        demand_kg: 200.0,
    }
}

fn transfer_station(lat: f64, lon: f64) -> TransferStation {
    TransferStation {
        location: GeoLocation::new(lat, lon),
    }
}

fn small_config(seed: u64) -> InstanceConfig {
    InstanceConfig {
        collection_points: 6,
        transfer_stations: 2,
        type1_legs: 4,
        type2_legs: 4,
        seed: Some(seed),
        ..InstanceConfig::default()
    }
}

fn assigned(vars: &[(usize, VarId)], assignment: &Assignment) -> usize {
    vars.iter().filter(|&&(_, var)| assignment.value(var)).count()
}

// ============================================================================
// Hand-built scenarios
// ============================================================================

#[test]
fn test_single_point_single_leg() {
    let instance = Instance::new(
        GeoLocation::new(0.1, 0.1),
        vec![collection_point(0.05, 0.05)],
        vec![transfer_station(0.0, 0.0)],
        vec![Leg::new(LegOrigin::Depot, 0, vec![0], 25.0, 200.0)],
        Vec::new(),
        RouteLimits::default(),
    )
    .unwrap();

    let routes = plan(&instance, &FormulationOptions::default(), &GoodLpSolver).unwrap();

    assert_eq!(routes.fleet_size, 1);
    let route = &routes.routes[0];
    assert_eq!(route.vehicle, 0);
    assert_eq!(route.type1_leg, 0);
    assert_eq!(route.type2_leg, None);
    assert_eq!(routes.to_string(), "vehicle 0 route 0, none\n");
}

#[test]
fn test_all_legs_too_long_is_infeasible() {
    let instance = Instance::new(
        GeoLocation::new(0.1, 0.1),
        vec![collection_point(0.05, 0.05)],
        vec![transfer_station(0.0, 0.0)],
        vec![Leg::new(LegOrigin::Depot, 0, vec![0], 500.0, 200.0)],
        vec![Leg::new(LegOrigin::Station(0), 0, vec![0], 500.0, 200.0)],
        RouteLimits::default(),
    )
    .unwrap();

    let result = plan(&instance, &FormulationOptions::default(), &GoodLpSolver);
    assert!(matches!(result, Err(PlannerError::Infeasible { .. })), "{:?}", result);
}

#[test]
fn test_point_without_legs_is_infeasible() {
    let instance = Instance::new(
        GeoLocation::new(0.1, 0.1),
        vec![collection_point(0.05, 0.05), collection_point(0.15, 0.15)],
        vec![transfer_station(0.0, 0.0)],
        vec![Leg::new(LegOrigin::Depot, 0, vec![0], 30.0, 200.0)],
        Vec::new(),
        RouteLimits::default(),
    )
    .unwrap();

    let result = plan(&instance, &FormulationOptions::default(), &GoodLpSolver);
    assert!(matches!(result, Err(PlannerError::Infeasible { .. })));
}

#[test]
fn test_type2_leg_needs_matching_station() {
    // The only Type-2 leg departs station 1, but every Type-1 leg ends at
    // station 0, so point 1 has to be served by its own Type-1 leg.
    let instance = Instance::new(
        GeoLocation::new(0.1, 0.1),
        vec![collection_point(0.05, 0.05), collection_point(0.15, 0.15)],
        vec![transfer_station(0.0, 0.0), transfer_station(0.2, 0.2)],
        vec![
            Leg::new(LegOrigin::Depot, 0, vec![0], 30.0, 200.0),
            Leg::new(LegOrigin::Depot, 0, vec![1], 30.0, 200.0),
        ],
        vec![Leg::new(LegOrigin::Station(1), 0, vec![1], 10.0, 200.0)],
        RouteLimits::default(),
    )
    .unwrap();

    let routes = plan(&instance, &FormulationOptions::default(), &GoodLpSolver).unwrap();
    assert_eq!(routes.fleet_size, 2);
    assert!(routes.routes.iter().all(|route| route.type2_leg.is_none()));
}

#[test]
fn test_ordering_does_not_change_fleet_size() {
    let instance = generate(&small_config(11)).unwrap();
    let ordered = plan(&instance, &FormulationOptions::default(), &GoodLpSolver).unwrap();
    let unordered = plan(
        &instance,
        &FormulationOptions {
            order_vehicles: false,
            ..FormulationOptions::default()
        },
        &GoodLpSolver,
    )
    .unwrap();
    assert_eq!(ordered.fleet_size, unordered.fleet_size);
}

// ============================================================================
// Generated instances
// ============================================================================

#[test]
fn test_generated_plans_cover_every_point_once() {
    for seed in 0..3 {
        let instance = generate(&small_config(seed)).unwrap();
        let routes = plan(&instance, &FormulationOptions::default(), &GoodLpSolver).unwrap();

        let visits = routes.visits_per_point(instance.points.len());
        assert!(visits.iter().all(|&count| count == 1), "seed {}: {:?}", seed, visits);
    }
}

#[test]
fn test_generated_plans_respect_duration_cap() {
    for seed in 0..3 {
        let instance = generate(&small_config(seed)).unwrap();
        let routes = plan(&instance, &FormulationOptions::default(), &GoodLpSolver).unwrap();

        for route in &routes.routes {
            assert!(
                route.duration_minutes <= instance.limits.max_route_minutes + 1e-6,
                "seed {}: vehicle {} takes {:.1} min",
                seed,
                route.vehicle,
                route.duration_minutes
            );
        }
    }
}

#[test]
fn test_each_vehicle_carries_at_most_one_leg_per_type() {
    let instance = generate(&small_config(4)).unwrap();
    let formulation = formulate(&instance, &FormulationOptions::default()).unwrap();
    let assignment = GoodLpSolver.solve(&formulation).unwrap();
    let index = &formulation.index;

    assert!(formulation.violations(&assignment).is_empty());
    for vehicle in 0..index.vehicles() {
        let type1 = assigned(index.type1_of_vehicle(vehicle), &assignment);
        let type2 = assigned(index.type2_of_vehicle(vehicle), &assignment);
        assert!(type1 <= 1, "vehicle {} has {} type-1 legs", vehicle, type1);
        assert!(type2 <= 1, "vehicle {} has {} type-2 legs", vehicle, type2);
        if type2 == 1 {
            assert_eq!(type1, 1, "vehicle {} has a type-2 leg without a type-1 leg", vehicle);
        }
    }
}

#[test]
fn test_generated_type2_routes_are_connected() {
    let instance = generate(&small_config(2)).unwrap();
    let routes = plan(&instance, &FormulationOptions::default(), &GoodLpSolver).unwrap();

    for route in &routes.routes {
        if let Some(second) = route.type2_leg {
            let first = &instance.type1_legs[route.type1_leg];
            assert_eq!(instance.type2_legs[second].start_station(), Some(first.terminal));
        }
    }
}

#[test]
fn test_default_sized_instances_solve_end_to_end() {
    for seed in 0..3 {
        let instance = generate(&InstanceConfig {
            seed: Some(seed),
            ..InstanceConfig::default()
        })
        .unwrap();
        let formulation = formulate(&instance, &FormulationOptions::default()).unwrap();
        let assignment = GoodLpSolver.solve(&formulation).unwrap();
        assert!(formulation.violations(&assignment).is_empty(), "seed {}", seed);

        let index = &formulation.index;
        for vehicle in 0..index.vehicles() {
            assert!(assigned(index.type1_of_vehicle(vehicle), &assignment) <= 1);
            assert!(assigned(index.type2_of_vehicle(vehicle), &assignment) <= 1);
        }

        let routes = plan(&instance, &FormulationOptions::default(), &GoodLpSolver).unwrap();
        let visits = routes.visits_per_point(instance.points.len());
        assert!(visits.iter().all(|&count| count == 1), "seed {}: {:?}", seed, visits);
        for route in &routes.routes {
            assert!(route.duration_minutes <= instance.limits.max_route_minutes + 1e-6);
            assert!(route.load_kg <= 2.0 * instance.limits.capacity_kg + 1e-6);
        }
        assert_eq!(routes.fleet_size as f64, formulation.objective_value(&assignment));
    }
}
