//! Command line entry point: generate an instance, solve it, print routes.

use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::error;
use tracing_subscriber::EnvFilter;

use transfer_routing::PlannerError;
use transfer_routing::generator::{InstanceConfig, generate};
use transfer_routing::haversine::{GeoBounds, GeoLocation};
use transfer_routing::model::FormulationOptions;
use transfer_routing::report::RoutePlan;
use transfer_routing::solver::{GoodLpSolver, plan};

const POINTS_ARG_NAME: &str = "points";
const STATIONS_ARG_NAME: &str = "stations";
const TYPE1_LEGS_ARG_NAME: &str = "type1-legs";
const TYPE2_LEGS_ARG_NAME: &str = "type2-legs";
const VEHICLES_ARG_NAME: &str = "vehicles";
const CAPACITY_ARG_NAME: &str = "capacity";
const MAX_DURATION_ARG_NAME: &str = "max-duration";
const SPEED_ARG_NAME: &str = "speed";
const MIN_DEMAND_ARG_NAME: &str = "min-demand";
const MAX_DEMAND_ARG_NAME: &str = "max-demand";
const BOUNDS_ARG_NAME: &str = "bounds";
const DEPOT_ARG_NAME: &str = "depot";
const SEED_ARG_NAME: &str = "seed";
const JSON_ARG_NAME: &str = "json";
const NO_ORDERING_ARG_NAME: &str = "no-vehicle-ordering";

fn get_command() -> Command {
    Command::new("transfer-routing")
        .about("Routes waste collection vehicles through intermediate transfer stations")
        .arg(
            Arg::new(POINTS_ARG_NAME)
                .help("Number of collection points")
                .short('c')
                .long(POINTS_ARG_NAME)
                .value_parser(value_parser!(usize))
                .default_value("20"),
        )
        .arg(
            Arg::new(STATIONS_ARG_NAME)
                .help("Number of transfer stations")
                .short('s')
                .long(STATIONS_ARG_NAME)
                .value_parser(value_parser!(usize))
                .default_value("2"),
        )
        .arg(
            Arg::new(TYPE1_LEGS_ARG_NAME)
                .help("Candidate depot-to-station legs")
                .long(TYPE1_LEGS_ARG_NAME)
                .value_parser(value_parser!(usize))
                .default_value("10"),
        )
        .arg(
            Arg::new(TYPE2_LEGS_ARG_NAME)
                .help("Candidate station-to-station legs")
                .long(TYPE2_LEGS_ARG_NAME)
                .value_parser(value_parser!(usize))
                .default_value("10"),
        )
        .arg(
            Arg::new(VEHICLES_ARG_NAME)
                .help("Fleet size upper bound (defaults to the number of collection points)")
                .short('k')
                .long(VEHICLES_ARG_NAME)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new(CAPACITY_ARG_NAME)
                .help("Vehicle capacity in kg")
                .short('q')
                .long(CAPACITY_ARG_NAME)
                .value_parser(value_parser!(f64))
                .default_value("400"),
        )
        .arg(
            Arg::new(MAX_DURATION_ARG_NAME)
                .help("Maximum route duration in minutes")
                .short('l')
                .long(MAX_DURATION_ARG_NAME)
                .value_parser(value_parser!(f64))
                .default_value("480"),
        )
        .arg(
            Arg::new(SPEED_ARG_NAME)
                .help("Average vehicle speed in km/h")
                .long(SPEED_ARG_NAME)
                .value_parser(value_parser!(f64))
                .default_value("30"),
        )
        .arg(
            Arg::new(MIN_DEMAND_ARG_NAME)
                .help("Lower bound of the random demand per collection point, in kg")
                .long(MIN_DEMAND_ARG_NAME)
                .value_parser(value_parser!(f64))
                .default_value("100"),
        )
        .arg(
            Arg::new(MAX_DEMAND_ARG_NAME)
                .help("Upper bound of the random demand per collection point, in kg")
                .long(MAX_DEMAND_ARG_NAME)
                .value_parser(value_parser!(f64))
                .default_value("300"),
        )
        .arg(
            Arg::new(BOUNDS_ARG_NAME)
                .help("Bounding box in form \"min_lat,max_lat,min_lon,max_lon\"")
                .long(BOUNDS_ARG_NAME)
                .value_parser(parse_bounds),
        )
        .arg(
            Arg::new(DEPOT_ARG_NAME)
                .help("Depot location in form \"lat,lon\" (defaults to the box centre)")
                .long(DEPOT_ARG_NAME)
                .value_parser(parse_location),
        )
        .arg(
            Arg::new(SEED_ARG_NAME)
                .help("Random seed for instance generation")
                .long(SEED_ARG_NAME)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new(JSON_ARG_NAME)
                .help("Print the route plan as JSON")
                .long(JSON_ARG_NAME)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(NO_ORDERING_ARG_NAME)
                .help("Do not add vehicle ordering constraints")
                .long(NO_ORDERING_ARG_NAME)
                .action(ArgAction::SetTrue),
        )
}

fn parse_floats<const N: usize>(value: &str) -> Result<[f64; N], String> {
    let parsed = value
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|err| format!("'{}': {}", part, err)))
        .collect::<Result<Vec<f64>, String>>()?;
    parsed
        .try_into()
        .map_err(|parsed: Vec<f64>| format!("expected {} values, got {}", N, parsed.len()))
}

fn parse_bounds(value: &str) -> Result<GeoBounds, String> {
    let [min_lat, max_lat, min_lon, max_lon] = parse_floats::<4>(value)?;
    Ok(GeoBounds {
        min_lat,
        max_lat,
        min_lon,
        max_lon,
    })
}

fn parse_location(value: &str) -> Result<GeoLocation, String> {
    let [lat, lon] = parse_floats::<2>(value)?;
    Ok(GeoLocation::new(lat, lon))
}

fn get_config(matches: &ArgMatches) -> (InstanceConfig, FormulationOptions) {
    let defaults = InstanceConfig::default();
    let usize_arg = |name: &str| matches.get_one::<usize>(name).copied().unwrap_or_default();
    let f64_arg = |name: &str| matches.get_one::<f64>(name).copied().unwrap_or_default();

    let mut limits = defaults.limits;
    limits.capacity_kg = f64_arg(CAPACITY_ARG_NAME);
    limits.max_route_minutes = f64_arg(MAX_DURATION_ARG_NAME);

    let config = InstanceConfig {
        collection_points: usize_arg(POINTS_ARG_NAME),
        transfer_stations: usize_arg(STATIONS_ARG_NAME),
        type1_legs: usize_arg(TYPE1_LEGS_ARG_NAME),
        type2_legs: usize_arg(TYPE2_LEGS_ARG_NAME),
        limits,
        speed_kmh: f64_arg(SPEED_ARG_NAME),
        bounds: matches.get_one::<GeoBounds>(BOUNDS_ARG_NAME).copied().unwrap_or(defaults.bounds),
        min_demand_kg: f64_arg(MIN_DEMAND_ARG_NAME),
        max_demand_kg: f64_arg(MAX_DEMAND_ARG_NAME),
        depot: matches.get_one::<GeoLocation>(DEPOT_ARG_NAME).copied(),
        seed: matches.get_one::<u64>(SEED_ARG_NAME).copied(),
    };
    let options = FormulationOptions {
        vehicles: matches.get_one::<usize>(VEHICLES_ARG_NAME).copied(),
        order_vehicles: !matches.get_flag(NO_ORDERING_ARG_NAME),
    };
    (config, options)
}

fn render(routes: &RoutePlan, json: bool) -> Result<String, PlannerError> {
    if json {
        serde_json::to_string_pretty(routes)
            .map(|text| text + "\n")
            .map_err(|err| PlannerError::Output(err.to_string()))
    } else {
        Ok(routes.to_string())
    }
}

fn run(matches: &ArgMatches) -> Result<(), PlannerError> {
    let (config, options) = get_config(matches);
    let instance = generate(&config)?;
    let routes = plan(&instance, &options, &GoodLpSolver)?;

    print!("{}", render(&routes, matches.get_flag(JSON_ARG_NAME))?);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("transfer_routing=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = get_command().get_matches();
    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(PlannerError::Infeasible { reason }) => {
            error!(%reason, "Model is infeasible");
            println!("no solution found");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(%err, "Planning failed");
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}
