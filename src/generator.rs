//! Random instance generator.
//!
//! Points and stations are drawn uniformly from a bounding box. Candidate legs
//! come from capacity- and duration-bounded nearest-neighbour sequencing:
//!
//! 1. **Partition pass.** Starting from the depot, repeatedly take the nearest
//!    unassigned point and keep extending to the nearest next one until the
//!    load would exceed `Q` or the leg (ending at the station nearest its last
//!    point) would exceed `L`. The clusters cover every point exactly once.
//! 2. The first `n_I` clusters become Type-1 legs. Each further cluster
//!    becomes a Type-2 leg departing from the terminal station of a distinct
//!    Type-1 leg, so the partition itself is a feasible plan whenever it fits
//!    the leg budgets.
//! 3. **Fill pass.** Leftover budget is spent on alternative legs seeded at
//!    the least-covered points, giving the model something to choose from.
//!
//! Every emitted leg carries at most `Q` kg and takes at most `L` minutes.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::error::{PlannerError, Result};
use crate::haversine::{DEFAULT_SPEED_KMH, GeoBounds, GeoLocation, HaversineMatrix};
use crate::instance::{CollectionPoint, Instance, Leg, LegOrigin, RouteLimits, TransferStation};
use crate::traits::TravelTimeProvider;

/// Attempts per missing fill leg before giving up on the remaining budget.
const FILL_ATTEMPTS_PER_LEG: usize = 8;

#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Number of collection points (`n_C`).
    pub collection_points: usize,
    /// Number of transfer stations (`n_S`).
    pub transfer_stations: usize,
    /// Type-1 leg budget (`n_I`).
    pub type1_legs: usize,
    /// Type-2 leg budget (`n_J`).
    pub type2_legs: usize,
    pub limits: RouteLimits,
    /// Average vehicle speed in km/h.
    pub speed_kmh: f64,
    pub bounds: GeoBounds,
    pub min_demand_kg: f64,
    pub max_demand_kg: f64,
    /// Depot location. Defaults to the centre of `bounds`.
    pub depot: Option<GeoLocation>,
    /// RNG seed. Entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            collection_points: 20,
            transfer_stations: 2,
            type1_legs: 10,
            type2_legs: 10,
            limits: RouteLimits::default(),
            speed_kmh: DEFAULT_SPEED_KMH,
            bounds: GeoBounds::default(),
            min_demand_kg: 100.0,
            max_demand_kg: 300.0,
            depot: None,
            seed: None,
        }
    }
}

impl InstanceConfig {
    fn validate(&self) -> Result<()> {
        if !(self.speed_kmh > 0.0) {
            return Err(PlannerError::InvalidConfig(format!(
                "speed must be positive, got {}",
                self.speed_kmh
            )));
        }
        if !(self.limits.capacity_kg > 0.0) || !(self.limits.max_route_minutes > 0.0) {
            return Err(PlannerError::InvalidConfig(
                "capacity and max route duration must be positive".to_string(),
            ));
        }
        if !(0.0 <= self.min_demand_kg && self.min_demand_kg <= self.max_demand_kg) {
            return Err(PlannerError::InvalidConfig(format!(
                "demand range [{}, {}] is empty or negative",
                self.min_demand_kg, self.max_demand_kg
            )));
        }
        if self.bounds.min_lat > self.bounds.max_lat || self.bounds.min_lon > self.bounds.max_lon {
            return Err(PlannerError::InvalidConfig("bounding box is inverted".to_string()));
        }
        let wants_legs = self.type1_legs + self.type2_legs > 0;
        if wants_legs && self.collection_points > 0 && self.transfer_stations == 0 {
            return Err(PlannerError::InvalidConfig(
                "legs need at least one transfer station".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generate an instance with haversine travel times.
pub fn generate(config: &InstanceConfig) -> Result<Instance> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    generate_with(config, &HaversineMatrix::new(config.speed_kmh), &mut rng)
}

/// Generate an instance with a caller-supplied travel-time provider and RNG.
pub fn generate_with<M, R>(config: &InstanceConfig, provider: &M, rng: &mut R) -> Result<Instance>
where
    M: TravelTimeProvider,
    R: Rng + ?Sized,
{
    config.validate()?;

    let depot = config.depot.unwrap_or_else(|| config.bounds.center());
    let points: Vec<CollectionPoint> = (0..config.collection_points)
        .map(|_| CollectionPoint {
            location: GeoLocation::random(&config.bounds, rng),
            demand_kg: rng.gen_range(config.min_demand_kg..=config.max_demand_kg),
        })
        .collect();
    let stations: Vec<TransferStation> = (0..config.transfer_stations)
        .map(|_| TransferStation {
            location: GeoLocation::random(&config.bounds, rng),
        })
        .collect();

    let mut locations = Vec::with_capacity(1 + points.len() + stations.len());
    locations.push(depot);
    locations.extend(points.iter().map(|p| p.location));
    locations.extend(stations.iter().map(|s| s.location));
    let matrix = provider.matrix_for(&locations)?;

    let builder = LegBuilder {
        matrix: &matrix,
        points: &points,
        station_count: stations.len(),
        limits: config.limits,
    };

    let (mut type1, mut type2) = partition_legs(&builder, config);
    fill_legs(&builder, config, rng, &mut type1, &mut type2);

    info!(
        points = points.len(),
        stations = stations.len(),
        type1_legs = type1.len(),
        type2_legs = type2.len(),
        "Generated instance"
    );

    Instance::new(depot, points, stations, type1, type2, config.limits)
}

/// Matrix node of the depot; points follow it, then stations.
const DEPOT_NODE: usize = 0;

struct LegBuilder<'a> {
    matrix: &'a [Vec<f64>],
    points: &'a [CollectionPoint],
    station_count: usize,
    limits: RouteLimits,
}

impl LegBuilder<'_> {
    fn point_node(&self, point: usize) -> usize {
        1 + point
    }

    fn station_node(&self, station: usize) -> usize {
        1 + self.points.len() + station
    }

    fn origin_node(&self, origin: LegOrigin) -> usize {
        match origin {
            LegOrigin::Depot => DEPOT_NODE,
            LegOrigin::Station(station) => self.station_node(station),
        }
    }

    fn nearest_station(&self, from_node: usize) -> Option<usize> {
        (0..self.station_count).min_by(|&a, &b| {
            let da = self.matrix[from_node][self.station_node(a)];
            let db = self.matrix[from_node][self.station_node(b)];
            da.total_cmp(&db)
        })
    }

    fn nearest_point(&self, from_node: usize, available: &[bool]) -> Option<usize> {
        (0..self.points.len())
            .filter(|&c| available[c])
            .min_by(|&a, &b| {
                let da = self.matrix[from_node][self.point_node(a)];
                let db = self.matrix[from_node][self.point_node(b)];
                da.total_cmp(&db)
            })
    }

    /// Leg through `sequence`, ending at the station nearest its last point.
    fn leg(&self, origin: LegOrigin, sequence: &[usize]) -> Option<Leg> {
        let last = *sequence.last()?;
        let terminal = self.nearest_station(self.point_node(last))?;

        let mut node = self.origin_node(origin);
        let mut duration = 0.0;
        for &point in sequence {
            let next = self.point_node(point);
            duration += self.matrix[node][next];
            node = next;
        }
        duration += self.matrix[node][self.station_node(terminal)];

        let load = sequence.iter().map(|&c| self.points[c].demand_kg).sum();
        Some(Leg::new(origin, terminal, sequence.to_vec(), duration, load))
    }

    fn within_limits(&self, leg: &Leg) -> bool {
        leg.load_kg <= self.limits.capacity_kg
            && leg.duration_minutes <= self.limits.max_route_minutes
    }

    /// Nearest-neighbour extension from `seed` over `available` points.
    ///
    /// Stops at the first nearest point that would break `Q` or `L`. Returns
    /// `None` when the seed alone already breaks them.
    fn extend(&self, origin: LegOrigin, seed: usize, available: &[bool]) -> Option<Leg> {
        let mut sequence = vec![seed];
        let mut current = self.leg(origin, &sequence).filter(|leg| self.within_limits(leg))?;

        let mut open = available.to_vec();
        open[seed] = false;
        while let Some(next) = self.nearest_point(self.point_node(*sequence.last()?), &open) {
            sequence.push(next);
            match self.leg(origin, &sequence).filter(|leg| self.within_limits(leg)) {
                Some(extended) => {
                    current = extended;
                    open[next] = false;
                }
                None => break,
            }
        }
        Some(current)
    }
}

fn partition_legs(builder: &LegBuilder<'_>, config: &InstanceConfig) -> (Vec<Leg>, Vec<Leg>) {
    let mut type1 = Vec::new();
    let mut type2 = Vec::new();
    if builder.station_count == 0 {
        return (type1, type2);
    }

    let mut available = vec![true; builder.points.len()];
    let mut clusters = Vec::new();
    while let Some(seed) = builder.nearest_point(DEPOT_NODE, &available) {
        match builder.extend(LegOrigin::Depot, seed, &available) {
            Some(leg) => {
                for &c in &leg.points {
                    available[c] = false;
                }
                clusters.push(leg);
            }
            None => {
                warn!(point = seed, "Collection point cannot be served within vehicle limits");
                available[seed] = false;
            }
        }
    }

    let mut clusters = clusters.into_iter();
    type1.extend(clusters.by_ref().take(config.type1_legs));

    for (partner, cluster) in clusters.enumerate() {
        let paired = type1
            .get(partner)
            .filter(|_| type2.len() < config.type2_legs)
            .and_then(|first: &Leg| {
                let origin = LegOrigin::Station(first.terminal);
                builder
                    .leg(origin, &cluster.points)
                    .filter(|leg| builder.within_limits(leg))
                    .filter(|leg| {
                        first.duration_minutes + leg.duration_minutes
                            <= builder.limits.max_route_minutes
                    })
            });
        match paired {
            Some(leg) => type2.push(leg),
            None => warn!(
                points = ?cluster.points,
                "Partition cluster does not fit the leg budget"
            ),
        }
    }

    debug!(type1 = type1.len(), type2 = type2.len(), "Partition pass complete");
    (type1, type2)
}

fn fill_legs<R: Rng + ?Sized>(
    builder: &LegBuilder<'_>,
    config: &InstanceConfig,
    rng: &mut R,
    type1: &mut Vec<Leg>,
    type2: &mut Vec<Leg>,
) {
    if builder.points.is_empty() || builder.station_count == 0 {
        return;
    }

    let mut coverage = vec![0usize; builder.points.len()];
    for leg in type1.iter().chain(type2.iter()) {
        for &c in &leg.points {
            coverage[c] += 1;
        }
    }
    let everything = vec![true; builder.points.len()];

    let budgets = [
        (config.type1_legs.saturating_sub(type1.len()), true),
        (config.type2_legs.saturating_sub(type2.len()), false),
    ];
    for (missing, depot_origin) in budgets {
        let target = if depot_origin { &mut *type1 } else { &mut *type2 };
        let mut added = 0;
        for _ in 0..missing * FILL_ATTEMPTS_PER_LEG {
            if added == missing {
                break;
            }
            let Some(seed) = least_covered(&coverage, rng) else {
                break;
            };
            let origin = if depot_origin {
                LegOrigin::Depot
            } else {
                LegOrigin::Station(rng.gen_range(0..builder.station_count))
            };
            let Some(leg) = builder.extend(origin, seed, &everything) else {
                continue;
            };
            let duplicate = target
                .iter()
                .any(|existing| existing.origin == leg.origin && existing.points == leg.points);
            if duplicate {
                continue;
            }
            for &c in &leg.points {
                coverage[c] += 1;
            }
            debug!(
                origin = ?leg.origin,
                terminal = leg.terminal,
                points = ?leg.points,
                "Added fill leg"
            );
            target.push(leg);
            added += 1;
        }
        if added < missing {
            warn!(missing = missing - added, "Leg budget not exhausted");
        }
    }
}

/// A random point among those covered by the fewest legs so far.
fn least_covered<R: Rng + ?Sized>(coverage: &[usize], rng: &mut R) -> Option<usize> {
    let min = *coverage.iter().min()?;
    let candidates: Vec<usize> = (0..coverage.len()).filter(|&c| coverage[c] == min).collect();
    candidates.choose(rng).copied()
}
