//! Great-circle geometry and the haversine travel-time provider.
//!
//! Straight-line distances on a sphere, turned into travel minutes with an
//! assumed average speed. Ignores roads, which is fine for the short legs a
//! collection area produces.

use std::fmt;

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::traits::TravelTimeProvider;

/// Average vehicle speed assumption for time estimation.
pub const DEFAULT_SPEED_KMH: f64 = 30.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6378.0;

/// How far outside [-1, 1] the cosine argument may drift before it is an error.
const COSINE_TOLERANCE: f64 = 0.01;

/// A point on the Earth's surface, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lon: f64,
}

impl GeoLocation {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Uniformly random location inside `bounds`.
    pub fn random<R: Rng + ?Sized>(bounds: &GeoBounds, rng: &mut R) -> Self {
        Self {
            lat: sample(rng, bounds.min_lat, bounds.max_lat),
            lon: sample(rng, bounds.min_lon, bounds.max_lon),
        }
    }

    /// Great-circle distance to `other` in kilometers.
    ///
    /// The central angle's cosine is checked first: rounding can push it
    /// marginally past ±1, which is clamped, and anything further out returns
    /// [`PlannerError::Computation`]. The distance itself comes from the
    /// half-angle haversine form, which stays accurate for points centimetres
    /// apart where `acos` near 1 collapses to zero.
    pub fn haversine_distance(&self, other: &GeoLocation) -> Result<f64> {
        if self == other {
            return Ok(0.0);
        }

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lon = (other.lon - self.lon).to_radians();

        let mut value = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * delta_lon.cos();

        if value > 1.0 && value < 1.0 + COSINE_TOLERANCE {
            value = 1.0;
        } else if value < -1.0 && value > -1.0 - COSINE_TOLERANCE {
            value = -1.0;
        }

        // NaN fails both comparisons, so test for the valid range instead.
        if !(-1.0..=1.0).contains(&value) {
            return Err(PlannerError::Computation {
                from: *self,
                to: *other,
                value,
            });
        }

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();

        Ok(EARTH_RADIUS_KM * c)
    }

    /// Travel time to `other` in hours at `speed_kmh`.
    pub fn get_travel_time(&self, other: &GeoLocation, speed_kmh: f64) -> Result<f64> {
        Ok(self.haversine_distance(other)? / speed_kmh)
    }
}

impl fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// Latitude/longitude box that random locations are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Default for GeoBounds {
    fn default() -> Self {
        Self {
            min_lat: 0.0,
            max_lat: 0.2,
            min_lon: 0.0,
            max_lon: 0.2,
        }
    }
}

impl GeoBounds {
    pub fn center(&self) -> GeoLocation {
        GeoLocation::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    pub fn contains(&self, location: &GeoLocation) -> bool {
        (self.min_lat..=self.max_lat).contains(&location.lat)
            && (self.min_lon..=self.max_lon).contains(&location.lon)
    }
}

/// `gen_range` panics on an empty range; a degenerate box pins the coordinate.
fn sample<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if max > min { rng.gen_range(min..max) } else { min }
}

/// Haversine-based travel-time provider.
///
/// Estimates travel minutes from great-circle distance and an assumed speed.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Convert distance in km to travel time in minutes.
    fn km_to_minutes(&self, km: f64) -> f64 {
        km / self.speed_kmh * 60.0
    }
}

impl TravelTimeProvider for HaversineMatrix {
    fn matrix_for(&self, locations: &[GeoLocation]) -> Result<Vec<Vec<f64>>> {
        locations
            .par_iter()
            .map(|from| {
                locations
                    .iter()
                    .map(|to| Ok(self.km_to_minutes(from.haversine_distance(to)?)))
                    .collect::<Result<Vec<f64>>>()
            })
            .collect()
    }
}
