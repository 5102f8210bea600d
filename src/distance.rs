use geo::algorithm::haversine_distance::HaversineDistance;
use geo_types::Point;

use crate::Journey;

/// Crow-flies trips are assumed to move at this speed.
pub const BIRD_SPEED_KPH: f64 = 40.0;

/// Great circle distance in kilometers between two WGS84 points, using the Haversine formula on a
/// spherical Earth.
pub fn haversine_km(a: Point<f64>, b: Point<f64>) -> f64 {
    a.haversine_distance(&b) / 1000.0
}

/// Distance and time from `a` to `b` as the bird flies, rounded to 2 decimal places.
pub fn bird_distance_and_time(a: Point<f64>, b: Point<f64>) -> Journey {
    let km = haversine_km(a, b);
    Journey::new(round_to(km, 2), round_to(km / BIRD_SPEED_KPH, 2))
}

pub fn round_to(x: f64, digits: i32) -> f64 {
    let scale = 10.0_f64.powi(digits);
    (x * scale).round() / scale
}
