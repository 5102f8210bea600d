//! Conversion between WGS84 longitude/latitude and New Zealand Transverse Mercator (NZTM2000,
//! EPSG:2193).
//!
//! This is a transverse Mercator projection on the GRS80 ellipsoid, evaluated with Krüger's
//! series to third order in the third flattening. Over New Zealand that's accurate to well under a
//! millimetre, which is plenty for centroids and sampling.

use geo::MapCoords;
use geo_types::{Coord, MultiPolygon, Point};

// GRS80
const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_222_101;

const CENTRAL_MERIDIAN_DEGREES: f64 = 173.0;
const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 1_600_000.0;
const FALSE_NORTHING: f64 = 10_000_000.0;

struct Constants {
    /// Rectifying radius scaled by the central meridian's scale factor
    radius: f64,
    eccentricity: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
}

impl Constants {
    fn new() -> Constants {
        let n = FLATTENING / (2.0 - FLATTENING);
        let n2 = n * n;
        let n3 = n2 * n;
        Constants {
            radius: SCALE_FACTOR * SEMI_MAJOR_AXIS / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0),
            eccentricity: (FLATTENING * (2.0 - FLATTENING)).sqrt(),
            alpha: [
                n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
                13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
                61.0 * n3 / 240.0,
            ],
            beta: [
                n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
                n2 / 48.0 + n3 / 15.0,
                17.0 * n3 / 480.0,
            ],
            delta: [
                2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
                7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
                56.0 * n3 / 15.0,
            ],
        }
    }
}

/// Transform a WGS84 (longitude, latitude) coordinate in degrees to an NZTM (easting, northing)
/// coordinate in meters.
pub fn project(lon_lat: Coord<f64>) -> Coord<f64> {
    let c = Constants::new();
    let phi = lon_lat.y.to_radians();
    let lambda = (lon_lat.x - CENTRAL_MERIDIAN_DEGREES).to_radians();

    // Conformal latitude, via its tangent
    let sin_phi = phi.sin();
    let t = (sin_phi.atanh() - c.eccentricity * (c.eccentricity * sin_phi).atanh()).sinh();
    let xi_prime = t.atan2(lambda.cos());
    let eta_prime = (lambda.sin() / (1.0 + t * t).sqrt()).atanh();

    let mut xi = xi_prime;
    let mut eta = eta_prime;
    for (j, alpha) in c.alpha.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        xi += alpha * (k * xi_prime).sin() * (k * eta_prime).cosh();
        eta += alpha * (k * xi_prime).cos() * (k * eta_prime).sinh();
    }

    Coord {
        x: FALSE_EASTING + c.radius * eta,
        y: FALSE_NORTHING + c.radius * xi,
    }
}

/// The inverse of `project`: NZTM meters back to WGS84 degrees.
pub fn unproject(nztm: Coord<f64>) -> Coord<f64> {
    let c = Constants::new();
    let xi = (nztm.y - FALSE_NORTHING) / c.radius;
    let eta = (nztm.x - FALSE_EASTING) / c.radius;

    let mut xi_prime = xi;
    let mut eta_prime = eta;
    for (j, beta) in c.beta.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        xi_prime -= beta * (k * xi).sin() * (k * eta).cosh();
        eta_prime -= beta * (k * xi).cos() * (k * eta).sinh();
    }

    let chi = (xi_prime.sin() / eta_prime.cosh()).asin();
    let mut phi = chi;
    for (j, delta) in c.delta.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        phi += delta * (k * chi).sin();
    }
    let lambda = eta_prime.sinh().atan2(xi_prime.cos());

    Coord {
        x: CENTRAL_MERIDIAN_DEGREES + lambda.to_degrees(),
        y: phi.to_degrees(),
    }
}

pub fn project_multipolygon(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    mp.map_coords(project)
}

pub fn unproject_point(pt: Point<f64>) -> Point<f64> {
    unproject(pt.0).into()
}

pub fn project_point(pt: Point<f64>) -> Point<f64> {
    project(pt.0).into()
}
