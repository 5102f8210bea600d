use std::path::Path;

use anyhow::{bail, Result};
use fs_err::File;
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo_types::{MultiPolygon, Point};
use ordered_float::NotNan;
use rand::rngs::StdRng;
use rand::Rng;

use crate::distance::round_to;
use crate::nztm;
use crate::zones::AreaUnits;

/// Give up on a polygon after this many rejected candidates per requested point. Only an
/// extremely thin or degenerate polygon should ever hit this.
const MAX_ATTEMPTS_PER_POINT: usize = 10_000;

/// Pick `n` points uniformly at random within the polygon, by sampling from its bounding box and
/// discarding anything outside.
///
/// Note that "within" excludes points directly on the polygon's boundary.
pub fn sample_points(
    polygon: &MultiPolygon<f64>,
    n: usize,
    rng: &mut StdRng,
) -> Result<Vec<Point<f64>>> {
    let bounds = match polygon.bounding_rect() {
        Some(bounds) => bounds,
        None => bail!("can't calculate bounding box for polygon"),
    };

    let mut points = Vec::with_capacity(n);
    let mut attempts = 0;
    while points.len() < n {
        if attempts == MAX_ATTEMPTS_PER_POINT * n {
            bail!(
                "only found {} of {} points inside the polygon after {} attempts",
                points.len(),
                n,
                attempts
            );
        }
        attempts += 1;

        let x = rng.gen_range(bounds.min().x..=bounds.max().x);
        let y = rng.gen_range(bounds.min().y..=bounds.max().y);
        let pt = Point::new(x, y);
        if polygon.contains(&pt) {
            points.push(pt);
        }
    }
    Ok(points)
}

/// Write `n` random points per area unit, in WGS84 and rounded to 5 decimal places (about a meter
/// on the ground). Use these to estimate the trip from an area unit to itself.
pub fn write_sample_points_csv<P: AsRef<Path>>(
    area_units: &AreaUnits,
    n: usize,
    rng: &mut StdRng,
    path: P,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(File::create(path.as_ref())?);
    writer.write_record([
        "2013 area unit name",
        "WGS84 longitude of a sample point in the area unit",
        "WGS84 latitude of sample point",
    ])?;
    for au in area_units.iter() {
        for pt in sample_points(&au.polygon, n, rng)? {
            let pt = nztm::unproject_point(pt);
            writer.write_record([
                au.name.clone(),
                round_to(pt.x(), 5).to_string(),
                round_to(pt.y(), 5).to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// The middle value, or the mean of the two middle values when there's an even number of them.
/// NaNs are ignored; None if nothing remains.
pub fn median<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let mut values: Vec<NotNan<f64>> = values
        .into_iter()
        .filter_map(|x| NotNan::new(x).ok())
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort();
    let n = values.len();
    if n % 2 == 1 {
        Some(values[n / 2].into_inner())
    } else {
        Some((values[n / 2 - 1].into_inner() + values[n / 2].into_inner()) / 2.0)
    }
}
