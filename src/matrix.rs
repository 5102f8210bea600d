use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Result};
use fs_err::File;
use geo_types::Point;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::distance::{bird_distance_and_time, round_to};
use crate::nztm;
use crate::routing::Router;
use crate::sample::{median, sample_points};
use crate::zones::{AreaUnit, AreaUnits};
use crate::Mode;

/// The distance in kilometers and time in hours of a trip. Either may be unknown. Serialized as a
/// `[distance, time]` pair, with `null` for unknown values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "(Option<f64>, Option<f64>)",
    into = "(Option<f64>, Option<f64>)"
)]
pub struct Journey {
    pub distance_km: Option<f64>,
    pub hours: Option<f64>,
}

impl Journey {
    pub const UNKNOWN: Journey = Journey {
        distance_km: None,
        hours: None,
    };

    pub fn new(distance_km: f64, hours: f64) -> Journey {
        Journey {
            distance_km: Some(distance_km),
            hours: Some(hours),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.distance_km.is_none() && self.hours.is_none()
    }

    fn scale_time(self, factor: f64) -> Journey {
        Journey {
            distance_km: self.distance_km,
            hours: self.hours.map(|h| round_to(h * factor, 2)),
        }
    }

    fn rounded(self, digits: i32) -> Journey {
        Journey {
            distance_km: self.distance_km.map(|x| round_to(x, digits)),
            hours: self.hours.map(|x| round_to(x, digits)),
        }
    }

    /// The median distance and median time of some journeys, ignoring unknown values.
    fn median_of(journeys: &[Journey]) -> Journey {
        Journey {
            distance_km: median(journeys.iter().filter_map(|j| j.distance_km)),
            hours: median(journeys.iter().filter_map(|j| j.hours)),
        }
    }
}

impl From<(Option<f64>, Option<f64>)> for Journey {
    fn from((distance_km, hours): (Option<f64>, Option<f64>)) -> Journey {
        Journey { distance_km, hours }
    }
}

impl From<Journey> for (Option<f64>, Option<f64>) {
    fn from(j: Journey) -> Self {
        (j.distance_km, j.hours)
    }
}

/// For every mode, a square matrix of journeys between area units. `matrix[mode][i][j]` is the
/// trip from the area unit with index `i` to the one with index `j`, as given by
/// `index_by_name`. Indices follow the sorted order of names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistanceTimeMatrix {
    pub index_by_name: BTreeMap<String, usize>,
    pub matrix: BTreeMap<Mode, Vec<Vec<Journey>>>,
}

impl DistanceTimeMatrix {
    fn empty<'a, I: IntoIterator<Item = &'a String>>(names: I) -> DistanceTimeMatrix {
        DistanceTimeMatrix {
            index_by_name: names
                .into_iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect(),
            matrix: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index_by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_by_name.is_empty()
    }

    /// The trip between two named area units, if the mode and names are present.
    pub fn get(&self, mode: Mode, from: &str, to: &str) -> Option<Journey> {
        let i = *self.index_by_name.get(from)?;
        let j = *self.index_by_name.get(to)?;
        self.matrix.get(&mode)?.get(i)?.get(j).copied()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::save_json(self, path)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<DistanceTimeMatrix> {
        let matrix: DistanceTimeMatrix =
            serde_json::from_reader(BufReader::new(File::open(path.as_ref())?))?;
        for (mode, rows) in &matrix.matrix {
            if rows.len() != matrix.len() || rows.iter().any(|row| row.len() != matrix.len()) {
                bail!(
                    "The {} matrix in {} isn't {} by {}",
                    mode,
                    path.as_ref().display(),
                    matrix.len(),
                    matrix.len()
                );
            }
        }
        Ok(matrix)
    }
}

/// Estimate trips between every pair of area units as the bird flies, for every mode.
///
/// Between different area units, the trip goes from one centroid to the other. The trip from an
/// area unit to itself is estimated by picking `num_sample_points` random points in it and taking
/// the median distance and median time from those points to its centroid.
///
/// Distances are the same for every mode; times are scaled by `Mode::bird_time_factor`.
pub fn bird_matrix(
    area_units: &AreaUnits,
    num_sample_points: usize,
    rng: &mut StdRng,
) -> Result<DistanceTimeMatrix> {
    let units: Vec<&AreaUnit> = area_units.iter().collect();
    let centroids: Vec<Point<f64>> = units.iter().map(|au| au.centroid_wgs84()).collect();

    info!("Calculating bird distances between {} area units", units.len());
    let mut base = Vec::with_capacity(units.len());
    for (i, au) in units.iter().enumerate() {
        let mut row = Vec::with_capacity(units.len());
        for (j, centroid) in centroids.iter().enumerate() {
            if i == j {
                let journeys: Vec<Journey> = sample_points_wgs84(au, num_sample_points, rng)?
                    .into_iter()
                    .map(|pt| bird_distance_and_time(pt, centroids[i]))
                    .collect();
                row.push(Journey::median_of(&journeys));
            } else {
                row.push(bird_distance_and_time(centroids[i], *centroid));
            }
        }
        base.push(row);
    }

    let mut result = DistanceTimeMatrix::empty(area_units.names());
    for mode in Mode::all() {
        let factor = mode.bird_time_factor();
        result.matrix.insert(
            mode,
            base.iter()
                .map(|row| row.iter().map(|j| j.scale_time(factor)).collect())
                .collect(),
        );
    }
    Ok(result)
}

/// Like `bird_matrix`, but asks a routing service for each trip. Trips the service can't answer
/// are left unknown.
pub fn routed_matrix(
    area_units: &AreaUnits,
    router: &dyn Router,
    modes: &[Mode],
    num_sample_points: usize,
    rng: &mut StdRng,
) -> Result<DistanceTimeMatrix> {
    for mode in modes {
        if !router.supports(*mode) {
            bail!("{} can't route by {}", router.name(), mode);
        }
    }

    let units: Vec<&AreaUnit> = area_units.iter().collect();
    let centroids: Vec<Point<f64>> = units.iter().map(|au| au.centroid_wgs84()).collect();
    // Use the same sample points for every mode
    let mut samples = Vec::with_capacity(units.len());
    for au in &units {
        samples.push(sample_points_wgs84(au, num_sample_points, rng)?);
    }

    let mut result = DistanceTimeMatrix::empty(area_units.names());
    for mode in modes {
        info!(
            "Routing {} trips between {} area units with {}",
            mode,
            units.len(),
            router.name()
        );
        let mut rows = router.matrix(&centroids, &centroids, *mode)?;
        for (i, row) in rows.iter_mut().enumerate() {
            for journey in row.iter_mut() {
                *journey = journey.rounded(2);
            }
            let to_centroid: Vec<Journey> = router
                .matrix(&samples[i], &[centroids[i]], *mode)?
                .into_iter()
                .flatten()
                .collect();
            row[i] = Journey::median_of(&to_centroid).rounded(2);
        }
        result.matrix.insert(*mode, rows);
    }
    Ok(result)
}

/// Read distances and times from one `<mode>_commutes.csv` file per mode in `dir`, then arrange
/// them into a matrix over `names`.
///
/// Each row is either `origin,destination,distance,time` or `"origin - destination",distance,time`,
/// with distance in meters and time in minutes. These get converted to kilometers and hours,
/// rounded to 1 decimal place. Transit data often lacks distances, so a blank transit distance
/// uses the car distance for the same trip. Area unit names may themselves contain " - ", so the
/// older form is split wherever both halves are in `names`. Malformed rows and rows naming unknown
/// area units are skipped, and pairs without any row are unknown.
pub fn load_csv_matrix<P: AsRef<Path>>(
    dir: P,
    names: &BTreeSet<String>,
) -> Result<DistanceTimeMatrix> {
    let dir = dir.as_ref();
    let mut per_mode: BTreeMap<Mode, HashMap<(String, String), Journey>> = BTreeMap::new();
    // Mode::all() puts car before transit, so the fallback is available
    for mode in Mode::all() {
        let path = dir.join(csv_matrix_filename(mode));
        let journeys = read_commutes_csv(&path, mode, names, per_mode.get(&Mode::Car))?;
        info!("Read {} {} trips from {}", journeys.len(), mode, path.display());
        per_mode.insert(mode, journeys);
    }

    let mut result = DistanceTimeMatrix::empty(names);
    for (mode, journeys) in per_mode {
        let rows = names
            .iter()
            .map(|origin| {
                names
                    .iter()
                    .map(|destination| {
                        journeys
                            .get(&(origin.clone(), destination.clone()))
                            .copied()
                            .unwrap_or(Journey::UNKNOWN)
                    })
                    .collect()
            })
            .collect();
        result.matrix.insert(mode, rows);
    }
    Ok(result)
}

pub fn csv_matrix_filename(mode: Mode) -> String {
    format!("{}_commutes.csv", mode)
}

fn read_commutes_csv(
    path: &Path,
    mode: Mode,
    names: &BTreeSet<String>,
    car: Option<&HashMap<(String, String), Journey>>,
) -> Result<HashMap<(String, String), Journey>> {
    let mut journeys = HashMap::new();
    let mut unknown_pairs = 0;
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(File::open(path)?);
    for rec in reader.into_records() {
        let rec = rec?;
        let (origin, destination, distance, time) = match rec.len() {
            4 => (&rec[0], &rec[1], &rec[2], &rec[3]),
            3 => {
                if let Some((origin, destination)) = split_pair(&rec[0], names) {
                    (origin, destination, &rec[1], &rec[2])
                } else {
                    warn!(
                        "Skipping row without a pair of known area units in {}: {:?}",
                        path.display(),
                        rec
                    );
                    continue;
                }
            }
            _ => {
                warn!("Skipping row with {} fields in {}: {:?}", rec.len(), path.display(), rec);
                continue;
            }
        };
        if !names.contains(origin) || !names.contains(destination) {
            debug!("Skipping trip between unknown area units: {:?}", rec);
            unknown_pairs += 1;
            continue;
        }
        let key = (origin.to_string(), destination.to_string());

        let distance_km = if distance.is_empty() {
            if mode == Mode::Transit {
                car.and_then(|car| car.get(&key)).and_then(|j| j.distance_km)
            } else {
                None
            }
        } else if let Ok(meters) = distance.parse::<f64>() {
            Some(round_to(meters / 1000.0, 1))
        } else {
            warn!("Skipping row with a bad distance in {}: {:?}", path.display(), rec);
            continue;
        };
        let hours = if time.is_empty() {
            None
        } else if let Ok(minutes) = time.parse::<f64>() {
            Some(round_to(minutes / 60.0, 1))
        } else {
            warn!("Skipping row with a bad time in {}: {:?}", path.display(), rec);
            continue;
        };

        journeys.insert(key, Journey { distance_km, hours });
    }
    if unknown_pairs > 0 {
        warn!(
            "Skipped {} rows of {} naming area units outside this region",
            unknown_pairs,
            path.display()
        );
    }
    Ok(journeys)
}

/// Split `"origin - destination"` at the first ` - ` where both sides are known area units.
fn split_pair<'a>(pair: &'a str, names: &BTreeSet<String>) -> Option<(&'a str, &'a str)> {
    pair.match_indices(" - ")
        .map(|(i, separator)| (&pair[..i], &pair[i + separator.len()..]))
        .find(|(origin, destination)| names.contains(*origin) && names.contains(*destination))
}

fn sample_points_wgs84(au: &AreaUnit, n: usize, rng: &mut StdRng) -> Result<Vec<Point<f64>>> {
    match sample_points(&au.polygon, n, rng) {
        Ok(points) => Ok(points.into_iter().map(nztm::unproject_point).collect()),
        Err(err) => bail!("Couldn't sample points in {}: {}", au.name, err),
    }
}
