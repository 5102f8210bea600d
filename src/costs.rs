use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Result};
use fs_err::File;
use serde::{Deserialize, Serialize};

use crate::distance::round_to;
use crate::{DistanceTimeMatrix, Journey, Mode};

/// What commuting costs, per mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    /// Dollars per kilometer traveled
    pub cost_per_km: BTreeMap<Mode, f64>,
    /// How many trips make up one day of commuting. The default of 2 is there and back.
    #[serde(default = "default_trips_per_day")]
    pub trips_per_day: f64,
}

fn default_trips_per_day() -> f64 {
    2.0
}

impl Default for Tariff {
    fn default() -> Tariff {
        Tariff {
            cost_per_km: vec![
                (Mode::Walk, 0.0),
                (Mode::Bicycle, 0.0),
                (Mode::Car, 0.274),
                (Mode::Transit, 0.218),
            ]
            .into_iter()
            .collect(),
            trips_per_day: default_trips_per_day(),
        }
    }
}

impl Tariff {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Tariff> {
        Ok(serde_json::from_reader(BufReader::new(File::open(
            path.as_ref(),
        )?))?)
    }
}

/// The dollar cost and time in hours of one day of commuting. Either may be unknown. Serialized as
/// a `[cost, time]` pair, with `null` for unknown values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "(Option<f64>, Option<f64>)",
    into = "(Option<f64>, Option<f64>)"
)]
pub struct CommuteCost {
    pub dollars: Option<f64>,
    pub hours: Option<f64>,
}

impl From<(Option<f64>, Option<f64>)> for CommuteCost {
    fn from((dollars, hours): (Option<f64>, Option<f64>)) -> CommuteCost {
        CommuteCost { dollars, hours }
    }
}

impl From<CommuteCost> for (Option<f64>, Option<f64>) {
    fn from(c: CommuteCost) -> Self {
        (c.dollars, c.hours)
    }
}

/// Daily commute costs between area units, for every mode. Commutes are treated as symmetric, so
/// only the lower triangle is stored: `matrix[mode][i]` has entries for `j` from 0 to `i`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommuteCosts {
    pub index_by_name: BTreeMap<String, usize>,
    pub matrix: BTreeMap<Mode, Vec<Vec<CommuteCost>>>,
}

impl CommuteCosts {
    /// The commute between two named area units, in either direction.
    pub fn get(&self, mode: Mode, home: &str, work: &str) -> Option<CommuteCost> {
        let i = *self.index_by_name.get(home)?;
        let j = *self.index_by_name.get(work)?;
        let (i, j) = if j > i { (j, i) } else { (i, j) };
        self.matrix.get(&mode)?.get(i)?.get(j).copied()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::save_json(self, path)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<CommuteCosts> {
        Ok(serde_json::from_reader(BufReader::new(File::open(
            path.as_ref(),
        )?))?)
    }
}

/// Combine the distances and times of a matrix with a tariff into daily commute costs.
///
/// The trips in each direction are averaged when both are known; otherwise whichever is known is
/// used. The cost is distance times the mode's cost per kilometer, and both cost and time are
/// multiplied by the number of trips per day, then rounded to 2 decimal places.
pub fn commute_costs(matrix: &DistanceTimeMatrix, tariff: &Tariff) -> Result<CommuteCosts> {
    let n = matrix.len();
    let mut result = BTreeMap::new();
    for (mode, rows) in &matrix.matrix {
        let cost_per_km = if let Some(x) = tariff.cost_per_km.get(mode) {
            *x
        } else {
            bail!("The tariff doesn't say what {} costs", mode);
        };
        if rows.len() != n || rows.iter().any(|row| row.len() != n) {
            bail!("The {} matrix isn't {} by {}", mode, n, n);
        }

        let mut triangle = Vec::with_capacity(n);
        for i in 0..n {
            let mut row = Vec::with_capacity(i + 1);
            for j in 0..=i {
                let journey = both_directions(rows[i][j], rows[j][i]);
                row.push(CommuteCost {
                    dollars: journey
                        .distance_km
                        .map(|km| round_to(km * cost_per_km * tariff.trips_per_day, 2)),
                    hours: journey
                        .hours
                        .map(|hours| round_to(hours * tariff.trips_per_day, 2)),
                });
            }
            triangle.push(row);
        }
        result.insert(*mode, triangle);
    }
    Ok(CommuteCosts {
        index_by_name: matrix.index_by_name.clone(),
        matrix: result,
    })
}

fn both_directions(there: Journey, back: Journey) -> Journey {
    Journey {
        distance_km: average(there.distance_km, back.distance_km),
        hours: average(there.hours, back.hours),
    }
}

fn average(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}
