//! This crate prepares datasets for exploring the tradeoff between rent and commuting across New
//! Zealand census area units. It can:
//!
//! - attach rent statistics to area units, either from census data or by suburb via a lookup table
//! - calculate area unit centroids in the NZTM projection
//! - estimate distance and time matrices between area units, as the bird flies or using a routing
//!   service (OSRM, Mapquest, or Google Maps)
//! - combine those matrices with a tariff into daily commute costs
//!
//! All input and output geometry is WGS84. Geometric calculations happen in NZTM.

#[macro_use]
extern crate log;

pub mod costs;
pub mod distance;
pub mod matrix;
pub mod nztm;
pub mod region;
pub mod rents;
pub mod routing;
pub mod sample;
#[cfg(test)]
mod tests;
pub mod zones;

use std::fmt;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Result};
use fs_err::File;
use serde::{Deserialize, Serialize};

pub use self::costs::{commute_costs, CommuteCost, CommuteCosts, Tariff};
pub use self::matrix::{bird_matrix, load_csv_matrix, routed_matrix, DistanceTimeMatrix, Journey};
pub use self::region::{Region, RegionOptions};
pub use self::routing::{GoogleMaps, HttpOptions, Mapquest, Osrm, Router};
pub use self::zones::{load_area_units, AreaUnit, AreaUnits};

/// A way of commuting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Walk,
    Bicycle,
    Car,
    Transit,
}

impl Mode {
    pub fn all() -> Vec<Mode> {
        vec![Mode::Walk, Mode::Bicycle, Mode::Car, Mode::Transit]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Walk => "walk",
            Mode::Bicycle => "bicycle",
            Mode::Car => "car",
            Mode::Transit => "transit",
        }
    }

    /// When estimating trips as the bird flies, how many times longer does this mode take than
    /// driving?
    pub fn bird_time_factor(self) -> f64 {
        match self {
            Mode::Walk => 15.0,
            Mode::Bicycle => 4.0,
            Mode::Car | Mode::Transit => 1.0,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(x: &str) -> Result<Mode> {
        for mode in Mode::all() {
            if mode.as_str() == x {
                return Ok(mode);
            }
        }
        bail!("Unknown mode {x}; use walk, bicycle, car, or transit");
    }
}

pub fn save_json<P: AsRef<Path>, T: Serialize>(value: &T, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer(&mut writer, value)?;
    // Dropping the writer would swallow any error from the final write
    writer.flush()?;
    Ok(())
}
