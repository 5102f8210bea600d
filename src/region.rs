use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rand::rngs::StdRng;

use crate::costs::{commute_costs, Tariff};
use crate::matrix::{bird_matrix, csv_matrix_filename, load_csv_matrix};
use crate::rents::census_rents;
use crate::sample::write_sample_points_csv;
use crate::zones::{
    load_area_units, read_area_unit_names, slice_features, write_centroids_csv,
    write_centroids_geojson,
};
use crate::{save_json, Mode};

/// A region of New Zealand, whose files all live in one directory. The only input that must
/// exist beforehand is `area_units.csv`, listing the names of the region's area units. Routed
/// trips can be supplied as `<mode>_commutes.csv` files.
pub struct Region {
    pub dir: PathBuf,
}

pub struct RegionOptions {
    /// Which property of the shapes names the area unit?
    pub name_key: String,
    /// Which column of `area_units.csv` names the area unit?
    pub name_column: usize,
    /// Only record rents for dwellings with at most this many bedrooms
    pub max_bedrooms: usize,
    /// How many random points per area unit estimate the trip from an area unit to itself?
    pub num_sample_points: usize,
    pub tariff: Tariff,
}

impl Default for RegionOptions {
    fn default() -> RegionOptions {
        RegionOptions {
            name_key: "AU2013_NAM".to_string(),
            name_column: 0,
            max_bedrooms: 5,
            num_sample_points: 100,
            tariff: Tariff::default(),
        }
    }
}

impl Region {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Region {
        Region { dir: dir.into() }
    }

    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|x| x.to_string_lossy().to_string())
            .unwrap_or_else(|| self.dir.display().to_string())
    }

    pub fn area_units_csv(&self) -> PathBuf {
        self.dir.join("area_units.csv")
    }

    pub fn shapes(&self) -> PathBuf {
        self.dir.join("shapes.geojson")
    }

    pub fn rents(&self) -> PathBuf {
        self.dir.join("rents.json")
    }

    pub fn centroids_csv(&self) -> PathBuf {
        self.dir.join("centroids.csv")
    }

    pub fn centroids_geojson(&self) -> PathBuf {
        self.dir.join("centroids.geojson")
    }

    pub fn sample_points(&self) -> PathBuf {
        self.dir.join("sample_points.csv")
    }

    pub fn bird_commutes(&self) -> PathBuf {
        self.dir.join("bird_commutes.json")
    }

    pub fn commute_costs(&self) -> PathBuf {
        self.dir.join("commute_costs.json")
    }

    pub fn commutes_csv(&self, mode: Mode) -> PathBuf {
        self.dir.join(csv_matrix_filename(mode))
    }

    /// Are there routed trips for every mode?
    pub fn has_csv_matrix(&self) -> bool {
        Mode::all()
            .into_iter()
            .all(|mode| self.commutes_csv(mode).exists())
    }

    /// Create every file for this region from national data. `master_shapes` is a GeoJSON file
    /// with all area units. `master_rents`, if present, is a census rents CSV file covering them.
    pub fn run<P: AsRef<Path>>(
        &self,
        master_shapes: P,
        master_rents: Option<P>,
        opts: &RegionOptions,
        rng: &mut StdRng,
    ) -> Result<()> {
        let name = self.name();
        let names = read_area_unit_names(self.area_units_csv(), opts.name_column)?;
        info!("Creating files for {} with {} area units", name, names.len());

        info!("{}: shapes", name);
        slice_features(master_shapes, &opts.name_key, &names, self.shapes())?;

        if let Some(master_rents) = master_rents {
            info!("{}: rents", name);
            let rents = census_rents(master_rents, &names, opts.max_bedrooms)?;
            save_json(&rents, self.rents())?;
        }

        info!("{}: centroids", name);
        let area_units = load_area_units(self.shapes(), &opts.name_key)?;
        write_centroids_csv(&area_units, self.centroids_csv())?;
        write_centroids_geojson(&area_units, &opts.name_key, self.centroids_geojson())?;

        info!("{}: sample points", name);
        write_sample_points_csv(
            &area_units,
            opts.num_sample_points,
            rng,
            self.sample_points(),
        )?;

        info!("{}: bird commutes", name);
        let bird = bird_matrix(&area_units, opts.num_sample_points, rng)?;
        bird.save(self.bird_commutes())?;

        let matrix = if self.has_csv_matrix() {
            info!("{}: commute costs from routed trips", name);
            let names: BTreeSet<String> = area_units.names().cloned().collect();
            load_csv_matrix(&self.dir, &names)?
        } else {
            info!("{}: commute costs from bird trips", name);
            bird
        };
        commute_costs(&matrix, &opts.tariff)?.save(self.commute_costs())?;

        Ok(())
    }
}
