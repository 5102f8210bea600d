#[macro_use]
extern crate log;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;

use aucommute::rents::{attach_rents, census_rents, AuSuburbLookup, Breakdown, SuburbRents};
use aucommute::sample::write_sample_points_csv;
use aucommute::zones::{
    read_area_unit_names, slice_features, write_centroids_csv, write_centroids_geojson,
};
use aucommute::{
    bird_matrix, commute_costs, load_area_units, load_csv_matrix, routed_matrix, save_json,
    AreaUnits, DistanceTimeMatrix, GoogleMaps, HttpOptions, Mapquest, Mode, Osrm, Region,
    RegionOptions, Router, Tariff,
};

#[derive(Parser)]
#[clap(about, version)]
struct Cli {
    /// One of error, warn, info, debug, trace
    #[clap(long, default_value = "info", global = true)]
    log_level: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy the area units listed in a CSV file from a national GeoJSON file
    SliceShapes {
        #[clap(flatten)]
        shapes: ShapesArgs,
        #[clap(flatten)]
        names: NamesArgs,
        /// Path to write the GeoJSON subset
        #[clap(long)]
        output: PathBuf,
    },
    /// Record median census rents by area unit and number of bedrooms
    CensusRents {
        /// Path to a CSV file with area unit, bedrooms, count, and median rent columns
        #[clap(long)]
        rents: PathBuf,
        #[clap(flatten)]
        names: NamesArgs,
        #[clap(long, default_value_t = 5)]
        max_bedrooms: usize,
        /// Path to write JSON output
        #[clap(long)]
        output: PathBuf,
    },
    /// Attach rents by suburb to area units, using a lookup table from area unit to suburb
    SuburbRents {
        /// Path to a CSV file with region, suburb, property type, bedrooms, and rent columns
        #[clap(long)]
        rents: PathBuf,
        /// Path to a CSV file with area unit and suburb columns
        #[clap(long)]
        lookup: PathBuf,
        /// Keep separate rents per property type. Otherwise just use the totals.
        #[clap(long)]
        by_property: bool,
        /// Only use rents from these rent regions. If unspecified, use all of them.
        #[clap(long = "region")]
        regions: Vec<String>,
        /// A GeoJSON file of area units to attach rents to
        #[clap(long)]
        shapes: Option<PathBuf>,
        #[clap(long, default_value = "AU2013_NAM")]
        name_key: String,
        /// Path to write the GeoJSON file with rents attached. Requires --shapes.
        #[clap(long)]
        output_geojson: Option<PathBuf>,
        /// Path to write JSON rents by area unit
        #[clap(long)]
        output_json: Option<PathBuf>,
    },
    /// Calculate the centroid of every area unit
    Centroids {
        #[clap(flatten)]
        shapes: ShapesArgs,
        #[clap(long)]
        output_csv: Option<PathBuf>,
        #[clap(long)]
        output_geojson: Option<PathBuf>,
    },
    /// Pick random points inside every area unit
    SamplePoints {
        #[clap(flatten)]
        shapes: ShapesArgs,
        #[clap(flatten)]
        sampling: SamplingArgs,
        #[clap(long)]
        output: PathBuf,
    },
    /// Estimate trips between all area units as the bird flies
    BirdMatrix {
        #[clap(flatten)]
        shapes: ShapesArgs,
        #[clap(flatten)]
        sampling: SamplingArgs,
        #[clap(long)]
        output: PathBuf,
    },
    /// Estimate trips between all area units using a routing service
    RoutedMatrix {
        #[clap(flatten)]
        shapes: ShapesArgs,
        #[clap(flatten)]
        sampling: SamplingArgs,
        /// One of osrm, mapquest, google
        #[clap(long)]
        router: RouterKind,
        /// Which modes to route. If unspecified, every mode the router supports.
        #[clap(long = "mode")]
        modes: Vec<Mode>,
        #[clap(long, default_value = "https://router.project-osrm.org")]
        osrm_address: String,
        #[clap(long, env = "GOOGLE_MAPS_API_KEY")]
        google_key: Option<String>,
        #[clap(long, env = "MAPQUEST_API_KEY")]
        mapquest_key: Option<String>,
        /// Plan Google transit trips to arrive at this Unix timestamp
        #[clap(long)]
        transit_arrival_time: Option<u64>,
        /// Wait this many milliseconds before every request
        #[clap(long, default_value_t = 0)]
        pause_ms: u64,
        #[clap(long, default_value_t = 30)]
        timeout_secs: u64,
        #[clap(long)]
        output: PathBuf,
    },
    /// Arrange routed trips from per-mode CSV files into a matrix
    CsvMatrix {
        #[clap(flatten)]
        shapes: ShapesArgs,
        /// The directory containing <mode>_commutes.csv files
        #[clap(long)]
        dir: PathBuf,
        #[clap(long)]
        output: PathBuf,
    },
    /// Turn a distance and time matrix into daily commute costs
    CommuteCosts {
        /// A JSON matrix from bird-matrix, routed-matrix, or csv-matrix
        #[clap(long)]
        matrix: PathBuf,
        /// A JSON file with cost_per_km by mode and trips_per_day. Defaults to NZ rates.
        #[clap(long)]
        tariff: Option<PathBuf>,
        #[clap(long)]
        output: PathBuf,
    },
    /// Print the name of the area unit containing a point
    Locate {
        #[clap(flatten)]
        shapes: ShapesArgs,
        #[clap(long, allow_hyphen_values = true)]
        lon: f64,
        #[clap(long, allow_hyphen_values = true)]
        lat: f64,
    },
    /// Create every file for one region
    Region {
        /// The region's directory, containing area_units.csv
        #[clap(long)]
        dir: PathBuf,
        /// A GeoJSON file with every area unit
        #[clap(long)]
        master_shapes: PathBuf,
        /// A census rents CSV file covering every area unit
        #[clap(long)]
        master_rents: Option<PathBuf>,
        #[clap(long, default_value = "AU2013_NAM")]
        name_key: String,
        #[clap(long, default_value_t = 0)]
        name_column: usize,
        #[clap(long, default_value_t = 5)]
        max_bedrooms: usize,
        #[clap(long)]
        tariff: Option<PathBuf>,
        #[clap(flatten)]
        sampling: SamplingArgs,
    },
}

#[derive(Args)]
struct ShapesArgs {
    /// Path to a GeoJSON file with WGS84 area unit polygons
    #[clap(long)]
    shapes: PathBuf,
    /// Which property names the area unit?
    #[clap(long, default_value = "AU2013_NAM")]
    name_key: String,
}

impl ShapesArgs {
    fn load(&self) -> Result<AreaUnits> {
        let area_units = load_area_units(&self.shapes, &self.name_key)?;
        info!("Loaded {} area units", area_units.len());
        Ok(area_units)
    }
}

#[derive(Args)]
struct NamesArgs {
    /// Path to a CSV file listing area unit names
    #[clap(long)]
    area_units: PathBuf,
    /// Which column of --area-units has the names?
    #[clap(long, default_value_t = 0)]
    name_column: usize,
}

impl NamesArgs {
    fn load(&self) -> Result<BTreeSet<String>> {
        read_area_unit_names(&self.area_units, self.name_column)
    }
}

#[derive(Args)]
struct SamplingArgs {
    /// How many random points per area unit
    #[clap(long, default_value_t = 100)]
    sample_points: usize,
    /// By default, the output will be identical between runs. Change this to pick different
    /// random points.
    #[clap(long, default_value_t = 42)]
    rng_seed: u64,
}

impl SamplingArgs {
    fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.rng_seed)
    }
}

#[derive(Clone, Copy)]
enum RouterKind {
    Osrm,
    Mapquest,
    Google,
}

impl FromStr for RouterKind {
    type Err = anyhow::Error;

    fn from_str(x: &str) -> Result<RouterKind> {
        match x {
            "osrm" => Ok(RouterKind::Osrm),
            "mapquest" => Ok(RouterKind::Mapquest),
            "google" => Ok(RouterKind::Google),
            _ => bail!("Unknown router {x}; use osrm, mapquest, or google"),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = log::Level::from_str(&cli.log_level)
        .map_err(|_| anyhow!("Unknown log level {}", cli.log_level))?;
    simple_logger::init_with_level(level)
        .map_err(|err| anyhow!("Couldn't set up logging: {}", err))?;

    match cli.command {
        Command::SliceShapes {
            shapes,
            names,
            output,
        } => {
            slice_features(&shapes.shapes, &shapes.name_key, &names.load()?, &output)?;
            info!("Wrote {}", output.display());
        }
        Command::CensusRents {
            rents,
            names,
            max_bedrooms,
            output,
        } => {
            let rents = census_rents(&rents, &names.load()?, max_bedrooms)?;
            save_json(&rents, &output)?;
            info!("Wrote {}", output.display());
        }
        Command::SuburbRents {
            rents,
            lookup,
            by_property,
            regions,
            shapes,
            name_key,
            output_geojson,
            output_json,
        } => {
            let breakdown = if by_property {
                Breakdown::ByProperty
            } else {
                Breakdown::TotalOnly
            };
            let regions: BTreeSet<String> = regions.into_iter().collect();
            let rents = SuburbRents::load(
                &rents,
                breakdown,
                if regions.is_empty() {
                    None
                } else {
                    Some(&regions)
                },
            )?;
            info!("Read rents for {} suburbs", rents.by_suburb.len());
            let by_au = rents.by_area_unit(&AuSuburbLookup::load(&lookup)?)?;

            if let Some(path) = output_json {
                save_json(&by_au, &path)?;
                info!("Wrote {}", path.display());
            }
            match (shapes, output_geojson) {
                (Some(shapes), Some(path)) => {
                    let property_key = match breakdown {
                        Breakdown::ByProperty => "rent_by_nbedrooms_by_property",
                        Breakdown::TotalOnly => "rent_by_nbedrooms",
                    };
                    attach_rents(&shapes, &name_key, property_key, &by_au, &path)?;
                    info!("Wrote {}", path.display());
                }
                (None, Some(_)) => bail!("--output-geojson requires --shapes"),
                _ => {}
            }
        }
        Command::Centroids {
            shapes,
            output_csv,
            output_geojson,
        } => {
            let area_units = shapes.load()?;
            if let Some(path) = output_csv {
                write_centroids_csv(&area_units, &path)?;
                info!("Wrote {}", path.display());
            }
            if let Some(path) = output_geojson {
                write_centroids_geojson(&area_units, &shapes.name_key, &path)?;
                info!("Wrote {}", path.display());
            }
        }
        Command::SamplePoints {
            shapes,
            sampling,
            output,
        } => {
            let area_units = shapes.load()?;
            write_sample_points_csv(
                &area_units,
                sampling.sample_points,
                &mut sampling.rng(),
                &output,
            )?;
            info!("Wrote {}", output.display());
        }
        Command::BirdMatrix {
            shapes,
            sampling,
            output,
        } => {
            let area_units = shapes.load()?;
            let matrix = bird_matrix(&area_units, sampling.sample_points, &mut sampling.rng())?;
            save_matrix(&matrix, &output)?;
        }
        Command::RoutedMatrix {
            shapes,
            sampling,
            router,
            modes,
            osrm_address,
            google_key,
            mapquest_key,
            transit_arrival_time,
            pause_ms,
            timeout_secs,
            output,
        } => {
            let opts = HttpOptions {
                timeout: Duration::from_secs(timeout_secs),
                pause: Duration::from_millis(pause_ms),
            };
            let router: Box<dyn Router> = match router {
                RouterKind::Osrm => Box::new(Osrm::new(osrm_address, &opts)?),
                RouterKind::Mapquest => {
                    let key = mapquest_key
                        .ok_or_else(|| anyhow!("Set --mapquest-key or MAPQUEST_API_KEY"))?;
                    Box::new(Mapquest::new(key, &opts)?)
                }
                RouterKind::Google => {
                    let key = google_key
                        .ok_or_else(|| anyhow!("Set --google-key or GOOGLE_MAPS_API_KEY"))?;
                    let mut google = GoogleMaps::new(key, &opts)?;
                    if let Some(time) = transit_arrival_time {
                        google.transit_arrival_time = time;
                    }
                    Box::new(google)
                }
            };
            let modes = if modes.is_empty() {
                Mode::all()
                    .into_iter()
                    .filter(|mode| router.supports(*mode))
                    .collect()
            } else {
                modes
            };

            let area_units = shapes.load()?;
            let matrix = routed_matrix(
                &area_units,
                router.as_ref(),
                &modes,
                sampling.sample_points,
                &mut sampling.rng(),
            )?;
            save_matrix(&matrix, &output)?;
        }
        Command::CsvMatrix {
            shapes,
            dir,
            output,
        } => {
            let area_units = shapes.load()?;
            let names: BTreeSet<String> = area_units.names().cloned().collect();
            let matrix = load_csv_matrix(&dir, &names)?;
            save_matrix(&matrix, &output)?;
        }
        Command::CommuteCosts {
            matrix,
            tariff,
            output,
        } => {
            let matrix = DistanceTimeMatrix::load(&matrix)?;
            let tariff = match tariff {
                Some(path) => Tariff::load(&path)?,
                None => Tariff::default(),
            };
            commute_costs(&matrix, &tariff)?.save(&output)?;
            info!("Wrote {}", output.display());
        }
        Command::Locate { shapes, lon, lat } => {
            let area_units = shapes.load()?;
            match area_units.locate(lon, lat) {
                Some(au) => println!("{}", au.name),
                None => bail!("No area unit contains {lon}, {lat}"),
            }
        }
        Command::Region {
            dir,
            master_shapes,
            master_rents,
            name_key,
            name_column,
            max_bedrooms,
            tariff,
            sampling,
        } => {
            let opts = RegionOptions {
                name_key,
                name_column,
                max_bedrooms,
                num_sample_points: sampling.sample_points,
                tariff: match tariff {
                    Some(path) => Tariff::load(&path)?,
                    None => Tariff::default(),
                },
            };
            Region::new(dir).run(master_shapes, master_rents, &opts, &mut sampling.rng())?;
        }
    }
    Ok(())
}

fn save_matrix(matrix: &DistanceTimeMatrix, path: &Path) -> Result<()> {
    matrix.save(path)?;
    info!(
        "Wrote {} with {} area units and modes {:?}",
        path.display(),
        matrix.len(),
        matrix.matrix.keys().collect::<Vec<_>>()
    );
    Ok(())
}
