//! Attach rent statistics to area units. Rents come either by suburb, needing a lookup table from
//! area unit to suburb, or directly by area unit from the census.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use fs_err::File;
use serde_json::Value;

use crate::zones::{read_feature_collection, write_feature_collection};

/// Rents keyed by number of bedrooms. The keys are kept as strings, since sources use values like
/// "5+".
pub type RentByBedrooms = BTreeMap<String, f64>;

/// Area units without any rent data are marked with this, rather than omitted.
pub const NO_DATA: &str = "NA";

const TOTAL_PROPERTY: &str = "Total";

/// How to break down the rents of each suburb.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Breakdown {
    /// Keep a separate table for every property type (house, apartment, etc), ignoring the
    /// aggregate "Total" rows.
    ByProperty,
    /// Only keep the aggregate "Total" rows.
    TotalOnly,
}

/// Rent statistics per suburb.
pub struct SuburbRents {
    pub breakdown: Breakdown,
    /// Suburb, then property type, then number of bedrooms
    pub by_suburb: BTreeMap<String, BTreeMap<String, RentByBedrooms>>,
}

impl SuburbRents {
    /// Read a CSV file with a header row, where each row has a rent region, suburb, property type,
    /// number of bedrooms, and the rent in its last column. If `regions` is specified, only keep
    /// rows from those rent regions. When a suburb, property, and bedroom count appears more than
    /// once, the first row wins.
    pub fn load<P: AsRef<Path>>(
        csv_path: P,
        breakdown: Breakdown,
        regions: Option<&BTreeSet<String>>,
    ) -> Result<SuburbRents> {
        let csv_path = csv_path.as_ref();
        let mut by_suburb: BTreeMap<String, BTreeMap<String, RentByBedrooms>> = BTreeMap::new();
        let mut skipped = 0;
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(File::open(csv_path)?);
        for rec in reader.into_records() {
            let rec = rec?;
            if rec.len() < 5 {
                warn!("Skipping short row in {}: {:?}", csv_path.display(), rec);
                continue;
            }
            let (region, suburb, property, bedrooms) = (&rec[0], &rec[1], &rec[2], &rec[3]);
            if let Some(regions) = regions {
                if !regions.contains(region) {
                    continue;
                }
            }
            let keep = match breakdown {
                Breakdown::ByProperty => property != TOTAL_PROPERTY,
                Breakdown::TotalOnly => property == TOTAL_PROPERTY,
            };
            if !keep {
                continue;
            }
            let rent = if let Ok(rent) = rec[rec.len() - 1].parse::<f64>() {
                rent
            } else {
                debug!("No numeric rent in {:?}", rec);
                skipped += 1;
                continue;
            };

            by_suburb
                .entry(suburb.to_string())
                .or_default()
                .entry(property.to_string())
                .or_default()
                .entry(bedrooms.to_string())
                .or_insert(rent);
        }
        if skipped > 0 {
            info!(
                "Skipped {} rows of {} without a numeric rent",
                skipped,
                csv_path.display()
            );
        }
        Ok(SuburbRents {
            breakdown,
            by_suburb,
        })
    }

    /// Express rents by area unit instead of suburb. For `Breakdown::ByProperty`, each area unit
    /// gets property type -> bedrooms -> rent; for `Breakdown::TotalOnly`, just bedrooms -> rent.
    /// Area units without a suburb, or whose suburb has no rents, get `NO_DATA`.
    pub fn by_area_unit(&self, lookup: &AuSuburbLookup) -> Result<BTreeMap<String, Value>> {
        let mut result = BTreeMap::new();
        for (au, suburb) in &lookup.suburb_by_au {
            let value = match suburb.as_ref().and_then(|s| self.by_suburb.get(s)) {
                Some(per_property) => match self.breakdown {
                    Breakdown::ByProperty => serde_json::to_value(per_property)?,
                    Breakdown::TotalOnly => match per_property.get(TOTAL_PROPERTY) {
                        Some(rents) => serde_json::to_value(rents)?,
                        None => Value::String(NO_DATA.to_string()),
                    },
                },
                None => {
                    if let Some(suburb) = suburb {
                        warn!("{} maps to suburb {}, which has no rents", au, suburb);
                    }
                    Value::String(NO_DATA.to_string())
                }
            };
            result.insert(au.clone(), value);
        }
        Ok(result)
    }
}

/// Which rent suburb each area unit belongs to, if any.
pub struct AuSuburbLookup {
    pub suburb_by_au: BTreeMap<String, Option<String>>,
}

impl AuSuburbLookup {
    /// Read a CSV file with a header row, where each row has an area unit and a suburb. A blank
    /// suburb means there's no rent data for that area unit.
    pub fn load<P: AsRef<Path>>(csv_path: P) -> Result<AuSuburbLookup> {
        let csv_path = csv_path.as_ref();
        let mut suburb_by_au = BTreeMap::new();
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(File::open(csv_path)?);
        for rec in reader.into_records() {
            let rec = rec?;
            let au = if let Some(au) = rec.get(0).filter(|au| !au.is_empty()) {
                au.to_string()
            } else {
                warn!("Skipping row without an area unit in {}: {:?}", csv_path.display(), rec);
                continue;
            };
            let suburb = rec
                .get(1)
                .filter(|suburb| !suburb.is_empty())
                .map(|suburb| suburb.to_string());
            suburb_by_au.insert(au, suburb);
        }
        Ok(AuSuburbLookup { suburb_by_au })
    }
}

/// Copy a GeoJSON file, setting the `property_key` property of every feature to the rents of its
/// area unit, named by `name_key`. Features of area units absent from `rents` get `NO_DATA`.
pub fn attach_rents<P1: AsRef<Path>, P2: AsRef<Path>>(
    geojson_path: P1,
    name_key: &str,
    property_key: &str,
    rents: &BTreeMap<String, Value>,
    output_path: P2,
) -> Result<()> {
    let mut collection = read_feature_collection(geojson_path)?;
    for feature in &mut collection.features {
        let name = if let Some(name) = feature.property(name_key).and_then(|x| x.as_str()) {
            name.to_string()
        } else {
            warn!("Leaving a feature without a {} name alone", name_key);
            continue;
        };
        let value = rents
            .get(&name)
            .cloned()
            .unwrap_or_else(|| Value::String(NO_DATA.to_string()));
        feature.set_property(property_key, value);
    }
    write_feature_collection(collection.features, output_path)
}

/// Median weekly rent by area unit, then number of bedrooms. Every area unit in `names` and every
/// bedroom count from 1 to `max_bedrooms` is present, with None when there's no data.
pub type CensusRents = BTreeMap<String, BTreeMap<usize, Option<u32>>>;

/// Read census rents from a CSV file with a header row, where each row has an area unit, number of
/// bedrooms, count of dwellings, and median weekly rent. Only area units in `names` and dwellings
/// with at most `max_bedrooms` are kept.
pub fn census_rents<P: AsRef<Path>>(
    csv_path: P,
    names: &BTreeSet<String>,
    max_bedrooms: usize,
) -> Result<CensusRents> {
    let csv_path = csv_path.as_ref();
    let mut result: CensusRents = names
        .iter()
        .map(|name| {
            (
                name.clone(),
                (1..=max_bedrooms).map(|bedrooms| (bedrooms, None)).collect(),
            )
        })
        .collect();

    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(File::open(csv_path)?);
    for rec in reader.into_records() {
        let rec = rec?;
        if rec.len() < 4 {
            warn!("Skipping short row in {}: {:?}", csv_path.display(), rec);
            continue;
        }
        let per_bedrooms = if let Some(x) = result.get_mut(&rec[0]) {
            x
        } else {
            continue;
        };
        let bedrooms = match rec[1].parse::<usize>() {
            Ok(n) if (1..=max_bedrooms).contains(&n) => n,
            _ => continue,
        };
        // Null rents are already recorded
        if let Ok(rent) = rec[3].parse::<f64>() {
            per_bedrooms.insert(bedrooms, Some(rent.round() as u32));
        }
    }

    let without_rents: Vec<&String> = result
        .iter()
        .filter(|(_, per_bedrooms)| per_bedrooms.values().all(|rent| rent.is_none()))
        .map(|(name, _)| name)
        .collect();
    if !without_rents.is_empty() {
        warn!("No rents for {:?}", without_rents);
    }
    Ok(result)
}
