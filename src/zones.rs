use std::collections::{BTreeMap, BTreeSet};
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Result};
use fs_err::File;
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::centroid::Centroid;
use geo::algorithm::contains::Contains;
use geo_types::{MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, FeatureReader, GeoJson};
use rstar::{RTree, RTreeObject, AABB};
use serde_json::{Map, Value};

use crate::distance::round_to;
use crate::nztm;

/// A census area unit. Geometry is stored in NZTM, so areas and distances in the plane are
/// meaningful.
#[derive(Clone, Debug)]
pub struct AreaUnit {
    pub name: String,
    pub polygon: MultiPolygon<f64>,
    pub centroid: Point<f64>,
}

impl AreaUnit {
    pub fn centroid_wgs84(&self) -> Point<f64> {
        nztm::unproject_point(self.centroid)
    }
}

/// Area units keyed by name, with a spatial index for finding the one containing a point.
pub struct AreaUnits {
    by_name: BTreeMap<String, AreaUnit>,
    tree: RTree<AreaUnitBounds>,
}

struct AreaUnitBounds {
    name: String,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for AreaUnitBounds {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl AreaUnits {
    pub fn new(units: Vec<AreaUnit>) -> AreaUnits {
        let mut by_name = BTreeMap::new();
        let mut bounds = Vec::new();
        for au in units {
            if let Some(rect) = au.polygon.bounding_rect() {
                let min = rect.min();
                let max = rect.max();
                bounds.push(AreaUnitBounds {
                    name: au.name.clone(),
                    envelope: AABB::from_corners([min.x, min.y], [max.x, max.y]),
                });
            }
            if let Some(old) = by_name.insert(au.name.clone(), au) {
                warn!("Multiple area units named {}; keeping the last", old.name);
            }
        }
        AreaUnits {
            by_name,
            tree: RTree::bulk_load(bounds),
        }
    }

    /// In order of name
    pub fn iter(&self) -> impl Iterator<Item = &AreaUnit> {
        self.by_name.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.by_name.keys()
    }

    pub fn get(&self, name: &str) -> Option<&AreaUnit> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Find the area unit containing a WGS84 point, like a workplace picked on a map.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&AreaUnit> {
        let pt = nztm::project_point(Point::new(lon, lat));
        let envelope = AABB::from_point([pt.x(), pt.y()]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|bounds| self.by_name.get(&bounds.name))
            .find(|au| au.polygon.contains(&pt))
    }
}

/// Extract area units from a GeoJSON file of WGS84 polygons and multipolygons, using the
/// provided `name_key` property as the name. Each one is projected to NZTM and its centroid
/// calculated there.
///
/// Features with any other geometry are skipped.
pub fn load_area_units<P: AsRef<Path>>(geojson_path: P, name_key: &str) -> Result<AreaUnits> {
    let reader = FeatureReader::from_reader(BufReader::new(File::open(geojson_path.as_ref())?));
    let mut units = Vec::new();
    for feature in reader.features() {
        let feature = feature?;
        let name = if let Some(name) = feature.property(name_key).and_then(|x| x.as_str()) {
            name.to_string()
        } else {
            bail!(
                "Feature doesn't have a string area unit name {}: {:?}",
                name_key,
                feature.properties
            );
        };

        let gj_geom = if let Some(geom) = feature.geometry {
            geom
        } else {
            warn!("Skipping {name}, which has no geometry");
            continue;
        };
        let geo_geometry: geo_types::Geometry<f64> = gj_geom.try_into()?;
        let polygon: MultiPolygon<f64> = match geo_geometry {
            geo_types::Geometry::MultiPolygon(mp) => mp,
            geo_types::Geometry::Polygon(p) => p.into(),
            other => {
                warn!(
                    "Skipping {name}, which is a {} rather than a polygon",
                    geometry_type(&other)
                );
                continue;
            }
        };

        let polygon = nztm::project_multipolygon(&polygon);
        let centroid = if let Some(pt) = polygon.centroid() {
            pt
        } else {
            warn!("Skipping {name}, which is empty");
            continue;
        };
        units.push(AreaUnit {
            name,
            polygon,
            centroid,
        });
    }
    Ok(AreaUnits::new(units))
}

/// Read area unit names from one column of a CSV file with a header row.
pub fn read_area_unit_names<P: AsRef<Path>>(
    csv_path: P,
    column: usize,
) -> Result<BTreeSet<String>> {
    let csv_path = csv_path.as_ref();
    let mut names = BTreeSet::new();
    for rec in csv::Reader::from_reader(File::open(csv_path)?).records() {
        let rec = rec?;
        if let Some(name) = rec.get(column) {
            names.insert(name.to_string());
        } else {
            warn!(
                "Skipping a row in {} without column {}: {:?}",
                csv_path.display(),
                column,
                rec
            );
        }
    }
    Ok(names)
}

/// Copy the features whose `name_key` property is one of `names` to a new GeoJSON file. Returns
/// the names that had no feature.
pub fn slice_features<P1: AsRef<Path>, P2: AsRef<Path>>(
    geojson_path: P1,
    name_key: &str,
    names: &BTreeSet<String>,
    output_path: P2,
) -> Result<BTreeSet<String>> {
    let collection = read_feature_collection(geojson_path)?;
    let mut found = BTreeSet::new();
    let mut features = Vec::new();
    for feature in collection.features {
        if let Some(name) = feature.property(name_key).and_then(|x| x.as_str()) {
            if names.contains(name) {
                found.insert(name.to_string());
                features.push(feature);
            }
        }
    }
    info!("Kept {} of {} area units", features.len(), names.len());

    let missing: BTreeSet<String> = names.difference(&found).cloned().collect();
    if !missing.is_empty() {
        warn!("Missing shapes for {:?}", missing);
    }

    write_feature_collection(features, output_path)?;
    Ok(missing)
}

/// Write each area unit's WGS84 centroid to a CSV file.
pub fn write_centroids_csv<P: AsRef<Path>>(area_units: &AreaUnits, path: P) -> Result<()> {
    let mut writer = csv::Writer::from_writer(File::create(path.as_ref())?);
    writer.write_record([
        "2013 area unit name",
        "WGS84 longitude of centroid of area unit",
        "WGS84 latitude of centroid of area unit",
    ])?;
    for au in area_units.iter() {
        let pt = au.centroid_wgs84();
        writer.write_record([
            au.name.clone(),
            round_to(pt.x(), 5).to_string(),
            round_to(pt.y(), 5).to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write each area unit's WGS84 centroid as a point feature, named by the `name_key` property.
pub fn write_centroids_geojson<P: AsRef<Path>>(
    area_units: &AreaUnits,
    name_key: &str,
    path: P,
) -> Result<()> {
    let features = area_units
        .iter()
        .map(|au| {
            let pt = au.centroid_wgs84();
            let pt = Point::new(round_to(pt.x(), 5), round_to(pt.y(), 5));
            let mut properties = Map::new();
            properties.insert(name_key.to_string(), Value::String(au.name.clone()));
            Feature {
                geometry: Some(geojson::Geometry {
                    value: geojson::Value::from(&pt),
                    bbox: None,
                    foreign_members: None,
                }),
                properties: Some(properties),
                bbox: None,
                id: None,
                foreign_members: None,
            }
        })
        .collect();
    write_feature_collection(features, path)
}

pub(crate) fn read_feature_collection<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let gj: GeoJson = fs_err::read_to_string(path.as_ref())?.parse()?;
    Ok(FeatureCollection::try_from(gj)?)
}

pub(crate) fn write_feature_collection<P: AsRef<Path>>(
    features: Vec<Feature>,
    path: P,
) -> Result<()> {
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    fs_err::write(path.as_ref(), GeoJson::from(collection).to_string())?;
    Ok(())
}

fn geometry_type(geom: &geo_types::Geometry<f64>) -> &'static str {
    match geom {
        geo_types::Geometry::Point(_) => "Point",
        geo_types::Geometry::MultiPoint(_) => "MultiPoint",
        geo_types::Geometry::LineString(_) => "LineString",
        geo_types::Geometry::MultiLineString(_) => "MultiLineString",
        geo_types::Geometry::GeometryCollection(_) => "GeometryCollection",
        _ => "non-polygon geometry",
    }
}
