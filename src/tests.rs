use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{bail, Result};
use geo_types::{coord, LineString, MultiPolygon, Point, Polygon};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

use crate::costs::{commute_costs, CommuteCosts, Tariff};
use crate::distance::{bird_distance_and_time, haversine_km, round_to};
use crate::matrix::{bird_matrix, load_csv_matrix, routed_matrix, DistanceTimeMatrix, Journey};
use crate::rents::{attach_rents, census_rents, AuSuburbLookup, Breakdown, SuburbRents, NO_DATA};
use crate::routing::{matrix_in_blocks, GoogleMaps, HttpOptions, Mapquest, Osrm, Router};
use crate::sample::{median, sample_points};
use crate::zones::{
    load_area_units, read_area_unit_names, slice_features, write_centroids_csv,
    write_centroids_geojson, AreaUnits,
};
use crate::{nztm, save_json, Mode, Region, RegionOptions};

const NAME_KEY: &str = "AU2013_NAM";

fn area_units() -> AreaUnits {
    load_area_units("data/shapes.geojson", NAME_KEY).unwrap()
}

fn csv_names() -> BTreeSet<String> {
    ["Kelburn", "Te Aro", "Thorndon"]
        .into_iter()
        .map(|x| x.to_string())
        .collect()
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("aucommute_test_{name}"));
    let _ = fs_err::remove_dir_all(&dir);
    fs_err::create_dir_all(&dir).unwrap();
    dir
}

fn assert_close(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "{} isn't within {} of {}",
        actual,
        epsilon,
        expected
    );
}

#[test]
fn test_projection() {
    let pt = nztm::project(coord! { x: 174.739869, y: -36.840417 });
    assert_close(pt.x, 1_755_136.384, 1e-3);
    assert_close(pt.y, 5_921_417.890, 1e-3);

    for (lon, lat) in [(174.775, -41.285), (166.5, -46.0), (178.5, -37.5)] {
        let back = nztm::unproject(nztm::project(coord! { x: lon, y: lat }));
        assert_close(back.x, lon, 1e-7);
        assert_close(back.y, lat, 1e-7);
    }
}

#[test]
fn test_load_area_units() {
    let area_units = area_units();
    // The wharf is a point, not a polygon
    assert_eq!(
        area_units.names().cloned().collect::<Vec<_>>(),
        vec!["Karori", "Kelburn", "Te Aro", "Thorndon"]
    );

    for (name, lon, lat) in [
        ("Kelburn", 174.755, -41.285),
        ("Te Aro", 174.775, -41.295),
        // The hole is in the middle, so it doesn't move the centroid
        ("Thorndon", 174.775, -41.275),
    ] {
        let centroid = area_units.get(name).unwrap().centroid_wgs84();
        assert_close(centroid.x(), lon, 1e-4);
        assert_close(centroid.y(), lat, 1e-4);
    }
}

#[test]
fn test_locate() {
    let area_units = area_units();
    let name = |lon, lat| area_units.locate(lon, lat).map(|au| au.name.clone());

    assert_eq!(name(174.772, -41.298), Some("Te Aro".to_string()));
    assert_eq!(name(174.771, -41.279), Some("Thorndon".to_string()));
    // Either half of the multipolygon works
    assert_eq!(name(174.752, -41.288), Some("Kelburn".to_string()));
    assert_eq!(name(174.758, -41.282), Some("Kelburn".to_string()));
    // Inside Thorndon's hole
    assert_eq!(name(174.775, -41.275), None);
    assert_eq!(name(170.0, -45.0), None);
}

#[test]
fn test_centroid_outputs() {
    let area_units = load_area_units("data/lopsided.geojson", NAME_KEY).unwrap();
    let dir = temp_dir("centroid_outputs");
    write_centroids_csv(&area_units, dir.join("centroids.csv")).unwrap();
    write_centroids_geojson(&area_units, NAME_KEY, dir.join("centroids.geojson")).unwrap();

    let mut reader = csv::Reader::from_path(dir.join("centroids.csv")).unwrap();
    assert_eq!(
        reader.headers().unwrap().iter().collect::<Vec<_>>(),
        vec![
            "2013 area unit name",
            "WGS84 longitude of centroid of area unit",
            "WGS84 latitude of centroid of area unit",
        ]
    );
    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|rec| rec.unwrap().iter().map(|x| x.to_string()).collect())
        .collect();
    assert_eq!(
        rows,
        vec![
            // The hole is in the lower left, so the centroid is up and right of the square's
            // middle at (174.75, -41.31)
            vec!["Berhampore", "174.75049", "-41.30951"],
            // Weighted by area, so close to the big part. The mean of the two parts' centroids
            // would be 174.72125.
            vec!["Newtown", "174.71132", "-41.29044"],
        ]
    );

    let gj: geojson::GeoJson = fs_err::read_to_string(dir.join("centroids.geojson"))
        .unwrap()
        .parse()
        .unwrap();
    let collection = geojson::FeatureCollection::try_from(gj).unwrap();
    let points: Vec<(Value, geojson::Value)> = collection
        .features
        .into_iter()
        .map(|f| {
            (
                Value::Object(f.properties.unwrap()),
                f.geometry.unwrap().value,
            )
        })
        .collect();
    assert_eq!(
        points,
        vec![
            (
                json!({ NAME_KEY: "Berhampore" }),
                geojson::Value::Point(vec![174.75049, -41.30951])
            ),
            (
                json!({ NAME_KEY: "Newtown" }),
                geojson::Value::Point(vec![174.71132, -41.29044])
            ),
        ]
    );
}

#[cfg(target_os = "linux")]
#[test]
fn test_failed_json_writes_are_errors() {
    let area_units = area_units();
    let mut rng = StdRng::seed_from_u64(42);
    let matrix = bird_matrix(&area_units, 5, &mut rng).unwrap();
    let costs = commute_costs(&matrix, &Tariff::default()).unwrap();

    // Every write to /dev/full fails with "no space left on device"
    assert!(save_json(&vec![1, 2, 3], "/dev/full").is_err());
    assert!(matrix.save("/dev/full").is_err());
    assert!(costs.save("/dev/full").is_err());
}

#[test]
fn test_sample_points() {
    let area_units = area_units();
    let thorndon = area_units.get("Thorndon").unwrap();
    let hole = Polygon::new(
        LineString::from(vec![
            (174.773, -41.277),
            (174.777, -41.277),
            (174.777, -41.273),
            (174.773, -41.273),
            (174.773, -41.277),
        ]),
        Vec::new(),
    );
    let hole = nztm::project_multipolygon(&MultiPolygon::new(vec![hole]));

    let mut rng = StdRng::seed_from_u64(42);
    let points = sample_points(&thorndon.polygon, 200, &mut rng).unwrap();
    assert_eq!(points.len(), 200);
    for pt in points {
        let pt = nztm::unproject_point(pt);
        assert_eq!(
            area_units.locate(pt.x(), pt.y()).map(|au| au.name.as_str()),
            Some("Thorndon")
        );
        assert!(!geo::Contains::contains(&hole, &nztm::project_point(pt)));
    }
}

#[test]
fn test_sample_points_gives_up() {
    // No area, so no point is ever inside
    let flat = MultiPolygon::new(vec![Polygon::new(
        LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (0.0, 0.0)]),
        Vec::new(),
    )]);
    let mut rng = StdRng::seed_from_u64(42);
    assert!(sample_points(&flat, 2, &mut rng).is_err());
    assert!(sample_points(&MultiPolygon::new(Vec::new()), 2, &mut rng).is_err());
}

#[test]
fn test_median() {
    assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
    assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), Some(2.5));
    assert_eq!(median(vec![f64::NAN, 5.0]), Some(5.0));
    assert_eq!(median(Vec::new()), None);
}

#[test]
fn test_bird_distance() {
    // About 2.22km north-south
    let a = Point::new(174.775, -41.295);
    let b = Point::new(174.775, -41.275);
    assert_close(haversine_km(a, b), 2.224, 0.005);
    let journey = bird_distance_and_time(a, b);
    assert_eq!(journey, Journey::new(2.22, 0.06));
    assert_eq!(round_to(1.23456, 2), 1.23);
}

#[test]
fn test_bird_matrix() {
    let area_units = area_units();
    let mut rng = StdRng::seed_from_u64(42);
    let matrix = bird_matrix(&area_units, 10, &mut rng).unwrap();
    assert_eq!(matrix.len(), 4);
    assert_eq!(
        matrix.matrix.keys().copied().collect::<Vec<_>>(),
        Mode::all()
    );

    let car = matrix.get(Mode::Car, "Te Aro", "Thorndon").unwrap();
    assert_eq!(car, Journey::new(2.22, 0.06));
    assert_eq!(matrix.get(Mode::Car, "Thorndon", "Te Aro"), Some(car));
    for mode in Mode::all() {
        let journey = matrix.get(mode, "Te Aro", "Thorndon").unwrap();
        assert_eq!(journey.distance_km, car.distance_km);
        assert_close(
            journey.hours.unwrap(),
            0.06 * mode.bird_time_factor(),
            1e-9,
        );
    }

    // Trips within an area unit are never longer than half its diagonal
    for name in area_units.names() {
        let journey = matrix.get(Mode::Car, name, name).unwrap();
        let km = journey.distance_km.unwrap();
        assert!(km > 0.0 && km < 1.01, "{} to itself is {}km", name, km);
    }

    let dir = temp_dir("bird_matrix");
    matrix.save(dir.join("bird.json")).unwrap();
    let loaded = DistanceTimeMatrix::load(dir.join("bird.json")).unwrap();
    assert_eq!(loaded.index_by_name, matrix.index_by_name);
    assert_eq!(loaded.get(Mode::Walk, "Te Aro", "Thorndon"), Some(Journey::new(2.22, 0.9)));
}

/// Routes as the bird flies, but refuses trips over 3km and doesn't do transit.
struct ShortTripRouter;

impl Router for ShortTripRouter {
    fn name(&self) -> &'static str {
        "short trips"
    }

    fn supports(&self, mode: Mode) -> bool {
        mode != Mode::Transit
    }

    fn distance_and_time(&self, from: Point<f64>, to: Point<f64>, _mode: Mode) -> Result<Journey> {
        if haversine_km(from, to) > 3.0 {
            bail!("too far");
        }
        Ok(bird_distance_and_time(from, to))
    }
}

#[test]
fn test_routed_matrix() {
    let area_units = area_units();
    let mut rng = StdRng::seed_from_u64(42);
    let matrix = routed_matrix(
        &area_units,
        &ShortTripRouter,
        &[Mode::Walk, Mode::Car],
        5,
        &mut rng,
    )
    .unwrap();
    assert_eq!(
        matrix.matrix.keys().copied().collect::<Vec<_>>(),
        vec![Mode::Walk, Mode::Car]
    );

    assert_eq!(
        matrix.get(Mode::Car, "Te Aro", "Thorndon"),
        Some(Journey::new(2.22, 0.06))
    );
    // Karori is too far from everything else
    for name in ["Kelburn", "Te Aro", "Thorndon"] {
        assert!(matrix.get(Mode::Walk, "Karori", name).unwrap().is_unknown());
        assert!(matrix.get(Mode::Walk, name, "Karori").unwrap().is_unknown());
    }
    for name in area_units.names() {
        assert!(!matrix.get(Mode::Car, name, name).unwrap().is_unknown());
    }
    assert!(matrix.get(Mode::Transit, "Te Aro", "Thorndon").is_none());

    assert!(routed_matrix(&area_units, &ShortTripRouter, &[Mode::Transit], 5, &mut rng).is_err());
}

#[test]
fn test_matrix_in_blocks() {
    let origins: Vec<Point<f64>> = (0..5).map(|i| Point::new(i as f64, 0.0)).collect();
    let destinations: Vec<Point<f64>> = (0..3).map(|i| Point::new(i as f64, 0.0)).collect();
    let calls = std::cell::Cell::new(0);
    let rows = matrix_in_blocks("test", &origins, &destinations, 2, 2, |o, d| {
        calls.set(calls.get() + 1);
        assert!(o.len() <= 2 && d.len() <= 2);
        if o.iter().any(|pt| pt.x() == 4.0) {
            bail!("no route");
        }
        Ok(o.iter()
            .map(|from| d.iter().map(|to| Journey::new(from.x(), to.x())).collect())
            .collect())
    });
    assert_eq!(calls.get(), 6);

    assert_eq!(rows.len(), 5);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.len(), 3);
        for (j, journey) in row.iter().enumerate() {
            if i == 4 {
                assert!(journey.is_unknown());
            } else {
                assert_eq!(*journey, Journey::new(i as f64, j as f64));
            }
        }
    }
}

fn query(url: &reqwest::Url) -> BTreeMap<String, String> {
    url.query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_osrm() {
    let osrm = Osrm::new("http://localhost:5000/".to_string(), &HttpOptions::default()).unwrap();
    let from = Point::new(174.7, -41.3);
    let to = Point::new(174.8, -41.2);
    assert_eq!(
        osrm.route_url(from, to, Mode::Walk).unwrap().as_str(),
        "http://localhost:5000/route/v1/walking/174.7,-41.3;174.8,-41.2?overview=false"
    );
    assert!(osrm.route_url(from, to, Mode::Transit).is_err());
    assert!(!osrm.supports(Mode::Transit));

    let url = osrm.table_url(&[from, to], &[to], Mode::Car).unwrap();
    assert_eq!(
        url.path(),
        "/table/v1/driving/174.7,-41.3;174.8,-41.2;174.8,-41.2"
    );
    let params = query(&url);
    assert_eq!(params["sources"], "0;1");
    assert_eq!(params["destinations"], "2");
    assert_eq!(params["annotations"], "distance,duration");

    let journey =
        Osrm::parse_route(r#"{"code": "Ok", "routes": [{"distance": 1500.0, "duration": 360.0}]}"#)
            .unwrap();
    assert_eq!(journey, Journey::new(1.5, 0.1));
    assert!(Osrm::parse_route(r#"{"code": "NoRoute", "message": "Impossible route"}"#).is_err());

    let table = Osrm::parse_table(
        r#"{"code": "Ok", "distances": [[0, 1500], [null, 0]], "durations": [[0, 360], [null, 0]]}"#,
    )
    .unwrap();
    assert_eq!(table[0][1], Journey::new(1.5, 0.1));
    assert!(table[1][0].is_unknown());
    assert_eq!(table[1][1], Journey::new(0.0, 0.0));
}

#[test]
fn test_mapquest() {
    let mapquest = Mapquest::new("secret".to_string(), &HttpOptions::default()).unwrap();
    let url = mapquest
        .route_url(Point::new(174.7, -41.3), Point::new(174.8, -41.2), Mode::Walk)
        .unwrap();
    let params = query(&url);
    assert_eq!(params["key"], "secret");
    assert_eq!(params["from"], "-41.30000,174.70000");
    assert_eq!(params["to"], "-41.20000,174.80000");
    assert_eq!(params["routeType"], "pedestrian");
    assert_eq!(params["unit"], "k");

    let journey = Mapquest::parse_route(
        r#"{"route": {"distance": 3.2, "time": 720}, "info": {"statuscode": 0, "messages": []}}"#,
    )
    .unwrap();
    assert_eq!(journey, Journey::new(3.2, 0.2));
    assert!(Mapquest::parse_route(
        r#"{"route": {}, "info": {"statuscode": 402, "messages": ["Unable to calculate route."]}}"#
    )
    .is_err());
}

#[test]
fn test_google_maps() {
    let mut google = GoogleMaps::new("secret".to_string(), &HttpOptions::default()).unwrap();
    let from = Point::new(174.7, -41.3);
    let to = Point::new(174.8, -41.2);

    let params = query(&google.directions_url(from, to, Mode::Bicycle).unwrap());
    assert_eq!(params["origin"], "-41.30000,174.70000");
    assert_eq!(params["mode"], "bicycling");
    assert!(!params.contains_key("arrival_time"));

    let params = query(&google.directions_url(from, to, Mode::Transit).unwrap());
    assert_eq!(params["mode"], "transit");
    assert_eq!(params["arrival_time"], "1394652600");
    google.transit_arrival_time = 1_600_000_000;
    let params = query(&google.distance_matrix_url(&[from, to], &[to], Mode::Transit).unwrap());
    assert_eq!(params["arrival_time"], "1600000000");
    assert_eq!(params["origins"], "-41.30000,174.70000|-41.20000,174.80000");
    assert_eq!(params["destinations"], "-41.20000,174.80000");
    assert_eq!(params["key"], "secret");

    let journey = GoogleMaps::parse_directions(
        r#"{"status": "OK", "routes": [{"legs": [
            {"distance": {"value": 1000}, "duration": {"value": 60}},
            {"distance": {"value": 500}, "duration": {"value": 120}}
        ]}]}"#,
    )
    .unwrap();
    assert_eq!(journey, Journey::new(1.5, 0.05));
    assert!(GoogleMaps::parse_directions(r#"{"status": "ZERO_RESULTS", "routes": []}"#).is_err());

    let matrix = GoogleMaps::parse_distance_matrix(
        r#"{"status": "OK", "rows": [{"elements": [
            {"status": "OK", "distance": {"value": 2500}, "duration": {"value": 900}},
            {"status": "ZERO_RESULTS"}
        ]}]}"#,
    )
    .unwrap();
    assert_eq!(matrix, vec![vec![Journey::new(2.5, 0.25), Journey::UNKNOWN]]);
    assert!(GoogleMaps::parse_distance_matrix(
        r#"{"status": "REQUEST_DENIED", "error_message": "bad key"}"#
    )
    .is_err());
}

#[test]
fn test_load_csv_matrix() {
    let matrix = load_csv_matrix("data/commutes", &csv_names()).unwrap();
    assert_eq!(matrix.len(), 3);

    assert_eq!(
        matrix.get(Mode::Car, "Te Aro", "Thorndon"),
        Some(Journey::new(2.5, 0.1))
    );
    assert_eq!(
        matrix.get(Mode::Car, "Te Aro", "Te Aro"),
        Some(Journey::new(0.8, 0.1))
    );
    // The distance is malformed, so the row is skipped
    assert!(matrix
        .get(Mode::Car, "Kelburn", "Te Aro")
        .unwrap()
        .is_unknown());

    // "origin - destination" rows
    assert_eq!(
        matrix.get(Mode::Walk, "Te Aro", "Thorndon"),
        Some(Journey::new(2.4, 0.5))
    );
    assert_eq!(
        matrix.get(Mode::Walk, "Thorndon", "Te Aro"),
        Some(Journey {
            distance_km: None,
            hours: Some(0.5),
        })
    );
    assert!(matrix
        .get(Mode::Walk, "Kelburn", "Thorndon")
        .unwrap()
        .is_unknown());
    assert_eq!(
        matrix.get(Mode::Bicycle, "Te Aro", "Thorndon"),
        Some(Journey::new(2.5, 0.2))
    );

    // Blank transit distances use the car trip, when there is one
    assert_eq!(
        matrix.get(Mode::Transit, "Te Aro", "Thorndon"),
        Some(Journey::new(2.5, 0.3))
    );
    assert_eq!(
        matrix.get(Mode::Transit, "Te Aro", "Kelburn"),
        Some(Journey::new(3.0, 0.4))
    );
    assert_eq!(
        matrix.get(Mode::Transit, "Thorndon", "Kelburn"),
        Some(Journey {
            distance_km: None,
            hours: Some(0.5),
        })
    );

    assert!(load_csv_matrix("data/no_such_dir", &csv_names()).is_err());
}

#[test]
fn test_load_csv_matrix_with_hyphenated_names() {
    let dir = temp_dir("hyphenated_names");
    for mode in Mode::all() {
        fs_err::write(
            dir.join(format!("{}_commutes.csv", mode)),
            "od_pair,distance,time\n",
        )
        .unwrap();
    }
    fs_err::write(
        dir.join("walk_commutes.csv"),
        "od_pair,distance,time
Mt Victoria - East - Te Aro,1500,20
Te Aro - Mt Victoria - East,1600,24
Te Aro - Nowhere,900,12
",
    )
    .unwrap();
    fs_err::write(
        dir.join("car_commutes.csv"),
        "origin,destination,distance,time
Te Aro,Mt Victoria - East,1700,5
Te Aro,Nowhere,900,3
",
    )
    .unwrap();

    let names: BTreeSet<String> = ["Mt Victoria - East", "Te Aro"]
        .into_iter()
        .map(|x| x.to_string())
        .collect();
    let matrix = load_csv_matrix(&dir, &names).unwrap();
    assert_eq!(
        matrix.get(Mode::Walk, "Mt Victoria - East", "Te Aro"),
        Some(Journey::new(1.5, 0.3))
    );
    assert_eq!(
        matrix.get(Mode::Walk, "Te Aro", "Mt Victoria - East"),
        Some(Journey::new(1.6, 0.4))
    );
    assert_eq!(
        matrix.get(Mode::Car, "Te Aro", "Mt Victoria - East"),
        Some(Journey::new(1.7, 0.1))
    );
    assert!(matrix
        .get(Mode::Car, "Mt Victoria - East", "Te Aro")
        .unwrap()
        .is_unknown());
}

#[test]
fn test_commute_costs() {
    let matrix = load_csv_matrix("data/commutes", &csv_names()).unwrap();
    let costs = commute_costs(&matrix, &Tariff::default()).unwrap();

    // Lower triangle only
    for rows in costs.matrix.values() {
        assert_eq!(rows.len(), 3);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), i + 1);
        }
    }

    let check = |mode, home, work, dollars: Option<f64>, hours: Option<f64>| {
        let cost = costs.get(mode, home, work).unwrap();
        assert_eq!(cost, costs.get(mode, work, home).unwrap());
        match (cost.dollars, dollars) {
            (Some(a), Some(b)) => assert_close(a, b, 1e-9),
            (a, b) => assert_eq!(a, b, "{} dollars from {} to {}", mode, home, work),
        }
        match (cost.hours, hours) {
            (Some(a), Some(b)) => assert_close(a, b, 1e-9),
            (a, b) => assert_eq!(a, b, "{} hours from {} to {}", mode, home, work),
        }
    };
    // Both directions are averaged
    check(Mode::Car, "Te Aro", "Thorndon", Some(1.4), Some(0.2));
    check(Mode::Car, "Te Aro", "Te Aro", Some(0.44), Some(0.2));
    // Only one direction is known
    check(Mode::Car, "Kelburn", "Te Aro", Some(1.64), Some(0.4));
    check(Mode::Car, "Kelburn", "Thorndon", None, None);
    check(Mode::Transit, "Thorndon", "Te Aro", Some(1.09), Some(0.6));
    check(Mode::Transit, "Kelburn", "Thorndon", None, Some(1.0));
    check(Mode::Walk, "Te Aro", "Thorndon", Some(0.0), Some(1.0));

    let dir = temp_dir("commute_costs");
    costs.save(dir.join("costs.json")).unwrap();
    let loaded = CommuteCosts::load(dir.join("costs.json")).unwrap();
    assert_eq!(loaded.index_by_name, costs.index_by_name);
    assert_eq!(
        loaded.get(Mode::Car, "Kelburn", "Thorndon"),
        costs.get(Mode::Car, "Kelburn", "Thorndon")
    );

    let mut car_only = Tariff::default();
    car_only.cost_per_km.retain(|mode, _| *mode == Mode::Car);
    assert!(commute_costs(&matrix, &car_only).is_err());
}

#[test]
fn test_tariff_defaults_to_round_trips() {
    let tariff: Tariff = serde_json::from_value(json!({
        "cost_per_km": {"walk": 0.0, "bicycle": 0.0, "car": 0.5, "transit": 0.25}
    }))
    .unwrap();
    assert_eq!(tariff.trips_per_day, 2.0);
    assert_eq!(tariff.cost_per_km[&Mode::Car], 0.5);
}

#[test]
fn test_suburb_rents_by_property() {
    let rents = SuburbRents::load("data/suburb_rents.csv", Breakdown::ByProperty, None).unwrap();
    // Petone only has a total
    assert!(!rents.by_suburb.contains_key("Petone"));
    // The first row wins, and totals are left out
    assert_eq!(
        rents.by_suburb["Te Aro"]
            .keys()
            .cloned()
            .collect::<Vec<_>>(),
        vec!["Apartment", "House"]
    );
    assert_eq!(rents.by_suburb["Te Aro"]["Apartment"]["1"], 380.0);
    // No numeric rent
    assert!(!rents.by_suburb["Thorndon-Kelburn"].contains_key("Room"));

    let lookup = AuSuburbLookup::load("data/aus_and_suburbs.csv").unwrap();
    let by_au = rents.by_area_unit(&lookup).unwrap();
    assert_eq!(
        by_au["Te Aro"],
        json!({"Apartment": {"1": 380.0}, "House": {"2": 500.0}})
    );
    assert_eq!(by_au["Kelburn"], json!({"Flat": {"2": 450.0}}));
    assert_eq!(by_au["Thorndon"], by_au["Kelburn"]);
    // No suburb at all, or a suburb without rents
    assert_eq!(by_au["Karori"], json!(NO_DATA));
    assert_eq!(by_au["Aro Valley"], json!(NO_DATA));
}

#[test]
fn test_suburb_rents_totals() {
    let regions: BTreeSet<String> = vec!["Wellington".to_string()].into_iter().collect();
    let rents =
        SuburbRents::load("data/suburb_rents.csv", Breakdown::TotalOnly, Some(&regions)).unwrap();
    assert!(!rents.by_suburb.contains_key("Petone"));

    let lookup = AuSuburbLookup::load("data/aus_and_suburbs.csv").unwrap();
    let by_au = rents.by_area_unit(&lookup).unwrap();
    assert_eq!(by_au["Te Aro"], json!({"1": 390.0, "2": 500.0}));
    assert_eq!(by_au["Thorndon"], json!({"2": 450.0}));
    assert_eq!(by_au["Karori"], json!(NO_DATA));

    let dir = temp_dir("suburb_rents");
    let output = dir.join("shapes_with_rents.geojson");
    attach_rents("data/shapes.geojson", NAME_KEY, "rent_by_nbedrooms", &by_au, &output).unwrap();
    let gj: geojson::GeoJson = fs_err::read_to_string(&output).unwrap().parse().unwrap();
    let collection = geojson::FeatureCollection::try_from(gj).unwrap();
    assert_eq!(collection.features.len(), 5);
    let rents_of = |name: &str| -> Value {
        collection
            .features
            .iter()
            .find(|f| f.property(NAME_KEY).and_then(|x| x.as_str()) == Some(name))
            .and_then(|f| f.property("rent_by_nbedrooms").cloned())
            .unwrap()
    };
    assert_eq!(rents_of("Te Aro"), json!({"1": 390.0, "2": 500.0}));
    assert_eq!(rents_of("Karori"), json!(NO_DATA));
    // Not in the lookup at all
    assert_eq!(rents_of("Wharf"), json!(NO_DATA));
}

#[test]
fn test_census_rents() {
    let names = read_area_unit_names("data/area_units.csv", 0).unwrap();
    assert_eq!(names.len(), 4);
    let rents = census_rents("data/census_rents.csv", &names, 5).unwrap();

    assert_eq!(
        rents.keys().cloned().collect::<Vec<_>>(),
        vec!["Aro Valley", "Kelburn", "Te Aro", "Thorndon"]
    );
    let te_aro: Vec<Option<u32>> = rents["Te Aro"].values().copied().collect();
    assert_eq!(te_aro, vec![Some(350), Some(480), None, None, None]);
    assert_eq!(rents["Thorndon"][&2], Some(520));
    assert_eq!(rents["Thorndon"].len(), 5);
    assert!(rents["Kelburn"].values().all(|rent| rent.is_none()));

    let value = serde_json::to_value(&rents).unwrap();
    assert_eq!(value["Te Aro"]["1"], json!(350));
    assert_eq!(value["Te Aro"]["3"], Value::Null);
}

#[test]
fn test_slice_features() {
    let names = read_area_unit_names("data/area_units.csv", 0).unwrap();
    let dir = temp_dir("slice_features");
    let output = dir.join("shapes.geojson");
    let missing = slice_features("data/shapes.geojson", NAME_KEY, &names, &output).unwrap();
    assert_eq!(
        missing,
        vec!["Aro Valley".to_string()]
            .into_iter()
            .collect::<BTreeSet<_>>()
    );

    let sliced = load_area_units(&output, NAME_KEY).unwrap();
    assert_eq!(
        sliced.names().cloned().collect::<Vec<_>>(),
        vec!["Kelburn", "Te Aro", "Thorndon"]
    );
}

#[test]
fn test_mode_names() {
    for mode in Mode::all() {
        assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        assert_eq!(serde_json::to_value(mode).unwrap(), json!(mode.as_str()));
    }
    assert!("teleport".parse::<Mode>().is_err());
}

fn set_up_region(name: &str) -> Region {
    let dir = temp_dir(name);
    fs_err::copy("data/area_units.csv", dir.join("area_units.csv")).unwrap();
    Region::new(dir)
}

fn region_options() -> RegionOptions {
    RegionOptions {
        num_sample_points: 10,
        ..RegionOptions::default()
    }
}

#[test]
fn test_region_with_bird_trips() {
    let region = set_up_region("region_bird");
    assert!(!region.has_csv_matrix());
    let mut rng = StdRng::seed_from_u64(42);
    region
        .run(
            "data/shapes.geojson",
            Some("data/census_rents.csv"),
            &region_options(),
            &mut rng,
        )
        .unwrap();

    for path in [
        region.shapes(),
        region.rents(),
        region.centroids_csv(),
        region.centroids_geojson(),
        region.sample_points(),
        region.bird_commutes(),
        region.commute_costs(),
    ] {
        assert!(path.exists(), "{} wasn't created", path.display());
    }

    let centroids = csv::Reader::from_path(region.centroids_csv())
        .unwrap()
        .into_records()
        .count();
    assert_eq!(centroids, 3);
    let sample_points = csv::Reader::from_path(region.sample_points())
        .unwrap()
        .into_records()
        .count();
    assert_eq!(sample_points, 30);

    let bird = DistanceTimeMatrix::load(region.bird_commutes()).unwrap();
    let costs = CommuteCosts::load(region.commute_costs()).unwrap();
    assert_eq!(costs.index_by_name, bird.index_by_name);
    assert_eq!(costs.index_by_name.len(), 3);
    // 2.22km each way, twice a day
    let car = costs.get(Mode::Car, "Te Aro", "Thorndon").unwrap();
    assert_close(car.dollars.unwrap(), 1.22, 1e-9);
    assert_close(car.hours.unwrap(), 0.12, 1e-9);
}

#[test]
fn test_region_with_routed_trips() {
    let region = set_up_region("region_routed");
    for mode in Mode::all() {
        fs_err::copy(
            PathBuf::from("data/commutes").join(format!("{}_commutes.csv", mode)),
            region.commutes_csv(mode),
        )
        .unwrap();
    }
    assert!(region.has_csv_matrix());

    let mut rng = StdRng::seed_from_u64(42);
    region
        .run("data/shapes.geojson", None, &region_options(), &mut rng)
        .unwrap();
    assert!(!region.rents().exists());

    let costs = CommuteCosts::load(region.commute_costs()).unwrap();
    let car = costs.get(Mode::Car, "Te Aro", "Thorndon").unwrap();
    assert_close(car.dollars.unwrap(), 1.4, 1e-9);
    assert_close(car.hours.unwrap(), 0.2, 1e-9);
}
