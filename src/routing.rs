//! Ask third-party routing services for the distance and time of trips.

use std::time::Duration;

use anyhow::{bail, Result};
use geo_types::Point;
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;

use crate::{Journey, Mode};

/// Something that can estimate trips between WGS84 points.
pub trait Router {
    fn name(&self) -> &'static str;

    fn supports(&self, _mode: Mode) -> bool {
        true
    }

    fn distance_and_time(&self, from: Point<f64>, to: Point<f64>, mode: Mode) -> Result<Journey>;

    /// Estimate every trip from `origins` to `destinations`. `result[i][j]` is the trip from
    /// `origins[i]` to `destinations[j]`. Individual trips that fail are logged and left unknown.
    fn matrix(
        &self,
        origins: &[Point<f64>],
        destinations: &[Point<f64>],
        mode: Mode,
    ) -> Result<Vec<Vec<Journey>>> {
        let mut rows = Vec::with_capacity(origins.len());
        for from in origins {
            let mut row = Vec::with_capacity(destinations.len());
            for to in destinations {
                match self.distance_and_time(*from, *to, mode) {
                    Ok(journey) => row.push(journey),
                    Err(err) => {
                        warn!(
                            "{} couldn't route {} from {:?} to {:?}: {}",
                            self.name(),
                            mode,
                            from.x_y(),
                            to.x_y(),
                            err
                        );
                        row.push(Journey::UNKNOWN);
                    }
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

pub struct HttpOptions {
    /// Give up on a request after this long
    pub timeout: Duration,
    /// Wait this long before every request, to stay under rate limits
    pub pause: Duration,
}

impl Default for HttpOptions {
    fn default() -> HttpOptions {
        HttpOptions {
            timeout: Duration::from_secs(30),
            pause: Duration::ZERO,
        }
    }
}

struct Http {
    client: Client,
    pause: Duration,
}

impl Http {
    fn new(opts: &HttpOptions) -> Result<Http> {
        Ok(Http {
            client: Client::builder().timeout(opts.timeout).build()?,
            pause: opts.pause,
        })
    }

    fn get(&self, url: Url) -> Result<String> {
        if !self.pause.is_zero() {
            std::thread::sleep(self.pause);
        }
        // Don't log the query; it may contain an API key
        debug!("GET {}{}", url.origin().ascii_serialization(), url.path());
        let resp = self.client.get(url).send()?.error_for_status()?;
        Ok(resp.text()?)
    }
}

/// Fill in a large matrix by asking for blocks of at most `max_origins` by `max_destinations`.
/// A block that fails is logged and left unknown.
pub(crate) fn matrix_in_blocks<F: Fn(&[Point<f64>], &[Point<f64>]) -> Result<Vec<Vec<Journey>>>>(
    name: &str,
    origins: &[Point<f64>],
    destinations: &[Point<f64>],
    max_origins: usize,
    max_destinations: usize,
    block: F,
) -> Vec<Vec<Journey>> {
    let mut rows = vec![vec![Journey::UNKNOWN; destinations.len()]; origins.len()];
    for (oi, origin_chunk) in origins.chunks(max_origins).enumerate() {
        for (di, destination_chunk) in destinations.chunks(max_destinations).enumerate() {
            let row_offset = oi * max_origins;
            let col_offset = di * max_destinations;
            match block(origin_chunk, destination_chunk) {
                Ok(result) => {
                    for (i, row) in result.into_iter().enumerate() {
                        for (j, journey) in row.into_iter().enumerate() {
                            if let Some(cell) = rows
                                .get_mut(row_offset + i)
                                .and_then(|r| r.get_mut(col_offset + j))
                            {
                                *cell = journey;
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "{} failed for origins {}..{} and destinations {}..{}: {}",
                        name,
                        row_offset,
                        row_offset + origin_chunk.len(),
                        col_offset,
                        col_offset + destination_chunk.len(),
                        err
                    );
                }
            }
        }
    }
    rows
}

fn lat_lon(pt: Point<f64>) -> String {
    format!("{:.5},{:.5}", pt.y(), pt.x())
}

/// Uses the route and table services of an OSRM server, like `https://router.project-osrm.org`.
pub struct Osrm {
    http: Http,
    address: String,
}

impl Osrm {
    /// Coordinates per table request, to keep URLs a reasonable length
    const MAX_TABLE_SIDE: usize = 50;

    pub fn new(address: String, opts: &HttpOptions) -> Result<Osrm> {
        Ok(Osrm {
            http: Http::new(opts)?,
            address: address.trim_end_matches('/').to_string(),
        })
    }

    fn profile(mode: Mode) -> Result<&'static str> {
        match mode {
            Mode::Walk => Ok("walking"),
            Mode::Bicycle => Ok("cycling"),
            Mode::Car => Ok("driving"),
            Mode::Transit => bail!("OSRM doesn't route transit"),
        }
    }

    pub fn route_url(&self, from: Point<f64>, to: Point<f64>, mode: Mode) -> Result<Url> {
        let url = format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.address,
            Osrm::profile(mode)?,
            from.x(),
            from.y(),
            to.x(),
            to.y()
        );
        Ok(Url::parse_with_params(&url, &[("overview", "false")])?)
    }

    pub fn table_url(
        &self,
        origins: &[Point<f64>],
        destinations: &[Point<f64>],
        mode: Mode,
    ) -> Result<Url> {
        let coordinates: Vec<String> = origins
            .iter()
            .chain(destinations)
            .map(|pt| format!("{},{}", pt.x(), pt.y()))
            .collect();
        let sources: Vec<String> = (0..origins.len()).map(|i| i.to_string()).collect();
        let targets: Vec<String> = (origins.len()..origins.len() + destinations.len())
            .map(|i| i.to_string())
            .collect();
        let url = format!(
            "{}/table/v1/{}/{}",
            self.address,
            Osrm::profile(mode)?,
            coordinates.join(";")
        );
        Ok(Url::parse_with_params(
            &url,
            &[
                ("sources", sources.join(";")),
                ("destinations", targets.join(";")),
                ("annotations", "distance,duration".to_string()),
            ],
        )?)
    }

    pub fn parse_route(body: &str) -> Result<Journey> {
        let resp: OsrmRouteResponse = serde_json::from_str(body)?;
        if resp.code != "Ok" {
            bail!("OSRM failed with code {}: {:?}", resp.code, resp.message);
        }
        if let Some(route) = resp.routes.first() {
            Ok(Journey::new(route.distance / 1000.0, route.duration / 3600.0))
        } else {
            bail!("OSRM didn't return any routes");
        }
    }

    pub fn parse_table(body: &str) -> Result<Vec<Vec<Journey>>> {
        let resp: OsrmTableResponse = serde_json::from_str(body)?;
        if resp.code != "Ok" {
            bail!("OSRM failed with code {}: {:?}", resp.code, resp.message);
        }
        let (distances, durations) = match (resp.distances, resp.durations) {
            (Some(distances), Some(durations)) => (distances, durations),
            _ => bail!("OSRM table is missing distances or durations"),
        };
        Ok(distances
            .into_iter()
            .zip(durations)
            .map(|(distance_row, duration_row)| {
                distance_row
                    .into_iter()
                    .zip(duration_row)
                    .map(|(meters, seconds)| Journey {
                        distance_km: meters.map(|m| m / 1000.0),
                        hours: seconds.map(|s| s / 3600.0),
                    })
                    .collect()
            })
            .collect())
    }
}

impl Router for Osrm {
    fn name(&self) -> &'static str {
        "OSRM"
    }

    fn supports(&self, mode: Mode) -> bool {
        Osrm::profile(mode).is_ok()
    }

    fn distance_and_time(&self, from: Point<f64>, to: Point<f64>, mode: Mode) -> Result<Journey> {
        let url = self.route_url(from, to, mode)?;
        Osrm::parse_route(&self.http.get(url)?)
    }

    fn matrix(
        &self,
        origins: &[Point<f64>],
        destinations: &[Point<f64>],
        mode: Mode,
    ) -> Result<Vec<Vec<Journey>>> {
        Osrm::profile(mode)?;
        Ok(matrix_in_blocks(
            self.name(),
            origins,
            destinations,
            Osrm::MAX_TABLE_SIDE,
            Osrm::MAX_TABLE_SIDE,
            |origins, destinations| {
                let url = self.table_url(origins, destinations, mode)?;
                Osrm::parse_table(&self.http.get(url)?)
            },
        ))
    }
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    /// Meters
    distance: f64,
    /// Seconds
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    message: Option<String>,
    distances: Option<Vec<Vec<Option<f64>>>>,
    durations: Option<Vec<Vec<Option<f64>>>>,
}

/// Uses the Mapquest directions API, one trip at a time.
pub struct Mapquest {
    http: Http,
    key: String,
    base_url: String,
}

impl Mapquest {
    pub fn new(key: String, opts: &HttpOptions) -> Result<Mapquest> {
        Ok(Mapquest {
            http: Http::new(opts)?,
            key,
            base_url: "https://www.mapquestapi.com/directions/v2/route".to_string(),
        })
    }

    fn route_type(mode: Mode) -> &'static str {
        match mode {
            Mode::Walk => "pedestrian",
            Mode::Bicycle => "bicycle",
            Mode::Car => "fastest",
            Mode::Transit => "multimodal",
        }
    }

    pub fn route_url(&self, from: Point<f64>, to: Point<f64>, mode: Mode) -> Result<Url> {
        Ok(Url::parse_with_params(
            &self.base_url,
            &[
                ("key", self.key.clone()),
                ("from", lat_lon(from)),
                ("to", lat_lon(to)),
                ("routeType", Mapquest::route_type(mode).to_string()),
                ("unit", "k".to_string()),
                ("doReverseGeocode", "false".to_string()),
                ("narrativeType", "none".to_string()),
            ],
        )?)
    }

    pub fn parse_route(body: &str) -> Result<Journey> {
        let resp: MapquestResponse = serde_json::from_str(body)?;
        if resp.info.statuscode != 0 {
            bail!(
                "Mapquest failed with status {}: {:?}",
                resp.info.statuscode,
                resp.info.messages
            );
        }
        match resp.route {
            Some(MapquestRoute {
                distance: Some(km),
                time: Some(seconds),
            }) => Ok(Journey::new(km, seconds / 3600.0)),
            _ => bail!("Mapquest didn't return a route distance and time"),
        }
    }
}

impl Router for Mapquest {
    fn name(&self) -> &'static str {
        "Mapquest"
    }

    fn distance_and_time(&self, from: Point<f64>, to: Point<f64>, mode: Mode) -> Result<Journey> {
        let url = self.route_url(from, to, mode)?;
        Mapquest::parse_route(&self.http.get(url)?)
    }
}

#[derive(Debug, Deserialize)]
struct MapquestResponse {
    route: Option<MapquestRoute>,
    info: MapquestInfo,
}

#[derive(Debug, Deserialize)]
struct MapquestRoute {
    /// Kilometers, since we ask for unit=k
    distance: Option<f64>,
    /// Seconds
    time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MapquestInfo {
    statuscode: i64,
    #[serde(default)]
    messages: Vec<String>,
}

/// Uses the Google Maps directions API for single trips, and the distance matrix API for batches.
pub struct GoogleMaps {
    http: Http,
    key: String,
    directions_url: String,
    distance_matrix_url: String,
    /// Transit trips are planned to arrive at this Unix timestamp, usually a weekday morning.
    pub transit_arrival_time: u64,
}

impl GoogleMaps {
    /// The distance matrix API allows at most 25 origins and 100 elements per request
    const MAX_BLOCK_SIDE: usize = 10;

    /// 8:30 on Thursday 13 March 2014 in Auckland
    pub const DEFAULT_TRANSIT_ARRIVAL_TIME: u64 = 1_394_652_600;

    pub fn new(key: String, opts: &HttpOptions) -> Result<GoogleMaps> {
        Ok(GoogleMaps {
            http: Http::new(opts)?,
            key,
            directions_url: "https://maps.googleapis.com/maps/api/directions/json".to_string(),
            distance_matrix_url: "https://maps.googleapis.com/maps/api/distancematrix/json"
                .to_string(),
            transit_arrival_time: GoogleMaps::DEFAULT_TRANSIT_ARRIVAL_TIME,
        })
    }

    fn travel_mode(mode: Mode) -> &'static str {
        match mode {
            Mode::Walk => "walking",
            Mode::Bicycle => "bicycling",
            Mode::Car => "driving",
            Mode::Transit => "transit",
        }
    }

    fn params(&self, mode: Mode) -> Vec<(&'static str, String)> {
        let mut params = vec![("mode", GoogleMaps::travel_mode(mode).to_string())];
        if mode == Mode::Transit {
            params.push(("arrival_time", self.transit_arrival_time.to_string()));
        }
        params.push(("key", self.key.clone()));
        params
    }

    pub fn directions_url(&self, from: Point<f64>, to: Point<f64>, mode: Mode) -> Result<Url> {
        let mut params = vec![("origin", lat_lon(from)), ("destination", lat_lon(to))];
        params.extend(self.params(mode));
        Ok(Url::parse_with_params(&self.directions_url, &params)?)
    }

    pub fn distance_matrix_url(
        &self,
        origins: &[Point<f64>],
        destinations: &[Point<f64>],
        mode: Mode,
    ) -> Result<Url> {
        let join = |pts: &[Point<f64>]| {
            pts.iter()
                .map(|pt| lat_lon(*pt))
                .collect::<Vec<_>>()
                .join("|")
        };
        let mut params = vec![
            ("origins", join(origins)),
            ("destinations", join(destinations)),
        ];
        params.extend(self.params(mode));
        Ok(Url::parse_with_params(&self.distance_matrix_url, &params)?)
    }

    pub fn parse_directions(body: &str) -> Result<Journey> {
        let resp: GoogleDirectionsResponse = serde_json::from_str(body)?;
        if resp.status != "OK" {
            bail!(
                "Google directions failed with status {}: {:?}",
                resp.status,
                resp.error_message
            );
        }
        let route = if let Some(route) = resp.routes.first() {
            route
        } else {
            bail!("Google directions didn't return any routes");
        };
        let meters: f64 = route.legs.iter().map(|leg| leg.distance.value).sum();
        let seconds: f64 = route.legs.iter().map(|leg| leg.duration.value).sum();
        Ok(Journey::new(meters / 1000.0, seconds / 3600.0))
    }

    pub fn parse_distance_matrix(body: &str) -> Result<Vec<Vec<Journey>>> {
        let resp: GoogleMatrixResponse = serde_json::from_str(body)?;
        if resp.status != "OK" {
            bail!(
                "Google distance matrix failed with status {}: {:?}",
                resp.status,
                resp.error_message
            );
        }
        Ok(resp
            .rows
            .into_iter()
            .map(|row| {
                row.elements
                    .into_iter()
                    .map(|element| match element {
                        GoogleElement {
                            status,
                            distance: Some(distance),
                            duration: Some(duration),
                        } if status == "OK" => {
                            Journey::new(distance.value / 1000.0, duration.value / 3600.0)
                        }
                        _ => Journey::UNKNOWN,
                    })
                    .collect()
            })
            .collect())
    }
}

impl Router for GoogleMaps {
    fn name(&self) -> &'static str {
        "Google Maps"
    }

    fn distance_and_time(&self, from: Point<f64>, to: Point<f64>, mode: Mode) -> Result<Journey> {
        let url = self.directions_url(from, to, mode)?;
        GoogleMaps::parse_directions(&self.http.get(url)?)
    }

    fn matrix(
        &self,
        origins: &[Point<f64>],
        destinations: &[Point<f64>],
        mode: Mode,
    ) -> Result<Vec<Vec<Journey>>> {
        Ok(matrix_in_blocks(
            self.name(),
            origins,
            destinations,
            GoogleMaps::MAX_BLOCK_SIDE,
            GoogleMaps::MAX_BLOCK_SIDE,
            |origins, destinations| {
                let url = self.distance_matrix_url(origins, destinations, mode)?;
                GoogleMaps::parse_distance_matrix(&self.http.get(url)?)
            },
        ))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleDirectionsResponse {
    status: String,
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<GoogleRoute>,
}

#[derive(Debug, Deserialize)]
struct GoogleRoute {
    legs: Vec<GoogleLeg>,
}

#[derive(Debug, Deserialize)]
struct GoogleLeg {
    distance: GoogleValue,
    duration: GoogleValue,
}

#[derive(Debug, Deserialize)]
struct GoogleValue {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct GoogleMatrixResponse {
    status: String,
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<GoogleRow>,
}

#[derive(Debug, Deserialize)]
struct GoogleRow {
    elements: Vec<GoogleElement>,
}

#[derive(Debug, Deserialize)]
struct GoogleElement {
    status: String,
    distance: Option<GoogleValue>,
    duration: Option<GoogleValue>,
}
