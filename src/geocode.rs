use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Public OpenStreetMap search endpoint.
pub const DEFAULT_NOMINATIM_URL: &str =
    "https://nominatim.openstreetmap.org/search";

pub const DEFAULT_USER_AGENT: &str =
    concat!("newsdex/", env!("CARGO_PKG_VERSION"));

/// Result classes accepted as a geopolitical location.
const ACCEPTED_CLASSES: &[&str] = &["boundary", "place"];

/// A resolved place.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Human-readable address of the match.
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Outline of the place as GeoJSON, when the geocoder returns one.
    pub geojson: Option<Value>,
}

/// Resolves place names to coordinates.
pub trait Geocoder {
    /// `Ok(None)` when nothing acceptable matches `name`.
    fn locate(&self, name: &str) -> Result<Option<Location>>;
}

#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub url: String,
    pub user_agent: String,
    /// ISO 3166-1 alpha-2 codes the search is restricted to; empty for
    /// worldwide.
    pub country_codes: Vec<String>,
    pub timeout: Duration,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            country_codes: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Geocoder backed by the Nominatim search API.
///
/// Names are looked up as cities and only the best match is considered;
/// it is accepted when its class is `boundary` or `place`.
#[derive(Debug)]
pub struct NominatimGeocoder {
    client: Client,
    config: NominatimConfig,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    class: String,
    display_name: String,
    lat: String,
    lon: String,
    #[serde(default)]
    geojson: Option<Value>,
}

impl NominatimGeocoder {
    pub fn new(config: NominatimConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn query(&self, name: &str) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("city", name.to_string()),
            ("format", "json".to_string()),
            ("polygon_geojson", "1".to_string()),
            ("limit", "1".to_string()),
        ];
        if !self.config.country_codes.is_empty() {
            query.push(("countrycodes", self.config.country_codes.join(",")));
        }
        query
    }
}

impl Geocoder for NominatimGeocoder {
    fn locate(&self, name: &str) -> Result<Option<Location>> {
        let response = self
            .client
            .get(&self.config.url)
            .query(&self.query(name))
            .send()?;

        if !response.status().is_success() {
            return Err(Error::External {
                service: "geocoder",
                details: format!(
                    "{} returned {} for '{name}'",
                    self.config.url,
                    response.status()
                ),
            });
        }

        let body = response.text()?;
        let location = parse_response(&body)?;
        debug!(name, found = location.is_some(), "geocoded");
        Ok(location)
    }
}

/// Pick the first acceptable hit out of a Nominatim JSON response.
fn parse_response(body: &str) -> Result<Option<Location>> {
    let hits: Vec<SearchHit> = serde_json::from_str(body)?;
    let Some(hit) = hits.into_iter().next() else {
        return Ok(None);
    };
    if !ACCEPTED_CLASSES.contains(&hit.class.as_str()) {
        return Ok(None);
    }

    let coordinate = |raw: &str, axis: &str| {
        raw.parse::<f64>().map_err(|e| Error::External {
            service: "geocoder",
            details: format!("bad {axis} '{raw}': {e}"),
        })
    };

    Ok(Some(Location {
        location: hit.display_name,
        latitude: coordinate(&hit.lat, "latitude")?,
        longitude: coordinate(&hit.lon, "longitude")?,
        geojson: hit.geojson,
    }))
}
