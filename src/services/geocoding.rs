//! Geocoding against a Nominatim-compatible search API.

use super::GeocodingService;
use crate::models::{GeocodingConfig, LocationBounds, MobgenError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Kilometers per degree of latitude.
const KM_PER_DEGREE: f64 = 111.0;

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    #[serde(default)]
    address: HashMap<String, serde_json::Value>,
}

/// Geocoder for `/search?format=json` endpoints.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    user_agent: HeaderValue,
    bounds_size_km: f64,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(MobgenError::Network)?;
        let user_agent = HeaderValue::from_str(&config.user_agent).map_err(|_| {
            MobgenError::InvalidInput(format!("invalid user agent: {}", config.user_agent))
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent,
            bounds_size_km: config.bounds_size_km,
        })
    }
}

#[async_trait]
impl GeocodingService for NominatimGeocoder {
    async fn resolve(&self, location: &str) -> Result<LocationBounds> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, self.user_agent.clone())
            .query(&[
                ("q", location),
                ("format", "json"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MobgenError::Geocoding(format!(
                "HTTP {} for '{location}'",
                response.status().as_u16()
            )));
        }

        let hits: Vec<SearchHit> = response.json().await.map_err(|e| {
            MobgenError::Geocoding(format!("undecodable response for '{location}': {e}"))
        })?;
        let hit = hits
            .into_iter()
            .next()
            .ok_or_else(|| MobgenError::Geocoding(format!("no match for '{location}'")))?;

        let lat: f64 = hit
            .lat
            .parse()
            .map_err(|_| MobgenError::Geocoding(format!("bad latitude '{}'", hit.lat)))?;
        let lon: f64 = hit
            .lon
            .parse()
            .map_err(|_| MobgenError::Geocoding(format!("bad longitude '{}'", hit.lon)))?;

        let area_type = infer_area_type(&hit.address);
        debug!(location = %location, lat, lon, area_type, "Geocoded location");

        Ok(bounds_around(lat, lon, self.bounds_size_km, area_type))
    }
}

/// Square box of half-size `size_km` around a point.
///
/// Longitude degrees shrink with latitude, so the longitude offset is scaled
/// by `1 / cos(lat)`. Near the poles the scale is clamped.
pub fn bounds_around(lat: f64, lon: f64, size_km: f64, area_type: &str) -> LocationBounds {
    let lat_offset = size_km / KM_PER_DEGREE;
    let cos_lat = lat.to_radians().cos().abs().max(0.01);
    let lon_offset = size_km / (KM_PER_DEGREE * cos_lat);

    LocationBounds {
        center: (lat, lon),
        min_lat: (lat - lat_offset).max(-90.0),
        max_lat: (lat + lat_offset).min(90.0),
        min_lon: (lon - lon_offset).max(-180.0),
        max_lon: (lon + lon_offset).min(180.0),
        area_type: area_type.to_string(),
    }
}

/// Coarse area type from address components.
fn infer_area_type(address: &HashMap<String, serde_json::Value>) -> &'static str {
    let has = |key: &str| address.contains_key(key);

    if has("city") || has("town") {
        if has("city_district") || has("neighbourhood") {
            "urban"
        } else {
            "suburban"
        }
    } else if has("village") || has("hamlet") {
        "rural"
    } else {
        "suburban"
    }
}
