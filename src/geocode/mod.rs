//! Best-effort place names for hexagon cells.
//!
//! A cell is reduced to its centroid and reverse geocoded through
//! Nominatim. Any failure falls back to the cell id; nothing here ever
//! fails an evaluation.

use async_trait::async_trait;
use h3o::{CellIndex, LatLng};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GeocoderConfig;

/// Resolves a hexagon id to a human-readable place name.
#[async_trait]
pub trait PlaceResolver: Send + Sync {
    /// Never fails; returns the id itself when no name can be found.
    async fn resolve(&self, hexagon_id: &str) -> String;
}

/// Centroid of an H3 cell as `(lat, lng)` in degrees.
pub fn cell_centroid(hexagon_id: &str) -> Option<(f64, f64)> {
    let cell = CellIndex::from_str(hexagon_id.trim()).ok()?;
    let center = LatLng::from(cell);
    Some((center.lat(), center.lng()))
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Address,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    town: Option<String>,
    city: Option<String>,
    village: Option<String>,
}

impl Address {
    fn place(self) -> Option<String> {
        self.town.or(self.city).or(self.village)
    }
}

/// Nominatim reverse geocoder.
pub struct NominatimResolver {
    url: String,
    http_client: reqwest::Client,
}

impl NominatimResolver {
    pub fn new(config: &GeocoderConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            url: config.url.clone(),
            http_client,
        })
    }

    async fn lookup(&self, lat: f64, lng: f64) -> anyhow::Result<Option<String>> {
        let response = self
            .http_client
            .get(&self.url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: ReverseResponse = response.json().await?;
        Ok(body.address.place())
    }
}

#[async_trait]
impl PlaceResolver for NominatimResolver {
    async fn resolve(&self, hexagon_id: &str) -> String {
        let Some((lat, lng)) = cell_centroid(hexagon_id) else {
            warn!("{} is not a valid H3 cell, showing it as-is", hexagon_id);
            return hexagon_id.to_string();
        };

        match self.lookup(lat, lng).await {
            Ok(Some(place)) => {
                debug!("{} -> {}", hexagon_id, place);
                place
            }
            Ok(None) => {
                debug!("No town, city or village near {}", hexagon_id);
                hexagon_id.to_string()
            }
            Err(e) => {
                warn!("Reverse geocoding failed for {}: {}", hexagon_id, e);
                hexagon_id.to_string()
            }
        }
    }
}
