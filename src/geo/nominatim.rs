use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::geo::{with_country_hint, Coordinates, Geocoder};

/// Geocoder backed by a Nominatim-compatible `/search` endpoint.
#[derive(Clone, Debug)]
pub struct NominatimGeocoder {
    http_client: Client,
    base_url: String,
    country_hint: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, country_hint: &str, user_agent: &str) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            country_hint: country_hint.to_string(),
        })
    }

    async fn search(&self, query: &str) -> Result<Option<Coordinates>, AppError> {
        let hits: Vec<SearchHit> = self
            .http_client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", "1"),
                ("addressdetails", "1"),
            ])
            .send()
            .await
            .map_err(|err| AppError::Backend(format!("geocoding request failed: {err}")))?
            .error_for_status()
            .map_err(|err| AppError::Backend(format!("geocoding request failed: {err}")))?
            .json()
            .await
            .map_err(|err| AppError::Backend(format!("invalid geocoding response: {err}")))?;

        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };

        let latitude = hit
            .lat
            .parse::<f64>()
            .map_err(|err| AppError::Backend(format!("invalid latitude {}: {err}", hit.lat)))?;
        let longitude = hit
            .lon
            .parse::<f64>()
            .map_err(|err| AppError::Backend(format!("invalid longitude {}: {err}", hit.lon)))?;

        debug!(query, display_name = %hit.display_name, latitude, longitude, "geocoded");
        Ok(Some(Coordinates {
            latitude,
            longitude,
        }))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Option<Coordinates> {
        let query = with_country_hint(address, &self.country_hint)?;

        match self.search(&query).await {
            Ok(Some(coordinates)) => Some(coordinates),
            Ok(None) => {
                warn!(query = %query, "no geocoding result");
                None
            }
            Err(err) => {
                warn!(query = %query, error = %err, "geocoding failed; location unknown");
                None
            }
        }
    }
}
