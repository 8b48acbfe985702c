pub mod nominatim;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Free-text address lookup. `None` means the location is unknown, which
/// callers treat as a normal outcome.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Option<Coordinates>;
}

/// Appends `, <hint>` unless the address already names the country.
pub fn with_country_hint(address: &str, hint: &str) -> Option<String> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return None;
    }

    let hint = hint.trim();
    if hint.is_empty() || trimmed.to_lowercase().contains(&hint.to_lowercase()) {
        return Some(trimmed.to_string());
    }

    Some(format!("{trimmed}, {hint}"))
}

/// Lookup table geocoder for standalone runs and tests.
pub struct StaticGeocoder {
    country_hint: String,
    entries: DashMap<String, Coordinates>,
}

impl StaticGeocoder {
    pub fn new(country_hint: impl Into<String>) -> Self {
        Self {
            country_hint: country_hint.into(),
            entries: DashMap::new(),
        }
    }

    fn key(&self, address: &str) -> Option<String> {
        with_country_hint(address, &self.country_hint).map(|q| q.to_lowercase())
    }

    pub fn insert(&self, address: &str, coordinates: Coordinates) {
        if let Some(key) = self.key(address) {
            self.entries.insert(key, coordinates);
        }
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, address: &str) -> Option<Coordinates> {
        let key = self.key(address)?;
        self.entries.get(&key).map(|entry| *entry.value())
    }
}
