use std::env;

use crate::error::AppError;
use crate::lifecycle::transitions::PolicyKind;

pub const DEFAULT_COUNTRY_HINT: &str = "India";
pub const DEFAULT_USER_AGENT: &str = "ShipmentTracker/1.0 (ops@shipment-tracker.local)";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    /// Nominatim-compatible base URL. Unset means the in-process lookup table.
    pub geocoder_url: Option<String>,
    pub geocoder_country_hint: String,
    pub geocoder_user_agent: String,
    pub object_base_url: String,
    pub transition_policy: PolicyKind,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let http_port = parse_or_default("HTTP_PORT", 3000)?;

        Ok(Self {
            http_port,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            geocoder_url: env::var("GEOCODER_URL").ok().filter(|url| !url.trim().is_empty()),
            geocoder_country_hint: env::var("GEOCODER_COUNTRY_HINT")
                .unwrap_or_else(|_| DEFAULT_COUNTRY_HINT.to_string()),
            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            object_base_url: env::var("OBJECT_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{http_port}/objects")),
            transition_policy: parse_or_default("TRANSITION_POLICY", PolicyKind::Permissive)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
