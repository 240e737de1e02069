use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::model::{ConditionTag, Coordinates, Measurements, Reading, ReadingSource};

use super::{AdapterResult, ProviderId, WeatherProvider, fetch_json};

const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";
const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,precipitation,weather_code,surface_pressure,wind_speed_10m";

/// Keyless model-and-satellite feed from Open-Meteo.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    base_url: String,
    http: Client,
}

impl Default for OpenMeteoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenMeteoProvider {
    pub fn new() -> Self {
        Self { base_url: DEFAULT_BASE_URL.to_string(), http: Client::new() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// WMO weather interpretation codes.
/// See: https://open-meteo.com/en/docs#weathervariables
fn condition_from_wmo_code(code: i32) -> ConditionTag {
    match code {
        0 | 1 => ConditionTag::Clear,
        2 | 3 => ConditionTag::Cloudy,
        45 | 48 => ConditionTag::Foggy,
        51..=67 | 80..=82 => ConditionTag::Rainy,
        95..=99 => ConditionTag::Stormy,
        _ => ConditionTag::Cloudy,
    }
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    #[serde(default)]
    precipitation: f64,
    weather_code: i32,
    surface_pressure: f64,
    wind_speed_10m: f64,
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    current: OmCurrent,
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    async fn fetch_reading(&self, coords: Coordinates, timeout: Duration) -> AdapterResult {
        let url = format!("{}/v1/forecast", self.base_url);

        let request = self.http.get(url).query(&[
            ("latitude", coords.lat().to_string()),
            ("longitude", coords.lon().to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("wind_speed_unit", "kmh".to_string()),
        ]);

        let parsed: OmResponse = fetch_json(ProviderId::OpenMeteo, request, timeout).await?;
        let current = parsed.current;

        Ok(Reading::new(
            Measurements {
                temperature_c: current.temperature_2m,
                humidity_pct: current.relative_humidity_2m,
                wind_speed_kph: current.wind_speed_10m,
                precipitation_mm: current.precipitation,
                pressure_hpa: current.surface_pressure,
            },
            condition_from_wmo_code(current.weather_code),
            ReadingSource::Provider(ProviderId::OpenMeteo),
            Utc::now(),
        ))
    }
}
